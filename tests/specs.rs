// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests (`spec.md` §8 "End-to-end scenarios", S1-S6),
//! exercised against the full `afk-core`/`afk-storage`/`afk-runner`/
//! `afk-scheduler` stack rather than any single crate's unit tests.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use afk_core::{FakeClock, SequentialIdGen, TaskError};
use afk_runner::{Runner, Task, TaskConfig, TaskContext};
use afk_storage::{LocalLocation, Location, Storage};
use chrono::Local;
use tempfile::tempdir;

fn storage_in(dir: &Path) -> Storage {
    let base: Box<dyn Location> = Box::new(LocalLocation::new(dir));
    let storage = Storage::new(base, Local::now());
    storage.data().mkdir(true).unwrap();
    storage.tmp().mkdir(true).unwrap();
    storage.archive().mkdir(true).unwrap();
    storage.log().mkdir(true).unwrap();
    storage
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("condition never became true within the test's polling window");
}

fn read_log(storage: &Storage, task_type: &str) -> String {
    let loc = storage.log().join_loc(&format!("{task_type}.log"));
    String::from_utf8(loc.read().unwrap_or_default()).unwrap_or_default()
}

fn line_index(log: &str, needle: &str) -> Option<usize> {
    log.lines().position(|l| l.contains(needle))
}

// S1 - Single happy task.
struct HappyTask;

impl Task for HappyTask {
    fn task_name(&self) -> &str {
        "t1"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig {
            has_mutex: true,
            has_archive: false,
        }
    }

    fn main(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let out = ctx.storage.data().join_loc("out.txt");
        out.touch(true, true).map_err(|e| TaskError::new(e.to_string()))?;
        let mut stream = out.open(afk_storage::OpenMode::Write).map_err(|e| TaskError::new(e.to_string()))?;
        stream.write_all(b"ok").map_err(|e| TaskError::new(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn s1_single_happy_task() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(storage_in(dir.path()));
    let runner = Runner::new(
        storage.clone(),
        "test-host",
        Arc::new(SequentialIdGen::new("s1")),
        Arc::new(afk_core::SystemClock),
    );
    runner.start().unwrap();

    let instance = runner.generate_task_instance(Box::new(HappyTask), "default", "manual");
    let uuid = instance.uuid.clone();
    runner.add_tasks([instance]);

    wait_until(|| !storage.mutex_location("t1").exists().unwrap_or(true)).await;
    runner.shutdown(false).await;

    let out = storage.data().join_loc("out.txt");
    assert_eq!(out.read().unwrap(), b"ok");
    assert!(!storage.mutex_location("t1").exists().unwrap());

    let log = read_log(&storage, "default");
    let start = line_index(&log, "JOB_START").expect("JOB_START missing");
    let conditions = line_index(&log, "CONDITIONS_PASSED").expect("CONDITIONS_PASSED missing");
    let completed = line_index(&log, "JOB_COMPLETED").expect("JOB_COMPLETED missing");
    assert!(start < conditions && conditions < completed);
    for line in [log.lines().nth(start).unwrap(), log.lines().nth(conditions).unwrap(), log.lines().nth(completed).unwrap()] {
        assert!(line.contains(&uuid), "record missing instance uuid: {line}");
    }
}

// S2 - Failing task retains mutex.
struct FailingTask;

impl Task for FailingTask {
    fn task_name(&self) -> &str {
        "t2"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig {
            has_mutex: true,
            has_archive: false,
        }
    }

    fn main(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Err(TaskError::new("deliberate failure"))
    }
}

#[tokio::test]
async fn s2_failing_task_retains_mutex() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(storage_in(dir.path()));
    let runner = Runner::new(
        storage.clone(),
        "test-host",
        Arc::new(SequentialIdGen::new("s2")),
        Arc::new(afk_core::SystemClock),
    );
    runner.start().unwrap();

    let instance = runner.generate_task_instance(Box::new(FailingTask), "default", "manual");
    runner.add_tasks([instance]);

    wait_until(|| read_log(&storage, "default").contains("JOB_FAILED")).await;
    runner.shutdown(false).await;

    assert!(storage.mutex_location("t2").exists().unwrap());
    let log = read_log(&storage, "default");
    assert!(log.contains("CONDITIONS_PASSED"));
    assert!(log.contains("ERROR: deliberate failure"));
    assert!(log.contains("JOB_FAILED"));
}

// S3 - Mutex blocks re-run.
#[tokio::test]
async fn s3_mutex_blocks_rerun() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(storage_in(dir.path()));
    storage.mutex_location("t1").touch(true, true).unwrap();

    let runner = Runner::new(
        storage.clone(),
        "test-host",
        Arc::new(SequentialIdGen::new("s3")),
        Arc::new(afk_core::SystemClock),
    );
    runner.start().unwrap();

    let instance = runner.generate_task_instance(Box::new(HappyTask), "default", "manual");
    runner.add_tasks([instance]);

    wait_until(|| read_log(&storage, "default").contains("MUTEX_FOUND")).await;
    runner.shutdown(false).await;

    assert!(!storage.data().join_loc("out.txt").exists().unwrap());
}

// S4 - Recurrence cadence. Uses a FakeClock advanced in 1-minute steps
// rather than waiting 6m20s of real time; min_interval=2 minutes.
struct SleepyTask;

impl Task for SleepyTask {
    fn task_name(&self) -> &str {
        "t3"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::default()
    }

    fn main(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        std::thread::sleep(StdDuration::from_millis(30));
        Ok(())
    }
}

#[tokio::test]
async fn s4_recurrence_cadence() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(storage_in(dir.path()));
    let fake_clock = Arc::new(FakeClock::new(Local::now()));
    let runner = Arc::new(Runner::new(
        storage.clone(),
        "test-host",
        Arc::new(SequentialIdGen::new("s4")),
        fake_clock.clone(),
    ));

    let source_path = dir.path().join("schedule_additions.json");
    let source: Box<dyn Location> = Box::new(LocalLocation::new(source_path.as_path()));
    let id_gen = Arc::new(SequentialIdGen::new("s4-sched"));
    let scheduler = afk_scheduler::Scheduler::new(runner, source, 60, fake_clock.clone(), id_gen);

    scheduler.register_task(t3_registered_task());
    scheduler
        .add_scheduled_task_instance("t3", Some(2), None, None, serde_json::Map::new())
        .unwrap();
    scheduler.start().unwrap();

    // Advance through 4 fires at 2-minute intervals, letting each SleepyTask
    // run to completion between advances.
    for _ in 0..4 {
        fake_clock.advance_ms(2 * 60 * 1000);
        tokio::time::sleep(StdDuration::from_millis(80)).await;
    }
    wait_until(|| read_log(&storage, "recurring").matches("JOB_COMPLETED").count() >= 4).await;

    scheduler.shutdown(false).await;
    let log = read_log(&storage, "recurring");
    assert!(log.matches("JOB_START").count() >= 4);
    assert_eq!(log.matches("JOB_START").count(), log.matches("JOB_COMPLETED").count());
}

fn t3_registered_task() -> afk_scheduler::RegisteredTask {
    afk_scheduler::RegisteredTask::new(
        "t3",
        "recurring",
        "scheduled",
        serde_json::Map::new(),
        |_kwargs| -> Box<dyn Task> { Box::new(SleepyTask) },
    )
}

// S5 - Block-delta sync.
#[tokio::test]
async fn s5_block_delta_sync() {
    let dir = tempdir().unwrap();
    let a_path = dir.path().join("a.bin");
    let b_path = dir.path().join("b.bin");

    let a_bytes = vec![b'A'; 12 * 1024];
    std::fs::write(&a_path, &a_bytes).unwrap();

    let mut b_bytes = a_bytes.clone();
    for byte in &mut b_bytes[4096..5000] {
        *byte = b'X';
    }
    std::fs::write(&b_path, &b_bytes).unwrap();

    let a = LocalLocation::new(a_path.as_path());
    let b = LocalLocation::new(b_path.as_path());
    b.sync_locations(&a, false, false).unwrap();

    let synced = std::fs::read(&b_path).unwrap();
    assert_eq!(synced, a_bytes);
}

// S6 - Rotate chain.
#[tokio::test]
async fn s6_rotate_chain() {
    let dir = tempdir().unwrap();
    let f_path = dir.path().join("f");

    for _ in 0..3 {
        std::fs::write(&f_path, b"x").unwrap();
        let loc = LocalLocation::new(f_path.as_path());
        loc.rotate().unwrap();
    }
    std::fs::write(&f_path, b"x").unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["f", "f.old0", "f.old1", "f.old2"]);
}
