// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use afk_core::{SequentialIdGen, SystemClock, TaskError};
use afk_storage::LocalLocation;
use chrono::{Local, TimeZone};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration as StdDuration;
use tempfile::tempdir;

fn runner_in(dir: &std::path::Path) -> Runner {
    let base: Box<dyn Location> = Box::new(LocalLocation::new(dir));
    let storage = Storage::new(base, Local.with_ymd_and_hms(2026, 7, 30, 9, 0, 0).unwrap());
    storage.data().mkdir(true).unwrap();
    storage.log().mkdir(true).unwrap();
    Runner::new(
        Arc::new(storage),
        "test-host",
        Arc::new(SequentialIdGen::new("inst")),
        Arc::new(SystemClock),
    )
}

struct FlagTask {
    ran: Arc<AtomicBool>,
}

impl Task for FlagTask {
    fn task_name(&self) -> &str {
        "flag-task"
    }

    fn config(&self) -> crate::task::TaskConfig {
        crate::task::TaskConfig {
            has_mutex: true,
            has_archive: false,
        }
    }

    fn main(&self, _ctx: &crate::task::TaskContext) -> Result<(), TaskError> {
        self.ran.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn dispatches_and_completes_a_task() {
    let dir = tempdir().unwrap();
    let runner = runner_in(dir.path());
    runner.start().unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let instance = runner.generate_task_instance(Box::new(FlagTask { ran: ran.clone() }), "demo", "manual");
    runner.add_tasks([instance]);

    wait_until(|| ran.load(AtomicOrdering::SeqCst)).await;
    runner.shutdown(false).await;

    let log_path = std::path::Path::new(dir.path()).join("logs").join("demo.log");
    let contents = std::fs::read_to_string(log_path).unwrap();
    assert!(contents.contains("JOB_START"));
    assert!(contents.contains("CONDITIONS_PASSED"));
    assert!(contents.contains("JOB_COMPLETED"));
}

#[tokio::test]
async fn bare_callable_emits_conditions_passed_without_preflight() {
    let dir = tempdir().unwrap();
    let runner = runner_in(dir.path());
    runner.start().unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = ran.clone();
    let instance = runner.generate_callable_instance(
        Box::new(move || {
            ran_clone.store(true, AtomicOrdering::SeqCst);
            Ok(())
        }),
        "adhoc",
        "one-off",
        "manual",
    );
    runner.add_tasks([instance]);

    wait_until(|| ran.load(AtomicOrdering::SeqCst)).await;
    runner.shutdown(false).await;

    let log_path = std::path::Path::new(dir.path()).join("logs").join("adhoc.log");
    let contents = std::fs::read_to_string(log_path).unwrap();
    assert!(contents.contains("CONDITIONS_PASSED"));
    assert!(contents.contains("JOB_COMPLETED"));
}

#[tokio::test]
async fn start_is_idempotent() {
    let dir = tempdir().unwrap();
    let runner = runner_in(dir.path());
    runner.start().unwrap();
    runner.start().unwrap();
    runner.shutdown(false).await;
}

struct SlowTask {
    started: Arc<AtomicBool>,
    ran: Arc<AtomicBool>,
}

impl Task for SlowTask {
    fn task_name(&self) -> &str {
        "demo"
    }

    fn config(&self) -> crate::task::TaskConfig {
        crate::task::TaskConfig {
            has_mutex: true,
            has_archive: false,
        }
    }

    fn main(&self, _ctx: &crate::task::TaskContext) -> Result<(), TaskError> {
        self.started.store(true, AtomicOrdering::SeqCst);
        std::thread::sleep(StdDuration::from_millis(150));
        self.ran.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn concurrent_submission_of_same_task_name_is_blocked_by_mutex() {
    let dir = tempdir().unwrap();
    let runner = runner_in(dir.path());
    runner.start().unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let ran_first = Arc::new(AtomicBool::new(false));
    let first = runner.generate_task_instance(
        Box::new(SlowTask {
            started: started.clone(),
            ran: ran_first.clone(),
        }),
        "demo",
        "manual",
    );
    runner.add_tasks([first]);
    wait_until(|| started.load(AtomicOrdering::SeqCst)).await;

    let ran_second = Arc::new(AtomicBool::new(false));
    let second = runner.generate_task_instance(
        Box::new(FlagTask {
            ran: ran_second.clone(),
        }),
        "demo",
        "manual",
    );
    runner.add_tasks([second]);

    wait_until(|| ran_first.load(AtomicOrdering::SeqCst)).await;
    runner.shutdown(false).await;

    assert!(!ran_second.load(AtomicOrdering::SeqCst));

    let log_path = std::path::Path::new(dir.path()).join("logs").join("demo.log");
    let contents = std::fs::read_to_string(log_path).unwrap();
    assert!(contents.contains("MUTEX_FOUND"));
}
