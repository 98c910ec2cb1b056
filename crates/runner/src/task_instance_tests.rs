// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::log_route::LogRoute;
use afk_core::{LogContext, SequentialIdGen, SystemClock};
use afk_storage::LocalLocation;
use chrono::{Local, TimeZone};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::tempdir;
use tokio::sync::mpsc;

struct RecordingSink {
    records: Arc<std::sync::Mutex<Vec<(LogLevel, String)>>>,
}

impl crate::log_route::LogSink for RecordingSink {
    fn write_record(&mut self, record: &afk_core::LogRecord) {
        self.records
            .lock()
            .unwrap()
            .push((record.level, record.message.clone()));
    }
}

fn storage_in(dir: &std::path::Path) -> Arc<Storage> {
    let base: Box<dyn Location> = Box::new(LocalLocation::new(dir));
    let storage = Storage::new(base, Local.with_ymd_and_hms(2026, 7, 30, 9, 0, 0).unwrap());
    storage.data().mkdir(true).unwrap();
    Arc::new(storage)
}

fn handle_with_recorder() -> (LogHandle, Arc<std::sync::Mutex<Vec<(LogLevel, String)>>>) {
    let records = Arc::new(std::sync::Mutex::new(Vec::new()));
    let route = LogRoute::spawn(Box::new(RecordingSink {
        records: records.clone(),
    }));
    let ctx = LogContext {
        host_id: "host".to_string(),
        run_type: "manual".to_string(),
        task_type: "demo".to_string(),
        task_name: "flag-task".to_string(),
        uuid: "uuid-1".to_string(),
    };
    let handle = LogHandle::new(ctx, Arc::new(SystemClock), route.sender());
    // Dropping `route` here only drops its own sender clone and detaches its
    // consumer JoinHandle; the clone held by `handle` keeps the channel (and
    // therefore the consumer fiber) alive for the rest of the test.
    (handle, records)
}

struct RanFlagTask {
    ran: Arc<AtomicBool>,
    config: TaskConfig,
}

impl Task for RanFlagTask {
    fn task_name(&self) -> &str {
        "flag-task"
    }

    fn config(&self) -> TaskConfig {
        self.config
    }

    fn main(&self, _ctx: &TaskContext) -> Result<(), afk_core::TaskError> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingTask;

impl Task for FailingTask {
    fn task_name(&self) -> &str {
        "failing-task"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::default()
    }

    fn main(&self, _ctx: &TaskContext) -> Result<(), afk_core::TaskError> {
        Err(afk_core::TaskError::new("boom"))
    }
}

struct PanickingTask;

impl Task for PanickingTask {
    fn task_name(&self) -> &str {
        "panicking-task"
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::default()
    }

    fn main(&self, _ctx: &TaskContext) -> Result<(), afk_core::TaskError> {
        panic!("everything is fine");
    }
}

#[test]
fn for_task_normalizes_and_assigns_uuid() {
    let id_gen = SequentialIdGen::new("inst");
    let task = Box::new(RanFlagTask {
        ran: Arc::new(AtomicBool::new(false)),
        config: TaskConfig::default(),
    });
    let instance = TaskInstance::for_task(task, "Demo Type", " Manual Run ", &id_gen);

    assert_eq!(instance.task_type, "demo_type");
    assert_eq!(instance.task_name, "flag-task");
    assert_eq!(instance.run_type, "manual_run");
    assert_eq!(instance.uuid, "inst-0");
    assert!(!instance.is_bare_callable());
}

#[test]
fn for_callable_is_bare() {
    let id_gen = SequentialIdGen::new("inst");
    let instance = TaskInstance::for_callable(
        Box::new(|| Ok(())),
        "demo",
        "adhoc",
        "manual",
        &id_gen,
    );
    assert!(instance.is_bare_callable());
}

#[tokio::test]
async fn start_without_log_fails() {
    let dir = tempdir().unwrap();
    let storage = storage_in(dir.path());
    let id_gen = SequentialIdGen::new("inst");
    let instance = TaskInstance::for_callable(Box::new(|| Ok(())), "demo", "adhoc", "manual", &id_gen);
    let (mutex_tx, _mutex_rx) = mpsc::unbounded_channel();

    let result = instance.start(storage, mutex_tx);
    assert!(matches!(result, Err(RunnerError::MissingLogAdapter)));
}

#[tokio::test]
async fn successful_task_runs_and_registers_mutex() {
    let dir = tempdir().unwrap();
    let storage = storage_in(dir.path());
    let id_gen = SequentialIdGen::new("inst");
    let ran = Arc::new(AtomicBool::new(false));
    let task = Box::new(RanFlagTask {
        ran: ran.clone(),
        config: TaskConfig {
            has_mutex: true,
            has_archive: false,
        },
    });
    let mut instance = TaskInstance::for_task(task, "demo", "manual", &id_gen);
    let (handle, records) = handle_with_recorder();
    instance.attach_log(handle);
    let (mutex_tx, mut mutex_rx) = mpsc::unbounded_channel();

    let join = instance.start(storage.clone(), mutex_tx).unwrap();
    let code = join.await.unwrap();

    assert_eq!(code, 0);
    assert!(ran.load(Ordering::SeqCst));
    let (key, _loc) = mutex_rx.recv().await.unwrap();
    assert_eq!(key, "flag-task-inst-0");
    assert!(records
        .lock()
        .unwrap()
        .iter()
        .any(|(_, msg)| msg == "CONDITIONS_PASSED"));
}

#[tokio::test]
async fn mutex_already_held_skips_main_without_error() {
    let dir = tempdir().unwrap();
    let storage = storage_in(dir.path());
    storage.mutex_location("flag-task").touch(true, true).unwrap();
    let id_gen = SequentialIdGen::new("inst");
    let ran = Arc::new(AtomicBool::new(false));
    let task = Box::new(RanFlagTask {
        ran: ran.clone(),
        config: TaskConfig {
            has_mutex: true,
            has_archive: false,
        },
    });
    let mut instance = TaskInstance::for_task(task, "demo", "manual", &id_gen);
    let (handle, records) = handle_with_recorder();
    instance.attach_log(handle);
    let (mutex_tx, _mutex_rx) = mpsc::unbounded_channel();

    let join = instance.start(storage, mutex_tx).unwrap();
    let code = join.await.unwrap();

    assert_eq!(code, 0);
    assert!(!ran.load(Ordering::SeqCst));
    assert!(records
        .lock()
        .unwrap()
        .iter()
        .any(|(_, msg)| msg == "MUTEX_FOUND"));
}

#[tokio::test]
async fn failing_task_emits_one_error_record() {
    let dir = tempdir().unwrap();
    let storage = storage_in(dir.path());
    let id_gen = SequentialIdGen::new("inst");
    let mut instance = TaskInstance::for_task(Box::new(FailingTask), "demo", "manual", &id_gen);
    let (handle, records) = handle_with_recorder();
    instance.attach_log(handle);
    let (mutex_tx, _mutex_rx) = mpsc::unbounded_channel();

    let join = instance.start(storage, mutex_tx).unwrap();
    let code = join.await.unwrap();

    assert_eq!(code, 1);
    let recorded = records.lock().unwrap();
    assert!(recorded.iter().any(|(level, msg)| *level == LogLevel::Error && msg == "boom"));
}

#[tokio::test]
async fn panicking_task_is_caught_and_reported() {
    let dir = tempdir().unwrap();
    let storage = storage_in(dir.path());
    let id_gen = SequentialIdGen::new("inst");
    let mut instance = TaskInstance::for_task(Box::new(PanickingTask), "demo", "manual", &id_gen);
    let (handle, records) = handle_with_recorder();
    instance.attach_log(handle);
    let (mutex_tx, _mutex_rx) = mpsc::unbounded_channel();

    let join = instance.start(storage, mutex_tx).unwrap();
    let code = join.await.unwrap();

    assert_eq!(code, 1);
    let recorded = records.lock().unwrap();
    let error_idx = recorded
        .iter()
        .position(|(level, msg)| *level == LogLevel::Error && msg.contains("everything is fine"))
        .expect("panic should produce an ERROR record with the panic message");

    let warnings: Vec<&str> = recorded[..error_idx]
        .iter()
        .filter(|(level, _)| *level == LogLevel::Warning)
        .map(|(_, msg)| msg.as_str())
        .collect();
    assert!(
        !warnings.is_empty(),
        "expected at least one WARNING frame line before the ERROR record"
    );
    assert!(warnings.iter().all(|line| !line.is_empty()));
}
