// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Scheduler (`spec.md` §4.F), ported from `afk/scheduler.py`'s
//! `Scheduler`: a Runner extended with an in-memory ordered fire queue and
//! an externally-polled JSON addition file. Implemented as composition
//! (`Scheduler` holds an `Arc<Runner>`) rather than inheritance, per
//! `SPEC_FULL.md`'s design note on `Task`/`TaskInstance` placement.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use afk_core::{Clock, IdGen};
use afk_runner::Runner;
use afk_storage::{Location, OpenMode};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde_json::Map;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::error::SchedulerError;
use crate::recurrence;
use crate::schedule_entry::{self, RegisteredTask, ScheduleAdditionRecord, ScheduleEntry};

const SCHEDULER_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct SchedulerState {
    registered_tasks: HashMap<String, RegisteredTask>,
    pending_entries: Vec<ScheduleEntry>,
    inactive_entries: Vec<ScheduleEntry>,
}

pub struct Scheduler {
    runner: Arc<Runner>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    schedule_source: Box<dyn Location>,
    file_check_interval_minutes: i64,
    state: Arc<Mutex<SchedulerState>>,
    running: Arc<AtomicBool>,
    fiber: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<Runner>,
        schedule_source: Box<dyn Location>,
        file_check_interval_minutes: i64,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGen>,
    ) -> Self {
        Self {
            runner,
            clock,
            id_gen,
            schedule_source,
            file_check_interval_minutes,
            state: Arc::new(Mutex::new(SchedulerState {
                registered_tasks: HashMap::new(),
                pending_entries: Vec::new(),
                inactive_entries: Vec::new(),
            })),
            running: Arc::new(AtomicBool::new(false)),
            fiber: Mutex::new(None),
        }
    }

    pub fn register_task(&self, task: RegisteredTask) {
        self.state.lock().registered_tasks.insert(task.task_id.clone(), task);
    }

    /// Registers a one-off or recurring fire directly (`spec.md` §4.F's
    /// `add_scheduled_task_instance`), bypassing the external file.
    pub fn add_scheduled_task_instance(
        &self,
        task_id: impl Into<String>,
        m: Option<i64>,
        h: Option<i64>,
        start: Option<DateTime<Local>>,
        kwargs: Map<String, serde_json::Value>,
    ) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        let next_fire = recurrence::calculate_first_run(m, h, start, now)?;
        let entry = ScheduleEntry {
            uuid: self.id_gen.next(),
            task_id: task_id.into(),
            m,
            h,
            start,
            next_fire,
            kwargs,
        };
        let mut state = self.state.lock();
        state.pending_entries.push(entry);
        state.pending_entries.sort_by_key(|e| e.next_fire);
        Ok(())
    }

    /// Idempotent. Starts the underlying Runner first, re-schedules any
    /// entries parked in `inactive_entries` from a prior shutdown
    /// (`spec.md` §4.F "Lifecycle interplay"), then starts the scheduler
    /// fiber.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.fiber.lock().is_some() {
            return Ok(());
        }
        self.runner.start()?;
        self.running.store(true, Ordering::SeqCst);

        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            let reactivated: Result<Vec<ScheduleEntry>, SchedulerError> = state
                .inactive_entries
                .drain(..)
                .map(|mut entry| {
                    entry.next_fire = recurrence::calculate_first_run(entry.m, entry.h, entry.start, now)?;
                    Ok(entry)
                })
                .collect();
            state.pending_entries.extend(reactivated?);
            state.pending_entries.sort_by_key(|e| e.next_fire);
        }

        let initial_deadline = recurrence::calculate_first_run(Some(self.file_check_interval_minutes), None, None, now)?;
        let fiber = tokio::spawn(scheduler_loop(
            self.runner.clone(),
            self.clock.clone(),
            self.id_gen.clone(),
            self.schedule_source.clone(),
            self.file_check_interval_minutes,
            self.state.clone(),
            self.running.clone(),
            initial_deadline,
        ));
        *self.fiber.lock() = Some(fiber);
        Ok(())
    }

    /// Stops the scheduler fiber first, drains `pending_entries` into
    /// `inactive_entries` (preserving uuids), then shuts down the Runner
    /// (`spec.md` §4.F "Lifecycle interplay").
    pub async fn shutdown(&self, force: bool) {
        self.running.store(false, Ordering::SeqCst);
        let fiber = self.fiber.lock().take();
        if let Some(fiber) = fiber {
            let _ = fiber.await;
        }
        {
            let mut state = self.state.lock();
            let drained: Vec<ScheduleEntry> = state.pending_entries.drain(..).collect();
            state.inactive_entries.extend(drained);
        }
        self.runner.shutdown(force).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn scheduler_loop(
    runner: Arc<Runner>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGen>,
    schedule_source: Box<dyn Location>,
    file_check_interval_minutes: i64,
    state: Arc<Mutex<SchedulerState>>,
    running: Arc<AtomicBool>,
    mut file_check_deadline: DateTime<Local>,
) {
    loop {
        let now = clock.now();
        if now >= file_check_deadline {
            poll_schedule_source(schedule_source.as_ref(), &state, &id_gen, now);
            file_check_deadline = recurrence::advance_next_fire(file_check_deadline, Some(file_check_interval_minutes), None)
                .unwrap_or(file_check_deadline);
        }

        fire_due_entry(&runner, &state, clock.now());

        // Poll again so entries added this iteration are visible without
        // waiting for the next file-check deadline (`spec.md` §4.F step c).
        // The source is cleared after every successful poll, so this is a
        // cheap no-op unless something was appended between the two polls.
        poll_schedule_source(schedule_source.as_ref(), &state, &id_gen, clock.now());
        state.lock().pending_entries.sort_by_key(|e| e.next_fire);

        if !running.load(Ordering::SeqCst) {
            break;
        }
        sleep(SCHEDULER_POLL_INTERVAL).await;
    }
}

fn fire_due_entry(runner: &Runner, state: &Mutex<SchedulerState>, now: DateTime<Local>) {
    let entry = {
        let mut st = state.lock();
        let due = st.pending_entries.first().is_some_and(|e| e.next_fire <= now);
        if due {
            Some(st.pending_entries.remove(0))
        } else {
            None
        }
    };
    let Some(entry) = entry else { return };

    let registered = state.lock().registered_tasks.get(&entry.task_id).cloned();
    match registered {
        Some(task) => {
            let merged = schedule_entry::merge_kwargs(&task.default_kwargs, &entry.kwargs);
            let built = (task.factory)(merged);
            let instance = runner.generate_task_instance(built, task.task_type.clone(), task.run_type.clone());
            runner.add_tasks([instance]);
        }
        None => {
            tracing::warn!(task_id = %entry.task_id, "scheduled entry references an unregistered task id");
        }
    }

    if let Some(next_fire) = recurrence::advance_next_fire(entry.next_fire, entry.m, entry.h) {
        let mut updated = entry;
        updated.next_fire = next_fire;
        let mut st = state.lock();
        st.pending_entries.push(updated);
        st.pending_entries.sort_by_key(|e| e.next_fire);
    }
}

/// Reads the external schedule-additions file (`spec.md` §6), decodes each
/// element, and registers it via the same path as
/// `add_scheduled_task_instance`. The file holds only additions made since
/// the last successful poll — it is cleared to `[]` afterward, so re-polling
/// within the same loop iteration (or finding no new content) is a no-op.
fn poll_schedule_source(
    schedule_source: &dyn Location,
    state: &Mutex<SchedulerState>,
    id_gen: &Arc<dyn IdGen>,
    now: DateTime<Local>,
) {
    let exists = match schedule_source.exists() {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!(error = %e, "failed to check schedule source");
            return;
        }
    };
    if !exists {
        return;
    }

    let bytes = match schedule_source.read() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read schedule source");
            return;
        }
    };
    if bytes.is_empty() {
        return;
    }

    let records: Vec<ScheduleAdditionRecord> = match serde_json::from_slice(&bytes) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "schedule source contains invalid JSON, skipping this poll");
            return;
        }
    };
    if records.is_empty() {
        return;
    }

    for record in records {
        let (m, h, start) = record
            .schedule
            .as_ref()
            .map(|s| (s.min_interval, s.h_interval, s.start_time))
            .unwrap_or((None, None, None));
        match recurrence::calculate_first_run(m, h, start, now) {
            Ok(next_fire) => {
                let entry = ScheduleEntry {
                    uuid: id_gen.next(),
                    task_id: record.task_id,
                    m,
                    h,
                    start,
                    next_fire,
                    kwargs: record.task_args,
                };
                state.lock().pending_entries.push(entry);
            }
            Err(e) => {
                tracing::warn!(task_id = %record.task_id, error = %e, "rejecting scheduled entry with invalid recurrence");
            }
        }
    }

    if let Ok(mut stream) = schedule_source.open(OpenMode::Write) {
        let _ = stream.write_all(b"[]");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
