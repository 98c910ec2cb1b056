// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `TaskInstance` (`spec.md` §4.D), ported from `afk/task_process.py`'s
//! `TaskProcess`: wraps either a `Task` or a bare callable, runs it inside
//! an exception boundary, and reports back an exit code the reaper polls.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use afk_core::{normalize_identifier, IdGen, LogContext, LogLevel};
use afk_storage::{Location, Storage};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::RunnerError;
use crate::log_route::LogHandle;
use crate::preflight;
use crate::task::{Task, TaskConfig, TaskContext};

type MutexRegistration = (String, Box<dyn Location>);

enum Kind {
    Task {
        task: Box<dyn Task>,
        config: TaskConfig,
        override_archive: bool,
    },
    Callable(Box<dyn FnOnce() -> Result<(), afk_core::TaskError> + Send>),
}

/// One unit of dispatch. Constructed via `for_task`/`for_callable` — exactly
/// one of those two shapes exists per instance, enforced by construction
/// rather than a runtime check (`spec.md` §4.D: "validates that exactly one
/// of the two is provided").
pub struct TaskInstance {
    pub uuid: String,
    pub task_type: String,
    pub task_name: String,
    pub run_type: String,
    kind: Kind,
    log: Option<LogHandle>,
}

impl TaskInstance {
    pub fn for_task(
        task: Box<dyn Task>,
        task_type: impl Into<String>,
        run_type: impl Into<String>,
        id_gen: &dyn IdGen,
    ) -> Self {
        let task_name = normalize_identifier(task.task_name());
        let config = task.config();
        let override_archive = task.override_archive();
        Self {
            uuid: id_gen.next(),
            task_type: normalize_identifier(&task_type.into()),
            task_name,
            run_type: normalize_identifier(&run_type.into()),
            kind: Kind::Task {
                task,
                config,
                override_archive,
            },
            log: None,
        }
    }

    pub fn for_callable(
        callable: Box<dyn FnOnce() -> Result<(), afk_core::TaskError> + Send>,
        task_type: impl Into<String>,
        task_name: impl Into<String>,
        run_type: impl Into<String>,
        id_gen: &dyn IdGen,
    ) -> Self {
        Self {
            uuid: id_gen.next(),
            task_type: normalize_identifier(&task_type.into()),
            task_name: normalize_identifier(&task_name.into()),
            run_type: normalize_identifier(&run_type.into()),
            kind: Kind::Callable(callable),
            log: None,
        }
    }

    pub fn is_bare_callable(&self) -> bool {
        matches!(self.kind, Kind::Callable(_))
    }

    /// `"<task-name>-<uuid>"` (`spec.md` §4.E step 4).
    pub fn composite_key(&self) -> String {
        format!("{}-{}", self.task_name, self.uuid)
    }

    pub fn log_context(&self, host_id: &str) -> LogContext {
        LogContext {
            host_id: host_id.to_string(),
            run_type: self.run_type.clone(),
            task_type: self.task_type.clone(),
            task_name: self.task_name.clone(),
            uuid: self.uuid.clone(),
        }
    }

    pub fn attach_log(&mut self, log: LogHandle) {
        self.log = Some(log);
    }

    /// Starts the worker on the blocking pool — a separate OS thread, so a
    /// panicking task cannot corrupt the Runner's own state (`spec.md` §5
    /// "parallel workers"). Fails if no log adapter has been attached
    /// (`spec.md` §4.D: "`start()` must fail if no log adapter has been set").
    pub fn start(
        mut self,
        storage: Arc<Storage>,
        mutex_tx: UnboundedSender<MutexRegistration>,
    ) -> Result<JoinHandle<i32>, RunnerError> {
        let log = self.log.take().ok_or(RunnerError::MissingLogAdapter)?;
        let composite_key = self.composite_key();
        let uuid = self.uuid.clone();
        let kind = self.kind;
        Ok(tokio::task::spawn_blocking(move || {
            run_kind(kind, storage, log, mutex_tx, composite_key, uuid)
        }))
    }
}

fn run_kind(
    kind: Kind,
    storage: Arc<Storage>,
    log: LogHandle,
    mutex_tx: UnboundedSender<MutexRegistration>,
    composite_key: String,
    uuid: String,
) -> i32 {
    match kind {
        Kind::Callable(callable) => run_guarded(log, move || callable()),
        Kind::Task {
            task,
            config,
            override_archive,
        } => {
            let preflight = match preflight::check_run_conditions(
                &storage,
                &task.task_name(),
                &config,
                override_archive,
            ) {
                Ok(result) => result,
                Err(e) => {
                    log.emit(LogLevel::Error, e.to_string());
                    return 1;
                }
            };

            if !preflight.outcome.proceeds() {
                let message = preflight.outcome.reserved_message().unwrap_or("UNKNOWN");
                log.emit(LogLevel::Warning, message);
                return 0;
            }
            if let Some(mutex_loc) = preflight.mutex_location {
                let _ = mutex_tx.send((composite_key, mutex_loc));
            }
            log.emit(LogLevel::Info, "CONDITIONS_PASSED");

            let task_log = log.clone();
            run_guarded(log, move || {
                let ctx = TaskContext {
                    storage,
                    log: task_log,
                    uuid,
                };
                task.main(&ctx)
            })
        }
    }
}

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Chains onto the process' existing panic hook (there should only ever be
/// one installed, by `spawn_blocking`'s own Tokio runtime or by us) so a
/// worker thread's panic leaves a `Backtrace::force_capture()` behind in its
/// own thread-local before unwinding reaches `catch_unwind` — `catch_unwind`
/// itself only yields the panic payload, never a backtrace.
fn ensure_backtrace_hook_installed() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|cell| {
                *cell.borrow_mut() = Some(Backtrace::force_capture());
            });
            previous(info);
        }));
    });
}

/// Runs `body` inside a panic boundary, converting an uncaught panic into
/// WARNING + ERROR records the way `prep_run` did (`spec.md` §4.D step 2).
fn run_guarded(log: LogHandle, body: impl FnOnce() -> Result<(), afk_core::TaskError>) -> i32 {
    ensure_backtrace_hook_installed();
    match std::panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            log.emit(LogLevel::Error, e.0);
            1
        }
        Err(payload) => {
            let message = panic_message(&payload);
            let backtrace = LAST_BACKTRACE.with(|cell| cell.borrow_mut().take());
            for line in backtrace_frame_lines(backtrace.as_ref()) {
                log.emit(LogLevel::Warning, line);
            }
            log.emit(LogLevel::Error, message);
            1
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// One WARNING line per captured frame (`spec.md` §4.D step 2's "WARNING
/// per traceback frame" sequence). Falls back to a single line noting the
/// backtrace is unavailable rather than silently emitting nothing, for the
/// case where the hook never ran (a panic originating outside `catch_unwind`'s
/// dynamic scope, which should not happen here but costs nothing to guard).
fn backtrace_frame_lines(backtrace: Option<&Backtrace>) -> Vec<String> {
    let Some(backtrace) = backtrace else {
        return vec!["no backtrace captured for this panic".to_string()];
    };
    let rendered = backtrace.to_string();
    let lines: Vec<String> = rendered
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect();
    if lines.is_empty() {
        vec!["no backtrace captured for this panic".to_string()]
    } else {
        lines
    }
}

#[cfg(test)]
#[path = "task_instance_tests.rs"]
mod tests;
