// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Task` (`spec.md` §4.C), ported from `afk/task.py`'s `BaseTask`. A single
//! abstract operation `main`, plus the configuration flags
//! `check_run_conditions` (`preflight.rs`) acts on.

use std::sync::Arc;

use afk_core::TaskError;
use afk_storage::Storage;

use crate::log_route::LogHandle;

/// Flags a Task declares up front; `check_run_conditions` reads them to
/// decide which preflight checks apply (`spec.md` §4.C).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskConfig {
    pub has_mutex: bool,
    pub has_archive: bool,
}

/// What a running Task's `main` gets: its log handle, the storage bundle it
/// was scheduled against, and its instance uuid.
pub struct TaskContext {
    pub storage: Arc<Storage>,
    pub log: LogHandle,
    pub uuid: String,
}

impl TaskContext {
    pub fn info(&self, message: impl Into<String>) {
        self.log.emit(afk_core::LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log.emit(afk_core::LogLevel::Warning, message);
    }
}

/// A unit of work. `main` is the user's actual work; a Task is invalid
/// until it's provided, so implementors supply it directly.
pub trait Task: Send + Sync {
    fn task_name(&self) -> &str;
    fn config(&self) -> TaskConfig;

    /// Whether an existing preflight archive marker should be rotated and
    /// the run continued, rather than short-circuited (`spec.md` §4.C step 3).
    fn override_archive(&self) -> bool {
        false
    }

    fn main(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
