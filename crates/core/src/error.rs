// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for `Task`/`TaskInstance` (`spec.md` §7).
//!
//! Other crates define their own error enums for their own taxonomy rows
//! (`afk_storage::StorageError` for "Location operation"/"Remote transient",
//! `afk_runner::RunnerError` for "Runner invariant").

use thiserror::Error;

/// A caught application error from `Task::main` (the idiomatic analogue of
/// a caught exception in the original). Produces a single ERROR record.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for TaskError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Result of `Task::check_run_conditions` (`spec.md` §4.C): either the run
/// may proceed, or a named pre-flight short circuit fired. Short circuits
/// are not errors — the worker still exits 0 ("did not run").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightOutcome {
    /// All conditions passed; mutex (if any) has been touched and registered.
    Proceed,
    /// `ARCHIVE_FILE_FOUND` — archive output already exists and `override` is false.
    ArchiveFileFound,
    /// `STOP_FILE_FOUND` — a halt file is present.
    StopFileFound,
    /// `DEP_FILES_MISSING` — one or more required files are absent.
    DepFilesMissing,
    /// `MUTEX_FOUND` — the mutex file already exists.
    MutexFound,
}

impl PreflightOutcome {
    /// Whether this outcome lets `Task::main` run.
    pub fn proceeds(self) -> bool {
        matches!(self, PreflightOutcome::Proceed)
    }

    /// The reserved terminal message associated with a short circuit, if any.
    pub fn reserved_message(self) -> Option<&'static str> {
        match self {
            PreflightOutcome::Proceed => None,
            PreflightOutcome::ArchiveFileFound => Some("ARCHIVE_FILE_FOUND"),
            PreflightOutcome::StopFileFound => Some("STOP_FILE_FOUND"),
            PreflightOutcome::DepFilesMissing => Some("DEP_FILES_MISSING"),
            PreflightOutcome::MutexFound => Some("MUTEX_FOUND"),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
