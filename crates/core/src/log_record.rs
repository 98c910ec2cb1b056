// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical structured log record (`spec.md` §6):
//!
//! ```text
//! <asctime> <host-id> <run-type> <task-type> <task-name> <uuid> '<source-path>' LINENO:<n> <LEVEL>: <message>
//! ```

use chrono::{DateTime, Local};
use std::fmt;

pub const CANONICAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity, ordered so sinks can filter (`log_level` on a `Task`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Identifies the emitting source location in the implementation.
#[derive(Debug, Clone)]
pub struct LogSource {
    pub path: String,
    pub line: u32,
}

impl LogSource {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

/// One structured log record, ready to be rendered to the canonical line
/// format and written to a task-type sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub host_id: String,
    pub run_type: String,
    pub task_type: String,
    pub task_name: String,
    pub uuid: String,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} '{}' LINENO:{} {}: {}",
            self.timestamp.format(CANONICAL_TIME_FORMAT),
            self.host_id,
            self.run_type,
            self.task_type,
            self.task_name,
            self.uuid,
            self.source.path,
            self.source.line,
            self.level,
            self.message,
        )
    }
}

/// Per-instance metadata bound into every [`LogRecord`] a `TaskInstance`
/// emits — built once at dispatch time (`spec.md` §4.E step 5) and cloned
/// into each record.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub host_id: String,
    pub run_type: String,
    pub task_type: String,
    pub task_name: String,
    pub uuid: String,
}

impl LogContext {
    pub fn record(
        &self,
        clock_now: DateTime<Local>,
        level: LogLevel,
        source: LogSource,
        message: impl Into<String>,
    ) -> LogRecord {
        LogRecord {
            timestamp: clock_now,
            host_id: self.host_id.clone(),
            run_type: self.run_type.clone(),
            task_type: self.task_type.clone(),
            task_name: self.task_name.clone(),
            uuid: self.uuid.clone(),
            source,
            level,
            message: message.into(),
        }
    }
}

/// Emit a [`LogRecord`] from a `LogContext`, a clock, and a level, stamping
/// the call site via `file!()`/`line!()` as `spec.md` §6 requires.
#[macro_export]
macro_rules! log_record {
    ($ctx:expr, $clock:expr, $level:expr, $($arg:tt)*) => {
        $ctx.record($clock.now(), $level, $crate::log_record::LogSource::new(file!(), line!()), format!($($arg)*))
    };
}

#[cfg(test)]
#[path = "log_record_tests.rs"]
mod tests;
