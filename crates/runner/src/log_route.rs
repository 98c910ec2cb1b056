// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log Routing (`spec.md` §4.G): one sink and one channel per task-type.
//! Producers (TaskInstances) push `LogRecord`s; a single consumer fiber per
//! route writes them out serially, preserving per-producer program order.

use std::io::Write as _;
use std::sync::Arc;

use afk_core::{LogContext, LogLevel, LogRecord};
use afk_storage::Storage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Where a task-type's log records ultimately land. The default is an
/// append-only file at `log-loc/<task-type>.log`; callers may register
/// their own sink before a route is created.
pub trait LogSink: Send + 'static {
    fn write_record(&mut self, record: &LogRecord);
}

pub struct FileLogSink {
    file: std::fs::File,
}

impl FileLogSink {
    pub fn for_task_type(storage: &Storage, task_type: &str) -> std::io::Result<Self> {
        let loc = storage.log().join_loc(&format!("{task_type}.log"));
        let path = loc.path().to_string();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { file })
    }
}

impl LogSink for FileLogSink {
    fn write_record(&mut self, record: &LogRecord) {
        // Best-effort: a write failure here must not take down the
        // consumer fiber, since that would silently stop the whole route.
        let _ = writeln!(self.file, "{record}");
    }
}

/// A producer-facing handle bound to one TaskInstance: stamps uuid,
/// task-type, task-name, run-type, and host, then pushes onto the route's
/// channel.
#[derive(Clone)]
pub struct LogHandle {
    ctx: LogContext,
    clock: Arc<dyn afk_core::Clock>,
    tx: UnboundedSender<LogRecord>,
}

impl LogHandle {
    pub fn new(ctx: LogContext, clock: Arc<dyn afk_core::Clock>, tx: UnboundedSender<LogRecord>) -> Self {
        Self { ctx, clock, tx }
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let source = afk_core::LogSource::new(file!(), line!());
        let record = self.ctx.record(self.clock.now(), level, source, message.into());
        let _ = self.tx.send(record);
    }
}

/// One task-type's (sink, channel) pair plus the consumer fiber writing to
/// it, per `spec.md` §4.G.
pub struct LogRoute {
    tx: UnboundedSender<LogRecord>,
    consumer: JoinHandle<()>,
}

impl LogRoute {
    pub fn spawn(mut sink: Box<dyn LogSink>) -> Self {
        let (tx, mut rx): (UnboundedSender<LogRecord>, UnboundedReceiver<LogRecord>) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                sink.write_record(&record);
            }
        });
        Self { tx, consumer }
    }

    pub fn sender(&self) -> UnboundedSender<LogRecord> {
        self.tx.clone()
    }

    /// Stops the consumer fiber after the channel drains. Dropping every
    /// sender clone closes the channel; `recv()` then returns `None` and
    /// the consumer task exits on its own.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.consumer.await;
    }
}

#[cfg(test)]
#[path = "log_route_tests.rs"]
mod tests;
