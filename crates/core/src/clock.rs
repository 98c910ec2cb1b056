// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source abstraction.
//!
//! The scheduler's recurrence math (`spec.md` §4.F) and the canonical log
//! timestamp (`spec.md` §6) both need "now" in local time. A trait keeps
//! the Runner/Scheduler free of a process-wide clock singleton (Design Note
//! in `spec.md` §9) and lets tests drive time deterministically.

use chrono::{DateTime, Local, TimeZone};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> DateTime<Local>;

    /// Current time as milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64 {
        self.now()
            .timestamp_millis()
            .try_into()
            .unwrap_or_default()
    }
}

/// Wall-clock time source for production use.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Deterministic, settable/advanceable clock for tests (recurrence math,
/// scenario S4's cadence checks).
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: std::sync::Arc<AtomicI64>,
}

impl FakeClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            epoch_ms: std::sync::Arc::new(AtomicI64::new(now.timestamp_millis())),
        }
    }

    /// Advance the fake clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.epoch_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now: DateTime<Local>) {
        self.epoch_ms.store(now.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Local> {
        let ms = self.epoch_ms.load(Ordering::SeqCst);
        Local.timestamp_millis_opt(ms).single().unwrap_or_else(Local::now)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
