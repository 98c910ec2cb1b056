// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit runtime context (`spec.md` §9 Design Notes): the original had
//! module-level default loggers, an `INTERACTIVE` probe, and an implicit
//! working-directory capture. The port passes a `RuntimeContext` (host id,
//! clock, id generator) explicitly into `Runner`/`Scheduler` constructors
//! instead of relying on process-wide singletons.

use crate::clock::{Clock, SystemClock};
use crate::id::{IdGen, UuidIdGen};
use std::sync::Arc;

#[derive(Clone)]
pub struct RuntimeContext {
    pub host_id: String,
    pub clock: Arc<dyn Clock>,
    pub id_gen: Arc<dyn IdGen>,
}

impl RuntimeContext {
    pub fn new(host_id: impl Into<String>, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGen>) -> Self {
        Self {
            host_id: host_id.into(),
            clock,
            id_gen,
        }
    }

    /// Production context: wall-clock time, OS hostname (falling back to
    /// `"localhost"` if unavailable), uuid v4 identifiers.
    pub fn production() -> Self {
        let host_id = hostname_or_default();
        Self::new(host_id, Arc::new(SystemClock), Arc::new(UuidIdGen))
    }
}

fn hostname_or_default() -> String {
    // `hostname` crate is not part of the dependency stack; shelling out is
    // avoided in favor of the portable env var most POSIX shells export.
    std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
