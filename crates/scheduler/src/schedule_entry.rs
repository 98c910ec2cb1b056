// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RegisteredTask`/`ScheduleEntry` (`spec.md` §4.F) and the external
//! schedule-file wire format (`spec.md` §6 "Schedule input file").

use std::sync::Arc;

use afk_runner::Task;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One element's `schedule` object in the external schedule-file format.
/// Absent entirely means one-shot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub min_interval: Option<i64>,
    pub h_interval: Option<i64>,
    pub start_time: Option<DateTime<Local>>,
}

/// One element of the JSON array the Scheduler polls from its external
/// source (`spec.md` §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleAdditionRecord {
    pub task_id: String,
    #[serde(default)]
    pub task_args: Map<String, Value>,
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
}

/// A task registered with the Scheduler under a stable `task_id`: how to
/// build a fresh `Task` for a firing, plus the dispatch metadata the
/// resulting TaskInstance needs.
#[derive(Clone)]
pub struct RegisteredTask {
    pub task_id: String,
    pub task_type: String,
    pub run_type: String,
    pub default_kwargs: Map<String, Value>,
    pub factory: Arc<dyn Fn(Map<String, Value>) -> Box<dyn Task> + Send + Sync>,
}

impl RegisteredTask {
    pub fn new(
        task_id: impl Into<String>,
        task_type: impl Into<String>,
        run_type: impl Into<String>,
        default_kwargs: Map<String, Value>,
        factory: impl Fn(Map<String, Value>) -> Box<dyn Task> + Send + Sync + 'static,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            run_type: run_type.into(),
            default_kwargs,
            factory: Arc::new(factory),
        }
    }
}

/// A single in-memory schedule registration: the RegisteredTask it fires,
/// the recurrence that governs it, and the per-invocation kwargs overlay.
#[derive(Clone)]
pub struct ScheduleEntry {
    pub uuid: String,
    pub task_id: String,
    pub m: Option<i64>,
    pub h: Option<i64>,
    pub start: Option<DateTime<Local>>,
    pub next_fire: DateTime<Local>,
    pub kwargs: Map<String, Value>,
}

/// Defaults overlaid by per-invocation kwargs; per-invocation wins
/// (`spec.md` §4.F "Argument merging"). Keys present in neither are simply
/// absent from the result.
pub fn merge_kwargs(defaults: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
#[path = "schedule_entry_tests.rs"]
mod tests;
