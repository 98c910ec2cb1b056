// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `check_run_conditions` (`spec.md` §4.C), ported from `afk/task.py`'s
//! `BaseTask.check_run_conditions`.

use afk_core::PreflightOutcome;
use afk_storage::{Location, Storage, StorageError};

use crate::task::TaskConfig;

/// Result of a preflight pass: the outcome, plus the mutex Location to
/// register with the Runner's mutex-registration channel if one was
/// acquired (`spec.md` §4.C step 7).
pub struct PreflightResult {
    pub outcome: PreflightOutcome,
    pub mutex_location: Option<Box<dyn Location>>,
}

pub fn check_run_conditions(
    storage: &Storage,
    task_name: &str,
    config: &TaskConfig,
    override_archive: bool,
) -> Result<PreflightResult, StorageError> {
    let mutex_loc = config.has_mutex.then(|| storage.mutex_location(task_name));

    if config.has_archive {
        // Spec.md §4.C: the preflight archive marker is `<task-name>.tar.bz2`
        // directly under the archive slot — distinct from the dated
        // filename `Storage::archive_location` produces for created
        // archives (`spec.md` §6).
        let archive_marker = storage.archive().join_loc(&format!("{task_name}.tar.bz2"));
        if archive_marker.exists()? {
            if override_archive {
                archive_marker.rotate()?;
            } else {
                return Ok(PreflightResult {
                    outcome: PreflightOutcome::ArchiveFileFound,
                    mutex_location: None,
                });
            }
        }
    }

    if storage.any_halt_file_present()? {
        return Ok(PreflightResult {
            outcome: PreflightOutcome::StopFileFound,
            mutex_location: None,
        });
    }

    if !storage.missing_required_files()?.is_empty() {
        return Ok(PreflightResult {
            outcome: PreflightOutcome::DepFilesMissing,
            mutex_location: None,
        });
    }

    if let Some(mutex_loc) = &mutex_loc {
        if mutex_loc.exists()? {
            return Ok(PreflightResult {
                outcome: PreflightOutcome::MutexFound,
                mutex_location: None,
            });
        }
        mutex_loc.touch(true, true)?;
    }

    Ok(PreflightResult {
        outcome: PreflightOutcome::Proceed,
        mutex_location: mutex_loc,
    })
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
