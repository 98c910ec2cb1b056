// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("negative interval component in recurrence")]
    NegativeInterval,

    #[error("runner error: {0}")]
    Runner(#[from] afk_runner::RunnerError),

    #[error("storage error: {0}")]
    Storage(#[from] afk_storage::StorageError),
}
