// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner error taxonomy (`spec.md` §7 "Runner invariant" row): these are
//! fatal — the reaper fiber is expected to crash and the process restarted,
//! never silently swallowed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("duplicate composite key registered: {0}")]
    DuplicateCompositeKey(String),

    #[error("no log route for task type: {0}")]
    MissingLogRoute(String),

    #[error("storage error: {0}")]
    Storage(#[from] afk_storage::StorageError),

    #[error("no log adapter attached to instance")]
    MissingLogAdapter,
}
