// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy (`spec.md` §7: "Location operation" and "Remote
//! transient" rows).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("cannot remove non-empty directory without recursive=true: {0}")]
    DirectoryNotEmpty(PathBuf),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("unrecognized open mode: {0}")]
    UnrecognizedMode(String),

    #[error("unknown storage backend kind: {0}")]
    UnknownBackend(String),

    #[error("missing required config field: {0}")]
    MissingConfigField(&'static str),

    #[error("required files missing: {0:?}")]
    RequiredFilesMissing(Vec<String>),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Broken pipe / EOF on a remote SFTP channel (`spec.md` §7 "Remote
    /// transient"). Callers log at ERROR and let the affected fiber exit
    /// cleanly rather than retrying.
    #[error("remote connection to {host} lost: {message}")]
    RemoteTransient { host: String, message: String },

    #[error("ssh/sftp error: {0}")]
    Ssh(#[from] ssh2::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
