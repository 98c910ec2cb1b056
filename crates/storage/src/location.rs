// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Location` abstraction (`spec.md` §4.A), ported from
//! `observer/storage/models/local_filesystem.py`'s `LocalFileSystem` /
//! `remote_filesystem.py`'s `RemoteFileConnection`. Rust has no common base
//! class to lean on, so the shared surface becomes a single object-safe
//! trait and callers hold `Box<dyn Location>`.

use chrono::{DateTime, Local};
use std::fmt;
use std::io::{Read, Seek, Write};

use crate::config::LocationConfig;
use crate::error::StorageError;

/// Which concrete backend a `Location` is, so callers (and `to_config`) can
/// recover the variant without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Mirrors the original's `mode` string argument to `open`/`read`
/// (`"r"`, `"rb"`, `"w"`, `"wb"`, `"a"`, `"ab"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

impl OpenMode {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        match raw {
            "r" | "rb" => Ok(Self::Read),
            "w" | "wb" => Ok(Self::Write),
            "a" | "ab" => Ok(Self::Append),
            other => Err(StorageError::UnrecognizedMode(other.to_string())),
        }
    }
}

/// A handle returned by `Location::open`. Local backends hand back a
/// `std::fs::File` wrapper directly; the remote backend hands back an
/// in-memory buffer that is flushed to the SFTP channel on drop-free
/// `finish()` (sftp streams in `ssh2` are not `Seek`, so remote writes are
/// staged locally and pushed whole).
pub trait LocationStream: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> LocationStream for T {}

/// Object-safe storage location. One implementor per backend
/// (`local.rs`, `remote.rs`); `Storage` (see `storage.rs`) holds seven of
/// these as named slots.
pub trait Location: Send + Sync {
    fn backend_kind(&self) -> BackendKind;

    /// Absolute path/key this location addresses, backend-specific format.
    fn path(&self) -> &str;

    /// Display name, independent of `path` (`spec.md` §4.A: settable,
    /// derived from the path's final segment by default).
    fn name(&self) -> &str;
    fn set_name(&mut self, name: impl Into<String>)
    where
        Self: Sized;

    fn exists(&self) -> Result<bool, StorageError>;
    fn is_dir(&self) -> Result<bool, StorageError>;
    fn is_file(&self) -> Result<bool, StorageError>;
    fn size(&self) -> Result<u64, StorageError>;
    fn m_time(&self) -> Result<DateTime<Local>, StorageError>;
    fn a_time(&self) -> Result<DateTime<Local>, StorageError>;

    /// Read the full contents. `binary` selects bytes vs. lossy-UTF8 string
    /// semantics the way the original's `"r"` vs `"rb"` modes did; the Rust
    /// port always returns bytes and leaves decoding to the caller.
    fn read(&self) -> Result<Vec<u8>, StorageError>;

    fn open(&self, mode: OpenMode) -> Result<Box<dyn LocationStream>, StorageError>;

    /// Open for random-access read+write without truncating or requiring
    /// the file to preexist — the block-delta sync's patch pass needs to
    /// leave untouched blocks alone (`rsync.rs`).
    fn open_in_place(&self) -> Result<Box<dyn LocationStream>, StorageError>;

    /// Set the final length, used by the block-delta sync to trim the
    /// destination to the source's byte length once patching is done.
    fn truncate(&self, len: u64) -> Result<(), StorageError>;

    /// Create an empty file at this location. `exist_ok=false` with an
    /// existing target is an error; `parents=true` creates missing parent
    /// directories first.
    fn touch(&self, exist_ok: bool, parents: bool) -> Result<(), StorageError>;

    fn mkdir(&self, parents: bool) -> Result<(), StorageError>;

    /// `missing_ok` swallows a not-found error; `recursive` allows removing
    /// a non-empty directory tree.
    fn delete(&self, missing_ok: bool, recursive: bool) -> Result<(), StorageError>;

    fn move_to(&mut self, dest: &dyn Location) -> Result<(), StorageError>;
    fn copy_to(&self, dest: &dyn Location) -> Result<(), StorageError>;

    /// Renames this entry to `<name>.old<N>` for the smallest non-negative
    /// `N` not already taken (`spec.md` §4.A), leaving no file at the
    /// original path. Fails if the entry does not exist.
    fn rotate(&self) -> Result<(), StorageError>;

    /// Children of a directory location, one `Location` per entry.
    fn iter_location(&self) -> Result<Vec<Box<dyn Location>>, StorageError>;

    /// A new `Location` of the same backend, path-joined with `segment`.
    fn join_loc(&self, segment: &str) -> Box<dyn Location>;

    /// Make this Location's contents match `src` (`spec.md` §4.A "Sync
    /// semantics"): full copy if absent, metadata short-circuit, whole-hash
    /// short-circuit, else block-delta patch. The algorithm itself lives in
    /// `rsync.rs` and is backend-agnostic — it only uses other `Location`
    /// methods, so it works across any combination of local/remote src/dest.
    fn sync_locations(
        &self,
        src: &dyn Location,
        use_metadata: bool,
        full_hashcheck: bool,
    ) -> Result<(), StorageError> {
        crate::rsync::sync_locations(self, src, use_metadata, full_hashcheck)
    }

    fn to_config(&self) -> LocationConfig;

    fn clone_box(&self) -> Box<dyn Location>;

    /// Downcast hook so `LocalLocation::copy_to` can take a direct
    /// filesystem-copy fast path when both sides are local. Remote
    /// locations keep the default `None`.
    fn as_any_local(&self) -> Option<&crate::local::LocalLocation> {
        None
    }
}

impl Clone for Box<dyn Location> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
