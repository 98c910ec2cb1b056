// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! afk-storage: the `Location` abstraction over local and SFTP-remote
//! backends, block-delta synchronization, and the `Storage` bundle of
//! named slots a Runner resolves its file layout against.

mod archive;
pub mod config;
pub mod error;
pub mod local;
pub mod location;
pub mod remote;
pub mod remote_connection;
mod rsync;
pub mod storage;

pub use config::{LocalConfig, LocationConfig, RemoteConfig, SshInterfaceConfig, StorageConfig};
pub use error::StorageError;
pub use local::LocalLocation;
pub use location::{BackendKind, Location, LocationStream, OpenMode};
pub use remote::RemoteLocation;
pub use remote_connection::{RemoteConnection, RemoteConnectionPool};
pub use rsync::adler32;
pub use storage::{Storage, DEFAULT_DATE_POSTFIX_FMT};
