// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote connection identity, ported from the original's
//! `SSHInterfaceCollection` (`observer/storage/models/remote_filesystem.py`).
//! A `RemoteConnection` is an immutable (host, user, port, key) tuple; it
//! opens a fresh `ssh2::Session` per operation rather than holding a
//! long-lived handle, matching `spec.md` §5's "single-owner, scoped to a
//! single operation" policy.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use ssh2::{Session, Sftp};

use crate::config::SshInterfaceConfig;
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteConnection {
    pub host: String,
    pub userid: String,
    pub port: u16,
    pub ssh_key: String,
}

impl RemoteConnection {
    pub fn new(host: impl Into<String>, userid: impl Into<String>, port: u16, ssh_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            userid: userid.into(),
            port,
            ssh_key: ssh_key.into(),
        }
    }

    pub fn from_config(config: &SshInterfaceConfig) -> Self {
        Self::new(&config.host, &config.userid, config.port, &config.ssh_key)
    }

    /// Open a fresh TCP + SSH session, then a single SFTP subsystem on it.
    /// The caller owns the returned handle for the lifetime of one
    /// operation or one open stream; it is never cached on `self`.
    pub fn open_sftp(&self) -> Result<(Session, Sftp), StorageError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| StorageError::io(&self.host, e))?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session.userauth_pubkey_file(&self.userid, None, self.ssh_key.as_ref(), None)?;
        if !session.authenticated() {
            return Err(StorageError::RemoteTransient {
                host: self.host.clone(),
                message: "ssh authentication failed".to_string(),
            });
        }
        let sftp = session.sftp()?;
        Ok((session, sftp))
    }
}

/// De-duplicates `RemoteConnection` identifiers so Locations pointed at the
/// same host/user/port share one logical identity, the way the original's
/// `SSHInterfaceCollection` kept one entry per interface tuple.
#[derive(Default, Clone)]
pub struct RemoteConnectionPool {
    entries: Arc<Mutex<HashMap<RemoteConnection, Arc<RemoteConnection>>>>,
}

impl RemoteConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, conn: RemoteConnection) -> Arc<RemoteConnection> {
        let mut entries = self.entries.lock();
        entries
            .entry(conn.clone())
            .or_insert_with(|| Arc::new(conn))
            .clone()
    }
}

#[cfg(test)]
#[path = "remote_connection_tests.rs"]
mod tests;
