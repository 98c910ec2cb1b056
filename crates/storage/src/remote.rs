// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote SFTP backend, ported from
//! `observer/storage/models/remote_filesystem.py`'s `RemoteFileConnection`.
//! Every operation opens a short-lived session (`spec.md` §4.A "Backend
//! differences"); only `open()` keeps one alive, tied to the returned
//! stream's lifetime.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};
use ssh2::{OpenFlags, OpenType, Session, Sftp};

use crate::config::{LocationConfig, RemoteConfig};
use crate::error::StorageError;
use crate::location::{BackendKind, Location, LocationStream, OpenMode};
use crate::remote_connection::RemoteConnection;

pub struct RemoteLocation {
    conn: Arc<RemoteConnection>,
    path: String,
    name: String,
}

impl RemoteLocation {
    /// Normalizes a leading `.` against the remote working directory, which
    /// requires one network round trip at construction time.
    pub fn new(conn: Arc<RemoteConnection>, path: impl Into<String>) -> Result<Self, StorageError> {
        let mut path = path.into();
        if path.starts_with('.') {
            let (_session, sftp) = conn.open_sftp()?;
            let resolved = sftp.realpath(Path::new(&path))?;
            path = resolved.to_string_lossy().into_owned();
        }
        let name = derive_name(&path);
        Ok(Self { conn, path, name })
    }

    pub fn from_config(pool: &crate::remote_connection::RemoteConnectionPool, config: &RemoteConfig) -> Result<Self, StorageError> {
        let conn = pool.get_or_insert(RemoteConnection::from_config(&config.ssh_inter));
        Self::new(conn, config.path_ref.clone())
    }

    fn sftp(&self) -> Result<(Session, Sftp), StorageError> {
        self.conn.open_sftp()
    }
}

fn derive_name(path: &str) -> String {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path).to_string()
}

fn to_local(secs: u64) -> DateTime<Local> {
    Local
        .timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(|| Local.timestamp_opt(0, 0).single().expect("epoch is representable"))
}

impl Location for RemoteLocation {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    fn exists(&self) -> Result<bool, StorageError> {
        let (_s, sftp) = self.sftp()?;
        match sftp.stat(Path::new(&self.path)) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(false), // SSH_FX_NO_SUCH_FILE
            Err(e) => Err(StorageError::Ssh(e)),
        }
    }

    fn is_dir(&self) -> Result<bool, StorageError> {
        let (_s, sftp) = self.sftp()?;
        Ok(sftp.stat(Path::new(&self.path))?.is_dir())
    }

    fn is_file(&self) -> Result<bool, StorageError> {
        let (_s, sftp) = self.sftp()?;
        Ok(sftp.stat(Path::new(&self.path))?.is_file())
    }

    fn size(&self) -> Result<u64, StorageError> {
        let (_s, sftp) = self.sftp()?;
        sftp.stat(Path::new(&self.path))?
            .size
            .ok_or_else(|| StorageError::RemoteTransient {
                host: self.conn.host.clone(),
                message: "stat response missing size".to_string(),
            })
    }

    fn m_time(&self) -> Result<DateTime<Local>, StorageError> {
        let (_s, sftp) = self.sftp()?;
        let stat = sftp.stat(Path::new(&self.path))?;
        Ok(to_local(stat.mtime.unwrap_or(0)))
    }

    fn a_time(&self) -> Result<DateTime<Local>, StorageError> {
        let (_s, sftp) = self.sftp()?;
        let stat = sftp.stat(Path::new(&self.path))?;
        Ok(to_local(stat.atime.unwrap_or(0)))
    }

    fn read(&self) -> Result<Vec<u8>, StorageError> {
        let (_session, sftp) = self.sftp()?;
        let mut file = sftp.open(Path::new(&self.path))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(buf)
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn LocationStream>, StorageError> {
        let (session, sftp) = self.sftp()?;
        let flags = match mode {
            OpenMode::Read => OpenFlags::READ,
            OpenMode::Write => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            OpenMode::Append => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND,
        };
        let file = sftp.open_mode(Path::new(&self.path), flags, 0o644, OpenType::File)?;
        Ok(Box::new(RemoteFileStream {
            _session: session,
            _sftp: sftp,
            file,
        }))
    }

    fn open_in_place(&self) -> Result<Box<dyn LocationStream>, StorageError> {
        let (session, sftp) = self.sftp()?;
        let file = sftp.open_mode(
            Path::new(&self.path),
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE,
            0o644,
            OpenType::File,
        )?;
        Ok(Box::new(RemoteFileStream {
            _session: session,
            _sftp: sftp,
            file,
        }))
    }

    fn truncate(&self, len: u64) -> Result<(), StorageError> {
        let (_s, sftp) = self.sftp()?;
        let mut stat = sftp.stat(Path::new(&self.path))?;
        stat.size = Some(len);
        sftp.setstat(Path::new(&self.path), stat)
            .map_err(StorageError::from)
    }

    fn touch(&self, exist_ok: bool, parents: bool) -> Result<(), StorageError> {
        if self.exists()? && !exist_ok {
            return Err(StorageError::AlreadyExists(self.path.clone().into()));
        }
        if parents {
            if let Some(parent) = self.path.rsplit_once('/').map(|(p, _)| p) {
                let (_s, sftp) = self.sftp()?;
                let _ = sftp.mkdir(Path::new(parent), 0o755);
            }
        }
        if !self.exists()? {
            let (_s, sftp) = self.sftp()?;
            sftp.open_mode(
                Path::new(&self.path),
                OpenFlags::WRITE | OpenFlags::CREATE,
                0o644,
                OpenType::File,
            )?;
        }
        Ok(())
    }

    fn mkdir(&self, parents: bool) -> Result<(), StorageError> {
        let (_s, sftp) = self.sftp()?;
        if parents {
            let mut prefix = String::new();
            for segment in self.path.split('/').filter(|s| !s.is_empty()) {
                prefix.push('/');
                prefix.push_str(segment);
                let _ = sftp.mkdir(Path::new(&prefix), 0o755);
            }
            Ok(())
        } else {
            sftp.mkdir(Path::new(&self.path), 0o755).map_err(StorageError::from)
        }
    }

    fn delete(&self, missing_ok: bool, recursive: bool) -> Result<(), StorageError> {
        if !self.exists()? {
            return if missing_ok {
                Ok(())
            } else {
                Err(StorageError::NotFound(self.path.clone().into()))
            };
        }
        let (_s, sftp) = self.sftp()?;
        if self.is_dir()? {
            if recursive {
                for child in self.iter_location()? {
                    child.delete(true, true)?;
                }
            }
            sftp.rmdir(Path::new(&self.path)).map_err(StorageError::from)
        } else {
            sftp.unlink(Path::new(&self.path)).map_err(StorageError::from)
        }
    }

    fn move_to(&mut self, dest: &dyn Location) -> Result<(), StorageError> {
        self.copy_to(dest)?;
        self.delete(false, true)
    }

    fn copy_to(&self, dest: &dyn Location) -> Result<(), StorageError> {
        if self.is_dir()? {
            dest.mkdir(true)?;
            for child in self.iter_location()? {
                let dest_child = dest.join_loc(child.name());
                child.copy_to(dest_child.as_ref())?;
            }
            return Ok(());
        }
        let mut reader = self.open(OpenMode::Read)?;
        let mut writer = dest.open(OpenMode::Write)?;
        std::io::copy(&mut reader, &mut writer).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    fn rotate(&self) -> Result<(), StorageError> {
        if !self.exists()? {
            return Err(StorageError::NotFound(self.path.clone().into()));
        }
        let (_s, sftp) = self.sftp()?;
        let mut idx = 0u32;
        let target = loop {
            let candidate = format!("{}.old{idx}", self.path);
            if sftp.stat(Path::new(&candidate)).is_err() {
                break candidate;
            }
            idx += 1;
        };
        sftp.rename(Path::new(&self.path), Path::new(&target), None)?;
        Ok(())
    }

    fn iter_location(&self) -> Result<Vec<Box<dyn Location>>, StorageError> {
        let (_s, sftp) = self.sftp()?;
        let mut out = Vec::new();
        for (path, _stat) in sftp.readdir(Path::new(&self.path))? {
            let child_path = path.to_string_lossy().into_owned();
            out.push(Box::new(RemoteLocation {
                conn: self.conn.clone(),
                name: derive_name(&child_path),
                path: child_path,
            }) as Box<dyn Location>);
        }
        Ok(out)
    }

    fn join_loc(&self, segment: &str) -> Box<dyn Location> {
        let joined = format!("{}/{segment}", self.path.trim_end_matches('/'));
        Box::new(RemoteLocation {
            conn: self.conn.clone(),
            name: segment.to_string(),
            path: joined,
        })
    }

    fn to_config(&self) -> LocationConfig {
        LocationConfig::RemoteFilesystem(RemoteConfig {
            path_ref: self.path.clone(),
            ssh_inter: crate::config::SshInterfaceConfig {
                host: self.conn.host.clone(),
                userid: self.conn.userid.clone(),
                port: self.conn.port,
                ssh_key: self.conn.ssh_key.clone(),
            },
        })
    }

    fn clone_box(&self) -> Box<dyn Location> {
        Box::new(RemoteLocation {
            conn: self.conn.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
        })
    }
}

/// Keeps the session and sftp subsystem alive for as long as the caller
/// holds the stream; dropping it releases the SFTP session.
struct RemoteFileStream {
    _session: Session,
    _sftp: Sftp,
    file: ssh2::File,
}

impl Read for RemoteFileStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for RemoteFileStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for RemoteFileStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.file.seek(offset);
                Ok(offset)
            }
            SeekFrom::Current(_) | SeekFrom::End(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "remote streams only support seeking from start",
            )),
        }
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
