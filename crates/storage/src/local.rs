// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local filesystem backend, ported from
//! `observer/storage/models/local_filesystem.py`'s `LocalFileSystem`.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use crate::config::{LocalConfig, LocationConfig};
use crate::error::StorageError;
use crate::location::{BackendKind, Location, LocationStream, OpenMode};

#[derive(Clone, Copy)]
struct CachedStat {
    size: u64,
    m_time: DateTime<Local>,
    a_time: DateTime<Local>,
}

pub struct LocalLocation {
    path: PathBuf,
    name: String,
    // Populated on construction when the path exists, refreshed after any
    // mutating operation (`spec.md` §4.A "Backend differences").
    stat: Mutex<Option<CachedStat>>,
}

impl LocalLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = derive_name(&path);
        let stat = Mutex::new(read_stat(&path).ok());
        Self { path, name, stat }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(&config.path_ref)
    }

    fn refresh_stat(&self) {
        *self.stat.lock() = read_stat(&self.path).ok();
    }
}

fn derive_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn read_stat(path: &Path) -> std::io::Result<CachedStat> {
    let meta = fs::metadata(path)?;
    Ok(CachedStat {
        size: meta.len(),
        m_time: DateTime::from(meta.modified()?),
        a_time: DateTime::from(meta.accessed()?),
    })
}

impl Location for LocalLocation {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn path(&self) -> &str {
        self.path.to_str().unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    fn exists(&self) -> Result<bool, StorageError> {
        Ok(self.path.exists())
    }

    fn is_dir(&self) -> Result<bool, StorageError> {
        Ok(self.path.is_dir())
    }

    fn is_file(&self) -> Result<bool, StorageError> {
        Ok(self.path.is_file())
    }

    fn size(&self) -> Result<u64, StorageError> {
        if let Some(cached) = *self.stat.lock() {
            return Ok(cached.size);
        }
        let meta = fs::metadata(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(meta.len())
    }

    fn m_time(&self) -> Result<DateTime<Local>, StorageError> {
        if let Some(cached) = *self.stat.lock() {
            return Ok(cached.m_time);
        }
        let meta = fs::metadata(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(DateTime::from(
            meta.modified().map_err(|e| StorageError::io(&self.path, e))?,
        ))
    }

    fn a_time(&self) -> Result<DateTime<Local>, StorageError> {
        if let Some(cached) = *self.stat.lock() {
            return Ok(cached.a_time);
        }
        let meta = fs::metadata(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(DateTime::from(
            meta.accessed().map_err(|e| StorageError::io(&self.path, e))?,
        ))
    }

    fn read(&self) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        File::open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(buf)
    }

    fn open(&self, mode: OpenMode) -> Result<Box<dyn LocationStream>, StorageError> {
        let mut opts = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                opts.read(true);
            }
            OpenMode::Write => {
                opts.read(true).write(true).create(true).truncate(true);
            }
            OpenMode::Append => {
                opts.read(true).write(true).create(true).append(true);
            }
        }
        let file = opts
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        if mode != OpenMode::Read {
            self.refresh_stat();
        }
        Ok(Box::new(file))
    }

    fn open_in_place(&self) -> Result<Box<dyn LocationStream>, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn truncate(&self, len: u64) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.set_len(len).map_err(|e| StorageError::io(&self.path, e))?;
        self.refresh_stat();
        Ok(())
    }

    fn touch(&self, exist_ok: bool, parents: bool) -> Result<(), StorageError> {
        if self.path.exists() && !exist_ok {
            return Err(StorageError::AlreadyExists(self.path.clone()));
        }
        if parents {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
        }
        if !self.path.exists() {
            File::create(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        }
        self.refresh_stat();
        Ok(())
    }

    fn mkdir(&self, parents: bool) -> Result<(), StorageError> {
        if parents {
            fs::create_dir_all(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        } else {
            fs::create_dir(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        }
        self.refresh_stat();
        Ok(())
    }

    fn delete(&self, missing_ok: bool, recursive: bool) -> Result<(), StorageError> {
        if !self.path.exists() {
            return if missing_ok {
                Ok(())
            } else {
                Err(StorageError::NotFound(self.path.clone()))
            };
        }
        let result = if self.path.is_dir() {
            if recursive {
                fs::remove_dir_all(&self.path)
            } else {
                fs::remove_dir(&self.path)
            }
        } else {
            fs::remove_file(&self.path)
        };
        result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::Other || e.raw_os_error() == Some(39) {
                StorageError::DirectoryNotEmpty(self.path.clone())
            } else {
                StorageError::io(&self.path, e)
            }
        })?;
        *self.stat.lock() = None;
        Ok(())
    }

    fn move_to(&mut self, dest: &dyn Location) -> Result<(), StorageError> {
        self.copy_to(dest)?;
        self.delete(false, true)?;
        Ok(())
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
        if let Some(local_dest) = dest.as_any_local() {
            if let Some(parent) = local_dest.path.parent() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
            }
            fs::copy(&self.path, &local_dest.path)
                .map_err(|e| StorageError::io(&local_dest.path, e))?;
            local_dest.refresh_stat();
            return Ok(());
        }
        let mut reader = self.open(OpenMode::Read)?;
        let mut out = dest.open(OpenMode::Write)?;
        std::io::copy(&mut reader, &mut out).map_err(|e| StorageError::io(dest.path(), e))?;
        Ok(())
    }

    fn rotate(&self) -> Result<(), StorageError> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.clone()));
        }
        let mut idx = 0u32;
        let target = loop {
            let candidate = rotated_path(&self.path, idx);
            if !candidate.exists() {
                break candidate;
            }
            idx += 1;
        };
        fs::rename(&self.path, &target).map_err(|e| StorageError::io(&self.path, e))?;
        self.refresh_stat();
        Ok(())
    }

    fn iter_location(&self) -> Result<Vec<Box<dyn Location>>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(|e| StorageError::io(&self.path, e))? {
            let entry = entry.map_err(|e| StorageError::io(&self.path, e))?;
            out.push(Box::new(LocalLocation::new(entry.path())) as Box<dyn Location>);
        }
        Ok(out)
    }

    fn join_loc(&self, segment: &str) -> Box<dyn Location> {
        Box::new(LocalLocation::new(self.path.join(segment)))
    }

    fn to_config(&self) -> LocationConfig {
        LocationConfig::LocalFilesystem(LocalConfig {
            path_ref: self.path.to_string_lossy().into_owned(),
        })
    }

    fn clone_box(&self) -> Box<dyn Location> {
        Box::new(LocalLocation::new(self.path.clone()))
    }

    fn as_any_local(&self) -> Option<&LocalLocation> {
        Some(self)
    }
}

fn rotated_path(base: &Path, idx: u32) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(format!(".old{idx}"));
    PathBuf::from(os)
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
