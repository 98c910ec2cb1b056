// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Storage` bundle (`spec.md` §4.B), ported from `afk/storage/storage.py`'s
//! `Storage` class: seven named Locations resolved against a `base` and a
//! run-date, plus the archive/required/halt file lists and archive creation.

use chrono::{DateTime, Local};

use crate::archive;
use crate::config::{LocationConfig, StorageConfig};
use crate::error::StorageError;
use crate::local::LocalLocation;
use crate::location::Location;
use crate::remote::RemoteLocation;
use crate::remote_connection::RemoteConnectionPool;

pub const DEFAULT_DATE_POSTFIX_FMT: &str = "%Y_%m_%d";

pub struct Storage {
    base: Box<dyn Location>,
    data: Box<dyn Location>,
    tmp: Box<dyn Location>,
    report: Box<dyn Location>,
    archive: Box<dyn Location>,
    mutex: Box<dyn Location>,
    log: Box<dyn Location>,
    report_date: DateTime<Local>,
    date_postfix_fmt: String,
    archive_files: Vec<String>,
    required_files: Vec<String>,
    halt_files: Vec<String>,
    pool: RemoteConnectionPool,
}

fn location_from_config(
    pool: &RemoteConnectionPool,
    config: &LocationConfig,
) -> Result<Box<dyn Location>, StorageError> {
    match config {
        LocationConfig::LocalFilesystem(cfg) => Ok(Box::new(LocalLocation::from_config(cfg))),
        LocationConfig::RemoteFilesystem(cfg) => {
            Ok(Box::new(RemoteLocation::from_config(pool, cfg)?))
        }
    }
}

impl Storage {
    /// Derives the seven slots against an already-constructed `base`, with
    /// no overrides (`spec.md` §4.B's default mapping, no date subdirs
    /// applied beyond the three date-partitioned slots).
    pub fn new(base: Box<dyn Location>, report_date: DateTime<Local>) -> Self {
        let pool = RemoteConnectionPool::new();
        let date_str = report_date.format(DEFAULT_DATE_POSTFIX_FMT).to_string();
        let data = base.join_loc("data").join_loc(&format!("data_{date_str}"));
        let tmp = base.join_loc("tmp");
        let report = base
            .join_loc("reports")
            .join_loc(&format!("report_{date_str}"));
        let archive = base
            .join_loc("archives")
            .join_loc(&format!("archive_{date_str}"));
        let mutex = base.join_loc("tmp");
        let log = base.join_loc("logs");
        Self {
            base,
            data,
            tmp,
            report,
            archive,
            mutex,
            log,
            report_date,
            date_postfix_fmt: DEFAULT_DATE_POSTFIX_FMT.to_string(),
            archive_files: Vec::new(),
            required_files: Vec::new(),
            halt_files: Vec::new(),
            pool,
        }
    }

    pub fn from_config(config: &StorageConfig, report_date: DateTime<Local>) -> Result<Self, StorageError> {
        let pool = RemoteConnectionPool::new();
        let base_cfg = config
            .base_loc
            .as_ref()
            .ok_or(StorageError::MissingConfigField("base_loc"))?;
        let base = location_from_config(&pool, base_cfg)?;

        let mut storage = Self::new(base, report_date);
        storage.pool = pool;

        if let Some(cfg) = &config.data_loc {
            storage.set_data(location_from_config(&storage.pool, cfg)?);
        }
        if let Some(cfg) = &config.tmp_loc {
            storage.set_tmp(location_from_config(&storage.pool, cfg)?);
        }
        if let Some(cfg) = &config.report_loc {
            storage.set_report(location_from_config(&storage.pool, cfg)?);
        }
        if let Some(cfg) = &config.archive_loc {
            storage.set_archive(location_from_config(&storage.pool, cfg)?);
        }
        if let Some(cfg) = &config.mutex_loc {
            storage.set_mutex(location_from_config(&storage.pool, cfg)?);
        }
        if let Some(cfg) = &config.log_loc {
            storage.log = location_from_config(&storage.pool, cfg)?;
        }
        Ok(storage)
    }

    fn date_str(&self) -> String {
        self.report_date.format(&self.date_postfix_fmt).to_string()
    }

    pub fn base(&self) -> &dyn Location {
        self.base.as_ref()
    }
    pub fn data(&self) -> &dyn Location {
        self.data.as_ref()
    }
    pub fn tmp(&self) -> &dyn Location {
        self.tmp.as_ref()
    }
    pub fn report(&self) -> &dyn Location {
        self.report.as_ref()
    }
    pub fn archive(&self) -> &dyn Location {
        self.archive.as_ref()
    }
    pub fn mutex(&self) -> &dyn Location {
        self.mutex.as_ref()
    }
    pub fn log(&self) -> &dyn Location {
        self.log.as_ref()
    }

    /// Re-derives `data`/`report`/`archive`'s date subdirectory from the new
    /// base — the date-joined children are recomputed fresh from the field,
    /// so there is no stale cache to invalidate (`spec.md` §4.B invariant).
    pub fn set_base(&mut self, base: Box<dyn Location>) {
        let date_str = self.date_str();
        self.data = base.join_loc("data").join_loc(&format!("data_{date_str}"));
        self.tmp = base.join_loc("tmp");
        self.report = base
            .join_loc("reports")
            .join_loc(&format!("report_{date_str}"));
        self.archive = base
            .join_loc("archives")
            .join_loc(&format!("archive_{date_str}"));
        self.mutex = base.join_loc("tmp");
        self.log = base.join_loc("logs");
        self.base = base;
    }

    pub fn set_data(&mut self, data: Box<dyn Location>) {
        self.data = data;
    }
    pub fn set_tmp(&mut self, tmp: Box<dyn Location>) {
        self.tmp = tmp;
    }
    pub fn set_report(&mut self, report: Box<dyn Location>) {
        self.report = report;
    }
    pub fn set_archive(&mut self, archive: Box<dyn Location>) {
        self.archive = archive;
    }
    pub fn set_mutex(&mut self, mutex: Box<dyn Location>) {
        self.mutex = mutex;
    }

    /// `<task-name>_<date>.mutex` under `mutex_loc` (`spec.md` §6).
    pub fn mutex_location(&self, task_name: &str) -> Box<dyn Location> {
        self.mutex.join_loc(&format!("{task_name}_{}.mutex", self.date_str()))
    }

    /// `<task-name>_<date>.tar.bz2` under `archive_loc` (`spec.md` §6).
    pub fn archive_location(&self, task_name: &str) -> Box<dyn Location> {
        self.archive
            .join_loc(&format!("{task_name}_{}.tar.bz2", self.date_str()))
    }

    fn push_deduped(list: &mut Vec<String>, value: String, kind: &str) {
        if list.contains(&value) {
            tracing::warn!(kind, %value, "duplicate entry dropped");
        } else {
            list.push(value);
        }
    }

    pub fn add_archive_file(&mut self, name: impl Into<String>) {
        Self::push_deduped(&mut self.archive_files, name.into(), "archive-file");
    }

    pub fn add_required_file(&mut self, name: impl Into<String>) {
        Self::push_deduped(&mut self.required_files, name.into(), "required-file");
    }

    pub fn add_halt_file(&mut self, name: impl Into<String>) {
        Self::push_deduped(&mut self.halt_files, name.into(), "halt-file");
    }

    pub fn archive_files(&self) -> &[String] {
        &self.archive_files
    }
    pub fn required_files(&self) -> &[String] {
        &self.required_files
    }
    pub fn halt_files(&self) -> &[String] {
        &self.halt_files
    }

    /// Missing required files, evaluated against `data` (`spec.md` §4.C
    /// step 5).
    pub fn missing_required_files(&self) -> Result<Vec<String>, StorageError> {
        let mut missing = Vec::new();
        for name in &self.required_files {
            if !self.data.join_loc(name).exists()? {
                missing.push(name.clone());
            }
        }
        Ok(missing)
    }

    pub fn any_halt_file_present(&self) -> Result<bool, StorageError> {
        for name in &self.halt_files {
            if self.data.join_loc(name).exists()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Applies `rotate` to each Location in order; propagates the first
    /// failure (`spec.md` §4.B).
    pub fn rotate_location(locs: &[&dyn Location]) -> Result<(), StorageError> {
        for loc in locs {
            loc.rotate()?;
        }
        Ok(())
    }

    /// Builds a bz2-compressed tar of `files` at `destination`, staged
    /// under `tmp` first (`spec.md` §4.B).
    pub fn create_archive(
        &self,
        files: &[Box<dyn Location>],
        destination: &dyn Location,
        cleanup: bool,
    ) -> Result<(), StorageError> {
        archive::create_archive(files, destination, self.tmp.as_ref(), cleanup)
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
