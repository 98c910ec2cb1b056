// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serializable configuration records (`spec.md` §6 "Storage
//! configuration"). Round-trips through `to_config`/`from_config` the way
//! the original's `to_dict` did.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "config_type", content = "config", rename_all = "snake_case")]
pub enum LocationConfig {
    LocalFilesystem(LocalConfig),
    RemoteFilesystem(RemoteConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub path_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub path_ref: String,
    pub ssh_inter: SshInterfaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SshInterfaceConfig {
    pub host: String,
    pub userid: String,
    pub port: u16,
    pub ssh_key: String,
}

/// The seven slots may each be overridden; unspecified slots are derived
/// from `base` per `spec.md` §4.B's slot-name mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_loc: Option<LocationConfig>,
    pub data_loc: Option<LocationConfig>,
    pub tmp_loc: Option<LocationConfig>,
    pub report_loc: Option<LocationConfig>,
    pub archive_loc: Option<LocationConfig>,
    pub mutex_loc: Option<LocationConfig>,
    pub log_loc: Option<LocationConfig>,
}
