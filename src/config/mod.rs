// nasvm/src/config/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Invocation settings.
//!
//! Values are layered: command-line flag, then environment variable (both
//! handled by clap), then `config.toml`, then built-in defaults. The result
//! is one [`NasvmConfig`] that is passed explicitly to every subsystem.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{NasvmError, Result as NasvmResult};
use crate::log::TracingConfig;
use crate::vm::GuardPolicy;

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of `config.toml`. Every key is optional.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub user: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub log: TracingConfig,
    #[serde(default)]
    pub guard: GuardPolicy,
}

/// Values supplied on the command line or through `NASVM_*` variables.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub server: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub force_prompt: bool,
    pub timeout_secs: Option<u64>,
    pub verbosity: u8,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct NasvmConfig {
    pub server: String,
    pub user: String,
    pub password: Option<String>,
    pub force_prompt: bool,
    pub timeout: Duration,
    pub log: TracingConfig,
    pub guard: GuardPolicy,
}

impl Default for NasvmConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            user: DEFAULT_USER.to_string(),
            password: None,
            force_prompt: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log: TracingConfig::default(),
            guard: GuardPolicy::default(),
        }
    }
}

impl NasvmConfig {
    /// Merges overrides on top of the file values.
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> NasvmResult<Self> {
        let server = overrides
            .server
            .or(file.server)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                NasvmError::Config(
                    "no server configured (use --server, NASVM_SERVER or `server` in config.toml)"
                        .into(),
                )
            })?;

        let user = overrides
            .user
            .or(file.user)
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(NasvmError::Config("timeout must be at least one second".into()));
        }

        let mut log = file.log;
        log.default_level = match overrides.verbosity {
            0 => log.default_level,
            1 => log.default_level.max(LevelFilter::DEBUG),
            _ => LevelFilter::TRACE,
        };

        Ok(Self {
            server,
            user,
            password: overrides.password,
            force_prompt: overrides.force_prompt,
            timeout: Duration::from_secs(timeout_secs),
            log,
            guard: file.guard,
        })
    }
}

/// `<config dir>/nasvm/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nasvm").join("config.toml"))
}

/// Reads the config file.
///
/// An explicitly named file must exist; the default file may be absent,
/// in which case all defaults apply.
pub async fn load(explicit: Option<&Path>) -> NasvmResult<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let contents = fs::read_to_string(&path)
        .await
        .map_err(|e| NasvmError::io_with_path(path.clone(), e))?;
    toml::from_str(&contents)
        .map_err(|e| NasvmError::Config(format!("{}: {}", path.display(), e)))
}
