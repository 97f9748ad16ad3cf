// nasvm/src/log/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};

use crate::error::{NasvmError, Result as NasvmResult};

/// Initializes the global tracing subscriber.
///
/// Diagnostics always go to stderr so that stdout carries only command
/// output. When `file` is set, events are also appended to that file.
pub fn init(
    config: &TracingConfig,
) -> NasvmResult<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let mut file_guard: Option<tracing_appender::non_blocking::WorkerGuard> = None;

    let env_filter = EnvFilter::try_new(filter_directives(config))
        .map_err(|e| NasvmError::Config(format!("invalid log filter: {}", e)))?;

    let mut layers = Vec::new();

    // 1. StdErr layer
    if config.stderr {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .boxed();
        layers.push(console_layer);
    }

    // 2. File layer
    if let Some(path) = &config.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .ok_or_else(|| NasvmError::Config(format!("log file {:?} has no file name", path)))?;

        fs::create_dir_all(&dir).map_err(|e| NasvmError::io_with_path(dir.clone(), e))?;

        let file_appender = tracing_appender::rolling::never(&dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = if config.structured {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| NasvmError::Internal(format!("failed to init tracing: {}", e)))?;

    Ok(file_guard)
}

fn filter_directives(config: &TracingConfig) -> String {
    let mut directives = vec![format!("nasvm={}", config.default_level)];

    // Override per-module levels
    for (target, level) in &config.modules {
        directives.push(format!("{}={}", target, level));
    }

    directives.join(",")
}

/// Helper: deserialize LevelFilter from string (e.g., "info", "debug")
fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<LevelFilter>().map_err(serde::de::Error::custom)
}

fn deserialize_module_levels<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, LevelFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, String> = Deserialize::deserialize(deserializer)?;
    let mut result = HashMap::new();
    for (target, level_str) in map {
        let level = level_str
            .parse::<LevelFilter>()
            .map_err(serde::de::Error::custom)?;
        result.insert(target, level);
    }
    Ok(result)
}

/// `[log]` section of `config.toml`.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    #[serde(
        rename = "level",
        default = "default_log_level",
        deserialize_with = "deserialize_level_filter"
    )]
    pub default_level: LevelFilter,

    /// JSON lines in the log file.
    #[serde(default = "default_structured")]
    pub structured: bool,

    #[serde(default = "default_stderr")]
    pub stderr: bool,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_module_levels")]
    pub modules: HashMap<String, LevelFilter>,
}

fn default_log_level() -> LevelFilter { LevelFilter::WARN }
fn default_structured() -> bool { false }
fn default_stderr() -> bool { true }

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: default_log_level(),
            structured: default_structured(),
            stderr: default_stderr(),
            file: None,
            modules: HashMap::new(),
        }
    }
}
