/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Settings loader
//!
//! Settings come from an optional yaml file (path taken from
//! `LIVEMODELING_SETTINGS`, default `settings.yaml`) layered under
//! `LIVEMODELING__*` environment overrides, e.g.
//! `LIVEMODELING__CONTAINER__URL=http://container:1337`.

use crate::livemodeling::LiveModelingSettings;
use config::{Config, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::Deserialize;

const SETTINGS_PATH_ENV: &str = "LIVEMODELING_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "settings.yaml";
const ENV_PREFIX: &str = "LIVEMODELING";

const DEFAULT_CONTAINER_URL: &str = "http://localhost:1337";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/winery";

#[derive(Debug, thiserror::Error)]
pub enum SettingError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSetting {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSetting {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub container: ContainerSetting,
    pub backend: BackendSetting,
    pub live_modeling: LiveModelingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container: ContainerSetting {
                url: DEFAULT_CONTAINER_URL.to_string(),
            },
            backend: BackendSetting {
                url: DEFAULT_BACKEND_URL.to_string(),
            },
            live_modeling: LiveModelingSettings::default(),
        }
    }
}

lazy_static! {
    static ref SETTINGS: Settings = {
        let path = std::env::var(SETTINGS_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        match load_settings(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "falling back to default settings");
                Settings::default()
            }
        }
    };
}

/// Process-wide settings, loaded on first access
pub fn get_config() -> &'static Settings {
    &SETTINGS
}

/// Load settings from `path` (missing file is fine) plus environment overrides
pub fn load_settings(path: &str) -> Result<Settings, SettingError> {
    let defaults = LiveModelingSettings::default();
    let config = Config::builder()
        .set_default("container.url", DEFAULT_CONTAINER_URL)?
        .set_default("backend.url", DEFAULT_BACKEND_URL)?
        .set_default("live_modeling.timeout_ms", defaults.timeout_ms as i64)?
        .set_default("live_modeling.interval_ms", defaults.interval_ms as i64)?
        .add_source(File::new(path, FileFormat::Yaml).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(config.try_deserialize::<Settings>()?)
}
