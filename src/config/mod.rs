// SPDX-License-Identifier: MPL-2.0
//! Reporter configuration, loaded from and saved to a `settings.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use junebug::config::{self, ReporterConfig};
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Route reports to the support inbox
//! config.support_inbox = Some("support@example.com".to_string());
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "JuneBug";

/// Settings of the embedded bug reporter.
///
/// Keyed tables keep the order in which they appear in the file, which is
/// the order their lines appear in reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Recipient of bug reports. Without it nothing is sent.
    pub support_inbox: Option<String>,
    pub app_name: Option<String>,
    /// Subject line; [`defaults::DEFAULT_SUBJECT_PREFIX`] when unset.
    pub subject_prefix: Option<String>,
    /// Mail relay URL; [`defaults::DEFAULT_ENDPOINT`] when unset.
    pub endpoint: Option<String>,
    pub disable_emailer: bool,
    pub disable_console_logs: bool,
    pub disable_screenshot: bool,
    /// Prefilled text of the chat deep link on the chat card.
    pub chat_message: Option<String>,
    /// Who is reporting (e.g. `fullName`, `email`).
    pub reporter_info: Option<Map<String, Value>>,
    /// Extra key/value pairs attached as their own log file.
    pub custom_log_fields: Map<String, Value>,
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<ReporterConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(ReporterConfig::default())
}

pub fn save(config: &ReporterConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

/// Reads a configuration file. Invalid TOML yields the defaults.
pub fn load_from_path(path: &Path) -> Result<ReporterConfig> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable configuration");
            Ok(ReporterConfig::default())
        }
    }
}

pub fn save_to_path(config: &ReporterConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
