use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

pub const API_BASE_URL_ENV: &str = "PROCTOR_API_BASE_URL";
pub const STORE_BASE_URL_ENV: &str = "PROCTOR_STORE_BASE_URL";
pub const DATA_DIR_ENV: &str = "PROCTOR_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctorConfig {
    pub session_duration_secs: u32,
    pub feedback_threshold_secs: u32,
    pub tick_interval_ms: u64,
    pub api_base_url: String,
    pub store_base_url: String,
    pub request_timeout_secs: u64,
    pub violation_path: String,
    pub completion_path: String,
    pub abandon_path: String,
    pub data_dir: PathBuf,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            session_duration_secs: 14 * 60,
            feedback_threshold_secs: 120,
            tick_interval_ms: 1000,
            api_base_url: "http://localhost:3000/api".into(),
            store_base_url: "http://localhost:9000".into(),
            request_timeout_secs: 120,
            violation_path: "/unfollowingrules".into(),
            completion_path: "/interview-complete".into(),
            abandon_path: "/landing".into(),
            data_dir: PathBuf::from(".interview-proctor"),
        }
    }
}

impl ProctorConfig {
    /// Reads `path` if it exists. An unreadable or malformed file falls back
    /// to defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents).unwrap_or_else(|err| {
                    warn!(
                        "Ignoring malformed config at {} ({err}); using defaults",
                        path.display()
                    );
                    ProctorConfig::default()
                })
            }
            _ => ProctorConfig::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(STORE_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.store_base_url = url;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_duration_secs == 0 {
            bail!("sessionDurationSecs must be positive");
        }
        if self.feedback_threshold_secs >= self.session_duration_secs {
            bail!(
                "feedbackThresholdSecs ({}) must be below sessionDurationSecs ({})",
                self.feedback_threshold_secs,
                self.session_duration_secs
            );
        }
        if self.tick_interval_ms == 0 {
            bail!("tickIntervalMs must be positive");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("interview-proctor.sqlite3")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
