use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use transfer_core::{config::TransferConfig, transport::BasicAuth};

pub const DEFAULT_CONFIG_FILE: &str = "transfer.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub search_debounce_ms: u64,
    pub search_min_chars: usize,
    pub search_page_size: u32,
    pub cascade_enrollment_location: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let transfer = TransferConfig::default();
        Self {
            base_url: "http://localhost:8080".into(),
            username: None,
            password: None,
            search_debounce_ms: transfer.search_debounce.as_millis() as u64,
            search_min_chars: transfer.search_min_chars,
            search_page_size: transfer.search_page_size,
            cascade_enrollment_location: transfer.cascade_enrollment_location,
        }
    }
}

/// Shape of `transfer.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    search_debounce_ms: Option<u64>,
    search_min_chars: Option<usize>,
    search_page_size: Option<u32>,
    cascade_enrollment_location: Option<bool>,
}

impl Settings {
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            search_min_chars: self.search_min_chars,
            search_page_size: self.search_page_size,
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            cascade_enrollment_location: self.cascade_enrollment_location,
        }
        .normalized()
    }

    pub fn auth(&self) -> Option<BasicAuth> {
        let username = self.username.clone().filter(|u| !u.trim().is_empty())?;
        Some(BasicAuth {
            username,
            password: self.password.clone().unwrap_or_default(),
        })
    }

    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.base_url {
            self.base_url = v;
        }
        if let Some(v) = file_cfg.username {
            self.username = Some(v);
        }
        if let Some(v) = file_cfg.password {
            self.password = Some(v);
        }
        if let Some(v) = file_cfg.search_debounce_ms {
            self.search_debounce_ms = v;
        }
        if let Some(v) = file_cfg.search_min_chars {
            self.search_min_chars = v;
        }
        if let Some(v) = file_cfg.search_page_size {
            self.search_page_size = v;
        }
        if let Some(v) = file_cfg.cascade_enrollment_location {
            self.cascade_enrollment_location = v;
        }
        Ok(())
    }

    /// `APP__*` names win over the plain names. Unparseable numbers and flags are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TRACKER_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = var("APP__BASE_URL") {
            self.base_url = v;
        }

        if let Some(v) = var("TRACKER_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = var("APP__USERNAME") {
            self.username = Some(v);
        }

        if let Some(v) = var("TRACKER_PASSWORD") {
            self.password = Some(v);
        }
        if let Some(v) = var("APP__PASSWORD") {
            self.password = Some(v);
        }

        if let Some(parsed) = var("APP__SEARCH_DEBOUNCE_MS").and_then(|v| v.trim().parse().ok()) {
            self.search_debounce_ms = parsed;
        }
        if let Some(parsed) = var("APP__SEARCH_MIN_CHARS").and_then(|v| v.trim().parse().ok()) {
            self.search_min_chars = parsed;
        }
        if let Some(parsed) = var("APP__SEARCH_PAGE_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.search_page_size = parsed;
        }
        if let Some(parsed) =
            var("APP__CASCADE_ENROLLMENT_LOCATION").and_then(|v| parse_flag(&v))
        {
            self.cascade_enrollment_location = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Defaults, then the config file, then environment. An explicit `path` must exist; the
/// default `transfer.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            settings
                .apply_file(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                if let Err(err) = settings.apply_file(&raw) {
                    tracing::warn!(error = %err, "ignoring invalid {DEFAULT_CONFIG_FILE}");
                }
            }
        }
    }

    settings.apply_env(|name| std::env::var(name).ok());
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
