use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CONFIG_FILE: &str = "story_writer.toml";

/// Environment names checked for the credential, lowest precedence first.
const API_KEY_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "STORY__API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
}

/// Validated client configuration handed to `GeminiClient::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key configured; set API_KEY (or GEMINI_API_KEY) or add api_key to {DEFAULT_CONFIG_FILE}")]
    MissingApiKey,
    #[error("model name must not be empty")]
    EmptyModel,
    #[error("invalid base url '{value}': {source}")]
    InvalidBaseUrl {
        value: String,
        source: url::ParseError,
    },
}

impl Settings {
    pub fn with_overrides(mut self, model: Option<String>, base_url: Option<String>) -> Self {
        if let Some(model) = non_empty(model) {
            self.model = model;
        }
        if let Some(base_url) = non_empty(base_url) {
            self.base_url = base_url;
        }
        self
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .and_then(|key| non_empty(Some(key)))
            .ok_or(ConfigError::MissingApiKey)?;
        let model = self.model.trim();
        if model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        let base_url =
            Url::parse(self.base_url.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
                value: self.base_url.clone(),
                source,
            })?;

        Ok(GeminiConfig {
            api_key,
            model: model.to_string(),
            base_url,
        })
    }
}

/// Defaults, then the TOML file, then the process environment.
///
/// An explicitly named file must exist; the default `story_writer.toml` is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if let Some(file_cfg) = read_file_settings(&path, required)? {
        apply_file_settings(&mut settings, file_cfg);
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn read_file_settings(path: &Path, required: bool) -> anyhow::Result<Option<FileSettings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };

    let parsed = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = non_empty(file_cfg.api_key) {
        settings.api_key = Some(v);
    }
    if let Some(v) = non_empty(file_cfg.model) {
        settings.model = v;
    }
    if let Some(v) = non_empty(file_cfg.base_url) {
        settings.base_url = v;
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for name in API_KEY_VARS {
        if let Some(v) = non_empty(lookup(name)) {
            settings.api_key = Some(v);
        }
    }
    if let Some(v) = non_empty(lookup("STORY__MODEL")) {
        settings.model = v;
    }
    if let Some(v) = non_empty(lookup("STORY__BASE_URL")) {
        settings.base_url = v;
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
