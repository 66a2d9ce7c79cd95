use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::fetch::{FetchSettings, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::naming::DEFAULT_LABEL;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid settings yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Daemon settings. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub bind: String,
    pub workers: usize,
    pub web_root: Option<String>,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub default_label: String,
    pub log_filter: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            workers: 4,
            web_root: None,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_label: DEFAULT_LABEL.to_string(),
            log_filter: "vless_sub=info".to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: ServiceSettings = if yaml.trim().is_empty() {
            ServiceSettings::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.bind.trim().is_empty() {
            return Err(SettingsError::Invalid("bind must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(SettingsError::Invalid("workers must be > 0".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(SettingsError::Invalid(
                "fetch_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Replaces the port of `bind`, keeping its host.
    pub fn override_port(&mut self, port: u16) {
        let host = match self.bind.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.bind.clone(),
        };
        self.bind = format!("{}:{}", host, port);
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}
