use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::flow_importer::{Credentials, ImportSettings};
use crate::services::flow_store::FlowStore;
use crate::services::http::HttpSettings;
use crate::services::readiness::RetryPolicy;

/// Runtime configuration: file, then environment, then command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub registry_url: String,
    pub nifi_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub flows_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub service_ready_attempts: u32,
    pub auth_ready_attempts: u32,
    pub retry_interval_secs: u64,
    pub direct_upload: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://localhost:18080".to_string(),
            nifi_url: "http://localhost:8080".to_string(),
            username: None,
            password: None,
            flows_dir: PathBuf::from("flows"),
            backups_dir: PathBuf::from("backups"),
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
            settle_delay_ms: 2000,
            service_ready_attempts: 60,
            auth_ready_attempts: 20,
            retry_interval_secs: 5,
            direct_upload: true,
        }
    }
}

impl SyncConfig {
    /// Load from an optional TOML or YAML file and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML config {}", path.display()))?,
        };
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("NIFI_REGISTRY_URL") {
            self.registry_url = url;
        }
        if let Some(url) = lookup("NIFI_URL") {
            self.nifi_url = url;
        }
        if let Some(username) = lookup("NIFI_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("NIFI_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(dir) = lookup("FLOWSYNC_FLOWS_DIR") {
            self.flows_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FLOWSYNC_BACKUPS_DIR") {
            self.backups_dir = PathBuf::from(dir);
        }
    }

    fn http_settings(&self, base_url: &str) -> HttpSettings {
        HttpSettings {
            base_url: base_url.to_string(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn registry_http(&self) -> HttpSettings {
        self.http_settings(&self.registry_url)
    }

    pub fn nifi_http(&self) -> HttpSettings {
        self.http_settings(&self.nifi_url)
    }

    pub fn flow_store(&self) -> FlowStore {
        FlowStore::new(&self.flows_dir, &self.backups_dir)
    }

    pub fn import_settings(&self) -> ImportSettings {
        let interval = Duration::from_secs(self.retry_interval_secs);
        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        ImportSettings {
            credentials,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            service_readiness: RetryPolicy::new(self.service_ready_attempts, interval),
            auth_readiness: RetryPolicy::new(self.auth_ready_attempts, interval),
            attempt_direct_upload: self.direct_upload,
            ..ImportSettings::default()
        }
    }
}
