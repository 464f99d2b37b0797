//! Configuration Management
//!
//! Handles persistent provider configuration for ycbackup.

use crate::api::auth::{Credentials, TokenSource};
use crate::api::client::{BackupClient, DEFAULT_ENDPOINT, DEFAULT_OPERATION_ENDPOINT};
use crate::api::http::HttpClient;
use crate::backup::bindings::{BindingOptions, DEFAULT_MAX_RETRIES};
use crate::backup::PolicyConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default IAM endpoint for OAuth token exchange
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.api.cloud.yandex.net";

/// IAM tokens carry this prefix; anything else is treated as an OAuth token
const IAM_TOKEN_PREFIX: &str = "t1.";

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Cloud Backup API base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub operation_endpoint: Option<String>,
    #[serde(default)]
    pub iam_endpoint: Option<String>,
    /// Default folder for new policies
    #[serde(default)]
    pub folder_id: Option<String>,
    /// IAM or OAuth token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Apply attempts when binding a policy
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub operation_poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            operation_endpoint: None,
            iam_endpoint: None,
            folder_id: None,
            token: None,
            max_retries: default_max_retries(),
            operation_poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// First non-empty value, in precedence order
fn resolve(candidates: &[Option<String>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|v| !v.is_empty())
        .cloned()
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl ProviderConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ycbackup").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring unreadable config {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective folder (CLI > config > YC_FOLDER_ID)
    pub fn effective_folder_id(&self, cli: Option<&str>) -> Option<String> {
        resolve(&[cli.map(str::to_string), self.folder_id.clone(), env("YC_FOLDER_ID")])
    }

    /// Get effective endpoint (CLI > config > YC_BACKUP_ENDPOINT > default)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        resolve(&[cli.map(str::to_string), self.endpoint.clone(), env("YC_BACKUP_ENDPOINT")])
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn effective_operation_endpoint(&self) -> String {
        resolve(&[self.operation_endpoint.clone()])
            .unwrap_or_else(|| DEFAULT_OPERATION_ENDPOINT.to_string())
    }

    pub fn effective_iam_endpoint(&self) -> String {
        resolve(&[self.iam_endpoint.clone()]).unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string())
    }

    /// Token source (config > YC_IAM_TOKEN > YC_TOKEN)
    pub fn token_source(&self) -> Option<TokenSource> {
        if let Some(token) = resolve(&[self.token.clone()]) {
            return Some(self.classify_token(token));
        }
        if let Some(token) = resolve(&[env("YC_IAM_TOKEN")]) {
            return Some(TokenSource::Iam(token));
        }
        resolve(&[env("YC_TOKEN")]).map(|token| self.classify_token(token))
    }

    fn classify_token(&self, token: String) -> TokenSource {
        if token.starts_with(IAM_TOKEN_PREFIX) {
            TokenSource::Iam(token)
        } else {
            TokenSource::OAuth {
                token,
                endpoint: self.effective_iam_endpoint(),
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.operation_poll_interval_ms)
    }

    pub fn binding_options(&self) -> BindingOptions {
        BindingOptions {
            max_retries: self.max_retries,
            poll_interval: self.poll_interval(),
            ..Default::default()
        }
    }

    /// Build an authenticated API client
    pub fn build_client(&self, endpoint: Option<&str>) -> Result<BackupClient> {
        let Some(source) = self.token_source() else {
            bail!("No credentials configured: set token in {:?} or YC_TOKEN / YC_IAM_TOKEN", Self::config_path());
        };

        let http = HttpClient::new(Duration::from_secs(self.request_timeout_secs))
            .context("Failed to create HTTP client")?;
        let credentials = Credentials::new(source, http.clone());

        Ok(BackupClient::new(
            credentials,
            http,
            &self.effective_endpoint(endpoint),
            &self.effective_operation_endpoint(),
        ))
    }
}

/// Load a policy document; `.json` files are JSON, everything else YAML
pub fn load_policy_document(path: &Path) -> Result<PolicyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {:?}", path))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON policy {:?}", path))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML policy {:?}", path))
    }
}
