//! The wizard server config: a single JSON object at `<config>/wizard.json`.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

use udos_core::atomic_write::write_file_atomic;

/// Default id of the admin-token entry in the secret store.
pub const DEFAULT_ADMIN_KEY_ID: &str = "wizard-admin-token";

fn default_admin_key_id() -> String {
    DEFAULT_ADMIN_KEY_ID.to_string()
}

fn default_model_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:4321".to_string()
}

/// Which tier of local models the self-heal probe requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    #[default]
    Tier2,
    Tier3,
}

impl ModelTier {
    /// Model names this tier requires from the local model service.
    #[must_use]
    pub fn required_models(self) -> &'static [&'static str] {
        match self {
            ModelTier::Tier2 => &["llama3.2", "qwen2.5-coder:1.5b"],
            ModelTier::Tier3 => &["llama3.2", "qwen2.5-coder:1.5b", "mistral-nemo", "llava"],
        }
    }
}

/// The wizard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Id of the admin-token entry in the secret store.
    #[serde(default = "default_admin_key_id")]
    pub admin_api_key_id: String,

    /// Loopback endpoint of the local model service.
    #[serde(default = "default_model_endpoint")]
    pub model_endpoint: String,

    /// Default model the self-heal probe expects to find.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model tier the probe derives its required-model list from.
    #[serde(default)]
    pub model_tier: ModelTier,

    /// Wizard server bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Operator-supplied shell allowlist; replaces the built-in safe sets
    /// when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_allowlist: Option<Vec<String>>,

    /// Workspace directory for file commands; defaults to
    /// `<state>/workspace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<String>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            admin_api_key_id: default_admin_key_id(),
            model_endpoint: default_model_endpoint(),
            default_model: default_model(),
            model_tier: ModelTier::default(),
            bind: default_bind(),
            shell_allowlist: None,
            workspace_dir: None,
        }
    }
}

impl WizardConfig {
    /// Load the config, falling back to defaults when the file is absent.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read server config: {path}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse server config: {path}"))
    }

    /// Atomically persist the config as pretty-printed JSON.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_file_atomic(path, &json)
    }

    /// Read one raw field from the config file without applying serde
    /// defaults. Used by drift detection to distinguish a missing field
    /// from a defaulted one.
    pub fn raw_field(path: &Utf8Path, field: &str) -> Result<Option<serde_json::Value>> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read server config: {path}"))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse server config: {path}"))?;
        Ok(value.get(field).cloned())
    }
}
