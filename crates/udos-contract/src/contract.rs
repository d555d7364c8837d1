//! Drift detection and repair across the three contract artifacts.
//!
//! The repair path is state-machine driven: each drift kind maps to one
//! ordered action, so adding a kind means adding a transition, not editing
//! procedure. Repair is mutually exclusive with itself across the process
//! (an advisory file lock) and idempotent: repairing a healthy state
//! performs nothing.

use camino::Utf8PathBuf;
use fd_lock::RwLock as FdRwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use tracing::{info, warn};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use udos_config::{DEFAULT_ADMIN_KEY_ID, EnvFile, WizardConfig};
use udos_core::error::{ErrorKind, UdosError};

use crate::store::{SecretStore, StoreError, TombStore, random_bytes};

/// Env-file key holding the store unlock key (64 hex chars).
pub const WIZARD_KEY: &str = "WIZARD_KEY";

/// Env-file key holding the admin token (>= 32 bytes, base64url).
pub const WIZARD_ADMIN_TOKEN: &str = "WIZARD_ADMIN_TOKEN";

/// Raw byte length of a generated admin token.
const TOKEN_BYTES: usize = 32;

/// Ways the three artifacts can disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    MissingEnvKey,
    MissingEnvToken,
    MissingConfigKeyId,
    SecretStoreLocked,
    MissingSecretEntry,
    TokenMismatch,
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DriftKind::MissingEnvKey => "missing_env_key",
            DriftKind::MissingEnvToken => "missing_env_token",
            DriftKind::MissingConfigKeyId => "missing_config_key_id",
            DriftKind::SecretStoreLocked => "secret_store_locked",
            DriftKind::MissingSecretEntry => "missing_secret_entry",
            DriftKind::TokenMismatch => "token_mismatch",
        };
        f.write_str(name)
    }
}

/// Actions the repair path may perform, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    EnsureConfigKeyId,
    GenerateWizardKey,
    GenerateAdminToken,
    UpsertSecretEntry,
    ResetSecretStore,
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RepairAction::EnsureConfigKeyId => "ensure_config_key_id",
            RepairAction::GenerateWizardKey => "generate_wizard_key",
            RepairAction::GenerateAdminToken => "generate_admin_token",
            RepairAction::UpsertSecretEntry => "upsert_secret_entry",
            RepairAction::ResetSecretStore => "reset_secret_store",
        };
        f.write_str(name)
    }
}

/// Result of a status check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractStatus {
    pub ok: bool,
    pub drift: Vec<DriftKind>,
    /// Human-readable repair plan, one line per pending action.
    pub repair_actions: Vec<String>,
}

/// Result of a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub ok: bool,
    pub performed: Vec<RepairAction>,
    pub residual_drift: Vec<DriftKind>,
}

/// Manager over the three artifact paths.
#[derive(Debug, Clone)]
pub struct ContractManager {
    env_path: Utf8PathBuf,
    config_path: Utf8PathBuf,
    store_path: Utf8PathBuf,
}

impl ContractManager {
    #[must_use]
    pub fn new(
        env_path: impl Into<Utf8PathBuf>,
        config_path: impl Into<Utf8PathBuf>,
        store_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            env_path: env_path.into(),
            config_path: config_path.into(),
            store_path: store_path.into(),
        }
    }

    /// Resolve paths from the process-wide config/state layout.
    #[must_use]
    pub fn from_default_paths() -> Self {
        Self::new(
            udos_core::paths::env_file_path(),
            udos_core::paths::wizard_config_path(),
            udos_core::paths::secret_store_path(),
        )
    }

    /// Detect drift between the three artifacts.
    pub fn status(&self) -> Result<ContractStatus, UdosError> {
        let env = EnvFile::load(&self.env_path)
            .map_err(|e| UdosError::internal(format!("env file unreadable: {e}")))?;

        let mut drift = Vec::new();

        let wizard_key = env.get(WIZARD_KEY).filter(|k| is_valid_key(k));
        if wizard_key.is_none() {
            drift.push(DriftKind::MissingEnvKey);
        }

        let env_token = env.get(WIZARD_ADMIN_TOKEN).filter(|t| !t.is_empty());
        if env_token.is_none() {
            drift.push(DriftKind::MissingEnvToken);
        }

        let raw_key_id = WizardConfig::raw_field(&self.config_path, "admin_api_key_id")
            .map_err(|e| UdosError::internal(format!("server config unreadable: {e}")))?;
        let key_id = match raw_key_id.as_ref().and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                drift.push(DriftKind::MissingConfigKeyId);
                DEFAULT_ADMIN_KEY_ID.to_string()
            }
        };

        let mut store = TombStore::new(self.store_path.clone());
        match wizard_key {
            Some(key) => match store.unlock(key) {
                Ok(()) => {
                    let entry = store
                        .get(&key_id)
                        .map_err(|e| UdosError::internal(e.to_string()))?;
                    match (entry, env_token) {
                        (None, _) => drift.push(DriftKind::MissingSecretEntry),
                        (Some(stored), Some(expected)) if stored != expected => {
                            drift.push(DriftKind::TokenMismatch);
                        }
                        _ => {}
                    }
                }
                Err(StoreError::Locked) => drift.push(DriftKind::SecretStoreLocked),
                Err(e) => return Err(UdosError::internal(e.to_string())),
            },
            None => {
                // Without a valid key an existing store is unreadable.
                if store.exists() {
                    drift.push(DriftKind::SecretStoreLocked);
                }
            }
        }

        let repair_actions = drift.iter().map(planned_action).collect();

        Ok(ContractStatus {
            ok: drift.is_empty(),
            drift,
            repair_actions,
        })
    }

    /// Repair drift. Serialized across the process by an advisory lock;
    /// concurrent callers observe an idempotent outcome.
    pub fn repair(&self) -> Result<RepairOutcome, UdosError> {
        let mut lock = self.open_repair_lock()?;
        let _guard = lock
            .write()
            .map_err(|e| UdosError::internal(format!("cannot acquire repair lock: {e}")))?;

        let mut env = EnvFile::load(&self.env_path)
            .map_err(|e| UdosError::internal(format!("env file unreadable: {e}")))?;
        let mut performed = Vec::new();

        // Config key id first: later steps address the store by it.
        let raw_key_id = WizardConfig::raw_field(&self.config_path, "admin_api_key_id")
            .map_err(|e| UdosError::internal(format!("server config unreadable: {e}")))?;
        if raw_key_id.as_ref().and_then(|v| v.as_str()).is_none_or(str::is_empty) {
            let mut config = WizardConfig::load(&self.config_path)
                .map_err(|e| UdosError::internal(e.to_string()))?;
            config.admin_api_key_id = DEFAULT_ADMIN_KEY_ID.to_string();
            config
                .save(&self.config_path)
                .map_err(|e| UdosError::internal(e.to_string()))?;
            info!(action = %RepairAction::EnsureConfigKeyId, "Contract repair");
            performed.push(RepairAction::EnsureConfigKeyId);
        }
        let key_id = WizardConfig::load(&self.config_path)
            .map_err(|e| UdosError::internal(e.to_string()))?
            .admin_api_key_id;

        // Unlock key next.
        if env.get(WIZARD_KEY).filter(|k| is_valid_key(k)).is_none() {
            let key = hex::encode(random_bytes(32));
            env.set(WIZARD_KEY, &key);
            env.save(&self.env_path)
                .map_err(|e| UdosError::internal(e.to_string()))?;
            info!(action = %RepairAction::GenerateWizardKey, "Contract repair");
            performed.push(RepairAction::GenerateWizardKey);
        }
        let wizard_key = env
            .get(WIZARD_KEY)
            .map(str::to_string)
            .expect("wizard key present after repair step");

        let mut store = TombStore::new(self.store_path.clone());
        match store.unlock(&wizard_key) {
            Ok(()) => {
                // Unlockable: make sure a token exists, then align the entry.
                if env.get(WIZARD_ADMIN_TOKEN).filter(|t| !t.is_empty()).is_none() {
                    let token = URL_SAFE_NO_PAD.encode(random_bytes(TOKEN_BYTES));
                    env.set(WIZARD_ADMIN_TOKEN, &token);
                    env.save(&self.env_path)
                        .map_err(|e| UdosError::internal(e.to_string()))?;
                    info!(action = %RepairAction::GenerateAdminToken, "Contract repair");
                    performed.push(RepairAction::GenerateAdminToken);
                }
                let token = env
                    .get(WIZARD_ADMIN_TOKEN)
                    .expect("token present after repair step")
                    .to_string();

                let current = store
                    .get(&key_id)
                    .map_err(|e| UdosError::internal(e.to_string()))?;
                if current.as_deref() != Some(token.as_str()) {
                    store
                        .put(&key_id, &token)
                        .map_err(|e| UdosError::internal(e.to_string()))?;
                    info!(action = %RepairAction::UpsertSecretEntry, "Contract repair");
                    performed.push(RepairAction::UpsertSecretEntry);
                }
            }
            Err(StoreError::Locked) => {
                // Controlled reset, permitted only with a present env token.
                match env.get(WIZARD_ADMIN_TOKEN).filter(|t| !t.is_empty()) {
                    Some(token) => {
                        let token = token.to_string();
                        store
                            .reset(&wizard_key)
                            .map_err(|e| UdosError::internal(e.to_string()))?;
                        info!(action = %RepairAction::ResetSecretStore, "Contract repair");
                        performed.push(RepairAction::ResetSecretStore);
                        store
                            .put(&key_id, &token)
                            .map_err(|e| UdosError::internal(e.to_string()))?;
                        info!(action = %RepairAction::UpsertSecretEntry, "Contract repair");
                        performed.push(RepairAction::UpsertSecretEntry);
                    }
                    None => {
                        warn!("Secret store locked and no env token present, refusing reset");
                    }
                }
            }
            Err(e) => return Err(UdosError::internal(e.to_string())),
        }

        let status = self.status()?;
        Ok(RepairOutcome {
            ok: status.ok,
            performed,
            residual_drift: status.drift,
        })
    }

    /// The admin token from the env file, if present and non-empty. Callers
    /// compare against it; they never persist it elsewhere.
    pub fn admin_token(&self) -> Result<Option<String>, UdosError> {
        let env = EnvFile::load(&self.env_path)
            .map_err(|e| UdosError::internal(format!("env file unreadable: {e}")))?;
        Ok(env
            .get(WIZARD_ADMIN_TOKEN)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    /// Map a repair result to the terminal error the shell entry reports.
    pub fn repair_or_error(&self) -> Result<RepairOutcome, UdosError> {
        let outcome = self.repair()?;
        if outcome.ok {
            Ok(outcome)
        } else {
            Err(UdosError::new(
                ErrorKind::ContractUnrepairable,
                format!(
                    "residual drift after repair: {}",
                    outcome
                        .residual_drift
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ))
        }
    }

    fn open_repair_lock(&self) -> Result<FdRwLock<std::fs::File>, UdosError> {
        let lock_path = self.store_path.with_extension("repair.lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| UdosError::internal(format!("cannot create lock dir: {e}")))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path.as_std_path())
            .map_err(|e| UdosError::internal(format!("cannot open repair lock: {e}")))?;
        Ok(FdRwLock::new(file))
    }
}

/// A valid unlock key is exactly 64 lowercase-insensitive hex characters.
fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}

/// The single action planned for a drift kind (status reporting only; the
/// repair path derives its own order).
fn planned_action(kind: &DriftKind) -> String {
    let action = match kind {
        DriftKind::MissingEnvKey => RepairAction::GenerateWizardKey,
        DriftKind::MissingEnvToken => RepairAction::GenerateAdminToken,
        DriftKind::MissingConfigKeyId => RepairAction::EnsureConfigKeyId,
        DriftKind::SecretStoreLocked => RepairAction::ResetSecretStore,
        DriftKind::MissingSecretEntry | DriftKind::TokenMismatch => RepairAction::UpsertSecretEntry,
    };
    action.to_string()
}
