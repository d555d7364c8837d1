//! Server configuration (`wizard.json`) and the plain KEY=VALUE env file.

mod env_file;
mod wizard;

pub use env_file::EnvFile;
pub use wizard::{DEFAULT_ADMIN_KEY_ID, ModelTier, WizardConfig};

/// Environment variable gating mode-boundary enforcement (default on).
pub const ENFORCE_MODE_BOUNDARIES_ENV: &str = "UDOS_ENFORCE_MODE_BOUNDARIES";

/// Whether mode boundaries are enforced. Anything but `"0"` (including an
/// unset variable) enforces.
#[must_use]
pub fn mode_boundaries_enforced() -> bool {
    std::env::var(ENFORCE_MODE_BOUNDARIES_ENV).map_or(true, |v| v != "0")
}
