//! Config and state directory resolution.
//!
//! Layout:
//! - `<config>/wizard.json` — server config (single JSON object)
//! - `<config>/secrets.tomb` — encrypted secret store
//! - `<config>/env` — plain KEY=VALUE environment file
//! - `<state>/session.log.jsonl` — append-only session log
//!
//! `UDOS_CONFIG_DIR` / `UDOS_STATE_DIR` override the platform defaults;
//! tests point them at temp directories.

use camino::Utf8PathBuf;
use std::fs;

/// Environment override for the config directory.
pub const CONFIG_DIR_ENV: &str = "UDOS_CONFIG_DIR";

/// Environment override for the state directory.
pub const STATE_DIR_ENV: &str = "UDOS_STATE_DIR";

/// Resolve the config directory (`~/.config/udos` by default).
#[must_use]
pub fn config_dir() -> Utf8PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Utf8PathBuf::from(dir);
    }
    let base = dirs::config_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    Utf8PathBuf::from_path_buf(base.join("udos")).unwrap_or_else(|p| {
        Utf8PathBuf::from(p.to_string_lossy().into_owned())
    })
}

/// Resolve the state directory (`~/.local/state/udos` by default).
#[must_use]
pub fn state_dir() -> Utf8PathBuf {
    if let Ok(dir) = std::env::var(STATE_DIR_ENV)
        && !dir.is_empty()
    {
        return Utf8PathBuf::from(dir);
    }
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    Utf8PathBuf::from_path_buf(base.join("udos")).unwrap_or_else(|p| {
        Utf8PathBuf::from(p.to_string_lossy().into_owned())
    })
}

/// Path of the server config, `<config>/wizard.json`.
#[must_use]
pub fn wizard_config_path() -> Utf8PathBuf {
    config_dir().join("wizard.json")
}

/// Path of the encrypted secret store, `<config>/secrets.tomb`.
#[must_use]
pub fn secret_store_path() -> Utf8PathBuf {
    config_dir().join("secrets.tomb")
}

/// Path of the plain KEY=VALUE environment file, `<config>/env`.
#[must_use]
pub fn env_file_path() -> Utf8PathBuf {
    config_dir().join("env")
}

/// Path of the append-only session log, `<state>/session.log.jsonl`.
#[must_use]
pub fn session_log_path() -> Utf8PathBuf {
    state_dir().join("session.log.jsonl")
}

/// Create a directory and its parents, tolerating benign races.
pub fn ensure_dir_all(path: &Utf8PathBuf) -> std::io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_the_resolved_dirs() {
        assert!(wizard_config_path().as_str().ends_with("wizard.json"));
        assert!(secret_store_path().as_str().ends_with("secrets.tomb"));
        assert!(env_file_path().as_str().ends_with("env"));
        assert!(session_log_path().as_str().ends_with("session.log.jsonl"));
    }

    #[test]
    fn ensure_dir_all_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(tmp.path().join("a/b/c")).unwrap();
        ensure_dir_all(&dir).unwrap();
        ensure_dir_all(&dir).unwrap();
        assert!(dir.as_std_path().is_dir());
    }
}
