//! Append-only session log and local usage counters.
//!
//! One JSON-lines record per dispatch at `<state>/session.log.jsonl`.
//! The log is single-writer: appends serialize
//! on an advisory write lock; readers open the file independently. All data
//! stays local. Raw input text is never recorded unless the caller opted in.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use fd_lock::RwLock as FdRwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;

use udos_core::types::{Caller, DispatchTarget, ResponseStatus};

/// One dispatch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub timestamp_utc: DateTime<Utc>,
    pub caller: Caller,
    /// blake3 hex of the raw input.
    pub input_hash: String,
    pub route: DispatchTarget,
    pub status: ResponseStatus,
    pub elapsed_ms: u64,
    /// Most severe failover reason when the vibe chain was exercised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover: Option<String>,
    /// Redaction classes that fired on the recorded error text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<String>,
    /// Canonical command on ucode dispatches; feeds per-command counters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Raw input, present only when the caller explicitly opted in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// Aggregated counters over the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: u64,
    pub per_route: BTreeMap<String, u64>,
    pub per_command: BTreeMap<String, u64>,
    pub per_status: BTreeMap<String, u64>,
    pub failovers: BTreeMap<String, u64>,
}

/// Hash input text for the log; the raw text itself stays out by default.
#[must_use]
pub fn hash_input(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// The session log at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: Utf8PathBuf,
}

impl SessionLog {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve from the process-wide state layout.
    #[must_use]
    pub fn from_default_paths() -> Self {
        Self::new(udos_core::paths::session_log_path())
    }

    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    /// Append one record atomically. Entries are totally ordered by append
    /// sequence; the advisory lock serializes concurrent writers.
    pub fn record(&self, entry: &SessionEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {parent}"))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .with_context(|| format!("Failed to open session log: {}", self.path))?;

        let mut lock = FdRwLock::new(file);
        let mut guard = lock
            .write()
            .with_context(|| format!("Failed to lock session log: {}", self.path))?;

        let line = serde_json::to_string(entry).context("Failed to serialize session entry")?;
        writeln!(*guard, "{line}").context("Failed to append session entry")?;
        guard.flush().context("Failed to flush session log")?;

        Ok(())
    }

    /// Read all entries. Lines that fail to parse are skipped: a torn tail
    /// write must not poison the whole log.
    pub fn entries(&self) -> Result<Vec<SessionEntry>> {
        if !self.path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .with_context(|| format!("Failed to read session log: {}", self.path))?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Aggregate local counters.
    pub fn summary(&self) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        for entry in self.entries()? {
            summary.total += 1;
            *summary
                .per_route
                .entry(entry.route.to_string())
                .or_default() += 1;
            *summary
                .per_status
                .entry(
                    serde_json::to_value(entry.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                )
                .or_default() += 1;
            if let Some(command) = entry.command {
                *summary.per_command.entry(command).or_default() += 1;
            }
            if let Some(failover) = entry.failover {
                *summary.failovers.entry(failover).or_default() += 1;
            }
        }
        Ok(summary)
    }
}
