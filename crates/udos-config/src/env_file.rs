//! The plain KEY=VALUE environment file.
//!
//! No interpolation, no quoting rules: a line is either blank, a `#`
//! comment, or `KEY=VALUE` with the value taken verbatim to end of line.
//! Comments and ordering survive a rewrite.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

use udos_core::atomic_write::write_file_atomic;

#[derive(Debug, Clone)]
enum Line {
    Blank,
    Comment(String),
    Pair { key: String, value: String },
}

/// An env file held in memory with its original line structure.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    /// Parse file content. Malformed lines (no `=`) are preserved as
    /// comments so a rewrite never destroys operator text.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    Line::Blank
                } else if trimmed.starts_with('#') {
                    Line::Comment(line.to_string())
                } else if let Some((key, value)) = trimmed.split_once('=') {
                    Line::Pair {
                        key: key.trim().to_string(),
                        value: value.to_string(),
                    }
                } else {
                    Line::Comment(line.to_string())
                }
            })
            .collect();
        Self { lines }
    }

    /// Load from disk; an absent file yields an empty env.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read env file: {path}"))?;
        Ok(Self::parse(&content))
    }

    /// Atomically persist, preserving comments and ordering.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        write_file_atomic(path, &self.to_content())
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set a value, updating the last existing entry or appending.
    pub fn set(&mut self, key: &str, value: &str) {
        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key => Some(value),
            _ => None,
        });
        match existing {
            Some(slot) => *slot = value.to_string(),
            None => self.lines.push(Line::Pair {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Serialize back to file content.
    #[must_use]
    pub fn to_content(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Blank => out.push('\n'),
                Line::Comment(text) => {
                    out.push_str(text);
                    out.push('\n');
                }
                Line::Pair { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                    out.push('\n');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn parses_pairs_and_preserves_comments() {
        let env = EnvFile::parse("# header\nWIZARD_KEY=abc\n\nWIZARD_ADMIN_TOKEN=tok\n");
        assert_eq!(env.get("WIZARD_KEY"), Some("abc"));
        assert_eq!(env.get("WIZARD_ADMIN_TOKEN"), Some("tok"));
        assert!(env.to_content().starts_with("# header\n"));
    }

    #[test]
    fn set_updates_in_place() {
        let mut env = EnvFile::parse("A=1\nB=2\n");
        env.set("A", "9");
        assert_eq!(env.get("A"), Some("9"));
        assert_eq!(env.to_content(), "A=9\nB=2\n");
    }

    #[test]
    fn set_appends_new_keys() {
        let mut env = EnvFile::default();
        env.set("NEW", "value");
        assert_eq!(env.to_content(), "NEW=value\n");
    }

    #[test]
    fn values_are_taken_verbatim_without_interpolation() {
        let env = EnvFile::parse("KEY=$HOME/literal=stuff\n");
        assert_eq!(env.get("KEY"), Some("$HOME/literal=stuff"));
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let env = EnvFile::parse("K=first\nK=second\n");
        assert_eq!(env.get("K"), Some("second"));
    }

    #[test]
    fn load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("env")).unwrap();
        let mut env = EnvFile::default();
        env.set("WIZARD_KEY", "deadbeef");
        env.save(&path).unwrap();

        let loaded = EnvFile::load(&path).unwrap();
        assert_eq!(loaded.get("WIZARD_KEY"), Some("deadbeef"));
    }

    #[test]
    fn absent_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("missing")).unwrap();
        let env = EnvFile::load(&path).unwrap();
        assert!(env.get("ANY").is_none());
    }
}
