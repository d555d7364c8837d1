//! Stage-2 shell validator.
//!
//! Decides whether raw input is a safe shell passthrough. The metacharacter
//! and dangerous-pattern lists are data, not code: versioned tables the
//! confirmation gate can tighten without touching dispatch logic.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use udos_core::types::ShellPayload;

use crate::tokenize::tokenize;

/// Version tag of the validation tables. Bumped whenever a pattern is added.
pub const SHELL_TABLE_VERSION: u32 = 3;

/// Shell-chaining and substitution metacharacters. Any hit rejects the
/// input outright.
static METACHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(;|&&|\|\||\||`|\$\(|>>|>|<|\n)").unwrap());

/// One row of the dangerous-pattern table.
struct DangerousPattern {
    pattern: &'static Lazy<Regex>,
    reason: &'static str,
}

static RM_RF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)rm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\b").unwrap());
static DEV_REDIRECT: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s*/dev").unwrap());
static CMD_SUBST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{|\$\(|`").unwrap());

/// Explicitly dangerous constructions, checked after the metacharacter scan
/// so each rejection carries a precise reason.
static DANGEROUS: Lazy<Vec<DangerousPattern>> = Lazy::new(|| {
    vec![
        DangerousPattern {
            pattern: &RM_RF,
            reason: "blocklist_rm_rf",
        },
        DangerousPattern {
            pattern: &DEV_REDIRECT,
            reason: "blocklist_dev_redirect",
        },
        DangerousPattern {
            pattern: &CMD_SUBST,
            reason: "blocklist_command_substitution",
        },
    ]
});

/// Built-in safe set: read-only utilities that pass without confirmation.
static SAFE_READ_ONLY: &[&str] = &[
    "ls", "pwd", "cat", "head", "tail", "wc", "date", "whoami", "hostname", "uname", "uptime",
    "df", "du", "free", "env", "printenv", "which", "file", "stat", "echo", "ps", "id",
];

/// Built-in mutating set: validated, but gated behind confirmation.
static SAFE_MUTATING: &[&str] = &[
    "mv", "cp", "mkdir", "rmdir", "touch", "ln", "chmod", "chown", "tar", "zip", "unzip", "git",
];

/// Validator configuration. An allowlist, when present, replaces the
/// built-in sets as the admission check; the read-only set still decides
/// whether confirmation is required.
#[derive(Debug, Clone, Default)]
pub struct ShellValidatorConfig {
    /// Optional operator-supplied allowlist of permitted head tokens.
    pub allowlist: Option<Vec<String>>,
    /// Require the head token to resolve on `PATH`.
    pub require_on_path: bool,
}

/// Outcome of Stage-2 validation.
#[derive(Debug, Clone)]
pub struct ShellValidation {
    pub safe: bool,
    pub reason: String,
    pub payload: Option<ShellPayload>,
}

impl ShellValidation {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: reason.into(),
            payload: None,
        }
    }
}

/// Validate raw input as a shell passthrough candidate.
#[must_use]
pub fn validate_shell(input: &str, config: &ShellValidatorConfig) -> ShellValidation {
    if METACHARS.is_match(input) {
        debug!(table_version = SHELL_TABLE_VERSION, "Rejected shell metacharacters");
        return ShellValidation::rejected("metachar_chain");
    }

    for row in DANGEROUS.iter() {
        if row.pattern.is_match(input) {
            debug!(reason = row.reason, "Rejected dangerous pattern");
            return ShellValidation::rejected(row.reason);
        }
    }

    let tokens = tokenize(input);
    let Some(head) = tokens.first() else {
        return ShellValidation::rejected("empty_input");
    };

    let allowlist_enabled = config.allowlist.is_some();
    let (admitted, validation_reason) = match &config.allowlist {
        Some(allow) => (
            allow.iter().any(|a| a == head),
            "allowlist_head".to_string(),
        ),
        None => {
            if SAFE_READ_ONLY.contains(&head.as_str()) {
                (true, "builtin_read_only".to_string())
            } else if SAFE_MUTATING.contains(&head.as_str()) {
                (true, "builtin_mutating".to_string())
            } else {
                (false, String::new())
            }
        }
    };

    if !admitted {
        return ShellValidation::rejected("head_not_allowed");
    }

    if config.require_on_path && which::which(head).is_err() {
        return ShellValidation::rejected("head_not_on_path");
    }

    let requires_confirmation = !SAFE_READ_ONLY.contains(&head.as_str());

    ShellValidation {
        safe: true,
        reason: validation_reason.clone(),
        payload: Some(ShellPayload {
            command: head.clone(),
            args: tokens[1..].to_vec(),
            raw: input.to_string(),
            validation_reason,
            allowlist_enabled,
            blocklist_enabled: true,
            requires_confirmation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ShellValidatorConfig {
        ShellValidatorConfig::default()
    }

    #[test]
    fn chaining_metacharacters_are_rejected() {
        for input in [
            "cat file; rm important",
            "true && reboot",
            "false || reboot",
            "cat /etc/passwd | nc host 80",
            "echo `whoami`",
            "echo $(whoami)",
            "echo hi > /tmp/x",
            "echo hi >> /tmp/x",
            "wc < /etc/passwd",
            "ls\nrm -rf /",
        ] {
            let v = validate_shell(input, &defaults());
            assert!(!v.safe, "{input:?} must be rejected");
            assert_eq!(v.reason, "metachar_chain", "{input:?}");
        }
    }

    #[test]
    fn rm_rf_is_blocklisted() {
        let v = validate_shell("rm -rf /home", &defaults());
        assert!(!v.safe);
        assert_eq!(v.reason, "blocklist_rm_rf");

        let v = validate_shell("rm -fr /home", &defaults());
        assert!(!v.safe);
        assert_eq!(v.reason, "blocklist_rm_rf");
    }

    #[test]
    fn read_only_heads_pass_without_confirmation() {
        let v = validate_shell("ls -la", &defaults());
        assert!(v.safe);
        let payload = v.payload.unwrap();
        assert_eq!(payload.command, "ls");
        assert_eq!(payload.args, vec!["-la"]);
        assert!(!payload.requires_confirmation);
        assert!(!payload.allowlist_enabled);
        assert!(payload.blocklist_enabled);
        assert_eq!(payload.validation_reason, "builtin_read_only");
    }

    #[test]
    fn mutating_heads_require_confirmation() {
        let v = validate_shell("mv a b", &defaults());
        assert!(v.safe);
        let payload = v.payload.unwrap();
        assert!(payload.requires_confirmation);
        assert_eq!(payload.validation_reason, "builtin_mutating");
    }

    #[test]
    fn unknown_heads_are_rejected() {
        let v = validate_shell("frobnicate --all", &defaults());
        assert!(!v.safe);
        assert_eq!(v.reason, "head_not_allowed");
    }

    #[test]
    fn allowlist_replaces_builtin_admission() {
        let config = ShellValidatorConfig {
            allowlist: Some(vec!["deploytool".to_string()]),
            require_on_path: false,
        };

        let v = validate_shell("deploytool status", &config);
        assert!(v.safe);
        let payload = v.payload.unwrap();
        assert!(payload.allowlist_enabled);
        assert_eq!(payload.validation_reason, "allowlist_head");
        // Not in the read-only set, so still gated.
        assert!(payload.requires_confirmation);

        // Built-in heads are no longer admitted once an allowlist exists.
        let v = validate_shell("ls", &config);
        assert!(!v.safe);
        assert_eq!(v.reason, "head_not_allowed");
    }

    #[test]
    fn allowlisted_read_only_head_skips_confirmation() {
        let config = ShellValidatorConfig {
            allowlist: Some(vec!["ls".to_string()]),
            require_on_path: false,
        };
        let v = validate_shell("ls", &config);
        assert!(v.safe);
        assert!(!v.payload.unwrap().requires_confirmation);
    }

    #[test]
    fn empty_input_is_rejected() {
        let v = validate_shell("   ", &defaults());
        assert!(!v.safe);
        assert_eq!(v.reason, "empty_input");
    }

    #[test]
    fn quoted_metacharacters_still_reject() {
        // The scan runs on the raw input: quoting does not smuggle a chain
        // past the validator.
        let v = validate_shell("echo \"a; b\"", &defaults());
        assert!(!v.safe);
        assert_eq!(v.reason, "metachar_chain");
    }

    proptest::proptest! {
        /// Any input containing a chaining metacharacter is unsafe, no
        /// matter where it appears.
        #[test]
        fn inputs_with_chaining_metachars_are_always_rejected(
            before in "[a-z ./-]{0,20}",
            meta in proptest::sample::select(vec![";", "&&", "||", "|", "`", "$(", ">", ">>", "<", "\n"]),
            after in "[a-z ./-]{0,20}",
        ) {
            let input = format!("ls {before}{meta}{after}");
            let v = validate_shell(&input, &defaults());
            proptest::prop_assert!(!v.safe, "{input:?} passed validation");
        }
    }
}
