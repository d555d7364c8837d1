//! The canonical command catalog and alias bridges.
//!
//! The catalog is the single source of truth for Stage-1 dispatch: the fixed
//! canonical names, the compound forms `FILE NEW` / `FILE EDIT`, and the
//! reserved alias targets `UCODE` and `SEND`. Aliases are additive only;
//! removing one is a breaking change. The handler registry must match the
//! dispatchable set exactly — the parity test fails the build on any
//! divergence.
//!
//! Three legacy names (`RESTART`, `SCHEDULE`, `TALK`) remain in the catalog
//! but dispatch through their alias bridges; the matcher consults the bridge
//! table before exact names.

mod registry;

pub use registry::{CommandHandler, CommandOutcome, CommandRequest, HandlerRegistry};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Kind tag of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ReadOnly,
    Mutating,
    Destructive,
}

/// Stage-1 acceptance floor for fuzzy matches.
const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

/// Destructive commands are never reachable through a fuzzy match.
const DESTRUCTIVE_MIN_CONFIDENCE: f64 = 1.0;

/// One canonical command.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub kind: CommandKind,
    pub min_confidence: f64,
}

const fn entry(name: &'static str, kind: CommandKind) -> CatalogEntry {
    let min_confidence = match kind {
        CommandKind::Destructive => DESTRUCTIVE_MIN_CONFIDENCE,
        _ => DEFAULT_MIN_CONFIDENCE,
    };
    CatalogEntry {
        name,
        kind,
        min_confidence,
    }
}

/// The fixed canonical set in catalog order (fuzzy-match ties break on this
/// order). Simple names first, compound forms last.
pub static CATALOG: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    use CommandKind::{Destructive, Mutating, ReadOnly};
    vec![
        entry("ANCHOR", Mutating),
        entry("BAG", ReadOnly),
        entry("BINDER", ReadOnly),
        entry("CLEAN", Destructive),
        entry("COMPOST", Destructive),
        entry("CONFIG", ReadOnly),
        entry("DESTROY", Destructive),
        entry("DEV", Mutating),
        entry("DRAW", Mutating),
        entry("EMPIRE", Mutating),
        entry("FILE", Mutating),
        entry("FIND", ReadOnly),
        entry("GHOST", Mutating),
        entry("GOTO", Mutating),
        entry("GRAB", Mutating),
        entry("GRID", ReadOnly),
        entry("HEALTH", ReadOnly),
        entry("HELP", ReadOnly),
        entry("LIBRARY", ReadOnly),
        entry("LOAD", Mutating),
        entry("LOGS", ReadOnly),
        entry("MAP", ReadOnly),
        entry("MIGRATE", Destructive),
        entry("MODE", Mutating),
        entry("MUSIC", Mutating),
        entry("NPC", Mutating),
        entry("PANEL", ReadOnly),
        entry("PLACE", Mutating),
        entry("PLAY", Mutating),
        entry("READ", ReadOnly),
        entry("REBOOT", Destructive),
        entry("REPAIR", Mutating),
        entry("RESTART", Destructive),
        entry("RULE", Mutating),
        entry("RUN", Mutating),
        entry("SAVE", Mutating),
        entry("SCHEDULE", Mutating),
        entry("SCHEDULER", Mutating),
        entry("SCRIPT", Mutating),
        entry("SETUP", Mutating),
        entry("SKIN", Mutating),
        entry("SONIC", Mutating),
        entry("SPAWN", Mutating),
        entry("TALK", Mutating),
        entry("TELL", Mutating),
        entry("THEME", Mutating),
        entry("TOKEN", ReadOnly),
        entry("UID", ReadOnly),
        entry("UNDO", Mutating),
        entry("USER", Mutating),
        entry("VERIFY", ReadOnly),
        entry("VIEWPORT", ReadOnly),
        entry("WIZARD", ReadOnly),
        // Compound forms.
        entry("FILE NEW", Mutating),
        entry("FILE EDIT", Mutating),
    ]
});

/// Reserved alias targets. Dispatchable, not part of the canonical listing.
pub static RESERVED: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    use CommandKind::{Mutating, ReadOnly};
    vec![entry("UCODE", ReadOnly), entry("SEND", Mutating)]
});

/// Alias bridges from legacy tokens to canonical names. Resolution always
/// returns confidence 1.0. Additive only. Consulted before exact names, so
/// the legacy rows `RESTART`, `SCHEDULE`, `TALK` dispatch through their
/// bridges.
pub static ALIASES: &[(&str, &str)] = &[
    ("RESTART", "REBOOT"),
    ("SCHEDULE", "SCHEDULER"),
    ("TALK", "SEND"),
    ("UCLI", "UCODE"),
    ("NEW", "FILE NEW"),
    ("EDIT", "FILE EDIT"),
];

/// The canonical command names, in catalog order.
#[must_use]
pub fn canonical_commands() -> Vec<&'static str> {
    CATALOG.iter().map(|e| e.name).collect()
}

/// Every name Stage-1 may dispatch to: canonical + reserved alias targets.
#[must_use]
pub fn dispatchable_commands() -> Vec<&'static str> {
    CATALOG
        .iter()
        .chain(RESERVED.iter())
        .map(|e| e.name)
        .collect()
}

/// Resolve a legacy alias to `(canonical, confidence)`.
#[must_use]
pub fn resolve_alias(token: &str) -> Option<(&'static str, f64)> {
    let upper = token.to_uppercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, canonical)| (*canonical, 1.0))
}

/// Look up the kind tag of a dispatchable command.
#[must_use]
pub fn kind_of(command: &str) -> Option<CommandKind> {
    lookup(command).map(|e| e.kind)
}

/// Look up a catalog entry (canonical or reserved) by name.
#[must_use]
pub fn lookup(command: &str) -> Option<&'static CatalogEntry> {
    let upper = command.to_uppercase();
    CATALOG
        .iter()
        .chain(RESERVED.iter())
        .find(|e| e.name == upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn catalog_contains_every_published_name() {
        let names: BTreeSet<_> = canonical_commands().into_iter().collect();
        for expected in [
            "ANCHOR", "BAG", "BINDER", "CLEAN", "COMPOST", "CONFIG", "DESTROY", "DEV", "DRAW",
            "EMPIRE", "FILE", "FIND", "GHOST", "GOTO", "GRAB", "GRID", "HEALTH", "HELP",
            "LIBRARY", "LOAD", "LOGS", "MAP", "MIGRATE", "MODE", "MUSIC", "NPC", "PANEL",
            "PLACE", "PLAY", "READ", "REBOOT", "REPAIR", "RESTART", "RULE", "RUN", "SAVE",
            "SCHEDULE", "SCHEDULER", "SCRIPT", "SETUP", "SKIN", "SONIC", "SPAWN", "TALK",
            "TELL", "THEME", "TOKEN", "UID", "UNDO", "USER", "VERIFY", "VIEWPORT", "WIZARD",
            "FILE NEW", "FILE EDIT",
        ] {
            assert!(names.contains(expected), "missing {expected}");
        }
        assert_eq!(names.len(), CATALOG.len(), "catalog names must be unique");
    }

    #[test]
    fn every_alias_targets_a_dispatchable_command() {
        let dispatchable: BTreeSet<_> = dispatchable_commands().into_iter().collect();
        for (alias, canonical) in ALIASES {
            assert!(
                dispatchable.contains(canonical),
                "alias {alias} targets unknown command {canonical}"
            );
        }
    }

    #[test]
    fn alias_resolution_returns_full_confidence() {
        for (alias, canonical) in ALIASES {
            let (resolved, confidence) = resolve_alias(alias).unwrap();
            assert_eq!(resolved, *canonical);
            assert!((confidence - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn alias_resolution_is_idempotent() {
        // Resolving an alias's canonical target never redirects again:
        // bridge targets are terminal.
        for (alias, _) in ALIASES {
            let (canonical, _) = resolve_alias(alias).unwrap();
            assert!(
                resolve_alias(canonical).is_none(),
                "bridge target {canonical} must not itself be an alias"
            );
        }
    }

    #[test]
    fn alias_resolution_is_case_insensitive() {
        assert_eq!(resolve_alias("restart").map(|(c, _)| c), Some("REBOOT"));
        assert_eq!(resolve_alias("ucli").map(|(c, _)| c), Some("UCODE"));
    }

    #[test]
    fn destructive_commands_require_exact_match() {
        for entry in CATALOG.iter() {
            if entry.kind == CommandKind::Destructive {
                assert!(
                    entry.min_confidence >= 1.0,
                    "{} must not be reachable via fuzzy match",
                    entry.name
                );
            }
        }
    }

    #[test]
    fn kind_lookup_covers_reserved_names() {
        assert_eq!(kind_of("UCODE"), Some(CommandKind::ReadOnly));
        assert_eq!(kind_of("SEND"), Some(CommandKind::Mutating));
        assert_eq!(kind_of("FILE NEW"), Some(CommandKind::Mutating));
        assert_eq!(kind_of("nonexistent"), None);
    }
}
