//! Stage-1 matcher: classify input as a canonical command.
//!
//! Resolution order: alias bridge, exact canonical name, compound form,
//! bounded fuzzy match. Aliases are consulted first so legacy rows
//! (`RESTART`, `SCHEDULE`, `TALK`) dispatch through their bridges. Fuzzy
//! matching only applies to purely alphabetic heads of length >= 4, which
//! keeps short shell tokens (`ls`, `nc`) out of the catalog's gravity.

use udos_catalog::{CATALOG, lookup, resolve_alias};

use crate::tokenize::tokenize;

/// Normalized edit-distance floor for fuzzy acceptance.
const FUZZY_FLOOR: f64 = 0.8;

/// Minimum head length before fuzzy matching is attempted.
const FUZZY_MIN_LEN: usize = 4;

/// Outcome of a Stage-1 match.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Canonical command, present above the acceptance threshold.
    pub command: Option<String>,
    /// Remaining tokens.
    pub args: Vec<String>,
    /// Confidence in `[0, 1]`; exact and alias matches are 1.0.
    pub confidence: f64,
    /// Why the matcher decided what it decided.
    pub reason: String,
}

impl MatchOutcome {
    fn no_match() -> Self {
        Self {
            command: None,
            args: vec![],
            confidence: 0.0,
            reason: "no_match".to_string(),
        }
    }
}

/// Classify `input` against the catalog.
#[must_use]
pub fn match_input(input: &str) -> MatchOutcome {
    let tokens = tokenize(input);
    let Some(head) = tokens.first() else {
        return MatchOutcome::no_match();
    };
    let head_upper = head.to_uppercase();
    let rest: Vec<String> = tokens[1..].to_vec();

    // Alias bridges first: legacy names rewrite to their canonical targets.
    if let Some((canonical, confidence)) = resolve_alias(&head_upper) {
        return MatchOutcome {
            command: Some(canonical.to_string()),
            args: rest,
            confidence,
            reason: "alias".to_string(),
        };
    }

    // Compound forms: FILE NEW / FILE EDIT consume two tokens.
    if let Some(second) = rest.first() {
        let compound = format!("{} {}", head_upper, second.to_uppercase());
        if lookup(&compound).is_some() {
            return MatchOutcome {
                command: Some(compound),
                args: rest[1..].to_vec(),
                confidence: 1.0,
                reason: "exact".to_string(),
            };
        }
    }

    // Exact canonical name.
    if lookup(&head_upper).is_some() {
        return MatchOutcome {
            command: Some(head_upper),
            args: rest,
            confidence: 1.0,
            reason: "exact".to_string(),
        };
    }

    // Bounded fuzzy match against canonical names only.
    if head_upper.len() >= FUZZY_MIN_LEN && head_upper.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut best: Option<(&'static str, f64)> = None;
        for entry in CATALOG.iter() {
            let score = similarity(&head_upper, entry.name);
            if score >= FUZZY_FLOOR && score >= entry.min_confidence {
                // Ties break on catalog order: strictly-greater keeps the
                // earlier entry.
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((entry.name, score));
                }
            }
        }
        if let Some((name, score)) = best {
            return MatchOutcome {
                command: Some(name.to_string()),
                args: rest,
                confidence: score,
                reason: "fuzzy".to_string(),
            };
        }
    }

    MatchOutcome::no_match()
}

/// Normalized edit-distance similarity in `[0, 1]`.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let dist = levenshtein(a, b);
    1.0 - (dist as f64 / max_len as f64)
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
