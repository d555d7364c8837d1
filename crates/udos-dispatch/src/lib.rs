//! Stage-1 and Stage-2 of the dispatch pipeline.
//!
//! Both stages are CPU-bound and non-blocking. Stage 1 classifies input as a
//! canonical command; Stage 2 decides whether raw input is a safe shell
//! passthrough. The orchestrator runs them in fixed order and falls through
//! to the generative assistant when both decline.

pub mod matcher;
pub mod shell;
pub mod tokenize;

pub use matcher::{MatchOutcome, match_input};
pub use shell::{ShellValidation, ShellValidatorConfig, validate_shell};
pub use tokenize::tokenize;
