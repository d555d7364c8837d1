//! The engine's closed error taxonomy.
//!
//! Every error carries a human-readable message and a machine code equal to
//! its kind name. Kinds that merely advance the dispatch pipeline
//! (`no_match`, `shell_blocked`) never surface as terminal errors; they exist
//! so the route trace can name them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Machine-readable error kinds. The set is closed; the serialized form is
/// the snake_case kind name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputInvalid,
    NoMatch,
    ShellBlocked,
    ConfirmationRequired,
    ProviderMissingAuth,
    ProviderAuthError,
    ProviderRateLimit,
    ProviderUnreachable,
    ProviderInvalidResponse,
    Cancelled,
    NonLoopbackTarget,
    ContractDrift,
    ContractUnrepairable,
    Internal,
}

impl ErrorKind {
    /// The machine code: identical to the serialized kind name.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::NoMatch => "no_match",
            ErrorKind::ShellBlocked => "shell_blocked",
            ErrorKind::ConfirmationRequired => "confirmation_required",
            ErrorKind::ProviderMissingAuth => "provider_missing_auth",
            ErrorKind::ProviderAuthError => "provider_auth_error",
            ErrorKind::ProviderRateLimit => "provider_rate_limit",
            ErrorKind::ProviderUnreachable => "provider_unreachable",
            ErrorKind::ProviderInvalidResponse => "provider_invalid_response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NonLoopbackTarget => "non_loopback_target",
            ErrorKind::ContractDrift => "contract_drift",
            ErrorKind::ContractUnrepairable => "contract_unrepairable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Library-level error type for the engine.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct UdosError {
    pub kind: ErrorKind,
    pub message: String,
}

impl UdosError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for `ErrorKind::Internal`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Map to the shell-entry exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::InputInvalid | ErrorKind::NoMatch | ErrorKind::ShellBlocked => {
                ExitCode::INPUT_INVALID
            }
            ErrorKind::ConfirmationRequired => ExitCode::CONFIRMATION_REQUIRED,
            ErrorKind::ProviderMissingAuth
            | ErrorKind::ProviderAuthError
            | ErrorKind::ProviderRateLimit
            | ErrorKind::ProviderUnreachable
            | ErrorKind::ProviderInvalidResponse => ExitCode::PROVIDER_FAILURE,
            ErrorKind::ContractUnrepairable => ExitCode::CONTRACT_UNREPAIRABLE,
            ErrorKind::Cancelled
            | ErrorKind::NonLoopbackTarget
            | ErrorKind::ContractDrift
            | ErrorKind::Internal => ExitCode::INTERNAL,
        }
    }

    /// The wire form carried inside the response envelope.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind.code().to_string(),
            message: self.message.clone(),
        }
    }
}

/// Serialized error carried in the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine code equal to the kind name.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
