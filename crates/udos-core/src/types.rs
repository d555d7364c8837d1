//! Request/response envelope types shared by every dispatch surface.
//!
//! The envelope is schema-stable: `contract.version` is `"m1.1"` and
//! `contract.route_order` is always `["ucode", "shell", "vibe"]`. Every
//! response names exactly one route in `dispatch_to`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cancel::CancelToken;
use crate::error::ErrorBody;

/// Wire-contract version stamped on every response.
pub const CONTRACT_VERSION: &str = "m1.1";

/// Fixed stage order of the dispatch pipeline.
pub const ROUTE_ORDER: [&str; 3] = ["ucode", "shell", "vibe"];

/// Which surface submitted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Caller {
    /// The interactive terminal prompt.
    Interactive,
    /// The local wizard HTTP server.
    Http,
    /// The non-interactive shell entry point.
    Shell,
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caller::Interactive => write!(f, "interactive"),
            Caller::Http => write!(f, "http"),
            Caller::Shell => write!(f, "shell"),
        }
    }
}

/// Optional per-request flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Attach a `route_trace` record for every stage entered.
    #[serde(default)]
    pub dispatch_debug: bool,
    /// Second submission of a gated shell command; permits execution.
    #[serde(default)]
    pub confirm: bool,
    /// Resolve the route but do not execute shell commands or call providers.
    #[serde(default)]
    pub dry_run: bool,
    /// Caller opts in to recording raw input text in the session log.
    #[serde(default)]
    pub record_input: bool,
}

/// A single dispatch request. Created at the public-surface boundary,
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw input exactly as the user typed it.
    pub input: String,
    /// Which surface is calling.
    pub caller: Caller,
    /// Optional flags.
    pub flags: RequestFlags,
    /// Cooperative cancellation signal; aborts in-flight provider calls.
    pub cancel: CancelToken,
    /// Environment overrides applied for this request only.
    pub env_overrides: HashMap<String, String>,
}

impl Request {
    /// Build a request with default flags and a fresh cancellation token.
    #[must_use]
    pub fn new(input: impl Into<String>, caller: Caller) -> Self {
        Self {
            input: input.into(),
            caller,
            flags: RequestFlags::default(),
            cancel: CancelToken::new(),
            env_overrides: HashMap::new(),
        }
    }

    /// Replace the flags on this request.
    #[must_use]
    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach an existing cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Terminal status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    /// A confirmation-gated shell command awaiting `--confirm`.
    Pending,
    /// Dry-run: the route was resolved but nothing executed.
    Skipped,
}

/// The single route a response names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchTarget {
    /// Stage 1: a canonical command handler.
    Ucode,
    /// Stage 2: validated shell passthrough.
    Shell,
    /// Stage 3: generative assistant.
    Vibe,
    /// Stage 2 confirmation gate.
    Confirm,
    /// No route (input rejected before stage 1).
    None,
}

impl std::fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchTarget::Ucode => write!(f, "ucode"),
            DispatchTarget::Shell => write!(f, "shell"),
            DispatchTarget::Vibe => write!(f, "vibe"),
            DispatchTarget::Confirm => write!(f, "confirm"),
            DispatchTarget::None => write!(f, "none"),
        }
    }
}

/// Contract metadata present on every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMeta {
    /// Wire-contract version, `"m1.1"`.
    pub version: String,
    /// Fixed stage order, `["ucode", "shell", "vibe"]`.
    pub route_order: Vec<String>,
}

impl Default for ContractMeta {
    fn default() -> Self {
        Self {
            version: CONTRACT_VERSION.to_string(),
            route_order: ROUTE_ORDER.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Per-stage decision as recorded in the route trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageDecision {
    /// Stage 1 matched a canonical command.
    Match,
    /// The stage declined and dispatch advanced.
    Skip,
    /// The stage produced the terminal route.
    Dispatch,
    /// The stage failed terminally.
    Fail,
}

/// One route-trace record per stage entered. Stage numbers are strictly
/// non-decreasing within a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTraceRecord {
    /// 1 = command match, 2 = shell validation, 3 = assistant.
    pub stage: u8,
    pub decision: StageDecision,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub elapsed_ms: u64,
}

/// Shell-route payload recorded on stage-2 dispatches and pending confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellPayload {
    /// Head token of the validated command.
    pub command: String,
    /// Remaining tokens.
    pub args: Vec<String>,
    /// The raw input as submitted.
    pub raw: String,
    /// Why the validator accepted this input.
    pub validation_reason: String,
    pub allowlist_enabled: bool,
    pub blocklist_enabled: bool,
    /// True for validated commands that are not read-only.
    pub requires_confirmation: bool,
}

/// A single provider attempt, surfaced under `debug.attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInfo {
    pub provider: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_reason: Option<String>,
}

/// Route-dependent payload. Serialized untagged so each route keeps its
/// documented JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Stage-1 command dispatch.
    Ucode {
        command: String,
        args: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    /// Stage-2 shell dispatch or pending confirmation.
    Shell {
        shell: ShellPayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// Stage-3 assistant reply.
    Vibe { text: String, provider_used: String },
    /// No payload (errors, rejected input).
    Empty {},
}

/// Debug block attached under `--dispatch-debug`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_trace: Vec<RouteTraceRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptInfo>,
}

impl DebugInfo {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_trace.is_empty() && self.attempts.is_empty()
    }
}

/// The response envelope returned for every dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub dispatch_to: DispatchTarget,
    pub contract: ContractMeta,
    pub payload: ResponsePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

impl Response {
    /// A success envelope for the given route and payload.
    #[must_use]
    pub fn success(dispatch_to: DispatchTarget, payload: ResponsePayload) -> Self {
        Self {
            status: ResponseStatus::Success,
            dispatch_to,
            contract: ContractMeta::default(),
            payload,
            error: None,
            debug: None,
        }
    }

    /// A pending envelope for the confirmation gate.
    #[must_use]
    pub fn pending(payload: ResponsePayload) -> Self {
        Self {
            status: ResponseStatus::Pending,
            dispatch_to: DispatchTarget::Confirm,
            contract: ContractMeta::default(),
            payload,
            error: None,
            debug: None,
        }
    }

    /// A skipped envelope for dry runs.
    #[must_use]
    pub fn skipped(dispatch_to: DispatchTarget, payload: ResponsePayload) -> Self {
        Self {
            status: ResponseStatus::Skipped,
            dispatch_to,
            contract: ContractMeta::default(),
            payload,
            error: None,
            debug: None,
        }
    }

    /// An error envelope carrying the machine code and message of `error`.
    #[must_use]
    pub fn error(dispatch_to: DispatchTarget, error: ErrorBody) -> Self {
        Self {
            status: ResponseStatus::Error,
            dispatch_to,
            contract: ContractMeta::default(),
            payload: ResponsePayload::Empty {},
            error: Some(error),
            debug: None,
        }
    }

    /// Attach a debug block, dropping it when empty.
    #[must_use]
    pub fn with_debug(mut self, debug: DebugInfo) -> Self {
        if !debug.is_empty() {
            self.debug = Some(debug);
        }
        self
    }
}
