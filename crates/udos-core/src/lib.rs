//! Foundation crate for the udos engine.
//!
//! Holds the request/response envelope shared by every surface (interactive
//! prompt, wizard HTTP server, shell entry), the closed error taxonomy, exit
//! codes, cooperative cancellation, and small filesystem utilities. Nothing
//! in this crate performs network I/O.

pub mod atomic_write;
pub mod cancel;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod redact;
pub mod types;

pub use cancel::CancelToken;
pub use error::{ErrorBody, ErrorKind, UdosError};
pub use exit_codes::ExitCode;
pub use types::{
    Caller, ContractMeta, DebugInfo, DispatchTarget, Request, RequestFlags, Response,
    ResponsePayload, ResponseStatus, RouteTraceRecord, ShellPayload, StageDecision,
};
