//! udos - the command-dispatch and provider-routing engine of a local,
//! offline-first developer console.
//!
//! Input typed at a prompt is classified through a fixed three-stage
//! pipeline (command match, shell passthrough, generative assistant) and
//! answered with a structured envelope. The same engine backs the
//! interactive prompt, the loopback wizard HTTP server, and the
//! non-interactive shell entry, so none of the three can drift.
//!
//! This crate is the stable facade: construct an [`Engine`] once, then use
//! [`Engine::dispatch`], [`Engine::contract_status`],
//! [`Engine::repair_contract`], and [`Engine::self_heal`]. No caller
//! reaches past this surface.

pub use udos_core::error::{ErrorBody, ErrorKind, UdosError};
pub use udos_core::exit_codes::ExitCode;
pub use udos_core::types::{
    Caller, ContractMeta, DispatchTarget, Request, RequestFlags, Response, ResponsePayload,
    ResponseStatus,
};
pub use udos_engine::Engine;

pub use udos_catalog as catalog;
pub use udos_config as config;
pub use udos_contract as contract;
pub use udos_dispatch as dispatch;
pub use udos_doctor as doctor;
pub use udos_loopback as loopback;
pub use udos_session as session;
pub use udos_vibe as vibe;

/// Crate version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
