//! Stage-3 of the dispatch pipeline: the generative assistant.
//!
//! A fixed, ordered chain of remote providers is attempted until one
//! answers. Each attempt is classified by a typed failover reason; the chain
//! advances on failure and stops on success or cancellation. Provider
//! endpoints are intentionally remote: the loopback boundary governs
//! core-to-local-service traffic, and the resolved chain's endpoints are the
//! registered exemption.

mod client;
mod failover;
mod provider;
mod shaping;

pub use client::{AssistantClient, AttemptOutcome, VibeAnswer, VibeError};
pub use failover::FailoverReason;
pub use provider::{ApiStyle, ProviderDescriptor, builtin_providers, resolve_chain};
pub use shaping::{build_request_body, endpoint_url, extract_text, headers_for};
