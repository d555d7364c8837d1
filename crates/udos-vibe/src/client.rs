//! The assistant client: walks the provider chain until one answers.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use udos_core::cancel::CancelToken;
use udos_core::error::{ErrorKind, UdosError};
use udos_core::redact::redact_error_message;

use crate::failover::FailoverReason;
use crate::provider::ProviderDescriptor;
use crate::shaping::{build_request_body, endpoint_url, extract_text, headers_for};

/// Per-attempt timeout budget.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal failure of the whole chain.
#[derive(Error, Debug, Clone)]
#[error("{reason}: {message}")]
pub struct VibeError {
    pub reason: FailoverReason,
    pub message: String,
}

impl VibeError {
    /// Map to the engine's closed error taxonomy.
    #[must_use]
    pub fn to_udos_error(&self) -> UdosError {
        let kind = match self.reason {
            FailoverReason::MissingAuth => ErrorKind::ProviderMissingAuth,
            FailoverReason::AuthError => ErrorKind::ProviderAuthError,
            FailoverReason::RateLimit => ErrorKind::ProviderRateLimit,
            FailoverReason::Unreachable => ErrorKind::ProviderUnreachable,
            FailoverReason::InvalidResponse => ErrorKind::ProviderInvalidResponse,
            FailoverReason::Cancelled => ErrorKind::Cancelled,
        };
        UdosError::new(kind, self.message.clone())
    }
}

/// Record of one provider attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub provider: String,
    pub ok: bool,
    pub failover_reason: Option<FailoverReason>,
}

/// A successful assistant reply.
#[derive(Debug, Clone)]
pub struct VibeAnswer {
    pub text: String,
    pub provider_used: String,
    pub attempts: Vec<AttemptOutcome>,
}

/// Assistant client holding the resolved chain and a shared HTTP client.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    chain: Vec<ProviderDescriptor>,
    client: reqwest::Client,
    attempt_timeout: Duration,
}

impl AssistantClient {
    /// Build a client over the given (already resolved) provider chain.
    pub fn new(chain: Vec<ProviderDescriptor>) -> Result<Self, UdosError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| UdosError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            chain,
            client,
            attempt_timeout: ATTEMPT_TIMEOUT,
        })
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Hosts of the chain's endpoints, for registration with the loopback
    /// boundary.
    #[must_use]
    pub fn endpoint_hosts(&self) -> Vec<String> {
        self.chain
            .iter()
            .filter_map(|p| reqwest::Url::parse(&p.endpoint).ok())
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect()
    }

    /// Ask the assistant. Providers are attempted in chain order; the first
    /// success wins. On exhaustion the most severe observed failover reason
    /// becomes the error. Repeating the call with the same chain and inputs
    /// attempts the same provider sequence.
    pub async fn ask(
        &self,
        prompt: &str,
        context: &str,
        cancel: &CancelToken,
    ) -> Result<VibeAnswer, (VibeError, Vec<AttemptOutcome>)> {
        let mut attempts: Vec<AttemptOutcome> = Vec::new();
        let mut worst: Option<(FailoverReason, String)> = None;

        for provider in &self.chain {
            if cancel.is_cancelled() {
                let error = VibeError {
                    reason: FailoverReason::Cancelled,
                    message: "dispatch cancelled before provider attempt".to_string(),
                };
                attempts.push(AttemptOutcome {
                    provider: provider.id.clone(),
                    ok: false,
                    failover_reason: Some(FailoverReason::Cancelled),
                });
                return Err((error, attempts));
            }

            match self.attempt(provider, prompt, context, cancel).await {
                Ok(text) => {
                    attempts.push(AttemptOutcome {
                        provider: provider.id.clone(),
                        ok: true,
                        failover_reason: None,
                    });
                    return Ok(VibeAnswer {
                        text,
                        provider_used: provider.id.clone(),
                        attempts,
                    });
                }
                Err((reason, message)) => {
                    debug!(
                        provider = %provider.id,
                        reason = %reason,
                        "Provider attempt failed, advancing chain"
                    );
                    attempts.push(AttemptOutcome {
                        provider: provider.id.clone(),
                        ok: false,
                        failover_reason: Some(reason),
                    });

                    if reason == FailoverReason::Cancelled {
                        return Err((VibeError { reason, message }, attempts));
                    }

                    let more_severe = worst
                        .as_ref()
                        .is_none_or(|(w, _)| reason.severity() > w.severity());
                    if more_severe {
                        worst = Some((reason, message));
                    }
                }
            }
        }

        let (reason, message) = worst.unwrap_or((
            FailoverReason::MissingAuth,
            "provider chain is empty".to_string(),
        ));
        warn!(reason = %reason, "Provider chain exhausted");
        Err((VibeError { reason, message }, attempts))
    }

    /// One provider attempt. No retry: rate limits and outages advance the
    /// chain instead of hammering the same backend.
    async fn attempt(
        &self,
        provider: &ProviderDescriptor,
        prompt: &str,
        context: &str,
        cancel: &CancelToken,
    ) -> Result<String, (FailoverReason, String)> {
        let api_key = match std::env::var(&provider.auth_env_var) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                return Err((
                    FailoverReason::MissingAuth,
                    format!(
                        "no API key in {} for provider '{}'",
                        provider.auth_env_var, provider.id
                    ),
                ));
            }
        };

        let model = model_for(provider);
        let url = endpoint_url(provider, &model);
        let body = build_request_body(provider.api_style, &model, prompt, context);

        let mut request = self
            .client
            .post(&url)
            .timeout(self.attempt_timeout)
            .json(&body);
        for (name, value) in headers_for(provider.api_style, &api_key) {
            request = request.header(name, value);
        }

        debug!(
            provider = %provider.id,
            model = %model,
            timeout_secs = self.attempt_timeout.as_secs(),
            "Attempting provider"
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err((
                    FailoverReason::Cancelled,
                    format!("cancelled during attempt on '{}'", provider.id),
                ));
            }
            result = request.send() => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return Err((
                    FailoverReason::Unreachable,
                    format!(
                        "'{}' request failed: {}",
                        provider.id,
                        redact_error_message(&e.to_string())
                    ),
                ));
            }
        };

        let status = response.status().as_u16();
        if status >= 400 {
            return Err((
                FailoverReason::from_status(status),
                format!("'{}' returned status {status}", provider.id),
            ));
        }

        let json: serde_json::Value = match response.json().await {
            Ok(json) => json,
            Err(e) => {
                return Err((
                    FailoverReason::InvalidResponse,
                    format!(
                        "'{}' body failed to parse: {}",
                        provider.id,
                        redact_error_message(&e.to_string())
                    ),
                ));
            }
        };

        match extract_text(provider.api_style, &json) {
            Some(text) => Ok(text),
            None => Err((
                FailoverReason::InvalidResponse,
                format!("'{}' response missing reply text", provider.id),
            )),
        }
    }
}

/// Per-provider model override: `VIBE_MODEL_<ID>` (uppercased) beats the
/// descriptor's default.
fn model_for(provider: &ProviderDescriptor) -> String {
    let override_var = format!("VIBE_MODEL_{}", provider.id.to_uppercase());
    match std::env::var(&override_var) {
        Ok(model) if !model.is_empty() => model,
        _ => provider.default_model.clone(),
    }
}
