//! Provider descriptors and chain resolution.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable naming an explicit, comma-separated provider chain.
pub const CHAIN_ENV: &str = "VIBE_CLOUD_PROVIDER_CHAIN";

/// Environment variable naming the primary provider.
pub const PRIMARY_ENV: &str = "VIBE_PRIMARY_CLOUD_PROVIDER";

/// Environment variable naming the secondary provider.
pub const SECONDARY_ENV: &str = "VIBE_SECONDARY_CLOUD_PROVIDER";

/// Built-in default chain order.
pub const DEFAULT_CHAIN: [&str; 5] = ["mistral", "openrouter", "openai", "anthropic", "gemini"];

/// Request/response dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    OpenAiChat,
    AnthropicMessages,
    GeminiGenerate,
}

/// Immutable description of one remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub api_style: ApiStyle,
    /// Endpoint URL. For `GeminiGenerate` this is a template containing
    /// `{model}`.
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub auth_env_var: String,
    pub default_model: String,
}

impl ProviderDescriptor {
    fn new(
        id: &str,
        api_style: ApiStyle,
        endpoint: &str,
        auth_env_var: &str,
        default_model: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            api_style,
            endpoint: endpoint.to_string(),
            auth_env_var: auth_env_var.to_string(),
            default_model: default_model.to_string(),
        }
    }
}

/// The five defined providers, in default-chain order.
#[must_use]
pub fn builtin_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::new(
            "mistral",
            ApiStyle::OpenAiChat,
            "https://api.mistral.ai/v1/chat/completions",
            "MISTRAL_API_KEY",
            "mistral-small-latest",
        ),
        ProviderDescriptor::new(
            "openrouter",
            ApiStyle::OpenAiChat,
            "https://openrouter.ai/api/v1/chat/completions",
            "OPENROUTER_API_KEY",
            "google/gemini-2.0-flash-lite",
        ),
        ProviderDescriptor::new(
            "openai",
            ApiStyle::OpenAiChat,
            "https://api.openai.com/v1/chat/completions",
            "OPENAI_API_KEY",
            "gpt-4o-mini",
        ),
        ProviderDescriptor::new(
            "anthropic",
            ApiStyle::AnthropicMessages,
            "https://api.anthropic.com/v1/messages",
            "ANTHROPIC_API_KEY",
            "claude-3-5-haiku-latest",
        ),
        ProviderDescriptor::new(
            "gemini",
            ApiStyle::GeminiGenerate,
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent",
            "GEMINI_API_KEY",
            "gemini-2.0-flash",
        ),
    ]
}

/// Resolve the chain order from the environment:
/// explicit chain env, then primary+secondary envs, then the built-in
/// default. Unknown ids are dropped with a warning; an empty result falls
/// back to the default chain.
#[must_use]
pub fn resolve_chain(lookup: impl Fn(&str) -> Option<String>) -> Vec<ProviderDescriptor> {
    let providers = builtin_providers();
    let find = |id: &str| providers.iter().find(|p| p.id == id).cloned();

    let requested: Vec<String> = if let Some(chain) = lookup(CHAIN_ENV).filter(|s| !s.is_empty()) {
        chain
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        let mut ids = Vec::new();
        if let Some(primary) = lookup(PRIMARY_ENV).filter(|s| !s.is_empty()) {
            ids.push(primary.trim().to_lowercase());
        }
        if let Some(secondary) = lookup(SECONDARY_ENV).filter(|s| !s.is_empty()) {
            ids.push(secondary.trim().to_lowercase());
        }
        ids
    };

    let mut resolved = Vec::new();
    for id in &requested {
        match find(id) {
            Some(descriptor) => {
                if !resolved.iter().any(|p: &ProviderDescriptor| p.id == *id) {
                    resolved.push(descriptor);
                }
            }
            None => warn!(provider = %id, "Unknown provider id in chain, skipping"),
        }
    }

    if resolved.is_empty() {
        DEFAULT_CHAIN.iter().filter_map(|id| find(id)).collect()
    } else {
        resolved
    }
}
