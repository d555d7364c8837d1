//! Request shaping and response extraction per API style.

use serde::Serialize;
use serde_json::Value;

use crate::provider::{ApiStyle, ProviderDescriptor};

/// Anthropic Messages API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token budget requested from every provider.
const MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

/// Build the JSON request body for one provider attempt.
#[must_use]
pub fn build_request_body(style: ApiStyle, model: &str, prompt: &str, context: &str) -> Value {
    match style {
        ApiStyle::OpenAiChat => {
            let mut messages = Vec::new();
            if !context.is_empty() {
                messages.push(ChatMessage {
                    role: "system",
                    content: context.to_string(),
                });
            }
            messages.push(ChatMessage {
                role: "user",
                content: prompt.to_string(),
            });
            serde_json::to_value(OpenAiChatRequest {
                model: model.to_string(),
                messages,
                max_tokens: MAX_TOKENS,
            })
            .expect("request body serializes")
        }
        ApiStyle::AnthropicMessages => serde_json::to_value(AnthropicRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: MAX_TOKENS,
            system: (!context.is_empty()).then(|| context.to_string()),
        })
        .expect("request body serializes"),
        ApiStyle::GeminiGenerate => {
            let text = if context.is_empty() {
                prompt.to_string()
            } else {
                format!("{context}\n\n{prompt}")
            };
            serde_json::to_value(GeminiRequest {
                contents: vec![GeminiContent {
                    parts: vec![GeminiPart { text }],
                }],
            })
            .expect("request body serializes")
        }
    }
}

/// Extract the reply text from a provider response body, if it has the
/// expected shape.
#[must_use]
pub fn extract_text(style: ApiStyle, body: &Value) -> Option<String> {
    let text = match style {
        ApiStyle::OpenAiChat => body
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()?,
        ApiStyle::AnthropicMessages => body.get("content")?.get(0)?.get("text")?.as_str()?,
        ApiStyle::GeminiGenerate => body
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()?,
    };
    Some(text.to_string())
}

/// Auth and protocol headers for one provider attempt.
#[must_use]
pub fn headers_for(style: ApiStyle, api_key: &str) -> Vec<(&'static str, String)> {
    match style {
        ApiStyle::OpenAiChat => vec![("authorization", format!("Bearer {api_key}"))],
        ApiStyle::AnthropicMessages => vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
        ApiStyle::GeminiGenerate => vec![("x-goog-api-key", api_key.to_string())],
    }
}

/// Concrete endpoint URL for a provider, substituting the model into
/// template endpoints.
#[must_use]
pub fn endpoint_url(descriptor: &ProviderDescriptor, model: &str) -> String {
    descriptor.endpoint.replace("{model}", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_chat_body_shape() {
        let body = build_request_body(ApiStyle::OpenAiChat, "gpt-4o-mini", "hello", "be brief");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn openai_chat_omits_empty_system() {
        let body = build_request_body(ApiStyle::OpenAiChat, "m", "hello", "");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn anthropic_body_shape() {
        let body =
            build_request_body(ApiStyle::AnthropicMessages, "claude-test", "hello", "be brief");
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn gemini_body_shape() {
        let body = build_request_body(ApiStyle::GeminiGenerate, "gemini-2.0-flash", "hello", "");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn extracts_openai_chat_reply() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
        });
        assert_eq!(
            extract_text(ApiStyle::OpenAiChat, &body).as_deref(),
            Some("hi there")
        );
    }

    #[test]
    fn extracts_anthropic_reply() {
        let body = json!({
            "content": [{"type": "text", "text": "hi there"}]
        });
        assert_eq!(
            extract_text(ApiStyle::AnthropicMessages, &body).as_deref(),
            Some("hi there")
        );
    }

    #[test]
    fn extracts_gemini_reply() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "hi there"}]}}]
        });
        assert_eq!(
            extract_text(ApiStyle::GeminiGenerate, &body).as_deref(),
            Some("hi there")
        );
    }

    #[test]
    fn shape_mismatch_yields_none() {
        let body = json!({"unexpected": true});
        for style in [
            ApiStyle::OpenAiChat,
            ApiStyle::AnthropicMessages,
            ApiStyle::GeminiGenerate,
        ] {
            assert!(extract_text(style, &body).is_none());
        }
    }

    #[test]
    fn gemini_endpoint_substitutes_model() {
        let providers = crate::provider::builtin_providers();
        let gemini = providers.iter().find(|p| p.id == "gemini").unwrap();
        let url = endpoint_url(gemini, "gemini-2.0-flash");
        assert!(url.ends_with("models/gemini-2.0-flash:generateContent"));
        assert!(!url.contains("{model}"));
    }

    #[test]
    fn auth_headers_per_style() {
        let openai = headers_for(ApiStyle::OpenAiChat, "key123");
        assert_eq!(openai[0].0, "authorization");
        assert_eq!(openai[0].1, "Bearer key123");

        let anthropic = headers_for(ApiStyle::AnthropicMessages, "key123");
        assert!(anthropic.iter().any(|(n, v)| *n == "x-api-key" && v == "key123"));
        assert!(anthropic.iter().any(|(n, _)| *n == "anthropic-version"));

        let gemini = headers_for(ApiStyle::GeminiGenerate, "key123");
        assert_eq!(gemini[0].0, "x-goog-api-key");
    }
}
