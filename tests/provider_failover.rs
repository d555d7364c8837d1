//! Provider-chain failover exercised end to end against mock backends.

use serial_test::serial;
use udos_core::types::{Caller, Request};
use udos_engine::testing::engine_in_dir;
use udos_vibe::{ApiStyle, AssistantClient, ProviderDescriptor};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(id: &str, endpoint: String, env_var: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        api_style: ApiStyle::OpenAiChat,
        endpoint,
        auth_env_var: env_var.to_string(),
        default_model: "test-model".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn rate_limited_primary_fails_over_to_secondary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mistral"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openrouter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "routed reply"}}]
        })))
        .mount(&server)
        .await;

    unsafe { std::env::set_var("FAILOVER_TEST_KEY", "key") };

    let chain = vec![
        provider("mistral", format!("{}/mistral", server.uri()), "FAILOVER_TEST_KEY"),
        provider(
            "openrouter",
            format!("{}/openrouter", server.uri()),
            "FAILOVER_TEST_KEY",
        ),
    ];
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in_dir(dir.path(), Some(AssistantClient::new(chain).unwrap()));

    let response = engine
        .dispatch(&Request::new("explain this error to me", Caller::Http))
        .await;
    unsafe { std::env::remove_var("FAILOVER_TEST_KEY") };

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["dispatch_to"], "vibe");
    assert_eq!(json["payload"]["provider_used"], "openrouter");
    assert_eq!(json["payload"]["text"], "routed reply");

    let attempts = json["debug"]["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["provider"], "mistral");
    assert_eq!(attempts[0]["failover_reason"], "rate_limit");
    assert_eq!(attempts[1]["provider"], "openrouter");
    assert_eq!(attempts[1]["ok"], true);
}

#[tokio::test]
#[serial]
async fn exhausted_chain_surfaces_most_severe_reason_and_failover_counter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    unsafe { std::env::set_var("FAILOVER_TEST_KEY2", "key") };

    let chain = vec![
        provider("mistral", format!("{}/down", server.uri()), "FAILOVER_TEST_KEY2"),
        provider("openai", format!("{}/limited", server.uri()), "FAILOVER_TEST_KEY2"),
    ];
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in_dir(dir.path(), Some(AssistantClient::new(chain).unwrap()));

    let response = engine
        .dispatch(&Request::new("explain this error to me", Caller::Http))
        .await;
    unsafe { std::env::remove_var("FAILOVER_TEST_KEY2") };

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "error");
    // rate_limit outranks unreachable in the severity order.
    assert_eq!(json["error"]["code"], "provider_rate_limit");

    // The dispatch was recorded with its failover classification.
    let summary = engine.session_summary().unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.failovers.get("rate_limit"), Some(&1));
}
