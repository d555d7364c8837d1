//! The local wizard HTTP surface.
//!
//! Three loopback-only endpoints over the engine's public surface:
//!
//! - `GET  /api/admin-token/contract/status`
//! - `POST /api/admin-token/contract/repair`
//! - `POST /api/dispatch`
//!
//! Every endpoint returns the JSON envelope. HTTP status follows the
//! response: 200 for success/pending/skipped, 400 for input errors, 409 for
//! confirmation-required, 502 for provider failures, 503 for an
//! unrepairable contract.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use udos_core::error::UdosError;
use udos_core::types::{Caller, ContractMeta, Request, RequestFlags, Response};
use udos_engine::Engine;
use udos_loopback::is_loopback_host;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Body of `POST /api/dispatch`.
#[derive(Debug, Deserialize)]
pub struct DispatchBody {
    pub input: String,
    #[serde(default)]
    pub flags: RequestFlags,
}

/// Build the router over an engine.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/admin-token/contract/status", get(contract_status))
        .route("/api/admin-token/contract/repair", post(contract_repair))
        .route("/api/dispatch", post(dispatch))
        .with_state(AppState { engine })
}

/// Bind and serve. The bind host must be loopback; wildcard binds are
/// rewritten, anything else is refused.
pub async fn serve(engine: Arc<Engine>) -> Result<(), UdosError> {
    let bind = engine.config().bind.clone();
    let bind = normalize_bind(&bind)?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| UdosError::internal(format!("failed to bind {bind}: {e}")))?;

    info!(addr = %bind, "Wizard server listening");
    axum::serve(listener, router(engine))
        .await
        .map_err(|e| UdosError::internal(format!("server error: {e}")))
}

/// Rewrite wildcard binds to loopback and refuse non-loopback hosts.
fn normalize_bind(bind: &str) -> Result<String, UdosError> {
    let (host, port) = bind
        .rsplit_once(':')
        .ok_or_else(|| UdosError::internal(format!("invalid bind address '{bind}'")))?;
    let host = match host {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    if !is_loopback_host(host) {
        return Err(UdosError::internal(format!(
            "refusing non-loopback bind host '{host}'"
        )));
    }
    Ok(format!("{host}:{port}"))
}

/// Authenticate an admin request against the env-file admin token.
///
/// While no token exists yet (fresh install), admin endpoints stay open so
/// the first repair can bootstrap the contract. Once a token is present,
/// requests must carry `Authorization: Bearer <token>`.
fn check_admin_auth(state: &AppState, headers: &HeaderMap) -> Result<(), AxumResponse> {
    let expected = match state.engine.admin_token() {
        Ok(Some(token)) => token,
        Ok(None) => return Ok(()),
        Err(e) => return Err(internal_error(&e)),
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected.as_str()) {
        return Ok(());
    }

    let body = json!({
        "status": "error",
        "dispatch_to": "none",
        "contract": ContractMeta::default(),
        "payload": {},
        "error": {
            "code": "input_invalid",
            "message": "missing or invalid admin token",
        },
    });
    Err((StatusCode::UNAUTHORIZED, Json(body)).into_response())
}

async fn contract_status(State(state): State<AppState>, headers: HeaderMap) -> AxumResponse {
    if let Err(denied) = check_admin_auth(&state, &headers) {
        return denied;
    }
    match state.engine.contract_status() {
        Ok(status) => envelope_response(StatusCode::OK, "success", json!(status)),
        Err(e) => internal_error(&e),
    }
}

async fn contract_repair(State(state): State<AppState>, headers: HeaderMap) -> AxumResponse {
    if let Err(denied) = check_admin_auth(&state, &headers) {
        return denied;
    }
    match state.engine.repair_contract() {
        Ok(outcome) if outcome.ok => {
            envelope_response(StatusCode::OK, "success", json!(outcome))
        }
        Ok(outcome) => {
            // Residual drift after repair: the contract is unrepairable.
            let body = json!({
                "status": "error",
                "dispatch_to": "none",
                "contract": ContractMeta::default(),
                "payload": outcome,
                "error": {
                    "code": "contract_unrepairable",
                    "message": "repair left residual drift",
                },
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        Err(e) => internal_error(&e),
    }
}

async fn dispatch(State(state): State<AppState>, Json(body): Json<DispatchBody>) -> AxumResponse {
    let request = Request::new(body.input, Caller::Http).with_flags(body.flags);
    let response = state.engine.dispatch(&request).await;
    let status = status_for(&response);
    (status, Json(response)).into_response()
}

/// HTTP status for a dispatch envelope.
fn status_for(response: &Response) -> StatusCode {
    use udos_core::types::ResponseStatus;

    match response.status {
        ResponseStatus::Success | ResponseStatus::Pending | ResponseStatus::Skipped => {
            StatusCode::OK
        }
        ResponseStatus::Error => match response.error.as_ref().map(|e| e.code.as_str()) {
            Some("input_invalid" | "no_match" | "shell_blocked") => StatusCode::BAD_REQUEST,
            Some("confirmation_required") => StatusCode::CONFLICT,
            Some(code) if code.starts_with("provider_") || code == "cancelled" => {
                StatusCode::BAD_GATEWAY
            }
            Some("contract_unrepairable") => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn envelope_response(
    status: StatusCode,
    outcome: &str,
    payload: serde_json::Value,
) -> AxumResponse {
    let body = json!({
        "status": outcome,
        "dispatch_to": "none",
        "contract": ContractMeta::default(),
        "payload": payload,
    });
    (status, Json(body)).into_response()
}

fn internal_error(error: &UdosError) -> AxumResponse {
    error!(error = %error, "Wizard endpoint failed");
    let body = json!({
        "status": "error",
        "dispatch_to": "none",
        "contract": ContractMeta::default(),
        "payload": {},
        "error": error.to_body(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
