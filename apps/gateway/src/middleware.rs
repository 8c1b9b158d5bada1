use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rategate_application::RateLimitRule;
use tracing::warn;

use crate::state::AppState;

/// Header carrying the caller's credential.
const API_KEY_HEADER: &str = "api_key";

/// Fixed payload returned to rejected callers.
const REJECTION_BODY: &str = r#"{"message": "you have reached the maximum number of requests or actions allowed within a certain time frame"}"#;

/// Admission gate applied to every route.
///
/// Resolves the caller's identity key and rule (configured credential first,
/// network address otherwise) and rejects with 429 once the caller is over
/// its limit. A store failure is logged and the request forwarded; it never
/// becomes a rejection.
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let (key, rule) = resolve_identity(&state, request.headers(), peer);

    let (decision, store_error) = state.rate_limit_service.check(&key, &rule).await;
    if let Some(error) = store_error {
        warn!(%error, identity = %key, "rate limit store failure, admitting request");
    }

    if !decision.admitted {
        return rejection_response();
    }

    next.run(request).await
}

fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> (String, RateLimitRule) {
    // A configured credential takes precedence over the caller's address;
    // an unconfigured one falls back to the address rule.
    if let Some(api_key) = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        if let Some(rule) = state.token_rules.get(api_key) {
            return (format!("token:{api_key}"), rule.clone());
        }
    }

    (format!("ip:{}", client_ip(headers, peer)), state.ip_rule.clone())
}

/// Resolves the caller's address: first `x-forwarded-for` entry, then
/// `x-real-ip`, then the connection's peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_owned();
    }

    peer.ip().to_string()
}

fn rejection_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::CONTENT_TYPE, "application/json")],
        REJECTION_BODY,
    )
        .into_response()
}
