//! Axum middleware applying the adaptive rate limiter to every request
//! (spec §4.6, §6). Demo client identification: an `X-Client-Id` header
//! (falling back to "anonymous") and an `X-Client-Tier` header (falling
//! back to the `anonymous` tier) — a real deployment would derive both
//! from an authenticated session.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::error::CoreError;
use crate::rate_limit::{Decision, RateLimitTier, RequestContext};
use crate::AppState;

fn parse_tier(raw: Option<&str>) -> RateLimitTier {
    match raw {
        Some("free") => RateLimitTier::Free,
        Some("pro") => RateLimitTier::Pro,
        Some("enterprise") => RateLimitTier::Enterprise,
        Some("internal") => RateLimitTier::Internal,
        Some("whitelisted") => RateLimitTier::Whitelisted,
        _ => RateLimitTier::Anonymous,
    }
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, CoreError> {
    let client_id = request
        .headers()
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let tier = parse_tier(request.headers().get("x-client-tier").and_then(|v| v.to_str().ok()));
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let ctx = RequestContext {
        client_id: client_id.clone(),
        tier,
        endpoint,
        user_agent,
        method,
        current_load: 0.0,
    };
    let now = Utc::now();

    state.rate_limiter.enter_concurrent(&client_id, tier, now).await;
    let decision = state.rate_limiter.check(&ctx, now).await;

    // Limit/remaining ride on every response (spec §6); denied requests
    // never reach the handler so their remaining is always 0.
    let limit = tier.config().requests_per_minute as u64;
    let mut remaining = 0u64;

    let result: Result<Response, CoreError> = match decision {
        Decision::Allow { remaining: left } => {
            remaining = left;
            let mut response = next.run(request).await;
            let status = response.status().as_u16();
            state.rate_limiter.record_outcome(&client_id, status, Utc::now()).await;
            Ok(response)
        }
        Decision::DenyCircuitOpen => {
            state.rate_limiter.record_denied(false).await;
            Err(CoreError::Unavailable {
                message: "circuit breaker open".into(),
                retry_after_secs: Some(crate::rate_limit::CIRCUIT_DEFAULT_OPEN_SECS as u64),
            })
        }
        Decision::DenyBlocked { retry_after_secs } => {
            state.rate_limiter.record_denied(true).await;
            Err(CoreError::RateLimited {
                retry_after_secs: retry_after_secs.max(0) as u64,
                threat_level: state.rate_limiter.threat_level(&client_id).await,
            })
        }
        Decision::DenyConcurrencyExceeded { retry_after_secs } => {
            state.rate_limiter.record_denied(false).await;
            Err(CoreError::RateLimited {
                retry_after_secs: retry_after_secs.max(0) as u64,
                threat_level: state.rate_limiter.threat_level(&client_id).await,
            })
        }
        Decision::DenyRateExceeded {
            retry_after_secs,
            threat_level,
        } => {
            state.rate_limiter.record_denied(true).await;
            Err(CoreError::RateLimited {
                retry_after_secs: retry_after_secs.max(0) as u64,
                threat_level,
            })
        }
    };

    state.rate_limiter.exit_concurrent(&client_id).await;

    // Every response carries X-Threat-Level, X-RateLimit-Limit and
    // X-RateLimit-Remaining (spec §6); deny paths convert the error to a
    // response here so the headers land on it too.
    let threat_level = state.rate_limiter.threat_level(&client_id).await;
    let mut response = match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };
    insert_header(&mut response, "x-ratelimit-limit", limit);
    insert_header(&mut response, "x-ratelimit-remaining", remaining);
    if let Ok(header_value) = HeaderValue::from_str(&format!("{threat_level:?}")) {
        response.headers_mut().insert("x-threat-level", header_value);
    }
    Ok(response)
}

fn insert_header(response: &mut Response, name: &'static str, value: u64) {
    if let Ok(header_value) = HeaderValue::from_str(&value.to_string()) {
        response.headers_mut().insert(name, header_value);
    }
}
