//! Request correlation, authentication, rate limiting and CORS.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub const CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
const MAX_CORRELATION_LEN: usize = 128;

/// Run the request inside a `request` span and echo `X-Correlation-ID`.
pub async fn correlation(req: Request, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.len() > MAX_CORRELATION_LEN
        || !trimmed.chars().all(|c| c.is_ascii_graphic())
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// Reject callers without the configured `X-API-Key`. Open mode passes everything.
pub async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get(&API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if expected.matches(presented) {
        next.run(req).await
    } else {
        warn!("rejected request with missing or invalid api key");
        ApiError::Unauthorized.into_response()
    }
}

/// Token-bucket limit keyed by the caller's IP address.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let caller = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if state.limiter.try_acquire(&caller) {
        next.run(req).await
    } else {
        warn!(caller, "rate limit exceeded");
        ApiError::RateLimited {
            rpm: state.limiter.rpm(),
        }
        .into_response()
    }
}

/// CORS for the configured origins. `*` is ignored because credentials are allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| {
            let wildcard = origin.as_str() == "*";
            if wildcard {
                warn!("wildcard CORS origin ignored");
            }
            !wildcard
        })
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "invalid CORS origin ignored");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, API_KEY_HEADER, CORRELATION_HEADER])
        .expose_headers([CORRELATION_HEADER])
        .allow_credentials(true)
        .max_age(Duration::from_secs(600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_bounded_and_printable() {
        assert_eq!(normalize_id(" abc-123 "), Some("abc-123".to_string()));
        assert_eq!(normalize_id(""), None);
        assert_eq!(normalize_id("has space"), None);
        assert_eq!(normalize_id(&"x".repeat(MAX_CORRELATION_LEN + 1)), None);
    }
}
