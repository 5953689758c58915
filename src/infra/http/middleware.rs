use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::api_keys::{ApiAuthError, ApiPrincipal};
use crate::application::error::ErrorReport;

use super::AppState;
use super::error::ApiError;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the `X-API-Key` header to a principal or reject with 401 before
/// any rate-limit or cache work runs.
pub async fn api_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // A blank header is the same as no header at all.
    let key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let Some(key) = key else {
        return ApiError::unauthorized("Missing X-API-Key header").into_response();
    };

    let principal = match state.api_keys.authenticate(&key).await {
        Ok(principal) => principal,
        Err(ApiAuthError::Missing | ApiAuthError::Invalid) => {
            return ApiError::unauthorized("Invalid or inactive API key").into_response();
        }
        Err(ApiAuthError::Repo(err)) => {
            return ApiError::internal().with_detail(err.to_string()).into_response();
        }
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Per-principal rolling-window admission. Runs after authentication; the
/// principal's own budget overrides the gateway default. Quota headers are
/// set on every response.
pub async fn api_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<ApiPrincipal>() else {
        warn!(
            target = "lettura::http::ratelimit",
            "missing principal in rate limit middleware"
        );
        return ApiError::unauthorized("Missing X-API-Key header").into_response();
    };

    let decision = state
        .rate_limiter
        .allow(&principal.key_id.to_string(), principal.rate_limit);

    if !decision.admitted {
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs(), decision.limit);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let api_key_id = request
        .extensions()
        .get::<ApiPrincipal>()
        .map(|principal| principal.key_id.to_string());
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "lettura::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                api_key_id = api_key_id.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                target = "lettura::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                api_key_id = api_key_id.as_deref().unwrap_or(""),
                "client request error",
            );
        }
    }

    response
}
