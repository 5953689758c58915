pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;

pub use rate_limit::ApiRateLimiter;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::api_keys::ApiKeyService;
use crate::application::scrape::ScrapeService;

#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyService>,
    pub scrape: Arc<ScrapeService>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

/// Assemble the gateway router. `/health` stays outside the authenticated
/// stack; `/v1/scrape` passes authentication, then rate limiting.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/scrape", post(handlers::scrape))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
