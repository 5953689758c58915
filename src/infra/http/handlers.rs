use axum::Json;
use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::api_keys::ApiPrincipal;
use crate::application::scrape::ScrapeCommand;

use super::AppState;
use super::error::ApiError;
use super::models::{ScrapeRequestBody, ScrapeResponseBody};

pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn scrape(
    State(state): State<AppState>,
    Extension(principal): Extension<ApiPrincipal>,
    Json(body): Json<ScrapeRequestBody>,
) -> Result<Json<ScrapeResponseBody>, ApiError> {
    let outcome = state
        .scrape
        .execute(&principal, ScrapeCommand::from(body))
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ScrapeResponseBody::from(outcome)))
}
