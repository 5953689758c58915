use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::scrape::ScrapeError;

/// The wire shape of every failure response.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn rate_limited(retry_after: u64, limit: u32) -> Response {
        let mut response = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Try again later.",
        )
        .into_response();

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            headers.insert(header::RETRY_AFTER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
            headers.insert("x-ratelimit-limit", value);
        }
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            error: self.message.clone(),
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http",
            self.status,
            self.detail.unwrap_or(self.message),
        )
        .attach(&mut response);
        response
    }
}

impl From<ScrapeError> for ApiError {
    fn from(err: ScrapeError) -> Self {
        match err {
            ScrapeError::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            ScrapeError::Timeout => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "Scrape timed out")
            }
            ScrapeError::Unreachable(detail) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "Failed to reach target URL")
                    .with_detail(detail)
            }
            ScrapeError::EmptyResult => {
                ApiError::internal().with_detail("scrape returned no data")
            }
            ScrapeError::Internal(detail) => ApiError::internal().with_detail(detail),
        }
    }
}
