use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use trawler_core::error::CrawlError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `CrawlError`.
pub struct ApiError(pub CrawlError);

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            CrawlError::Normalization(_) | CrawlError::Serialization(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            CrawlError::SourceNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CrawlError::RateLimitTimeout { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
            }
            CrawlError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            CrawlError::Fetch { .. } | CrawlError::Extraction(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            CrawlError::Database(_) | CrawlError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        // The message is the error's display form only — no stack detail.
        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
