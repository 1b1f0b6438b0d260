//! Rate limit endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::error::QuotagateError;
use crate::ratelimit::{RateLimiterBackend, RequestDescriptor};

/// Path of the rate limit decision endpoint.
pub const RATE_LIMIT_PATH: &str = "/api/v1/ratelimit/fixedwindow";

/// Body of a rate limit decision request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitRequest {
    #[serde(default)]
    pub descriptors: Vec<RequestDescriptor>,
}

/// An engine failure rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(QuotagateError);

impl From<QuotagateError> for ApiError {
    fn from(e: QuotagateError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            QuotagateError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Build the router serving the rate limit endpoint.
pub fn router<R: RateLimiterBackend + 'static>(rate_limiter: Arc<R>) -> Router {
    Router::new()
        .route(
            RATE_LIMIT_PATH,
            post(should_rate_limit::<R>).get(health),
        )
        .with_state(rate_limiter)
}

/// Determine whether the request described by the body should be limited.
///
/// Answers `429 Too Many Requests` if any descriptor is over its limit and
/// `200 OK` otherwise.
#[instrument(skip_all, fields(descriptor_count = request.descriptors.len()))]
async fn should_rate_limit<R: RateLimiterBackend>(
    State(rate_limiter): State<Arc<R>>,
    Json(request): Json<RateLimitRequest>,
) -> Result<StatusCode, ApiError> {
    debug!(descriptors = ?request.descriptors, "Processing rate limit request");

    let limited = rate_limiter
        .should_limit(&request.descriptors)
        .await
        .map_err(|e| {
            error!(error = %e, "Rate limit evaluation failed");
            ApiError::from(e)
        })?;

    info!(limited = limited, "Rate limit decision made");

    if limited {
        Ok(StatusCode::TOO_MANY_REQUESTS)
    } else {
        Ok(StatusCode::OK)
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}
