//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Error from a fulfillment service.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    let status = match &err {
        FulfillmentError::Validation(_) | FulfillmentError::Malformed(_) => {
            StatusCode::BAD_REQUEST
        }
        FulfillmentError::Signature(_) => StatusCode::UNAUTHORIZED,
        FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
        FulfillmentError::Duplicate(_) | FulfillmentError::Conflict(_) => StatusCode::CONFLICT,
        FulfillmentError::Upstream { .. } | FulfillmentError::Timeout { .. } => {
            StatusCode::BAD_GATEWAY
        }
        FulfillmentError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
        FulfillmentError::Store(_) | FulfillmentError::Serialization(_) => {
            tracing::error!(error = %err, "internal server error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    (status, err.to_string())
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
