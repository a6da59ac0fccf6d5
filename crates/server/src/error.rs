//! HTTP error mapping.
//!
//! Everything a client sees is a `{ detail, kind }` payload with the status
//! from the error taxonomy; internal causes are logged here and go no
//! further.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::GatewayError;

/// Wrapper turning [`GatewayError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self.0);
        }
        let body = Json(serde_json::json!({
            "detail": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl From<gateway_store::StoreError> for ApiError {
    fn from(err: gateway_store::StoreError) -> Self {
        tracing::error!("Store error: {}", err);
        ApiError(GatewayError::DependencyUnavailable("database".to_string()))
    }
}

impl From<gateway_epoch::EpochError> for ApiError {
    fn from(err: gateway_epoch::EpochError) -> Self {
        tracing::error!("Epoch error: {}", err);
        ApiError(GatewayError::DependencyUnavailable(
            "epoch scheduler".to_string(),
        ))
    }
}

impl From<gateway_s3::S3Error> for ApiError {
    fn from(err: gateway_s3::S3Error) -> Self {
        match err {
            gateway_s3::S3Error::Unavailable(detail) => {
                tracing::error!("Object store unavailable: {}", detail);
                ApiError(GatewayError::DependencyUnavailable(
                    "object store".to_string(),
                ))
            }
            other => {
                tracing::error!("Credential mint failed: {}", other);
                ApiError(GatewayError::Internal(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_propagates() {
        let err = ApiError(GatewayError::AuthSignature);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_store_error_maps_to_503() {
        let err: ApiError = gateway_store::StoreError::EpochExists("2025-06-01-00:00".into()).into();
        assert_eq!(err.0.http_status(), 503);
    }
}
