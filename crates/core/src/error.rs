//! Error taxonomy for the gateway.
//!
//! Every failure a caller can observe is one of these kinds; the HTTP layer
//! maps them to status codes and a `{ detail }` payload. Internal causes are
//! logged, never serialized.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias used across the gateway crates.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error kinds.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("malformed request: {0}")]
    AuthMalformed(String),

    #[error("timestamp outside accepted window")]
    AuthSkew,

    #[error("invalid signature")]
    AuthSignature,

    #[error("hotkey not registered on subnet")]
    AuthUnknownKey,

    #[error("validator status required")]
    AuthNotValidator,

    #[error("validator stake below required floor")]
    AuthStake,

    #[error("{detail}")]
    RateExceeded {
        detail: String,
        reset_at: DateTime<Utc>,
    },

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("no active epoch")]
    NoActiveEpoch,

    #[error("epoch not found: {0}")]
    EpochNotFound(String),

    #[error("internal error")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable name for the kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AuthMalformed(_) => "auth_malformed",
            GatewayError::AuthSkew => "auth_skew",
            GatewayError::AuthSignature => "auth_signature",
            GatewayError::AuthUnknownKey => "auth_unknown_key",
            GatewayError::AuthNotValidator => "auth_not_validator",
            GatewayError::AuthStake => "auth_stake",
            GatewayError::RateExceeded { .. } => "rate_exceeded",
            GatewayError::DependencyUnavailable(_) => "dependency_unavailable",
            GatewayError::NoActiveEpoch => "no_active_epoch",
            GatewayError::EpochNotFound(_) => "epoch_not_found",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// HTTP status the kind maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::AuthMalformed(_) | GatewayError::AuthSkew => 400,
            GatewayError::AuthSignature
            | GatewayError::AuthUnknownKey
            | GatewayError::AuthNotValidator => 401,
            GatewayError::AuthStake => 403,
            GatewayError::EpochNotFound(_) => 404,
            GatewayError::RateExceeded { .. } => 429,
            GatewayError::Internal(_) => 500,
            GatewayError::DependencyUnavailable(_) | GatewayError::NoActiveEpoch => 503,
        }
    }

    /// Whether the caller may retry without changing the request.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateExceeded { .. }
                | GatewayError::DependencyUnavailable(_)
                | GatewayError::NoActiveEpoch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::AuthSkew.http_status(), 400);
        assert_eq!(GatewayError::AuthSignature.http_status(), 401);
        assert_eq!(GatewayError::AuthStake.http_status(), 403);
        assert_eq!(
            GatewayError::EpochNotFound("2025-06-01-00:00".into()).http_status(),
            404
        );
        assert_eq!(
            GatewayError::RateExceeded {
                detail: "daily limit".into(),
                reset_at: Utc::now(),
            }
            .http_status(),
            429
        );
        assert_eq!(GatewayError::NoActiveEpoch.http_status(), 503);
        assert_eq!(GatewayError::Internal("bug".into()).http_status(), 500);
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(GatewayError::NoActiveEpoch.retriable());
        assert!(GatewayError::DependencyUnavailable("redis".into()).retriable());
        assert!(!GatewayError::AuthSignature.retriable());
        assert!(!GatewayError::AuthSkew.retriable());
    }

    #[test]
    fn test_internal_detail_not_in_display() {
        // The Display form is what reaches clients; internals stay hidden.
        let err = GatewayError::Internal("stack trace goes here".into());
        assert_eq!(err.to_string(), "internal error");
    }
}
