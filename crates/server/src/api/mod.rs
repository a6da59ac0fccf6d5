//! HTTP handlers.

pub mod access;
pub mod assignments;
pub mod meta;

use axum::http::HeaderMap;
use gateway_core::GatewayError;

/// Authentication fields as they arrive on the wire.
///
/// Both transport forms are accepted: legacy JSON body fields, and headers
/// (`Authorization: Bearer <sig>`, `X-Timestamp`, `X-Hotkey`). Body fields
/// win when both are present.
#[derive(Clone, Debug)]
pub struct WireAuth {
    pub hotkey: String,
    pub timestamp: i64,
    pub signature: String,
}

pub fn merge_auth(
    headers: &HeaderMap,
    hotkey: Option<String>,
    timestamp: Option<i64>,
    signature: Option<String>,
) -> Result<WireAuth, GatewayError> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let hotkey = hotkey
        .or_else(|| header_str("x-hotkey"))
        .ok_or_else(|| GatewayError::AuthMalformed("hotkey is required".into()))?;

    let timestamp = match timestamp {
        Some(ts) => ts,
        None => header_str("x-timestamp")
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| GatewayError::AuthMalformed("timestamp is required".into()))?,
    };

    let signature = signature
        .or_else(|| {
            header_str("authorization")
                .and_then(|raw| raw.strip_prefix("Bearer ").map(str::to_string))
        })
        .ok_or_else(|| GatewayError::AuthMalformed("signature is required".into()))?;

    Ok(WireAuth {
        hotkey,
        timestamp,
        signature,
    })
}

/// Best-effort client address for per-IP quotas: first hop of
/// `X-Forwarded-For`, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: std::net::SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}
