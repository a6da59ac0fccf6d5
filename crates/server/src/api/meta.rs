//! Health, limits and documentation endpoints.

use crate::error::ApiError;
use crate::state::AppState;
use axum::response::Html;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use gateway_store::queries;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// GET /healthcheck
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let now = Utc::now();

    // Object-store probe: a short-lived signed list request.
    let probe_started = Instant::now();
    let s3_ok = match state.minter.mint_list_url("data/", 60, now, None, Some(1)) {
        Ok(signed) => match state.probe_client.get(&signed.url).send().await {
            Ok(response) => response.status().as_u16() < 500,
            Err(e) => {
                tracing::warn!("Object-store health probe failed: {}", e);
                state.monitor.count_timeout();
                false
            }
        },
        Err(_) => false,
    };
    let s3_latency_ms = probe_started.elapsed().as_secs_f64() * 1000.0;

    let cache_ok = state.limiter.store_ok().await;
    let db_ok = queries::ping(&state.db).await;

    let status = if s3_ok && cache_ok && db_ok {
        "ok"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "timestamp": now,
        "bucket": state.minter.bucket(),
        "region": state.minter.region(),
        "folder_structure": "data/hotkey={hotkey_id}/job_id={job_id}/",
        "s3_ok": s3_ok,
        "s3_latency_ms": (s3_latency_ms * 100.0).round() / 100.0,
        "cache_ok": cache_ok,
        "db_ok": db_ok,
        "chain_view": {
            "netuid": state.config.netuid,
            "hotkeys_count": state.chain.hotkeys_count(),
            "last_sync": state.chain.last_sync(),
            "sync_failures": state.chain.sync_failures(),
            "sync_interval": state.config.metagraph_sync_interval,
        },
        "stats": state.monitor.stats(),
        "timeouts": {
            "validator_verification": format!("{}s", state.config.validator_verification_timeout),
            "signature_verification": format!("{}s", state.config.signature_verification_timeout),
            "s3_operations": format!("{}s", state.config.s3_operation_timeout),
        },
    }))
}

/// GET /rate-limits
pub async fn rate_limits(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let global_usage = if state.limiter.enabled() {
        state.limiter.global_usage(now).await.unwrap_or(0)
    } else {
        0
    };
    let limits = state.limiter.limits();

    Ok(Json(json!({
        "enabled": state.limiter.enabled(),
        "daily_limit_per_miner": limits.per_miner,
        "daily_limit_per_validator": limits.per_validator,
        "daily_limit_per_ip": limits.per_ip,
        "total_daily_limit": limits.global,
        "global_usage_today": global_usage,
        "reset_at": crate::ratelimit::RateLimiter::reset_at(now),
    })))
}

/// GET /commitment-formats
pub async fn commitment_formats() -> Json<serde_json::Value> {
    Json(json!({
        "miner_format": "s3:data:access:{coldkey}:{hotkey}:{timestamp}",
        "validator_format": "s3:validator:access:{timestamp}",
        "validator_upload_format": "s3:validator:upload:{timestamp}",
        "assignment_current_format": "zipcode:assignment:current:{timestamp}",
        "assignment_validation_format": "zipcode:validation:{epoch_id}:{timestamp}",
        "example_miner": "s3:data:access:5F3...coldkey:5H2...hotkey:1682345678",
        "example_validator": "s3:validator:access:1682345678",
        "example_validation": "zipcode:validation:2025-06-01-04:00:1682345678",
        "instructions": "1. Generate timestamp\n2. Sign commitment with the hotkey\n3. Send fields in the body or the X-Hotkey/X-Timestamp/Authorization headers",
    }))
}

/// GET /structure-info
pub async fn structure_info() -> Json<serde_json::Value> {
    Json(json!({
        "folder_structure": "data/hotkey={hotkey_id}/job_id={job_id}/",
        "validator_structure": "validators/{validator_hotkey}/epoch={epoch_id}/",
        "example_paths": [
            "data/hotkey=5F3...xyz/job_id=default_0/data_20250620_143052_150.parquet",
            "validators/5H2...abc/epoch=2025-06-01-04:00/validation_report.json",
        ],
        "upload_flow": [
            "1. Request credentials from the gateway",
            "2. Upload files under your own prefix with the returned form fields",
            "3. Embed the epoch nonce in uploaded records to prove in-epoch work",
        ],
    }))
}

/// GET /docs
pub async fn docs() -> Html<&'static str> {
    Html(
        r##"<!DOCTYPE html>
<html>
<head>
  <title>Gateway API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>"##,
    )
}

/// GET /openapi.json
pub async fn openapi(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Resi Gateway",
            "description": "Credential and assignment gateway for the Resi subnet",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": [{ "url": format!("http://{}:{}", state.config.host, state.config.port) }],
        "paths": {
            "/healthcheck": { "get": { "summary": "Liveness and dependency probes" } },
            "/rate-limits": { "get": { "summary": "Current limits and today's global usage" } },
            "/commitment-formats": { "get": { "summary": "Commitment templates" } },
            "/structure-info": { "get": { "summary": "Object-store keyspace layout" } },
            "/get-folder-access": { "post": { "summary": "Miner upload policy and list URL" } },
            "/get-validator-access": { "post": { "summary": "Validator global read URLs" } },
            "/get-miner-specific-access": { "post": { "summary": "Validator list URL for one miner" } },
            "/api/v1/s3-access/validator-upload": { "post": { "summary": "Validator upload credentials for a completed epoch" } },
            "/api/v1/s3-access/validator-uploads": { "get": { "summary": "Validator upload listing and audit trail" } },
            "/api/v1/zipcode-assignments/current": { "get": { "summary": "Current epoch assignment (miner)" } },
            "/api/v1/zipcode-assignments/epoch/{id}": { "get": { "summary": "Historical epoch assignment (validator)" } },
            "/api/v1/zipcode-assignments/stats": { "get": { "summary": "Assignment and zipcode statistics" } },
        },
    }))
}
