//! Zipcode assignment handlers.
//!
//! The public assignment view never carries the honeypot flag; honeypot
//! rows are indistinguishable from ordinary assignments on the wire.

use crate::api::{client_ip, merge_auth};
use crate::error::ApiError;
use crate::ratelimit::Scope;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use gateway_core::{Commitment, GatewayError};
use gateway_epoch::{parse_epoch_id, SchedulerStats};
use gateway_store::{queries, Epoch, EpochAssignment, ZipcodeStats};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct AssignmentView {
    pub zipcode: String,
    pub expected_listings: i32,
    pub state: String,
    pub city: String,
    pub county: Option<String>,
    pub market_tier: gateway_store::MarketTier,
    pub last_assigned: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub epoch_id: String,
    pub epoch_start: DateTime<Utc>,
    pub epoch_end: DateTime<Utc>,
    pub nonce: String,
    pub target_listings: i32,
    pub tolerance_percent: i32,
    pub zipcodes: Vec<AssignmentView>,
    pub metadata: serde_json::Value,
}

fn assignment_response(epoch: Epoch, assignments: Vec<EpochAssignment>) -> AssignmentResponse {
    let total_expected: i64 = assignments
        .iter()
        .filter(|a| !a.is_honeypot)
        .map(|a| a.expected_listings as i64)
        .sum();

    let zipcodes: Vec<AssignmentView> = assignments
        .into_iter()
        .map(|a| AssignmentView {
            zipcode: a.zipcode,
            expected_listings: a.expected_listings,
            state: a.state,
            city: a.city,
            county: a.county,
            market_tier: a.market_tier,
            last_assigned: epoch.start_time,
        })
        .collect();

    let metadata = serde_json::json!({
        "algorithm_version": epoch.algorithm_version,
        "status": epoch.status,
        "assignments_count": zipcodes.len(),
        "total_expected_listings": total_expected,
        "degraded": epoch.degraded,
    });

    AssignmentResponse {
        epoch_id: epoch.id,
        epoch_start: epoch.start_time,
        epoch_end: epoch.end_time,
        nonce: epoch.nonce,
        target_listings: epoch.target_listings,
        tolerance_percent: epoch.tolerance_percent,
        zipcodes,
        metadata,
    }
}

/// GET /api/v1/zipcode-assignments/current
pub async fn current_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, None, None, None)?;

    let commitment = Commitment::assignment_current(wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Miner(&ctx.hotkey), now).await?;

    let (epoch, assignments) = state
        .scheduler
        .current(now)
        .await?
        .ok_or(GatewayError::NoActiveEpoch)?;

    Ok(Json(assignment_response(epoch, assignments)))
}

/// GET /api/v1/zipcode-assignments/epoch/{id} (validator only)
pub async fn historical_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(epoch_id): Path<String>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, None, None, None)?;

    let commitment = Commitment::assignment_historical(&epoch_id, wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Validator(&ctx.hotkey), now).await?;

    if parse_epoch_id(&epoch_id).is_none() {
        return Err(GatewayError::EpochNotFound(epoch_id).into());
    }

    let (epoch, assignments) = state
        .scheduler
        .historical(&epoch_id, now)
        .await?
        .ok_or(GatewayError::EpochNotFound(epoch_id))?;

    Ok(Json(assignment_response(epoch, assignments)))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub timestamp: DateTime<Utc>,
    pub requests: crate::monitor::MonitorStats,
    pub epochs: SchedulerStats,
    pub zipcodes: ZipcodeStats,
    pub configuration: serde_json::Value,
}

/// GET /api/v1/zipcode-assignments/stats (public, per-IP limited)
pub async fn assignment_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    let now = Utc::now();
    let ip = client_ip(&headers, peer);
    state.limiter.check(Scope::Ip(&ip), now).await?;

    let selector = state.scheduler.selector_config();
    let filter = selector.eligibility_filter(now);
    let zipcodes = queries::zipcode_stats(&state.db, &filter).await?;
    let epochs = state.scheduler.stats(now).await?;

    let configuration = serde_json::json!({
        "target_listings": selector.target_listings,
        "tolerance_percent": selector.tolerance_percent,
        "cooldown_hours": selector.cooldown_hours,
        "state_priorities": selector.state_priorities,
        "market_tier_weights": {
            "premium": selector.premium_weight,
            "standard": selector.standard_weight,
            "emerging": selector.emerging_weight,
        },
    });

    Ok(Json(StatsResponse {
        timestamp: now,
        requests: state.monitor.stats(),
        epochs,
        zipcodes,
        configuration,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gateway_store::{EpochStatus, MarketTier};

    fn epoch() -> Epoch {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap();
        Epoch {
            id: "2025-06-01-04:00".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::hours(4),
            nonce: "ab".repeat(16),
            target_listings: 10_000,
            tolerance_percent: 10,
            status: EpochStatus::Active,
            created_at: start,
            selection_seed: 42,
            algorithm_version: "v1.0".to_string(),
            degraded: false,
        }
    }

    fn assignment(zipcode: &str, expected: i32, honeypot: bool) -> EpochAssignment {
        EpochAssignment {
            epoch_id: "2025-06-01-04:00".to_string(),
            zipcode: zipcode.to_string(),
            expected_listings: expected,
            state: "PA".to_string(),
            city: "Philadelphia".to_string(),
            county: Some("Philadelphia".to_string()),
            market_tier: MarketTier::Standard,
            selection_weight: 1.0,
            is_honeypot: honeypot,
        }
    }

    #[test]
    fn test_response_hides_honeypot_flag_but_keeps_row() {
        let response = assignment_response(
            epoch(),
            vec![assignment("19103", 500, false), assignment("19999", 20, true)],
        );

        assert_eq!(response.zipcodes.len(), 2);
        let json = serde_json::to_value(&response).unwrap();
        // The flag must not appear anywhere in the serialized payload.
        assert!(!json.to_string().contains("honeypot"));
        // Budget metadata counts only real assignments.
        assert_eq!(json["metadata"]["total_expected_listings"], 500);
    }

    #[test]
    fn test_response_shape() {
        let response = assignment_response(epoch(), vec![assignment("19103", 500, false)]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["epoch_id"], "2025-06-01-04:00");
        assert_eq!(json["nonce"].as_str().unwrap().len(), 32);
        assert_eq!(json["zipcodes"][0]["zipcode"], "19103");
        assert_eq!(json["zipcodes"][0]["market_tier"], "standard");
        assert_eq!(json["metadata"]["status"], "active");
    }
}
