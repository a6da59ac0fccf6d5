//! Object-store access handlers.

use crate::api::merge_auth;
use crate::error::ApiError;
use crate::ratelimit::Scope;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use gateway_core::{Commitment, GatewayError};
use gateway_s3::minter::miner_prefix;
use gateway_s3::{SignedUrl, UploadPolicy};
use gateway_store::{queries, EpochStatus, ValidatorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default credential lifetime when the request does not override it.
const DEFAULT_ACCESS_TTL_SECS: i64 = 86_400;
/// List URLs are shorter-lived than upload policies.
const LIST_URL_TTL_SECS: i64 = 3 * 3600;

fn requested_ttl(expiry: Option<i64>, now: DateTime<Utc>) -> Result<i64, GatewayError> {
    match expiry {
        None => Ok(DEFAULT_ACCESS_TTL_SECS),
        Some(expiry) => {
            let ttl = expiry - now.timestamp();
            if ttl <= 0 {
                return Err(GatewayError::AuthMalformed(
                    "expiry is in the past".to_string(),
                ));
            }
            Ok(ttl)
        }
    }
}

// ---------------------------------------------------------------------------
// POST /get-folder-access
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MinerAccessRequest {
    pub coldkey: Option<String>,
    pub hotkey: Option<String>,
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
    pub expiry: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FolderAccessResponse {
    pub folder: String,
    pub url: String,
    pub fields: BTreeMap<String, String>,
    pub expiry: DateTime<Utc>,
    pub list_url: String,
    pub rate_limit_remaining: u64,
    pub structure_info: serde_json::Value,
}

pub async fn get_folder_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MinerAccessRequest>,
) -> Result<Json<FolderAccessResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, req.hotkey, req.timestamp, req.signature)?;
    let coldkey = req
        .coldkey
        .ok_or_else(|| GatewayError::AuthMalformed("coldkey is required".into()))?;

    let commitment = Commitment::miner_data_access(&coldkey, &wire.hotkey, wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    let decision = state.limiter.check(Scope::Miner(&ctx.hotkey), now).await?;

    let ttl = requested_ttl(req.expiry, now)?;
    let policy = state.minter.miner_upload_policy(&ctx.hotkey, ttl, now)?;
    let folder = miner_prefix(&ctx.hotkey);
    let list_url = state
        .minter
        .mint_list_url(&folder, LIST_URL_TTL_SECS, now, None, None)?;

    Ok(Json(FolderAccessResponse {
        folder,
        url: policy.url,
        fields: policy.fields,
        expiry: policy.expiry,
        list_url: list_url.url,
        rate_limit_remaining: decision.remaining,
        structure_info: structure_info_block(),
    }))
}

// ---------------------------------------------------------------------------
// POST /get-validator-access
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ValidatorAccessRequest {
    pub hotkey: Option<String>,
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
    pub expiry: Option<i64>,
    pub miner_hotkey: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidatorAccessResponse {
    pub bucket: String,
    pub region: String,
    pub validator_hotkey: String,
    pub expiry: DateTime<Utc>,
    pub expiry_seconds: i64,
    pub urls: ValidatorUrls,
    pub structure_info: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ValidatorUrls {
    pub global: BTreeMap<String, String>,
    pub miners: BTreeMap<String, String>,
}

pub async fn get_validator_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ValidatorAccessRequest>,
) -> Result<Json<ValidatorAccessResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, req.hotkey, req.timestamp, req.signature)?;

    let commitment = Commitment::validator_access(wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Validator(&ctx.hotkey), now).await?;

    let ttl = requested_ttl(req.expiry, now)?;
    let list_all_data = state
        .minter
        .mint_list_url("data/hotkey=", ttl, now, None, None)?;
    let list_all_miners = state
        .minter
        .mint_list_url("data/hotkey=", ttl, now, Some("/"), None)?;

    let mut global = BTreeMap::new();
    global.insert("list_all_data".to_string(), list_all_data.url);
    let mut miners = BTreeMap::new();
    miners.insert("list_all_miners".to_string(), list_all_miners.url);

    Ok(Json(ValidatorAccessResponse {
        bucket: state.minter.bucket().to_string(),
        region: state.minter.region().to_string(),
        validator_hotkey: ctx.hotkey,
        expiry: list_all_data.expiry,
        expiry_seconds: ttl.min(state.config.max_credential_ttl_seconds),
        urls: ValidatorUrls { global, miners },
        structure_info: structure_info_block(),
    }))
}

// ---------------------------------------------------------------------------
// POST /get-miner-specific-access
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MinerSpecificAccessResponse {
    pub bucket: String,
    pub region: String,
    pub miner_hotkey: String,
    pub miner_url: String,
    pub prefix: String,
    pub expiry: DateTime<Utc>,
}

pub async fn get_miner_specific_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ValidatorAccessRequest>,
) -> Result<Json<MinerSpecificAccessResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, req.hotkey, req.timestamp, req.signature)?;
    let miner_hotkey = req
        .miner_hotkey
        .ok_or_else(|| GatewayError::AuthMalformed("miner_hotkey is required".into()))?;

    let commitment = Commitment::validator_access(wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Validator(&ctx.hotkey), now).await?;

    let prefix = miner_prefix(&miner_hotkey);
    let signed = state
        .minter
        .mint_list_url(&prefix, LIST_URL_TTL_SECS, now, None, Some(10_000))?;

    Ok(Json(MinerSpecificAccessResponse {
        bucket: state.minter.bucket().to_string(),
        region: state.minter.region().to_string(),
        miner_hotkey,
        miner_url: signed.url,
        prefix,
        expiry: signed.expiry,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/s3-access/validator-upload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ValidatorUploadRequest {
    pub hotkey: Option<String>,
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
    pub epoch_id: String,
}

#[derive(Debug, Serialize)]
pub struct S3Credentials {
    pub bucket: String,
    pub region: String,
    pub prefix: String,
    pub upload_url: String,
    pub fields: BTreeMap<String, String>,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ValidatorUploadResponse {
    pub s3_credentials: S3Credentials,
    pub upload_guidelines: gateway_s3::UploadGuidelines,
}

pub async fn validator_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ValidatorUploadRequest>,
) -> Result<Json<ValidatorUploadResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, req.hotkey, req.timestamp, req.signature)?;

    let commitment = Commitment::validator_upload(wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Validator(&ctx.hotkey), now).await?;

    // Uploads are only accepted for finished epochs.
    let epoch = queries::epoch_by_id(&state.db, &req.epoch_id)
        .await?
        .ok_or_else(|| GatewayError::EpochNotFound(req.epoch_id.clone()))?;
    if !matches!(epoch.status, EpochStatus::Completed | EpochStatus::Archived) {
        return Err(GatewayError::AuthMalformed(format!(
            "epoch {} is not completed",
            epoch.id
        ))
        .into());
    }

    let grant = state.uploads.grant(&ctx.hotkey, &epoch.id, now)?;

    let audit = ValidatorResult {
        id: uuid::Uuid::new_v4(),
        epoch_id: epoch.id.clone(),
        validator_hotkey: ctx.hotkey.clone(),
        validation_time: now,
        miners_evaluated: None,
        top_miners: None,
        total_listings: None,
        upload_path: grant.prefix.clone(),
        status: "credentials_issued".to_string(),
    };
    queries::insert_validator_result(&state.db, &audit).await?;

    let UploadPolicy {
        url,
        fields,
        expiry,
    } = grant.policy;

    Ok(Json(ValidatorUploadResponse {
        s3_credentials: S3Credentials {
            bucket: state.minter.bucket().to_string(),
            region: state.minter.region().to_string(),
            prefix: grant.prefix,
            upload_url: url,
            fields,
            expiry,
        },
        upload_guidelines: grant.upload_guidelines,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/v1/s3-access/validator-uploads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ValidatorUploadsQuery {
    pub epoch_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidatorUploadsResponse {
    pub validator_hotkey: String,
    pub epoch_id: Option<String>,
    pub list_url: String,
    pub expiry: DateTime<Utc>,
    pub issued_credentials: Vec<ValidatorResult>,
}

pub async fn validator_uploads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ValidatorUploadsQuery>,
) -> Result<Json<ValidatorUploadsResponse>, ApiError> {
    let now = Utc::now();
    let wire = merge_auth(&headers, None, None, None)?;

    let commitment = Commitment::validator_access(wire.timestamp);
    let ctx = state
        .auth
        .authenticate(&commitment, &wire.hotkey, &wire.signature, now)
        .await?;
    state.limiter.check(Scope::Validator(&ctx.hotkey), now).await?;

    let SignedUrl { url, expiry } =
        state
            .uploads
            .list_uploads_url(&ctx.hotkey, query.epoch_id.as_deref(), now)?;

    let issued_credentials = match &query.epoch_id {
        Some(epoch_id) => {
            queries::validator_results_for_epoch(&state.db, epoch_id, Some(&ctx.hotkey)).await?
        }
        None => Vec::new(),
    };

    Ok(Json(ValidatorUploadsResponse {
        validator_hotkey: ctx.hotkey,
        epoch_id: query.epoch_id,
        list_url: url,
        expiry,
        issued_credentials,
    }))
}

pub(crate) fn structure_info_block() -> serde_json::Value {
    serde_json::json!({
        "folder_structure": "data/hotkey={hotkey_id}/job_id={job_id}/",
        "description": "Job-based folder structure with explicit hotkey and job_id labels under the data/ prefix",
    })
}
