//! Role-isolation properties of minted credentials, checked against the
//! signed policy documents themselves: a policy evaluator decodes what was
//! actually signed and decides which uploads it would admit.

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use gateway_s3::minter::{miner_prefix, S3Config, UPLOAD_MAX_BYTES, UPLOAD_MIN_BYTES};
use gateway_s3::{CredentialMinter, UploadPolicy, ValidatorUploadService};

// ============================================================================
// POLICY EVALUATOR
// ============================================================================

/// Evaluate a signed POST policy the way the store would: key prefix,
/// content-length band, and expiration.
fn policy_admits(policy: &UploadPolicy, key: &str, size: u64, at: DateTime<Utc>) -> bool {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(&policy.fields["policy"])
        .expect("policy field is base64");
    let doc: serde_json::Value = serde_json::from_slice(&raw).expect("policy is json");

    let expiration =
        DateTime::parse_from_rfc3339(doc["expiration"].as_str().expect("expiration present"))
            .expect("expiration parses")
            .with_timezone(&Utc);
    if at > expiration {
        return false;
    }

    for condition in doc["conditions"].as_array().expect("conditions present") {
        if let Some(parts) = condition.as_array() {
            match parts[0].as_str() {
                Some("starts-with") if parts[1] == "$key" => {
                    let prefix = parts[2].as_str().expect("prefix is a string");
                    if !key.starts_with(prefix) {
                        return false;
                    }
                }
                Some("content-length-range") => {
                    let min = parts[1].as_u64().expect("min bound");
                    let max = parts[2].as_u64().expect("max bound");
                    if size < min || size > max {
                        return false;
                    }
                }
                _ => {}
            }
        }
    }
    true
}

fn minter() -> CredentialMinter {
    CredentialMinter::new(S3Config {
        bucket: "subnet-data".to_string(),
        region: "us-east-2".to_string(),
        access_key: "AKIAEXAMPLE".to_string(),
        secret_key: "secret".to_string(),
        max_credential_ttl_secs: 86_400,
    })
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

// ============================================================================
// MINER ISOLATION
// ============================================================================

#[test]
fn test_miner_policy_admits_only_own_prefix() {
    let policy = minter().miner_upload_policy("5Miner", 86_400, t0()).unwrap();

    assert!(policy_admits(
        &policy,
        "data/hotkey=5Miner/job_id=default_0/data.parquet",
        10_000,
        t0()
    ));

    // Any key outside the signer's folder is refused.
    assert!(!policy_admits(
        &policy,
        "data/hotkey=5Other/job_id=default_0/data.parquet",
        10_000,
        t0()
    ));
    assert!(!policy_admits(&policy, "data/", 10_000, t0()));
    assert!(!policy_admits(
        &policy,
        "validators/5Miner/epoch=2025-06-01-04:00/results.json",
        10_000,
        t0()
    ));
}

#[test]
fn test_miner_policy_enforces_size_band() {
    let policy = minter().miner_upload_policy("5Miner", 86_400, t0()).unwrap();
    let key = "data/hotkey=5Miner/job_id=a/file.parquet";

    assert!(policy_admits(&policy, key, UPLOAD_MIN_BYTES, t0()));
    assert!(policy_admits(&policy, key, UPLOAD_MAX_BYTES, t0()));
    assert!(!policy_admits(&policy, key, UPLOAD_MIN_BYTES - 1, t0()));
    assert!(!policy_admits(&policy, key, UPLOAD_MAX_BYTES + 1, t0()));
}

#[test]
fn test_miner_policy_expires() {
    let policy = minter().miner_upload_policy("5Miner", 3_600, t0()).unwrap();
    let key = "data/hotkey=5Miner/job_id=a/file.parquet";

    assert!(policy_admits(&policy, key, 10_000, t0() + Duration::seconds(3_599)));
    assert!(!policy_admits(&policy, key, 10_000, t0() + Duration::seconds(3_601)));
}

#[test]
fn test_distinct_miners_get_distinct_scopes() {
    let m = minter();
    let a = m.miner_upload_policy("5MinerA", 3_600, t0()).unwrap();
    let b = m.miner_upload_policy("5MinerB", 3_600, t0()).unwrap();

    let a_key = format!("{}file.parquet", miner_prefix("5MinerA"));
    assert!(policy_admits(&a, &a_key, 10_000, t0()));
    assert!(!policy_admits(&b, &a_key, 10_000, t0()));
    assert_ne!(a.fields["x-amz-signature"], b.fields["x-amz-signature"]);
}

// ============================================================================
// VALIDATOR WRITE ISOLATION
// ============================================================================

#[test]
fn test_validator_grant_admits_only_epoch_scoped_prefix() {
    let service = ValidatorUploadService::new(minter(), 14_400);
    let grant = service.grant("5Val", "2025-06-01-04:00", t0()).unwrap();

    assert!(policy_admits(
        &grant.policy,
        "validators/5Val/epoch=2025-06-01-04:00/validation_report.json",
        10_000,
        t0()
    ));

    assert!(!policy_admits(
        &grant.policy,
        "validators/5Val/epoch=2025-06-01-08:00/validation_report.json",
        10_000,
        t0()
    ));
    assert!(!policy_admits(
        &grant.policy,
        "validators/5Other/epoch=2025-06-01-04:00/validation_report.json",
        10_000,
        t0()
    ));
    assert!(!policy_admits(
        &grant.policy,
        "data/hotkey=5Val/file.parquet",
        10_000,
        t0()
    ));
}

#[test]
fn test_validator_grant_expiry_is_upload_ttl() {
    let service = ValidatorUploadService::new(minter(), 14_400);
    let grant = service.grant("5Val", "2025-06-01-04:00", t0()).unwrap();
    assert_eq!(grant.policy.expiry, t0() + Duration::seconds(14_400));

    let key = "validators/5Val/epoch=2025-06-01-04:00/results.parquet";
    assert!(policy_admits(&grant.policy, key, 10_000, t0() + Duration::seconds(14_000)));
    assert!(!policy_admits(&grant.policy, key, 10_000, t0() + Duration::seconds(15_000)));
}
