//! Validator upload grants.
//!
//! Thin specialization of the minter: a write-scoped POST policy rooted at
//! `validators/{hotkey}/epoch={epoch_id}/`, stamped with the validator and
//! epoch metadata the downstream audit expects. Epoch state checks and the
//! audit row live with the caller, which owns the database.

use crate::error::S3Error;
use crate::minter::{validator_upload_prefix, CredentialMinter, SignedUrl, UploadPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Guidance block returned with every validator upload grant.
#[derive(Clone, Debug, Serialize)]
pub struct UploadGuidelines {
    pub max_file_size_mb: u32,
    pub allowed_file_types: Vec<String>,
    pub required_metadata: serde_json::Value,
    pub folder_structure: String,
    pub example_files: Vec<String>,
}

/// A minted validator upload credential.
#[derive(Clone, Debug, Serialize)]
pub struct ValidatorUploadGrant {
    pub prefix: String,
    pub policy: UploadPolicy,
    pub upload_guidelines: UploadGuidelines,
}

/// Mints validator-scoped upload credentials.
#[derive(Clone, Debug)]
pub struct ValidatorUploadService {
    minter: CredentialMinter,
    upload_ttl_secs: i64,
}

impl ValidatorUploadService {
    pub fn new(minter: CredentialMinter, upload_ttl_secs: i64) -> Self {
        Self {
            minter,
            upload_ttl_secs,
        }
    }

    pub fn upload_ttl_secs(&self) -> i64 {
        self.upload_ttl_secs
    }

    /// Mint an upload policy for one validator and one epoch.
    pub fn grant(
        &self,
        validator_hotkey: &str,
        epoch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatorUploadGrant, S3Error> {
        let prefix = validator_upload_prefix(validator_hotkey, epoch_id);
        let metadata = vec![
            (
                "x-amz-meta-validator-hotkey".to_string(),
                validator_hotkey.to_string(),
            ),
            ("x-amz-meta-epoch-id".to_string(), epoch_id.to_string()),
        ];
        let policy =
            self.minter
                .mint_upload_policy(&prefix, self.upload_ttl_secs, now, &metadata)?;

        let upload_guidelines = UploadGuidelines {
            max_file_size_mb: 100,
            allowed_file_types: vec!["parquet".to_string(), "json".to_string()],
            required_metadata: serde_json::json!({
                "validator-hotkey": validator_hotkey,
                "epoch-id": epoch_id,
                "upload-purpose": "epoch_validation_results",
            }),
            folder_structure: prefix.clone(),
            example_files: vec![
                format!("{prefix}validated_data.parquet"),
                format!("{prefix}validation_report.json"),
                format!("{prefix}epoch_metadata.json"),
            ],
        };

        Ok(ValidatorUploadGrant {
            prefix,
            policy,
            upload_guidelines,
        })
    }

    /// Presigned list URL over a validator's uploads, optionally scoped to
    /// one epoch.
    pub fn list_uploads_url(
        &self,
        validator_hotkey: &str,
        epoch_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, S3Error> {
        let prefix = match epoch_id {
            Some(epoch_id) => validator_upload_prefix(validator_hotkey, epoch_id),
            None => format!("validators/{validator_hotkey}/"),
        };
        self.minter
            .mint_list_url(&prefix, self.upload_ttl_secs, now, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minter::S3Config;
    use chrono::TimeZone;

    fn service() -> ValidatorUploadService {
        let minter = CredentialMinter::new(S3Config {
            bucket: "validated-data".to_string(),
            region: "us-east-2".to_string(),
            access_key: "AK".to_string(),
            secret_key: "sk".to_string(),
            max_credential_ttl_secs: 86_400,
        });
        ValidatorUploadService::new(minter, 14_400)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_grant_is_rooted_at_validator_prefix() {
        let grant = service().grant("5Val", "2025-06-01-04:00", t0()).unwrap();
        assert_eq!(grant.prefix, "validators/5Val/epoch=2025-06-01-04:00/");
        assert!(grant.policy.fields["key"].starts_with(&grant.prefix));
        assert_eq!(grant.policy.fields["x-amz-meta-validator-hotkey"], "5Val");
        assert_eq!(
            grant.policy.fields["x-amz-meta-epoch-id"],
            "2025-06-01-04:00"
        );
    }

    #[test]
    fn test_grant_ttl_is_upload_ttl() {
        let grant = service().grant("5Val", "2025-06-01-04:00", t0()).unwrap();
        assert_eq!(grant.policy.expiry, t0() + chrono::Duration::seconds(14_400));
    }

    #[test]
    fn test_guidelines_name_examples_under_prefix() {
        let grant = service().grant("5Val", "2025-06-01-04:00", t0()).unwrap();
        for example in &grant.upload_guidelines.example_files {
            assert!(example.starts_with("validators/5Val/epoch=2025-06-01-04:00/"));
        }
    }

    #[test]
    fn test_list_uploads_scopes() {
        let all = service().list_uploads_url("5Val", None, t0()).unwrap();
        assert!(all.url.contains("prefix=validators%2F5Val%2F"));

        let scoped = service()
            .list_uploads_url("5Val", Some("2025-06-01-04:00"), t0())
            .unwrap();
        assert!(scoped
            .url
            .contains("prefix=validators%2F5Val%2Fepoch%3D2025-06-01-04%3A00%2F"));
    }
}
