//! Credential minter.
//!
//! Prefix derivation is by construction: the miner upload entry point takes
//! only the signer's hotkey, so a minted credential can never admit a key
//! outside `data/hotkey={hotkey}/`. The validator upload prefix is likewise
//! rooted at the signer's hotkey.

use crate::error::S3Error;
use crate::sigv4;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default content-length band for upload policies: 1 KiB to 5 GiB.
pub const UPLOAD_MIN_BYTES: u64 = 1024;
pub const UPLOAD_MAX_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Object-store configuration.
#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Upper bound on any minted credential's lifetime, seconds.
    pub max_credential_ttl_secs: i64,
}

/// A signed POST upload policy.
#[derive(Clone, Debug, Serialize)]
pub struct UploadPolicy {
    pub url: String,
    pub fields: BTreeMap<String, String>,
    pub expiry: DateTime<Utc>,
}

/// A presigned URL with its expiry.
#[derive(Clone, Debug, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expiry: DateTime<Utc>,
}

/// Upload prefix owned by one miner hotkey.
pub fn miner_prefix(hotkey: &str) -> String {
    format!("data/hotkey={hotkey}/")
}

/// Results prefix owned by one validator hotkey for one epoch.
pub fn validator_upload_prefix(hotkey: &str, epoch_id: &str) -> String {
    format!("validators/{hotkey}/epoch={epoch_id}/")
}

/// Mints scoped credentials against the configured bucket.
#[derive(Clone, Debug)]
pub struct CredentialMinter {
    config: S3Config,
}

impl CredentialMinter {
    pub fn new(config: S3Config) -> Self {
        Self { config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Clamp a requested ttl to `(0, max_credential_ttl]`.
    fn clamp_ttl(&self, ttl_secs: i64) -> Result<i64, S3Error> {
        if ttl_secs <= 0 {
            return Err(S3Error::InvalidTtl);
        }
        Ok(ttl_secs.min(self.config.max_credential_ttl_secs))
    }

    fn check_prefix(prefix: &str) -> Result<(), S3Error> {
        if prefix.is_empty() || prefix.contains("..") || prefix.starts_with('/') {
            return Err(S3Error::InvalidPrefix(prefix.to_string()));
        }
        Ok(())
    }

    /// Mint a POST policy restricted to `prefix` with the default size band.
    ///
    /// `extra_fields` are included both as form fields and exact-match
    /// policy conditions (used for validator upload metadata).
    pub fn mint_upload_policy(
        &self,
        prefix: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
        extra_fields: &[(String, String)],
    ) -> Result<UploadPolicy, S3Error> {
        Self::check_prefix(prefix)?;
        let ttl = self.clamp_ttl(ttl_secs)?;
        let expiry = now + Duration::seconds(ttl);

        let mut conditions = vec![
            serde_json::json!({ "bucket": self.config.bucket }),
            serde_json::json!(["starts-with", "$key", prefix]),
            serde_json::json!({ "acl": "private" }),
            serde_json::json!(["content-length-range", UPLOAD_MIN_BYTES, UPLOAD_MAX_BYTES]),
            serde_json::json!({ "x-amz-storage-class": "STANDARD" }),
        ];
        for (name, value) in extra_fields {
            let mut exact = serde_json::Map::new();
            exact.insert(name.clone(), serde_json::Value::String(value.clone()));
            conditions.push(serde_json::Value::Object(exact));
        }

        let policy_skeleton = serde_json::json!({
            "expiration": expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        });
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("key".to_string(), format!("{prefix}${{filename}}"));
        fields.insert("acl".to_string(), "private".to_string());
        fields.insert(
            "x-amz-storage-class".to_string(),
            "STANDARD".to_string(),
        );
        for (name, value) in extra_fields {
            fields.insert(name.clone(), value.clone());
        }

        let (_, amz_date) = sigv4::timestamps(now);
        let credential = sigv4::credential_scope(
            &self.config.access_key,
            &now.format("%Y%m%d").to_string(),
            &self.config.region,
        );
        conditions.push(serde_json::json!({ "x-amz-algorithm": "AWS4-HMAC-SHA256" }));
        conditions.push(serde_json::json!({ "x-amz-credential": credential }));
        conditions.push(serde_json::json!({ "x-amz-date": amz_date }));

        let mut policy_document = policy_skeleton;
        policy_document["conditions"] = serde_json::Value::Array(conditions);

        let signed = sigv4::sign_post_policy(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
            &policy_document,
            now,
        );

        fields.insert("x-amz-algorithm".to_string(), "AWS4-HMAC-SHA256".to_string());
        fields.insert("x-amz-credential".to_string(), signed.credential);
        fields.insert("x-amz-date".to_string(), signed.amz_date);
        fields.insert("policy".to_string(), signed.policy_b64);
        fields.insert("x-amz-signature".to_string(), signed.signature);

        Ok(UploadPolicy {
            url: format!(
                "https://{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            ),
            fields,
            expiry,
        })
    }

    /// Upload policy for a miner, rooted at its own hotkey folder.
    pub fn miner_upload_policy(
        &self,
        hotkey: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<UploadPolicy, S3Error> {
        self.mint_upload_policy(&miner_prefix(hotkey), ttl_secs, now, &[])
    }

    /// Presigned list URL over a prefix.
    pub fn mint_list_url(
        &self,
        prefix: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
        delimiter: Option<&str>,
        max_keys: Option<u32>,
    ) -> Result<SignedUrl, S3Error> {
        Self::check_prefix(prefix)?;
        let ttl = self.clamp_ttl(ttl_secs)?;

        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("prefix".to_string(), prefix.to_string()),
        ];
        if let Some(delimiter) = delimiter {
            query.push(("delimiter".to_string(), delimiter.to_string()));
        }
        if let Some(max_keys) = max_keys {
            query.push(("max-keys".to_string(), max_keys.to_string()));
        }

        let url = sigv4::presign_get_url(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.bucket,
            &self.config.region,
            "",
            &query,
            ttl,
            now,
        );
        Ok(SignedUrl {
            url,
            expiry: now + Duration::seconds(ttl),
        })
    }

    /// Presigned get URL for one object key.
    pub fn mint_get_url(
        &self,
        key: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, S3Error> {
        Self::check_prefix(key)?;
        let ttl = self.clamp_ttl(ttl_secs)?;
        let url = sigv4::presign_get_url(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.bucket,
            &self.config.region,
            key,
            &[],
            ttl,
            now,
        );
        Ok(SignedUrl {
            url,
            expiry: now + Duration::seconds(ttl),
        })
    }
}
