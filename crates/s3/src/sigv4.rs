//! AWS Signature Version 4 primitives.
//!
//! Implements the two signing flows the gateway needs: query-string
//! presigned URLs (list/get) and browser POST policies. Both are pure
//! functions of the configuration, the clock and the request shape.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Everything except unreserved characters gets percent-encoded.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Like [`URI_ENCODE`] but keeps `/`, for encoding object-key paths.
const URI_ENCODE_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

pub(crate) fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE).to_string()
}

pub(crate) fn uri_encode_path(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_PATH).to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// SigV4 key derivation chain for one (date, region, service).
pub(crate) fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// `YYYYMMDD` and `YYYYMMDDTHHMMSSZ` stamps for one instant.
pub(crate) fn timestamps(now: DateTime<Utc>) -> (String, String) {
    (
        now.format("%Y%m%d").to_string(),
        now.format("%Y%m%dT%H%M%SZ").to_string(),
    )
}

pub(crate) fn credential_scope(access_key: &str, date: &str, region: &str) -> String {
    format!("{access_key}/{date}/{region}/s3/aws4_request")
}

/// Build a presigned URL for a GET against the bucket's virtual-host
/// endpoint. `path` is `""` for bucket-level operations (list) or the
/// object key; `query` holds the operation parameters.
pub(crate) fn presign_get_url(
    access_key: &str,
    secret_key: &str,
    bucket: &str,
    region: &str,
    path: &str,
    query: &[(String, String)],
    expires_secs: i64,
    now: DateTime<Utc>,
) -> String {
    let host = format!("{bucket}.s3.{region}.amazonaws.com");
    let (date, amz_date) = timestamps(now);
    let scope = credential_scope(access_key, &date, region);

    let canonical_path = if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", uri_encode_path(path))
    };

    let mut params: Vec<(String, String)> = vec![
        ("X-Amz-Algorithm".to_string(), "AWS4-HMAC-SHA256".to_string()),
        ("X-Amz-Credential".to_string(), scope.clone()),
        ("X-Amz-Date".to_string(), amz_date.clone()),
        ("X-Amz-Expires".to_string(), expires_secs.to_string()),
        ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
    ];
    params.extend(query.iter().cloned());
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_request = format!(
        "GET\n{canonical_path}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD"
    );

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{date}/{region}/s3/aws4_request\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(secret_key, &date, region, "s3");
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!("https://{host}{canonical_path}?{canonical_query}&X-Amz-Signature={signature}")
}

/// A browser POST policy: the JSON policy document (base64) plus its
/// signature and the fixed form fields.
pub(crate) struct SignedPostPolicy {
    pub policy_b64: String,
    pub signature: String,
    pub amz_date: String,
    pub credential: String,
}

pub(crate) fn sign_post_policy(
    access_key: &str,
    secret_key: &str,
    region: &str,
    policy_document: &serde_json::Value,
    now: DateTime<Utc>,
) -> SignedPostPolicy {
    let (date, amz_date) = timestamps(now);
    let policy_b64 =
        base64::engine::general_purpose::STANDARD.encode(policy_document.to_string());
    let key = signing_key(secret_key, &date, region, "s3");
    let signature = hex::encode(hmac_sha256(&key, policy_b64.as_bytes()));
    SignedPostPolicy {
        policy_b64,
        signature,
        amz_date,
        credential: credential_scope(access_key, &date, region),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        let a = signing_key("secret", "20250601", "us-east-2", "s3");
        let b = signing_key("secret", "20250601", "us-east-2", "s3");
        assert_eq!(a, b);
        let c = signing_key("secret", "20250602", "us-east-2", "s3");
        assert_ne!(a, c);
    }

    #[test]
    fn test_uri_encode_aws_charset() {
        assert_eq!(uri_encode("data/hotkey=5Abc"), "data%2Fhotkey%3D5Abc");
        assert_eq!(uri_encode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(uri_encode_path("data/hotkey=5Abc/"), "data/hotkey%3D5Abc/");
    }

    #[test]
    fn test_timestamps_format() {
        let (date, amz) = timestamps(t0());
        assert_eq!(date, "20250601");
        assert_eq!(amz, "20250601T120000Z");
    }

    #[test]
    fn test_presigned_url_shape() {
        let url = presign_get_url(
            "AKIAEXAMPLE",
            "secret",
            "test-bucket",
            "us-east-2",
            "",
            &[
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), "data/hotkey=5Abc/".to_string()),
            ],
            3600,
            t0(),
        );
        assert!(url.starts_with("https://test-bucket.s3.us-east-2.amazonaws.com/?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("prefix=data%2Fhotkey%3D5Abc%2F"));
        assert!(url.contains("X-Amz-Signature="));
        // Signed query parameters must be sorted; the signature itself is
        // appended last.
        let query = url.split('?').nth(1).unwrap();
        let keys: Vec<&str> = query
            .split('&')
            .map(|kv| kv.split('=').next().unwrap())
            .collect();
        assert_eq!(keys.last(), Some(&"X-Amz-Signature"));
        let signed = &keys[..keys.len() - 1];
        let mut sorted = signed.to_vec();
        sorted.sort_unstable();
        assert_eq!(signed, &sorted[..]);
    }

    #[test]
    fn test_presigned_url_is_deterministic() {
        let build = || {
            presign_get_url(
                "AK",
                "sk",
                "b",
                "us-east-2",
                "",
                &[("prefix".to_string(), "data/".to_string())],
                60,
                t0(),
            )
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_post_policy_signature_binds_document() {
        let doc = serde_json::json!({
            "expiration": "2025-06-01T13:00:00Z",
            "conditions": [["starts-with", "$key", "data/hotkey=5Abc/"]],
        });
        let signed = sign_post_policy("AK", "sk", "us-east-2", &doc, t0());
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&signed.policy_b64)
            .unwrap();
        let round: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(round, doc);
        assert_eq!(signed.signature.len(), 64);
        assert_eq!(signed.credential, "AK/20250601/us-east-2/s3/aws4_request");

        let other = serde_json::json!({"expiration": "2025-06-01T13:00:00Z", "conditions": []});
        let signed_other = sign_post_policy("AK", "sk", "us-east-2", &other, t0());
        assert_ne!(signed.signature, signed_other.signature);
    }
}
