//! Commitment grammar.
//!
//! A commitment is the canonical string a peer signs to prove purpose and
//! freshness of a request. The set of purposes is closed; anything that does
//! not parse against one of the templates below is rejected before any
//! cryptography runs.
//!
//! Templates:
//!
//! ```text
//! s3:data:access:{coldkey}:{hotkey}:{timestamp}
//! s3:validator:access:{timestamp}
//! s3:validator:upload:{timestamp}
//! zipcode:assignment:current:{timestamp}
//! zipcode:validation:{epoch_id}:{timestamp}
//! ```

use crate::error::{GatewayError, Result};
use crate::types::Role;
use serde::{Deserialize, Serialize};

/// What a signed commitment authorizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    /// Miner requesting upload access to its own folder.
    MinerDataAccess { coldkey: String, hotkey: String },
    /// Validator requesting global read access.
    ValidatorAccess,
    /// Validator requesting write access to its results prefix.
    ValidatorUpload,
    /// Miner fetching the current zipcode assignment.
    AssignmentCurrent,
    /// Validator fetching a historical epoch assignment.
    AssignmentHistorical { epoch_id: String },
}

/// A parsed (or freshly built) commitment: purpose plus unix timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    pub purpose: Purpose,
    pub timestamp: i64,
}

impl Commitment {
    pub fn miner_data_access(coldkey: &str, hotkey: &str, timestamp: i64) -> Self {
        Self {
            purpose: Purpose::MinerDataAccess {
                coldkey: coldkey.to_string(),
                hotkey: hotkey.to_string(),
            },
            timestamp,
        }
    }

    pub fn validator_access(timestamp: i64) -> Self {
        Self {
            purpose: Purpose::ValidatorAccess,
            timestamp,
        }
    }

    pub fn validator_upload(timestamp: i64) -> Self {
        Self {
            purpose: Purpose::ValidatorUpload,
            timestamp,
        }
    }

    pub fn assignment_current(timestamp: i64) -> Self {
        Self {
            purpose: Purpose::AssignmentCurrent,
            timestamp,
        }
    }

    pub fn assignment_historical(epoch_id: &str, timestamp: i64) -> Self {
        Self {
            purpose: Purpose::AssignmentHistorical {
                epoch_id: epoch_id.to_string(),
            },
            timestamp,
        }
    }

    /// The role this purpose is reserved for.
    pub fn role(&self) -> Role {
        match &self.purpose {
            Purpose::MinerDataAccess { .. } | Purpose::AssignmentCurrent => Role::Miner,
            Purpose::ValidatorAccess
            | Purpose::ValidatorUpload
            | Purpose::AssignmentHistorical { .. } => Role::Validator,
        }
    }

    /// Canonical string, the exact bytes the hotkey signs.
    pub fn message(&self) -> String {
        match &self.purpose {
            Purpose::MinerDataAccess { coldkey, hotkey } => {
                format!("s3:data:access:{}:{}:{}", coldkey, hotkey, self.timestamp)
            }
            Purpose::ValidatorAccess => format!("s3:validator:access:{}", self.timestamp),
            Purpose::ValidatorUpload => format!("s3:validator:upload:{}", self.timestamp),
            Purpose::AssignmentCurrent => {
                format!("zipcode:assignment:current:{}", self.timestamp)
            }
            Purpose::AssignmentHistorical { epoch_id } => {
                format!("zipcode:validation:{}:{}", epoch_id, self.timestamp)
            }
        }
    }

    /// Parse a commitment string against the closed template set.
    ///
    /// Epoch ids contain a colon (`YYYY-MM-DD-HH:MM`), so the historical
    /// template takes everything between the fixed prefix and the trailing
    /// timestamp as the id.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let malformed = || GatewayError::AuthMalformed(format!("unrecognized commitment: {raw}"));

        match parts.as_slice() {
            ["s3", "data", "access", coldkey, hotkey, ts] => {
                if coldkey.is_empty() || hotkey.is_empty() {
                    return Err(malformed());
                }
                Ok(Self::miner_data_access(coldkey, hotkey, parse_ts(ts)?))
            }
            ["s3", "validator", "access", ts] => Ok(Self::validator_access(parse_ts(ts)?)),
            ["s3", "validator", "upload", ts] => Ok(Self::validator_upload(parse_ts(ts)?)),
            ["zipcode", "assignment", "current", ts] => {
                Ok(Self::assignment_current(parse_ts(ts)?))
            }
            ["zipcode", "validation", rest @ .., ts] if !rest.is_empty() => {
                let epoch_id = rest.join(":");
                Ok(Self::assignment_historical(&epoch_id, parse_ts(ts)?))
            }
            _ => Err(malformed()),
        }
    }

    /// Freshness check: rejects when `|now − ts|` exceeds the window.
    pub fn check_skew(&self, now: i64, max_skew_secs: i64) -> Result<()> {
        if (now - self.timestamp).abs() > max_skew_secs {
            return Err(GatewayError::AuthSkew);
        }
        Ok(())
    }
}

fn parse_ts(raw: &str) -> Result<i64> {
    let ts: i64 = raw
        .parse()
        .map_err(|_| GatewayError::AuthMalformed(format!("invalid timestamp: {raw}")))?;
    if ts < 0 {
        return Err(GatewayError::AuthMalformed(format!(
            "invalid timestamp: {raw}"
        )));
    }
    Ok(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miner_message_round_trip() {
        let c = Commitment::miner_data_access("5CK...cold", "5HK...hot", 1_700_000_000);
        let msg = c.message();
        assert_eq!(msg, "s3:data:access:5CK...cold:5HK...hot:1700000000");
        assert_eq!(Commitment::parse(&msg).unwrap(), c);
    }

    #[test]
    fn test_validator_access_round_trip() {
        let c = Commitment::validator_access(1_700_000_000);
        assert_eq!(c.message(), "s3:validator:access:1700000000");
        assert_eq!(Commitment::parse(&c.message()).unwrap(), c);
    }

    #[test]
    fn test_validator_upload_round_trip() {
        let c = Commitment::validator_upload(42);
        assert_eq!(Commitment::parse(&c.message()).unwrap(), c);
    }

    #[test]
    fn test_assignment_current_round_trip() {
        let c = Commitment::assignment_current(42);
        assert_eq!(c.message(), "zipcode:assignment:current:42");
        assert_eq!(Commitment::parse(&c.message()).unwrap(), c);
    }

    #[test]
    fn test_historical_epoch_id_keeps_colon() {
        let c = Commitment::assignment_historical("2025-06-01-04:00", 1_700_000_000);
        let msg = c.message();
        assert_eq!(msg, "zipcode:validation:2025-06-01-04:00:1700000000");
        let parsed = Commitment::parse(&msg).unwrap();
        assert_eq!(
            parsed.purpose,
            Purpose::AssignmentHistorical {
                epoch_id: "2025-06-01-04:00".to_string()
            }
        );
        assert_eq!(parsed.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_parse_rejects_unknown_template() {
        assert!(Commitment::parse("s3:data:write:a:b:1").is_err());
        assert!(Commitment::parse("").is_err());
        assert!(Commitment::parse("s3:validator:access").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        assert!(Commitment::parse("s3:validator:access:not-a-number").is_err());
        assert!(Commitment::parse("s3:validator:access:-5").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_keys() {
        assert!(Commitment::parse("s3:data:access::hot:1700000000").is_err());
        assert!(Commitment::parse("s3:data:access:cold::1700000000").is_err());
    }

    #[test]
    fn test_roles() {
        assert_eq!(Commitment::assignment_current(1).role(), Role::Miner);
        assert_eq!(Commitment::validator_upload(1).role(), Role::Validator);
        assert_eq!(
            Commitment::assignment_historical("2025-06-01-00:00", 1).role(),
            Role::Validator
        );
    }

    #[test]
    fn test_skew_window_is_symmetric() {
        let c = Commitment::validator_access(1000);
        assert!(c.check_skew(1300, 300).is_ok());
        assert!(c.check_skew(700, 300).is_ok());
        assert!(c.check_skew(1301, 300).is_err());
        assert!(c.check_skew(699, 300).is_err());
    }
}
