//! Row types for the zipcode system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

/// Market classification of a zipcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTier {
    Premium,
    Standard,
    Emerging,
}

impl MarketTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketTier::Premium => "premium",
            MarketTier::Standard => "standard",
            MarketTier::Emerging => "emerging",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "premium" => Ok(MarketTier::Premium),
            "standard" => Ok(MarketTier::Standard),
            "emerging" => Ok(MarketTier::Emerging),
            other => Err(format!("unknown market tier: {other}")),
        }
    }
}

/// Epoch lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochStatus {
    Pending,
    Active,
    Completed,
    Archived,
}

impl EpochStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochStatus::Pending => "pending",
            EpochStatus::Active => "active",
            EpochStatus::Completed => "completed",
            EpochStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "pending" => Ok(EpochStatus::Pending),
            "active" => Ok(EpochStatus::Active),
            "completed" => Ok(EpochStatus::Completed),
            "archived" => Ok(EpochStatus::Archived),
            other => Err(format!("unknown epoch status: {other}")),
        }
    }
}

/// Master record for one zipcode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZipcodeRecord {
    pub zipcode: String,
    pub state: String,
    pub city: String,
    pub county: Option<String>,
    pub population: Option<i32>,
    pub median_home_value: Option<i64>,
    pub expected_listings: i32,
    pub market_tier: MarketTier,
    pub last_assigned: Option<DateTime<Utc>>,
    pub assignment_count: i32,
    pub base_selection_weight: f64,
    pub data_updated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl<'r> FromRow<'r, PgRow> for ZipcodeRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let tier: String = row.try_get("market_tier")?;
        Ok(Self {
            zipcode: row.try_get("zipcode")?,
            state: row.try_get("state")?,
            city: row.try_get("city")?,
            county: row.try_get("county")?,
            population: row.try_get("population")?,
            median_home_value: row.try_get("median_home_value")?,
            expected_listings: row.try_get("expected_listings")?,
            market_tier: MarketTier::parse(&tier).map_err(decode_err)?,
            last_assigned: row.try_get("last_assigned")?,
            assignment_count: row.try_get("assignment_count")?,
            base_selection_weight: row.try_get("base_selection_weight")?,
            data_updated_at: row.try_get("data_updated_at")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// A 4-hour assignment window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Epoch {
    /// `YYYY-MM-DD-HH:MM`, aligned to the 4-hour UTC grid.
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 16-byte HMAC output, hex encoded.
    pub nonce: String,
    pub target_listings: i32,
    pub tolerance_percent: i32,
    pub status: EpochStatus,
    pub created_at: DateTime<Utc>,
    /// PRNG seed used for the selection, kept for recomputation.
    pub selection_seed: i64,
    pub algorithm_version: String,
    /// Set when the selection could not land inside the tolerance band.
    pub degraded: bool,
}

impl<'r> FromRow<'r, PgRow> for Epoch {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            nonce: row.try_get("nonce")?,
            target_listings: row.try_get("target_listings")?,
            tolerance_percent: row.try_get("tolerance_percent")?,
            status: EpochStatus::parse(&status).map_err(decode_err)?,
            created_at: row.try_get("created_at")?,
            selection_seed: row.try_get("selection_seed")?,
            algorithm_version: row.try_get("algorithm_version")?,
            degraded: row.try_get("degraded")?,
        })
    }
}

/// One zipcode inside one epoch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochAssignment {
    pub epoch_id: String,
    pub zipcode: String,
    pub expected_listings: i32,
    pub state: String,
    pub city: String,
    pub county: Option<String>,
    pub market_tier: MarketTier,
    pub selection_weight: f64,
    pub is_honeypot: bool,
}

impl<'r> FromRow<'r, PgRow> for EpochAssignment {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let tier: String = row.try_get("market_tier")?;
        Ok(Self {
            epoch_id: row.try_get("epoch_id")?,
            zipcode: row.try_get("zipcode")?,
            expected_listings: row.try_get("expected_listings")?,
            state: row.try_get("state")?,
            city: row.try_get("city")?,
            county: row.try_get("county")?,
            market_tier: MarketTier::parse(&tier).map_err(decode_err)?,
            selection_weight: row.try_get("selection_weight")?,
            is_honeypot: row.try_get("is_honeypot")?,
        })
    }
}

/// Audit row recorded when a validator mints upload credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub id: uuid::Uuid,
    pub epoch_id: String,
    pub validator_hotkey: String,
    pub validation_time: DateTime<Utc>,
    pub miners_evaluated: Option<i32>,
    pub top_miners: Option<serde_json::Value>,
    pub total_listings: Option<i32>,
    pub upload_path: String,
    pub status: String,
}

impl<'r> FromRow<'r, PgRow> for ValidatorResult {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            epoch_id: row.try_get("epoch_id")?,
            validator_hotkey: row.try_get("validator_hotkey")?,
            validation_time: row.try_get("validation_time")?,
            miners_evaluated: row.try_get("miners_evaluated")?,
            top_miners: row.try_get("top_miners")?,
            total_listings: row.try_get("total_listings")?,
            upload_path: row.try_get("upload_path")?,
            status: row.try_get("status")?,
        })
    }
}

/// Filter for `queries::eligible_zipcodes`.
#[derive(Clone, Debug)]
pub struct EligibilityFilter {
    pub min_listings: i32,
    pub max_listings: i32,
    /// Rows assigned at or after this instant are still cooling down.
    pub cooldown_cutoff: DateTime<Utc>,
    /// Rows whose data is older than this are dropped.
    pub data_age_cutoff: DateTime<Utc>,
    /// Only states with a configured priority take part.
    pub states: Vec<String>,
}

/// Per-state aggregate used by the stats endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct StateBucket {
    pub state: String,
    pub zipcode_count: i64,
    pub total_expected_listings: i64,
}

impl<'r> FromRow<'r, PgRow> for StateBucket {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            state: row.try_get("state")?,
            zipcode_count: row.try_get("zipcode_count")?,
            total_expected_listings: row.try_get("total_expected_listings")?,
        })
    }
}

/// Per-tier aggregate used by the stats endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct TierBucket {
    pub market_tier: String,
    pub zipcode_count: i64,
    pub avg_expected_listings: f64,
}

impl<'r> FromRow<'r, PgRow> for TierBucket {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            market_tier: row.try_get("market_tier")?,
            zipcode_count: row.try_get("zipcode_count")?,
            avg_expected_listings: row.try_get("avg_expected_listings")?,
        })
    }
}

/// Zipcode availability summary.
#[derive(Clone, Debug, Serialize)]
pub struct ZipcodeStats {
    pub total_zipcodes: i64,
    pub active_zipcodes: i64,
    pub eligible_zipcodes: i64,
    pub state_distribution: Vec<StateBucket>,
    pub tier_distribution: Vec<TierBucket>,
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_tier_round_trip() {
        for tier in [MarketTier::Premium, MarketTier::Standard, MarketTier::Emerging] {
            assert_eq!(MarketTier::parse(tier.as_str()).unwrap(), tier);
        }
        assert!(MarketTier::parse("luxury").is_err());
    }

    #[test]
    fn test_epoch_status_round_trip() {
        for status in [
            EpochStatus::Pending,
            EpochStatus::Active,
            EpochStatus::Completed,
            EpochStatus::Archived,
        ] {
            assert_eq!(EpochStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(EpochStatus::parse("expired").is_err());
    }

    #[test]
    fn test_tier_serde_lowercase() {
        let json = serde_json::to_string(&MarketTier::Premium).unwrap();
        assert_eq!(json, "\"premium\"");
        let back: MarketTier = serde_json::from_str("\"emerging\"").unwrap();
        assert_eq!(back, MarketTier::Emerging);
    }
}
