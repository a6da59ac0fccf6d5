//! Server configuration.
//!
//! Every knob in one clap struct, filled from flags or the environment
//! keys the deployment recognizes. Typed sub-configs for the individual
//! layers are derived from this.

use crate::auth::AuthConfig;
use crate::ratelimit::RateLimits;
use clap::Parser;
use gateway_chain::SignatureScheme;
use gateway_epoch::{SchedulerConfig, SelectorConfig};
use gateway_s3::minter::S3Config;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "gateway-server")]
#[command(about = "Credential and assignment gateway for the Resi subnet")]
pub struct Args {
    /// Server port
    #[arg(long, default_value = "8000", env = "PORT")]
    pub port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    // --- chain ---
    /// Target subnet
    #[arg(long, default_value = "46", env = "NET_UID")]
    pub netuid: u16,

    /// Chain network name (finney, test, local)
    #[arg(long, default_value = "finney", env = "BT_NETWORK")]
    pub bt_network: String,

    /// Explicit subtensor JSON-RPC endpoint; overrides the network default
    #[arg(long, env = "SUBTENSOR_ENDPOINT")]
    pub subtensor_endpoint: Option<String>,

    /// Signature scheme of the chain (sr25519 or ed25519)
    #[arg(long, default_value = "sr25519", env = "SIGNATURE_SCHEME")]
    pub signature_scheme: String,

    /// Metagraph sync period, seconds
    #[arg(long, default_value = "300", env = "METAGRAPH_SYNC_INTERVAL")]
    pub metagraph_sync_interval: u64,

    /// Snapshot age after which lookups degrade, seconds
    #[arg(long, default_value = "900", env = "METAGRAPH_MAX_STALE_SECONDS")]
    pub metagraph_max_stale: i64,

    /// Query the chain directly when the snapshot is unavailable
    #[arg(
        long,
        default_value_t = false,
        action = clap::ArgAction::Set,
        env = "CHAIN_FALLBACK_ENABLED"
    )]
    pub chain_fallback_enabled: bool,

    /// Stake floor for validator endpoints, in TAO (unset disables)
    #[arg(long, env = "VALIDATOR_MIN_STAKE")]
    pub validator_min_stake: Option<f64>,

    // --- object store ---
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    #[arg(long, default_value = "us-east-2", env = "S3_REGION")]
    pub s3_region: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY")]
    pub aws_secret_access_key: String,

    /// Upper bound on minted credential lifetimes, seconds
    #[arg(long, default_value = "86400", env = "MAX_CREDENTIAL_TTL_SECONDS")]
    pub max_credential_ttl_seconds: i64,

    /// Validator upload credential lifetime, seconds
    #[arg(long, default_value = "14400", env = "VALIDATOR_UPLOAD_TTL_SECONDS")]
    pub validator_upload_ttl_seconds: i64,

    // --- rate limiting ---
    #[arg(long, default_value = "20", env = "DAILY_LIMIT_PER_MINER")]
    pub daily_limit_per_miner: u64,

    #[arg(long, default_value = "10000", env = "DAILY_LIMIT_PER_VALIDATOR")]
    pub daily_limit_per_validator: u64,

    #[arg(long, default_value = "1000", env = "DAILY_LIMIT_PER_IP")]
    pub daily_limit_per_ip: u64,

    #[arg(long, default_value = "200000", env = "TOTAL_DAILY_LIMIT")]
    pub total_daily_limit: u64,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "ENABLE_RATE_LIMITING"
    )]
    pub enable_rate_limiting: bool,

    // --- timeouts ---
    #[arg(long, default_value = "120", env = "VALIDATOR_VERIFICATION_TIMEOUT")]
    pub validator_verification_timeout: u64,

    #[arg(long, default_value = "60", env = "SIGNATURE_VERIFICATION_TIMEOUT")]
    pub signature_verification_timeout: u64,

    #[arg(long, default_value = "60", env = "S3_OPERATION_TIMEOUT")]
    pub s3_operation_timeout: u64,

    /// Accepted clock skew on request timestamps, seconds
    #[arg(long, default_value = "300", env = "TIMESTAMP_SKEW_SECONDS")]
    pub timestamp_skew_seconds: i64,

    // --- zipcode selection ---
    #[arg(long, default_value = "10000", env = "TARGET_LISTINGS")]
    pub target_listings: i32,

    #[arg(long, default_value = "10", env = "TOLERANCE_PERCENT")]
    pub tolerance_percent: u32,

    #[arg(long, default_value = "200", env = "MIN_ZIPCODE_LISTINGS")]
    pub min_zipcode_listings: i32,

    #[arg(long, default_value = "3000", env = "MAX_ZIPCODE_LISTINGS")]
    pub max_zipcode_listings: i32,

    #[arg(long, default_value = "24", env = "COOLDOWN_HOURS")]
    pub cooldown_hours: i64,

    #[arg(long, default_value = "30", env = "MAX_DATA_AGE_DAYS")]
    pub max_data_age_days: i64,

    /// State priorities, e.g. `PA:1,NJ:2,NY:3`
    #[arg(long, default_value = "PA:1,NJ:2,NY:3,DE:4,MD:5", env = "STATE_PRIORITIES")]
    pub state_priorities: String,

    #[arg(long, default_value = "1.5", env = "PREMIUM_WEIGHT")]
    pub premium_weight: f64,

    #[arg(long, default_value = "1.0", env = "STANDARD_WEIGHT")]
    pub standard_weight: f64,

    #[arg(long, default_value = "0.8", env = "EMERGING_WEIGHT")]
    pub emerging_weight: f64,

    /// Selection randomness α in [0, 1]
    #[arg(long, default_value = "0.25", env = "SELECTION_RANDOMNESS")]
    pub selection_randomness: f64,

    #[arg(long, default_value = "0.3", env = "HONEYPOT_PROBABILITY")]
    pub honeypot_probability: f64,

    #[arg(long, default_value = "50", env = "HONEYPOT_THRESHOLD")]
    pub honeypot_threshold: i32,

    /// Secret key for epoch seeds and nonces
    #[arg(long, env = "ZIPCODE_SECRET_KEY")]
    pub zipcode_secret_key: String,

    /// Completed epochs are archived after this many days
    #[arg(long, default_value = "7", env = "EPOCH_RETENTION_DAYS")]
    pub epoch_retention_days: i64,

    // --- backing stores ---
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, default_value = "redis://localhost:6379/0", env = "REDIS_URL")]
    pub redis_url: String,
}

impl Args {
    /// Subtensor endpoint: explicit override, else the network default.
    pub fn chain_endpoint(&self) -> String {
        if let Some(endpoint) = &self.subtensor_endpoint {
            return endpoint.clone();
        }
        match self.bt_network.as_str() {
            "test" => "https://test.finney.opentensor.ai".to_string(),
            "local" => "http://127.0.0.1:9944".to_string(),
            _ => "https://entrypoint-finney.opentensor.ai".to_string(),
        }
    }

    pub fn signature_scheme(&self) -> Result<SignatureScheme, String> {
        self.signature_scheme.parse()
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            netuid: self.netuid,
            timestamp_skew_secs: self.timestamp_skew_seconds,
            validator_min_stake_tao: self.validator_min_stake,
            signature_timeout: Duration::from_secs(self.signature_verification_timeout),
            chain_query_timeout: Duration::from_secs(self.validator_verification_timeout),
            chain_fallback_enabled: self.chain_fallback_enabled,
        }
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            per_miner: self.daily_limit_per_miner,
            per_validator: self.daily_limit_per_validator,
            per_ip: self.daily_limit_per_ip,
            global: self.total_daily_limit,
        }
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            bucket: self.s3_bucket.clone(),
            region: self.s3_region.clone(),
            access_key: self.aws_access_key_id.clone(),
            secret_key: self.aws_secret_access_key.clone(),
            max_credential_ttl_secs: self.max_credential_ttl_seconds,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            target_listings: self.target_listings,
            tolerance_percent: self.tolerance_percent,
            min_zipcode_listings: self.min_zipcode_listings,
            max_zipcode_listings: self.max_zipcode_listings,
            cooldown_hours: self.cooldown_hours,
            max_data_age_days: self.max_data_age_days,
            premium_weight: self.premium_weight,
            standard_weight: self.standard_weight,
            emerging_weight: self.emerging_weight,
            state_priorities: gateway_epoch::selector::parse_state_priorities(
                &self.state_priorities,
            ),
            selection_randomness: self.selection_randomness,
            honeypot_probability: self.honeypot_probability,
            honeypot_threshold: self.honeypot_threshold,
            secret_key: self.zipcode_secret_key.clone(),
            algorithm_version: "v1.0".to_string(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            retention_days: self.epoch_retention_days,
            ..SchedulerConfig::default()
        }
    }
}
