//! Shared application state.

use crate::auth::Authenticator;
use crate::monitor::Monitor;
use crate::ratelimit::RateLimiter;
use gateway_chain::ChainView;
use gateway_epoch::EpochScheduler;
use gateway_s3::{CredentialMinter, ValidatorUploadService};
use gateway_store::DbPool;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs, behind one `Arc`.
pub struct AppState {
    pub auth: Authenticator,
    pub limiter: RateLimiter,
    pub minter: CredentialMinter,
    pub uploads: ValidatorUploadService,
    pub scheduler: Arc<EpochScheduler>,
    pub chain: Arc<ChainView>,
    pub db: DbPool,
    pub monitor: Monitor,
    /// Copy of the parsed configuration for endpoints that echo it.
    pub config: crate::config::Args,
    /// Client used for dependency probes (object store reachability).
    pub probe_client: reqwest::Client,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Authenticator,
        limiter: RateLimiter,
        minter: CredentialMinter,
        uploads: ValidatorUploadService,
        scheduler: Arc<EpochScheduler>,
        chain: Arc<ChainView>,
        db: DbPool,
        config: crate::config::Args,
    ) -> anyhow::Result<Self> {
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            auth,
            limiter,
            minter,
            uploads,
            scheduler,
            chain,
            db,
            monitor: Monitor::new(),
            config,
            probe_client,
        })
    }
}
