//! Request authentication pipeline.
//!
//! The order is fixed and input-independent: field checks, timestamp skew,
//! signature, chain registration, role requirements. Nothing in the request
//! body can reorder or skip a step, and rate-limit quota is only consumed
//! after this pipeline succeeds.

use chrono::{DateTime, Utc};
use gateway_chain::{ChainView, Lookup, MetagraphSource, Verifier};
use gateway_core::{AuthContext, Commitment, GatewayError, Purpose, RegistrationInfo, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Authentication pipeline configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub netuid: u16,
    pub timestamp_skew_secs: i64,
    /// Stake floor for validator endpoints, in TAO. `None` disables the check.
    pub validator_min_stake_tao: Option<f64>,
    pub signature_timeout: Duration,
    /// Deadline for the direct chain query used when the snapshot is stale.
    pub chain_query_timeout: Duration,
    /// Single explicit flag: when the snapshot is unavailable, either query
    /// the chain directly (true) or fail closed with a 503 (false).
    pub chain_fallback_enabled: bool,
}

/// Runs the fixed five-step pipeline for every authenticated request.
pub struct Authenticator {
    view: Arc<ChainView>,
    source: Arc<dyn MetagraphSource>,
    verifier: Verifier,
    config: AuthConfig,
    /// Bounds concurrent direct chain queries.
    fallback_permits: Semaphore,
}

impl Authenticator {
    pub fn new(
        view: Arc<ChainView>,
        source: Arc<dyn MetagraphSource>,
        verifier: Verifier,
        config: AuthConfig,
    ) -> Self {
        Self {
            view,
            source,
            verifier,
            config,
            fallback_permits: Semaphore::new(2),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate one request.
    ///
    /// `signer_hotkey` and `signature_hex` are the wire fields; `commitment`
    /// was built by the handler from the same request.
    pub async fn authenticate(
        &self,
        commitment: &Commitment,
        signer_hotkey: &str,
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthContext, GatewayError> {
        // 1. Field checks.
        if signer_hotkey.is_empty() {
            return Err(GatewayError::AuthMalformed("hotkey is required".into()));
        }
        if signature_hex.is_empty() {
            return Err(GatewayError::AuthMalformed("signature is required".into()));
        }
        if let Purpose::MinerDataAccess { hotkey, coldkey } = &commitment.purpose {
            if hotkey != signer_hotkey {
                return Err(GatewayError::AuthMalformed(
                    "commitment hotkey does not match request hotkey".into(),
                ));
            }
            if coldkey.is_empty() {
                return Err(GatewayError::AuthMalformed("coldkey is required".into()));
            }
        }

        // 2. Freshness.
        commitment.check_skew(now.timestamp(), self.config.timestamp_skew_secs)?;

        // 3. Signature, CPU-bound but deadline-guarded.
        let verified = {
            let verifier = self.verifier;
            let hotkey = signer_hotkey.to_string();
            let message = commitment.message();
            let signature = signature_hex.to_string();
            tokio::time::timeout(
                self.config.signature_timeout,
                tokio::task::spawn_blocking(move || {
                    verifier.verify_hex(&hotkey, message.as_bytes(), &signature)
                }),
            )
            .await
            .map_err(|_| {
                GatewayError::DependencyUnavailable("signature verification timed out".into())
            })?
            .map_err(|e| GatewayError::Internal(e.to_string()))?
        };
        if !verified {
            warn!("Signature verification failed for {}", signer_hotkey);
            return Err(GatewayError::AuthSignature);
        }

        // 4. Registration.
        let registration = self.resolve_registration(signer_hotkey, now).await?;

        // 5. Role requirements.
        if commitment.role() == Role::Validator {
            if !registration.validator {
                warn!("Validator endpoint denied for non-validator {}", signer_hotkey);
                return Err(GatewayError::AuthNotValidator);
            }
            if let Some(floor) = self.config.validator_min_stake_tao {
                if registration.stake_tao() < floor {
                    return Err(GatewayError::AuthStake);
                }
            }
        }

        let coldkey = match &commitment.purpose {
            Purpose::MinerDataAccess { coldkey, .. } => Some(coldkey.clone()),
            _ => None,
        };

        Ok(AuthContext {
            role: commitment.role(),
            hotkey: signer_hotkey.to_string(),
            coldkey,
            registration,
        })
    }

    async fn resolve_registration(
        &self,
        hotkey: &str,
        now: DateTime<Utc>,
    ) -> Result<RegistrationInfo, GatewayError> {
        match self.view.lookup(hotkey, now) {
            Lookup::Registered(info) => Ok(info),
            Lookup::NotFound => Err(GatewayError::AuthUnknownKey),
            Lookup::Unavailable => {
                if !self.config.chain_fallback_enabled {
                    return Err(GatewayError::DependencyUnavailable(
                        "chain snapshot unavailable".into(),
                    ));
                }
                self.direct_chain_lookup(hotkey).await
            }
        }
    }

    /// Timeout-guarded direct chain query, bounded by a small permit pool so
    /// a slow chain cannot pile up requests.
    async fn direct_chain_lookup(&self, hotkey: &str) -> Result<RegistrationInfo, GatewayError> {
        let _permit = self.fallback_permits.try_acquire().map_err(|_| {
            GatewayError::DependencyUnavailable("chain fallback saturated".into())
        })?;

        let metagraph = tokio::time::timeout(
            self.config.chain_query_timeout,
            self.source.fetch(self.config.netuid),
        )
        .await
        .map_err(|_| GatewayError::DependencyUnavailable("chain query timed out".into()))?
        .map_err(|e| GatewayError::DependencyUnavailable(format!("chain query failed: {e}")))?;

        let found = metagraph.neurons.get(hotkey).copied();
        // The fresh fetch doubles as a snapshot refresh for everyone else.
        self.view.publish(metagraph);
        found.ok_or(GatewayError::AuthUnknownKey)
    }
}
