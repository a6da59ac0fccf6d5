//! Metagraph sources.
//!
//! The gateway consumes the chain at a minimal surface: fetch the metagraph
//! for one subnet. Production uses [`SubtensorRpc`], which reads the
//! subtensor pallet storage over JSON-RPC (`state_getStorage`); tests use
//! [`crate::MockSource`].

use crate::error::ChainError;
use crate::metagraph::Metagraph;
use async_trait::async_trait;
use chrono::Utc;
use gateway_core::RegistrationInfo;
use parity_scale_codec::Decode;
use sp_core::crypto::Ss58Codec;
use std::time::Duration;

/// Capability to produce a full metagraph for a subnet.
#[async_trait]
pub trait MetagraphSource: Send + Sync {
    async fn fetch(&self, netuid: u16) -> Result<Metagraph, ChainError>;
}

/// Storage layout of the subtensor pallet entries we read.
///
/// Hashers follow the pallet declarations: netuid/uid keyed maps use the
/// identity hasher, hotkey keyed maps use blake2_128_concat.
mod layout {
    use parity_scale_codec::Encode;

    const PALLET: &[u8] = b"SubtensorModule";

    fn prefix(item: &[u8]) -> Vec<u8> {
        let mut key = sp_crypto_hashing::twox_128(PALLET).to_vec();
        key.extend(sp_crypto_hashing::twox_128(item));
        key
    }

    fn identity<K: Encode>(k: &K) -> Vec<u8> {
        k.encode()
    }

    fn blake2_128_concat<K: Encode>(k: &K) -> Vec<u8> {
        let encoded = k.encode();
        let mut out = sp_crypto_hashing::blake2_128(&encoded).to_vec();
        out.extend(encoded);
        out
    }

    /// `SubnetworkN(netuid) -> u16`
    pub fn subnetwork_n(netuid: u16) -> Vec<u8> {
        let mut key = prefix(b"SubnetworkN");
        key.extend(identity(&netuid));
        key
    }

    /// `Keys(netuid, uid) -> AccountId32`
    pub fn keys(netuid: u16, uid: u16) -> Vec<u8> {
        let mut key = prefix(b"Keys");
        key.extend(identity(&netuid));
        key.extend(identity(&uid));
        key
    }

    /// `ValidatorPermit(netuid) -> Vec<bool>`
    pub fn validator_permit(netuid: u16) -> Vec<u8> {
        let mut key = prefix(b"ValidatorPermit");
        key.extend(identity(&netuid));
        key
    }

    /// `TotalHotkeyAlpha(hotkey, netuid) -> u64`
    pub fn total_hotkey_alpha(hotkey: &sp_core::crypto::AccountId32, netuid: u16) -> Vec<u8> {
        let mut key = prefix(b"TotalHotkeyAlpha");
        key.extend(blake2_128_concat(hotkey));
        key.extend(identity(&netuid));
        key
    }
}

/// Metagraph source backed by a subtensor node's JSON-RPC endpoint.
pub struct SubtensorRpc {
    endpoint: String,
    http: reqwest::Client,
}

impl SubtensorRpc {
    /// `endpoint` is an HTTP(S) JSON-RPC URL of a subtensor node.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            http,
        })
    }

    async fn storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "state_getStorage",
            "params": [format!("0x{}", hex::encode(key))],
        });
        let resp: serde_json::Value = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            return Err(ChainError::Rpc(err.to_string()));
        }
        match resp.get("result") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(raw)) => {
                let stripped = raw.strip_prefix("0x").unwrap_or(raw);
                hex::decode(stripped)
                    .map(Some)
                    .map_err(|e| ChainError::Decode(e.to_string()))
            }
            Some(other) => Err(ChainError::Decode(format!(
                "unexpected storage result: {other}"
            ))),
        }
    }

    async fn storage_decode<T: Decode>(&self, key: &[u8]) -> Result<Option<T>, ChainError> {
        match self.storage(key).await? {
            None => Ok(None),
            Some(bytes) => T::decode(&mut bytes.as_slice())
                .map(Some)
                .map_err(|e| ChainError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl MetagraphSource for SubtensorRpc {
    async fn fetch(&self, netuid: u16) -> Result<Metagraph, ChainError> {
        let n: u16 = self
            .storage_decode(&layout::subnetwork_n(netuid))
            .await?
            .ok_or_else(|| ChainError::Rpc(format!("subnet {netuid} not found")))?;

        let permits: Vec<bool> = self
            .storage_decode(&layout::validator_permit(netuid))
            .await?
            .unwrap_or_default();

        let mut metagraph = Metagraph::new(netuid, Utc::now());
        for uid in 0..n {
            let account: sp_core::crypto::AccountId32 =
                match self.storage_decode(&layout::keys(netuid, uid)).await? {
                    Some(account) => account,
                    None => continue,
                };

            let stake_rao: u64 = self
                .storage_decode(&layout::total_hotkey_alpha(&account, netuid))
                .await?
                .unwrap_or(0);

            metagraph.insert(
                account.to_ss58check(),
                RegistrationInfo {
                    uid,
                    validator: permits.get(uid as usize).copied().unwrap_or(false),
                    stake_rao,
                },
            );
        }

        tracing::debug!(
            "Fetched metagraph for netuid {}: {} neurons",
            netuid,
            metagraph.len()
        );
        Ok(metagraph)
    }
}
