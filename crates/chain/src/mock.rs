//! In-memory metagraph source for tests and local development.

use crate::error::ChainError;
use crate::metagraph::Metagraph;
use crate::source::MetagraphSource;
use async_trait::async_trait;
use chrono::Utc;
use gateway_core::RegistrationInfo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`MetagraphSource`] backed by a fixed neuron table.
pub struct MockSource {
    netuid: u16,
    neurons: Mutex<HashMap<String, RegistrationInfo>>,
    fail: AtomicBool,
}

impl MockSource {
    pub fn new(netuid: u16) -> Self {
        Self {
            netuid,
            neurons: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_neuron(self, hotkey: &str, uid: u16, validator: bool, stake_rao: u64) -> Self {
        self.neurons.lock().insert(
            hotkey.to_string(),
            RegistrationInfo {
                uid,
                validator,
                stake_rao,
            },
        );
        self
    }

    pub fn insert(&self, hotkey: &str, uid: u16, validator: bool, stake_rao: u64) {
        self.neurons.lock().insert(
            hotkey.to_string(),
            RegistrationInfo {
                uid,
                validator,
                stake_rao,
            },
        );
    }

    /// Make subsequent fetches fail, to exercise staleness/fallback paths.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetagraphSource for MockSource {
    async fn fetch(&self, netuid: u16) -> Result<Metagraph, ChainError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("mock source set to fail".to_string()));
        }
        if netuid != self.netuid {
            return Err(ChainError::Rpc(format!("unknown netuid {netuid}")));
        }
        let mut metagraph = Metagraph::new(netuid, Utc::now());
        for (hotkey, info) in self.neurons.lock().iter() {
            metagraph.insert(hotkey.clone(), *info);
        }
        Ok(metagraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetch() {
        let source = MockSource::new(46).with_neuron("5Hot", 1, true, 42);
        let mg = source.fetch(46).await.unwrap();
        assert_eq!(mg.len(), 1);
        assert!(mg.neurons["5Hot"].validator);
    }

    #[tokio::test]
    async fn test_mock_failure_switch() {
        let source = MockSource::new(46);
        source.set_failing(true);
        assert!(source.fetch(46).await.is_err());
        source.set_failing(false);
        assert!(source.fetch(46).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_wrong_netuid() {
        let source = MockSource::new(46);
        assert!(source.fetch(1).await.is_err());
    }
}
