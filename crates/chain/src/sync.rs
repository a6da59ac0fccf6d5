//! Background metagraph sync.
//!
//! One long-lived task per process: fetch the metagraph at a fixed interval
//! and publish it into the shared [`ChainView`]. Failures keep the previous
//! snapshot; the view's staleness bound decides when lookups degrade to
//! `Unavailable`.

use crate::error::ChainError;
use crate::metagraph::ChainView;
use crate::source::MetagraphSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Run the initial sync with bounded exponential backoff.
///
/// The service must not accept authenticated requests until this succeeds
/// (unless the chain fallback is explicitly enabled in configuration).
pub async fn initial_sync(
    view: &ChainView,
    source: &dyn MetagraphSource,
    netuid: u16,
    max_attempts: u32,
) -> Result<(), ChainError> {
    let mut delay = Duration::from_secs(1);
    for attempt in 1..=max_attempts {
        match source.fetch(netuid).await {
            Ok(metagraph) => {
                info!(
                    "Initial metagraph sync for netuid {}: {} hotkeys",
                    netuid,
                    metagraph.len()
                );
                view.publish(metagraph);
                return Ok(());
            }
            Err(e) => {
                view.record_failure();
                warn!(
                    "Initial metagraph sync attempt {}/{} failed: {}",
                    attempt, max_attempts, e
                );
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(60));
                }
            }
        }
    }
    Err(ChainError::Unavailable)
}

/// Spawn the periodic sync loop.
pub fn spawn_sync_task(
    view: Arc<ChainView>,
    source: Arc<dyn MetagraphSource>,
    netuid: u16,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the caller already did the
        // initial sync, so skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match source.fetch(netuid).await {
                Ok(metagraph) => {
                    tracing::debug!(
                        "Metagraph sync ok: {} hotkeys for netuid {}",
                        metagraph.len(),
                        netuid
                    );
                    view.publish(metagraph);
                }
                Err(e) => {
                    view.record_failure();
                    warn!("Metagraph sync failed (keeping previous snapshot): {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSource;

    #[tokio::test]
    async fn test_initial_sync_publishes_snapshot() {
        let view = ChainView::new(900);
        let source = MockSource::new(46).with_neuron("5Hot", 0, false, 0);
        initial_sync(&view, &source, 46, 1).await.unwrap();
        assert_eq!(view.hotkeys_count(), 1);
    }

    #[tokio::test]
    async fn test_initial_sync_gives_up_after_attempts() {
        let view = ChainView::new(900);
        let source = MockSource::new(46);
        source.set_failing(true);
        let result = initial_sync(&view, &source, 46, 2).await;
        assert!(result.is_err());
        assert_eq!(view.sync_failures(), 2);
        assert!(view.snapshot().is_none());
    }
}
