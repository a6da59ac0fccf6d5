//! Immutable metagraph snapshots with atomic publication.
//!
//! The sync task builds a full [`Metagraph`] and swaps it in with a single
//! pointer store; readers either see the whole old snapshot or the whole new
//! one. There are no locks on the lookup path.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use gateway_core::RegistrationInfo;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One synced view of the subnet's registered keys.
#[derive(Clone, Debug)]
pub struct Metagraph {
    pub netuid: u16,
    /// SS58 hotkey -> registration facts.
    pub neurons: HashMap<String, RegistrationInfo>,
    pub synced_at: DateTime<Utc>,
}

impl Metagraph {
    pub fn new(netuid: u16, synced_at: DateTime<Utc>) -> Self {
        Self {
            netuid,
            neurons: HashMap::new(),
            synced_at,
        }
    }

    pub fn insert(&mut self, hotkey: String, info: RegistrationInfo) {
        self.neurons.insert(hotkey, info);
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }
}

/// Outcome of a hotkey lookup against the current snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Lookup {
    Registered(RegistrationInfo),
    NotFound,
    /// No snapshot yet, or the snapshot is older than the staleness bound.
    Unavailable,
}

/// Process-wide read-only chain view.
pub struct ChainView {
    snapshot: ArcSwapOption<Metagraph>,
    max_stale: Duration,
    sync_ok: AtomicU64,
    sync_failures: AtomicU64,
}

impl ChainView {
    pub fn new(max_stale_secs: i64) -> Self {
        Self {
            snapshot: ArcSwapOption::const_empty(),
            max_stale: Duration::seconds(max_stale_secs),
            sync_ok: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
        }
    }

    /// Publish a freshly synced snapshot. Monotonic: an older snapshot never
    /// replaces a newer one.
    pub fn publish(&self, metagraph: Metagraph) {
        if let Some(current) = self.snapshot.load_full() {
            if metagraph.synced_at < current.synced_at {
                tracing::warn!(
                    "Discarding out-of-order metagraph snapshot ({} < {})",
                    metagraph.synced_at,
                    current.synced_at
                );
                return;
            }
        }
        self.snapshot.store(Some(Arc::new(metagraph)));
        self.sync_ok.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed sync attempt; the previous snapshot is retained.
    pub fn record_failure(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current snapshot handle, if any.
    pub fn snapshot(&self) -> Option<Arc<Metagraph>> {
        self.snapshot.load_full()
    }

    /// Resolve a hotkey against the current snapshot.
    pub fn lookup(&self, hotkey: &str, now: DateTime<Utc>) -> Lookup {
        match self.snapshot.load_full() {
            None => Lookup::Unavailable,
            Some(mg) if now - mg.synced_at > self.max_stale => Lookup::Unavailable,
            Some(mg) => match mg.neurons.get(hotkey) {
                Some(info) => Lookup::Registered(*info),
                None => Lookup::NotFound,
            },
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load_full().map(|mg| mg.synced_at)
    }

    pub fn hotkeys_count(&self) -> usize {
        self.snapshot.load_full().map(|mg| mg.len()).unwrap_or(0)
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.load(Ordering::Relaxed)
    }

    pub fn sync_successes(&self) -> u64 {
        self.sync_ok.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(validator: bool, stake_rao: u64) -> RegistrationInfo {
        RegistrationInfo {
            uid: 7,
            validator,
            stake_rao,
        }
    }

    fn metagraph_at(synced_at: DateTime<Utc>) -> Metagraph {
        let mut mg = Metagraph::new(46, synced_at);
        mg.insert("5Hot".to_string(), info(true, 50_000_000_000_000));
        mg
    }

    #[test]
    fn test_lookup_before_first_sync_is_unavailable() {
        let view = ChainView::new(900);
        assert_eq!(view.lookup("5Hot", Utc::now()), Lookup::Unavailable);
    }

    #[test]
    fn test_lookup_registered_and_not_found() {
        let now = Utc::now();
        let view = ChainView::new(900);
        view.publish(metagraph_at(now));

        match view.lookup("5Hot", now) {
            Lookup::Registered(info) => {
                assert!(info.validator);
                assert_eq!(info.uid, 7);
            }
            other => panic!("unexpected lookup outcome: {other:?}"),
        }
        assert_eq!(view.lookup("5Other", now), Lookup::NotFound);
    }

    #[test]
    fn test_stale_snapshot_is_unavailable() {
        let now = Utc::now();
        let view = ChainView::new(900);
        view.publish(metagraph_at(now - Duration::seconds(901)));
        assert_eq!(view.lookup("5Hot", now), Lookup::Unavailable);
    }

    #[test]
    fn test_publish_is_monotone() {
        let now = Utc::now();
        let view = ChainView::new(900);
        view.publish(metagraph_at(now));

        // An older snapshot must not clobber the fresh one.
        let mut stale = Metagraph::new(46, now - Duration::seconds(600));
        stale.insert("5Stale".to_string(), info(false, 0));
        view.publish(stale);

        assert_eq!(view.last_sync(), Some(now));
        assert_eq!(view.lookup("5Stale", now), Lookup::NotFound);
    }

    #[test]
    fn test_counters() {
        let view = ChainView::new(900);
        view.record_failure();
        view.record_failure();
        view.publish(metagraph_at(Utc::now()));
        assert_eq!(view.sync_failures(), 2);
        assert_eq!(view.sync_successes(), 1);
        assert_eq!(view.hotkeys_count(), 1);
    }
}
