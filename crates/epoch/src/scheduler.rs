//! Epoch scheduler.
//!
//! One instance runs the tick loop: promote statuses at slot boundaries,
//! pre-generate the next epoch five minutes ahead, and archive old epochs.
//! Reads go through [`EpochScheduler::current`] / [`EpochScheduler::historical`],
//! which enforce the pre-reveal rule (`now >= start`) regardless of what is
//! persisted. Missed slots are never backfilled.

use crate::error::EpochError;
use crate::schedule;
use crate::selector::{self, SelectorConfig};
use chrono::{DateTime, Duration, Utc};
use gateway_store::{queries, DbPool, Epoch, EpochAssignment, EpochStatus, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Timing knobs for the scheduler loops.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// How far before a slot the next epoch is computed.
    pub pregen_lead_secs: i64,
    /// Tick loop period.
    pub tick_secs: u64,
    /// Completed epochs older than this are archived.
    pub retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pregen_lead_secs: 300,
            tick_secs: 60,
            retention_days: 7,
        }
    }
}

/// Owns epoch generation and the read API over persisted epochs.
pub struct EpochScheduler {
    pool: DbPool,
    selector: SelectorConfig,
    config: SchedulerConfig,
    epochs_generated: AtomicU64,
    generation_failures: AtomicU64,
}

impl EpochScheduler {
    pub fn new(pool: DbPool, selector: SelectorConfig, config: SchedulerConfig) -> Self {
        Self {
            pool,
            selector,
            config,
            epochs_generated: AtomicU64::new(0),
            generation_failures: AtomicU64::new(0),
        }
    }

    pub fn selector_config(&self) -> &SelectorConfig {
        &self.selector
    }

    /// One scheduler step at `now`: promote, then pre-generate when inside
    /// the lead window. Failures surface to the loop, which retries on the
    /// next tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), EpochError> {
        let (activated, completed) = queries::promote_epochs(&self.pool, now).await?;
        if activated > 0 || completed > 0 {
            info!(
                "Epoch promotion at {}: {} activated, {} completed",
                now, activated, completed
            );
        }

        let next_start = schedule::next_slot(now);
        if next_start - now <= Duration::seconds(self.config.pregen_lead_secs) {
            let next_id = schedule::epoch_id_for(next_start);
            if queries::epoch_by_id(&self.pool, &next_id).await?.is_none() {
                self.generate_epoch(next_start, now).await?;
            }
        }
        Ok(())
    }

    /// Compute and persist the epoch for `start` as `pending`.
    ///
    /// Safe to race across replicas: publication is serialized in the store
    /// and a loser simply adopts the winner's row.
    pub async fn generate_epoch(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Epoch, EpochError> {
        let epoch_id = schedule::epoch_id_for(start);

        let filter = self.selector.eligibility_filter(now);
        let eligible = queries::eligible_zipcodes(&self.pool, &filter).await?;
        let honeypots =
            queries::honeypot_pool(&self.pool, self.selector.honeypot_threshold).await?;

        let selection =
            selector::select(&self.selector, &epoch_id, start, now, eligible, honeypots)?;

        let epoch = Epoch {
            id: epoch_id.clone(),
            start_time: start,
            end_time: schedule::epoch_end(start),
            nonce: selection.nonce.clone(),
            target_listings: self.selector.target_listings,
            tolerance_percent: self.selector.tolerance_percent as i32,
            status: EpochStatus::Pending,
            created_at: now,
            selection_seed: selection.seed as i64,
            algorithm_version: self.selector.algorithm_version.clone(),
            degraded: selection.degraded,
        };

        let assignments: Vec<EpochAssignment> = selection
            .picked
            .iter()
            .map(|p| EpochAssignment {
                epoch_id: epoch_id.clone(),
                zipcode: p.record.zipcode.clone(),
                expected_listings: p.record.expected_listings,
                state: p.record.state.clone(),
                city: p.record.city.clone(),
                county: p.record.county.clone(),
                market_tier: p.record.market_tier,
                selection_weight: p.weight,
                is_honeypot: p.is_honeypot,
            })
            .collect();

        match queries::insert_epoch(&self.pool, &epoch, &assignments).await {
            Ok(()) => {
                self.epochs_generated.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Pre-generated epoch {}: {} zipcodes, {} expected listings",
                    epoch_id,
                    assignments.len(),
                    selection.total_expected
                );
                Ok(epoch)
            }
            Err(StoreError::EpochExists(_)) => {
                let existing = queries::epoch_by_id(&self.pool, &epoch_id)
                    .await?
                    .ok_or(StoreError::EpochExists(epoch_id))?;
                Ok(existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The epoch whose window contains `now`, with its assignments.
    ///
    /// Pre-generated rows are invisible until `now >= start`; the query is
    /// window-bounded, so nothing pending for a future slot can leak.
    pub async fn current(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(Epoch, Vec<EpochAssignment>)>, EpochError> {
        let Some(epoch) = queries::active_epoch(&self.pool, now).await? else {
            return Ok(None);
        };
        let assignments = queries::assignments(&self.pool, &epoch.id).await?;
        Ok(Some((epoch, assignments)))
    }

    /// A historical epoch by id. Returns `None` for unknown ids and for
    /// epochs whose start is still in the future (the nonce must not be
    /// revealed early).
    pub async fn historical(
        &self,
        epoch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Epoch, Vec<EpochAssignment>)>, EpochError> {
        let Some(epoch) = queries::epoch_by_id(&self.pool, epoch_id).await? else {
            return Ok(None);
        };
        if now < epoch.start_time {
            return Ok(None);
        }
        let assignments = queries::assignments(&self.pool, &epoch.id).await?;
        Ok(Some((epoch, assignments)))
    }

    /// Monitoring summary.
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<SchedulerStats, EpochError> {
        let current = queries::active_epoch(&self.pool, now).await?;
        let current_epoch = match current {
            Some(epoch) => {
                let assignments = queries::assignments(&self.pool, &epoch.id).await?;
                Some(CurrentEpochInfo {
                    id: epoch.id,
                    status: epoch.status,
                    start_time: epoch.start_time,
                    end_time: epoch.end_time,
                    assignments_count: assignments.len(),
                    degraded: epoch.degraded,
                })
            }
            None => None,
        };

        let next_start = schedule::next_slot(now);
        let recent = queries::recent_epochs(&self.pool, 5).await?;
        let status_counts = queries::epoch_status_counts(&self.pool).await?;

        Ok(SchedulerStats {
            current_epoch,
            next_epoch_start: next_start,
            seconds_until_next: (next_start - now).num_seconds(),
            recent_epochs: recent
                .into_iter()
                .map(|e| RecentEpoch {
                    id: e.id,
                    status: e.status,
                    start_time: e.start_time,
                })
                .collect(),
            status_counts,
            epochs_generated: self.epochs_generated.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
        })
    }

    /// Spawn the tick loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = self;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(scheduler.config.tick_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.tick(Utc::now()).await {
                    scheduler
                        .generation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!("Scheduler tick failed (will retry next tick): {}", e);
                }
            }
        })
    }

    /// Spawn the hourly retention sweep.
    pub fn spawn_retention(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - Duration::days(scheduler.config.retention_days);
                match queries::archive_epochs_before(&scheduler.pool, cutoff).await {
                    Ok(0) => {}
                    Ok(n) => info!("Archived {} epochs older than {}", n, cutoff),
                    Err(e) => warn!("Retention sweep failed: {}", e),
                }
            }
        })
    }
}

/// Current-epoch block of [`SchedulerStats`].
#[derive(Clone, Debug, Serialize)]
pub struct CurrentEpochInfo {
    pub id: String,
    pub status: EpochStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub assignments_count: usize,
    pub degraded: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecentEpoch {
    pub id: String,
    pub status: EpochStatus,
    pub start_time: DateTime<Utc>,
}

/// Monitoring view over the scheduler and its persisted epochs.
#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStats {
    pub current_epoch: Option<CurrentEpochInfo>,
    pub next_epoch_start: DateTime<Utc>,
    pub seconds_until_next: i64,
    pub recent_epochs: Vec<RecentEpoch>,
    pub status_counts: Vec<(String, i64)>,
    pub epochs_generated: u64,
    pub generation_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.pregen_lead_secs, 300);
        assert_eq!(config.tick_secs, 60);
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = SchedulerStats {
            current_epoch: None,
            next_epoch_start: Utc::now(),
            seconds_until_next: 120,
            recent_epochs: vec![],
            status_counts: vec![("active".to_string(), 1)],
            epochs_generated: 3,
            generation_failures: 0,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["seconds_until_next"], 120);
        assert!(json["current_epoch"].is_null());
    }
}
