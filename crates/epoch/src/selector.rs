//! Deterministic weighted zipcode selection.
//!
//! Pure given its inputs: the eligible rows, the epoch id, the shared
//! secret and the wall-clock date fully determine the selected set and the
//! epoch nonce. The scheduler recomputes nothing; it persists exactly what
//! this module returns.

use crate::error::EpochError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use gateway_store::{EligibilityFilter, MarketTier, ZipcodeRecord};
use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Selection parameters, loaded once from the environment.
#[derive(Clone, Debug)]
pub struct SelectorConfig {
    pub target_listings: i32,
    pub tolerance_percent: u32,
    pub min_zipcode_listings: i32,
    pub max_zipcode_listings: i32,
    pub cooldown_hours: i64,
    pub max_data_age_days: i64,
    pub premium_weight: f64,
    pub standard_weight: f64,
    pub emerging_weight: f64,
    /// State code -> priority; lower number means higher priority.
    pub state_priorities: HashMap<String, u32>,
    /// `α ∈ [0, 1]`; 0 is pure weighted sampling, 1 is uniform.
    pub selection_randomness: f64,
    pub honeypot_probability: f64,
    pub honeypot_threshold: i32,
    pub secret_key: String,
    pub algorithm_version: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target_listings: 10_000,
            tolerance_percent: 10,
            min_zipcode_listings: 200,
            max_zipcode_listings: 3_000,
            cooldown_hours: 24,
            max_data_age_days: 30,
            premium_weight: 1.5,
            standard_weight: 1.0,
            emerging_weight: 0.8,
            state_priorities: parse_state_priorities("PA:1,NJ:2,NY:3,DE:4,MD:5"),
            selection_randomness: 0.25,
            honeypot_probability: 0.3,
            honeypot_threshold: 50,
            secret_key: String::new(),
            algorithm_version: "v1.0".to_string(),
        }
    }
}

impl SelectorConfig {
    pub fn tier_weight(&self, tier: MarketTier) -> f64 {
        match tier {
            MarketTier::Premium => self.premium_weight,
            MarketTier::Standard => self.standard_weight,
            MarketTier::Emerging => self.emerging_weight,
        }
    }

    /// Database filter implementing the eligibility rules at `now`.
    pub fn eligibility_filter(&self, now: DateTime<Utc>) -> EligibilityFilter {
        let mut states: Vec<String> = self.state_priorities.keys().cloned().collect();
        states.sort_unstable();
        EligibilityFilter {
            min_listings: self.min_zipcode_listings,
            max_listings: self.max_zipcode_listings,
            cooldown_cutoff: now - Duration::hours(self.cooldown_hours),
            data_age_cutoff: now - Duration::days(self.max_data_age_days),
            states,
        }
    }
}

/// Parse `PA:1,NJ:2,...` into a priority map. Malformed entries are skipped.
pub fn parse_state_priorities(raw: &str) -> HashMap<String, u32> {
    let mut priorities = HashMap::new();
    for item in raw.split(',') {
        if let Some((state, priority)) = item.split_once(':') {
            if let Ok(priority) = priority.trim().parse::<u32>() {
                priorities.insert(state.trim().to_uppercase(), priority);
            }
        }
    }
    priorities
}

/// One selected zipcode with its final weight.
#[derive(Clone, Debug)]
pub struct SelectedZipcode {
    pub record: ZipcodeRecord,
    pub weight: f64,
    pub is_honeypot: bool,
}

/// Output of a selection run.
#[derive(Clone, Debug)]
pub struct Selection {
    pub picked: Vec<SelectedZipcode>,
    /// Sum of expected listings over non-honeypot rows.
    pub total_expected: i64,
    pub seed: u64,
    pub nonce: String,
    /// Set when the eligible pool could not reach the tolerance band.
    pub degraded: bool,
}

/// Deterministic per-epoch seed: the first 8 bytes of
/// `HMAC-SHA256(secret, "{epoch_id}:{YYYY-MM-DD}")`.
pub fn epoch_seed(secret: &str, epoch_id: &str, date: NaiveDate) -> u64 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}:{}", epoch_id, date.format("%Y-%m-%d")).as_bytes());
    let out = mac.finalize().into_bytes();
    u64::from_be_bytes(out[..8].try_into().expect("HMAC output is 32 bytes"))
}

/// Per-epoch nonce: 16 bytes of
/// `HMAC-SHA256(secret, "{epoch_id}:{start_unix}:{sha256(sorted zipcodes)}")`,
/// hex encoded.
pub fn epoch_nonce(
    secret: &str,
    epoch_id: &str,
    start_time: DateTime<Utc>,
    zipcodes: &[String],
) -> String {
    let mut sorted: Vec<&str> = zipcodes.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let zipcode_hash = hex::encode(Sha256::digest(sorted.concat().as_bytes()));

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}:{}:{}", epoch_id, start_time.timestamp(), zipcode_hash).as_bytes());
    hex::encode(&mac.finalize().into_bytes()[..16])
}

/// Cooldown factor: linear ramp from 0.1 right after an assignment back to
/// 1.0 once the cooldown window has fully elapsed.
pub fn cooldown_factor(
    last_assigned: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_hours: i64,
) -> f64 {
    let Some(last) = last_assigned else {
        return 1.0;
    };
    let hours_since = (now - last).num_seconds() as f64 / 3600.0;
    let cooldown = cooldown_hours as f64;
    if hours_since < cooldown {
        0.1 + 0.9 * hours_since / cooldown
    } else {
        1.0
    }
}

/// Final selection weight for one row.
pub fn selection_weight(cfg: &SelectorConfig, record: &ZipcodeRecord, now: DateTime<Utc>) -> f64 {
    let base = record.expected_listings as f64;
    let tier = cfg.tier_weight(record.market_tier);
    let state_priority = cfg.state_priorities.get(&record.state).copied().unwrap_or(10);
    let state = 1.0 / state_priority as f64;
    let cooldown = cooldown_factor(record.last_assigned, now, cfg.cooldown_hours);
    (base * tier * state * cooldown * record.base_selection_weight).max(0.1)
}

/// Run the selection for one epoch.
///
/// Sampling draws without replacement; each draw scores every remaining
/// candidate with `w^(1−α) · U^α` and takes the maximum, so `α` interpolates
/// between weighted and uniform sampling. Exact score ties break to the
/// lexicographically smaller zipcode. A draw that would push the budget past
/// `T·(1+τ)` is skipped while a smaller candidate could still fit
/// (overshoot ≤ smallest remaining), otherwise selection stops; the
/// published budget therefore never exceeds the band, and an epoch that
/// cannot reach `T·(1−τ)` comes back flagged degraded.
pub fn select(
    cfg: &SelectorConfig,
    epoch_id: &str,
    start_time: DateTime<Utc>,
    now: DateTime<Utc>,
    eligible: Vec<ZipcodeRecord>,
    honeypot_pool: Vec<ZipcodeRecord>,
) -> Result<Selection, EpochError> {
    if eligible.is_empty() {
        return Err(EpochError::NoEligibleZipcodes);
    }

    let seed = epoch_seed(&cfg.secret_key, epoch_id, now.date_naive());
    let mut rng = StdRng::seed_from_u64(seed);

    let target = cfg.target_listings as i64;
    let tolerance = target * cfg.tolerance_percent as i64 / 100;
    let min_target = target - tolerance;
    let max_target = target + tolerance;
    let alpha = cfg.selection_randomness.clamp(0.0, 1.0);

    // Candidates in lexicographic order so identical inputs walk the RNG
    // stream identically.
    let mut candidates: Vec<(ZipcodeRecord, f64)> = eligible
        .into_iter()
        .map(|record| {
            let weight = selection_weight(cfg, &record, now);
            (record, weight)
        })
        .collect();
    candidates.sort_by(|a, b| a.0.zipcode.cmp(&b.0.zipcode));

    let mut picked: Vec<SelectedZipcode> = Vec::new();
    let mut total: i64 = 0;

    while total < min_target && !candidates.is_empty() {
        let mut best_idx = 0usize;
        let mut best_key = f64::NEG_INFINITY;
        for (idx, (_, weight)) in candidates.iter().enumerate() {
            let u: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
            let key = weight.powf(1.0 - alpha) * u.powf(alpha);
            // Strict comparison keeps the first (lexicographically smaller)
            // candidate on exact ties.
            if key > best_key {
                best_key = key;
                best_idx = idx;
            }
        }

        let (record, weight) = candidates.remove(best_idx);
        let expected = record.expected_listings as i64;

        if total + expected > max_target {
            let overshoot = total + expected - max_target;
            let smallest_remaining = candidates
                .iter()
                .map(|(r, _)| r.expected_listings as i64)
                .min()
                .unwrap_or(i64::MAX);
            if overshoot > smallest_remaining {
                break;
            }
            // A smaller candidate may still fit; drop this draw and keep going.
            continue;
        }

        total += expected;
        picked.push(SelectedZipcode {
            record,
            weight,
            is_honeypot: false,
        });
    }

    let degraded = total < min_target;
    if degraded {
        tracing::warn!(
            "Selection for {} degraded: {} expected listings vs target band [{}, {}]",
            epoch_id,
            total,
            min_target,
            max_target
        );
    }

    // Honeypot draw comes from the same seeded stream so the whole output
    // stays reproducible. Honeypots never count toward the budget.
    let honeypot_roll: f64 = rng.gen();
    if honeypot_roll < cfg.honeypot_probability {
        let mut pool: Vec<ZipcodeRecord> = honeypot_pool
            .into_iter()
            .filter(|candidate| !picked.iter().any(|p| p.record.zipcode == candidate.zipcode))
            .collect();
        pool.sort_by(|a, b| a.zipcode.cmp(&b.zipcode));
        if !pool.is_empty() {
            let idx = rng.gen_range(0..pool.len());
            let record = pool.swap_remove(idx);
            tracing::info!("Added honeypot zipcode {} to {}", record.zipcode, epoch_id);
            picked.push(SelectedZipcode {
                record,
                weight: 0.0,
                is_honeypot: true,
            });
        }
    }

    let zipcodes: Vec<String> = picked.iter().map(|p| p.record.zipcode.clone()).collect();
    let nonce = epoch_nonce(&cfg.secret_key, epoch_id, start_time, &zipcodes);

    Ok(Selection {
        picked,
        total_expected: total,
        seed,
        nonce,
        degraded,
    })
}
