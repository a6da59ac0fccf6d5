//! Selector invariants across many epochs and pool shapes.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gateway_epoch::selector::{self, SelectorConfig};
use gateway_epoch::{epoch_end, epoch_id_for, next_slot, parse_epoch_id, slot_start};
use gateway_store::{MarketTier, ZipcodeRecord};

// ============================================================================
// HELPERS
// ============================================================================

fn record(zipcode: &str, state: &str, expected: i32, tier: MarketTier) -> ZipcodeRecord {
    ZipcodeRecord {
        zipcode: zipcode.to_string(),
        state: state.to_string(),
        city: "City".to_string(),
        county: Some("County".to_string()),
        population: Some(25_000),
        median_home_value: Some(400_000),
        expected_listings: expected,
        market_tier: tier,
        last_assigned: None,
        assignment_count: 0,
        base_selection_weight: 1.0,
        data_updated_at: Some(Utc.with_ymd_and_hms(2025, 5, 25, 0, 0, 0).unwrap()),
        is_active: true,
    }
}

fn pool(count: usize) -> Vec<ZipcodeRecord> {
    (0..count)
        .map(|i| {
            let state = ["PA", "NJ", "NY", "DE", "MD"][i % 5];
            let tier = match i % 3 {
                0 => MarketTier::Premium,
                1 => MarketTier::Standard,
                _ => MarketTier::Emerging,
            };
            record(
                &format!("{:05}", 10_000 + i),
                state,
                250 + (i as i32 * 37) % 1_200,
                tier,
            )
        })
        .collect()
}

fn config(secret: &str) -> SelectorConfig {
    SelectorConfig {
        secret_key: secret.to_string(),
        ..SelectorConfig::default()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 3, 55, 0).unwrap()
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn test_identical_inputs_identical_output_across_slots() {
    let cfg = config("prod-secret");
    for hour in [0u32, 4, 8, 12, 16, 20] {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap();
        let id = epoch_id_for(start);

        let a = selector::select(&cfg, &id, start, now(), pool(120), vec![]).unwrap();
        let b = selector::select(&cfg, &id, start, now(), pool(120), vec![]).unwrap();

        let zips_a: Vec<&str> = a.picked.iter().map(|p| p.record.zipcode.as_str()).collect();
        let zips_b: Vec<&str> = b.picked.iter().map(|p| p.record.zipcode.as_str()).collect();
        assert_eq!(zips_a, zips_b, "slot {hour}: selection must be reproducible");
        assert_eq!(a.nonce, b.nonce);
    }
}

#[test]
fn test_secret_changes_selection() {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 4, 0, 0).unwrap();
    let id = epoch_id_for(start);

    let a = selector::select(&config("secret-a"), &id, start, now(), pool(120), vec![]).unwrap();
    let b = selector::select(&config("secret-b"), &id, start, now(), pool(120), vec![]).unwrap();
    assert_ne!(a.seed, b.seed);
    assert_ne!(a.nonce, b.nonce);
}

#[test]
fn test_nonce_recomputes_from_stored_inputs() {
    let cfg = config("prod-secret");
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
    let id = epoch_id_for(start);
    let selection = selector::select(&cfg, &id, start, now(), pool(80), vec![]).unwrap();

    let zipcodes: Vec<String> = selection
        .picked
        .iter()
        .map(|p| p.record.zipcode.clone())
        .collect();
    assert_eq!(
        selector::epoch_nonce(&cfg.secret_key, &id, start, &zipcodes),
        selection.nonce
    );
}

// ============================================================================
// BUDGET BAND
// ============================================================================

#[test]
fn test_budget_band_holds_over_many_epochs() {
    let cfg = config("prod-secret");
    let target = cfg.target_listings as i64;
    let tol = target * cfg.tolerance_percent as i64 / 100;

    for day in 1..=14 {
        let start = Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap();
        let id = epoch_id_for(start);
        let selection =
            selector::select(&cfg, &id, start, start - Duration::minutes(5), pool(200), vec![])
                .unwrap();

        assert!(!selection.degraded, "{id}: pool of 200 should satisfy the band");
        assert!(
            selection.total_expected >= target - tol,
            "{id}: under budget ({})",
            selection.total_expected
        );
        assert!(
            selection.total_expected <= target + tol,
            "{id}: over budget ({})",
            selection.total_expected
        );
    }
}

#[test]
fn test_budget_excludes_honeypots_over_many_epochs() {
    let mut cfg = config("prod-secret");
    cfg.honeypot_probability = 1.0;
    let honeypots: Vec<ZipcodeRecord> = (0..10)
        .map(|i| record(&format!("0000{i}"), "PA", 10 + i, MarketTier::Emerging))
        .collect();

    for day in 1..=7 {
        let start = Utc.with_ymd_and_hms(2025, 6, day, 16, 0, 0).unwrap();
        let id = epoch_id_for(start);
        let selection = selector::select(
            &cfg,
            &id,
            start,
            start - Duration::minutes(5),
            pool(200),
            honeypots.clone(),
        )
        .unwrap();

        let honeypot_rows: Vec<_> = selection.picked.iter().filter(|p| p.is_honeypot).collect();
        assert_eq!(honeypot_rows.len(), 1, "{id}: exactly one honeypot expected");
        assert!(honeypot_rows[0].record.expected_listings < cfg.honeypot_threshold);

        let real_sum: i64 = selection
            .picked
            .iter()
            .filter(|p| !p.is_honeypot)
            .map(|p| p.record.expected_listings as i64)
            .sum();
        assert_eq!(selection.total_expected, real_sum);
    }
}

// ============================================================================
// SLOT GRID
// ============================================================================

#[test]
fn test_grid_walk_covers_a_day() {
    let mut t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let mut ids = Vec::new();
    for _ in 0..6 {
        assert_eq!(slot_start(t), t);
        assert_eq!(epoch_end(t), t + Duration::hours(4));
        ids.push(epoch_id_for(t));
        t = next_slot(t);
    }
    assert_eq!(
        ids,
        vec![
            "2025-06-01-00:00",
            "2025-06-01-04:00",
            "2025-06-01-08:00",
            "2025-06-01-12:00",
            "2025-06-01-16:00",
            "2025-06-01-20:00",
        ]
    );
    assert_eq!(t, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
}

#[test]
fn test_every_generated_id_parses_back() {
    let mut t = Utc.with_ymd_and_hms(2025, 6, 1, 2, 17, 9).unwrap();
    for _ in 0..12 {
        let start = slot_start(t);
        assert_eq!(parse_epoch_id(&epoch_id_for(start)), Some(start));
        t += Duration::hours(4);
    }
}

// ============================================================================
// COOLDOWN WEIGHTING
// ============================================================================

#[test]
fn test_recently_assigned_rows_are_heavily_downweighted() {
    let cfg = config("prod-secret");
    let now = now();

    let mut fresh = record("19103", "PA", 800, MarketTier::Standard);
    fresh.last_assigned = Some(now - Duration::hours(1));
    let rested = record("19104", "PA", 800, MarketTier::Standard);

    let fresh_weight = selector::selection_weight(&cfg, &fresh, now);
    let rested_weight = selector::selection_weight(&cfg, &rested, now);
    assert!(fresh_weight < rested_weight * 0.25);
}

#[test]
fn test_eligibility_filter_excludes_cooldown_window() {
    let cfg = config("prod-secret");
    let now = now();
    let filter = cfg.eligibility_filter(now);

    // A row assigned one hour ago is inside the window; 25 hours ago is out.
    let one_hour_ago = now - Duration::hours(1);
    let past_cooldown = now - Duration::hours(25);
    assert!(one_hour_ago >= filter.cooldown_cutoff);
    assert!(past_cooldown < filter.cooldown_cutoff);
}
