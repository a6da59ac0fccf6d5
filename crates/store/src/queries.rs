//! Query layer. All SQL lives here; callers pass and receive the row types
//! from [`crate::types`].

use crate::error::StoreError;
use crate::pool::DbPool;
use crate::types::{
    EligibilityFilter, Epoch, EpochAssignment, StateBucket, TierBucket, ValidatorResult,
    ZipcodeRecord, ZipcodeStats,
};
use chrono::{DateTime, Utc};
use tracing::info;

/// Advisory lock key serializing epoch publication across replicas.
const EPOCH_PUBLISH_LOCK: i64 = 0x7a69_7067_6174_6501;

/// Connectivity probe.
pub async fn ping(pool: &DbPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Insert or refresh master zipcode rows in one transaction.
pub async fn upsert_zipcodes(pool: &DbPool, records: &[ZipcodeRecord]) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    let mut written = 0u64;
    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO zipcodes (
                zipcode, state, city, county, population, median_home_value,
                expected_listings, market_tier, last_assigned, assignment_count,
                base_selection_weight, data_updated_at, is_active, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
            ON CONFLICT (zipcode) DO UPDATE SET
                state = EXCLUDED.state,
                city = EXCLUDED.city,
                county = EXCLUDED.county,
                population = EXCLUDED.population,
                median_home_value = EXCLUDED.median_home_value,
                expected_listings = EXCLUDED.expected_listings,
                market_tier = EXCLUDED.market_tier,
                base_selection_weight = EXCLUDED.base_selection_weight,
                data_updated_at = EXCLUDED.data_updated_at,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(&record.zipcode)
        .bind(&record.state)
        .bind(&record.city)
        .bind(&record.county)
        .bind(record.population)
        .bind(record.median_home_value)
        .bind(record.expected_listings)
        .bind(record.market_tier.as_str())
        .bind(record.last_assigned)
        .bind(record.assignment_count)
        .bind(record.base_selection_weight)
        .bind(record.data_updated_at)
        .bind(record.is_active)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

/// Rows eligible for selection: active, listings inside the band, outside
/// the cooldown window, data fresh enough, and in a prioritized state.
pub async fn eligible_zipcodes(
    pool: &DbPool,
    filter: &EligibilityFilter,
) -> Result<Vec<ZipcodeRecord>, StoreError> {
    let rows = sqlx::query_as::<_, ZipcodeRecord>(
        r#"
        SELECT * FROM zipcodes
        WHERE is_active
          AND expected_listings >= $1
          AND expected_listings <= $2
          AND (last_assigned IS NULL OR last_assigned < $3)
          AND data_updated_at >= $4
          AND state = ANY($5)
        ORDER BY zipcode
        "#,
    )
    .bind(filter.min_listings)
    .bind(filter.max_listings)
    .bind(filter.cooldown_cutoff)
    .bind(filter.data_age_cutoff)
    .bind(&filter.states)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch one master row.
pub async fn zipcode_by_id(
    pool: &DbPool,
    zipcode: &str,
) -> Result<Option<ZipcodeRecord>, StoreError> {
    let row = sqlx::query_as::<_, ZipcodeRecord>("SELECT * FROM zipcodes WHERE zipcode = $1")
        .bind(zipcode)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Low-activity pool honeypots are drawn from. Disjoint from the eligible
/// set because the threshold sits below the eligibility minimum.
pub async fn honeypot_pool(pool: &DbPool, threshold: i32) -> Result<Vec<ZipcodeRecord>, StoreError> {
    let rows = sqlx::query_as::<_, ZipcodeRecord>(
        r#"
        SELECT * FROM zipcodes
        WHERE is_active AND expected_listings < $1
        ORDER BY zipcode
        "#,
    )
    .bind(threshold)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Persist an epoch and its assignments atomically.
///
/// Serialized by an advisory lock. Master-row assignment history is not
/// touched here: a pre-generated epoch is still `pending`, and
/// `last_assigned` only moves when an epoch is actually published (see
/// [`promote_epochs`]).
pub async fn insert_epoch(
    pool: &DbPool,
    epoch: &Epoch,
    assignments: &[EpochAssignment],
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(EPOCH_PUBLISH_LOCK)
        .execute(&mut *tx)
        .await?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM epochs WHERE id = $1")
        .bind(&epoch.id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_some() {
        return Err(StoreError::EpochExists(epoch.id.clone()));
    }

    sqlx::query(
        r#"
        INSERT INTO epochs (
            id, start_time, end_time, nonce, target_listings,
            tolerance_percent, status, created_at, selection_seed,
            algorithm_version, degraded
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&epoch.id)
    .bind(epoch.start_time)
    .bind(epoch.end_time)
    .bind(&epoch.nonce)
    .bind(epoch.target_listings)
    .bind(epoch.tolerance_percent)
    .bind(epoch.status.as_str())
    .bind(epoch.created_at)
    .bind(epoch.selection_seed)
    .bind(&epoch.algorithm_version)
    .bind(epoch.degraded)
    .execute(&mut *tx)
    .await?;

    for a in assignments {
        sqlx::query(
            r#"
            INSERT INTO epoch_assignments (
                epoch_id, zipcode, expected_listings, state, city, county,
                market_tier, selection_weight, is_honeypot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&a.epoch_id)
        .bind(&a.zipcode)
        .bind(a.expected_listings)
        .bind(&a.state)
        .bind(&a.city)
        .bind(&a.county)
        .bind(a.market_tier.as_str())
        .bind(a.selection_weight)
        .bind(a.is_honeypot)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        "Persisted epoch {} with {} assignments",
        epoch.id,
        assignments.len()
    );
    Ok(())
}

/// Promote epoch statuses for the given instant, in one serialized
/// transaction: active epochs past their end become `completed`, then the
/// pending epoch whose window contains `now` becomes `active`. The order
/// guarantees no reader ever observes two active epochs.
///
/// `last_assigned` and `assignment_count` are stamped here, for exactly the
/// epochs that activate: a pending epoch whose slot is missed never touches
/// the master rows.
pub async fn promote_epochs(pool: &DbPool, now: DateTime<Utc>) -> Result<(u64, u64), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(EPOCH_PUBLISH_LOCK)
        .execute(&mut *tx)
        .await?;

    let completed = sqlx::query("UPDATE epochs SET status = 'completed' WHERE status = 'active' AND end_time <= $1")
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let activated: Vec<(String,)> = sqlx::query_as(
        r#"
        UPDATE epochs SET status = 'active'
        WHERE status = 'pending' AND start_time <= $1 AND end_time > $1
        RETURNING id
        "#,
    )
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    if !activated.is_empty() {
        let activated_ids: Vec<String> = activated.iter().map(|(id,)| id.clone()).collect();
        sqlx::query(
            r#"
            UPDATE zipcodes z
            SET last_assigned = e.start_time,
                assignment_count = z.assignment_count + 1,
                updated_at = now()
            FROM epoch_assignments a
            JOIN epochs e ON e.id = a.epoch_id
            WHERE a.zipcode = z.zipcode AND a.epoch_id = ANY($1)
            "#,
        )
        .bind(&activated_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok((activated.len() as u64, completed))
}

/// The epoch whose `[start, end)` window contains `now`.
///
/// Pending rows are included: visibility is decided by the time comparison
/// (`now >= start`), status promotion merely follows on the next tick.
pub async fn active_epoch(pool: &DbPool, now: DateTime<Utc>) -> Result<Option<Epoch>, StoreError> {
    let epoch = sqlx::query_as::<_, Epoch>(
        r#"
        SELECT * FROM epochs
        WHERE start_time <= $1 AND end_time > $1 AND status IN ('pending', 'active')
        ORDER BY start_time DESC
        LIMIT 1
        "#,
    )
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(epoch)
}

pub async fn epoch_by_id(pool: &DbPool, id: &str) -> Result<Option<Epoch>, StoreError> {
    let epoch = sqlx::query_as::<_, Epoch>("SELECT * FROM epochs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(epoch)
}

pub async fn assignments(pool: &DbPool, epoch_id: &str) -> Result<Vec<EpochAssignment>, StoreError> {
    let rows = sqlx::query_as::<_, EpochAssignment>(
        "SELECT * FROM epoch_assignments WHERE epoch_id = $1 ORDER BY zipcode",
    )
    .bind(epoch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_epochs(pool: &DbPool, limit: i64) -> Result<Vec<Epoch>, StoreError> {
    let rows = sqlx::query_as::<_, Epoch>(
        "SELECT * FROM epochs ORDER BY start_time DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Archive completed epochs that ended before `cutoff`. Deletion is
/// archival-only; assignment rows stay.
pub async fn archive_epochs_before(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let archived = sqlx::query(
        "UPDATE epochs SET status = 'archived' WHERE status = 'completed' AND end_time < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(archived)
}

/// Zipcode availability and distribution summary.
pub async fn zipcode_stats(
    pool: &DbPool,
    filter: &EligibilityFilter,
) -> Result<ZipcodeStats, StoreError> {
    let (total_zipcodes,): (i64,) = sqlx::query_as("SELECT count(*) FROM zipcodes")
        .fetch_one(pool)
        .await?;
    let (active_zipcodes,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM zipcodes WHERE is_active")
            .fetch_one(pool)
            .await?;
    let (eligible_zipcodes,): (i64,) = sqlx::query_as(
        r#"
        SELECT count(*) FROM zipcodes
        WHERE is_active
          AND expected_listings >= $1
          AND expected_listings <= $2
          AND (last_assigned IS NULL OR last_assigned < $3)
          AND data_updated_at >= $4
          AND state = ANY($5)
        "#,
    )
    .bind(filter.min_listings)
    .bind(filter.max_listings)
    .bind(filter.cooldown_cutoff)
    .bind(filter.data_age_cutoff)
    .bind(&filter.states)
    .fetch_one(pool)
    .await?;

    let state_distribution = sqlx::query_as::<_, StateBucket>(
        r#"
        SELECT state,
               count(*) AS zipcode_count,
               COALESCE(sum(expected_listings), 0)::BIGINT AS total_expected_listings
        FROM zipcodes
        WHERE is_active
        GROUP BY state
        ORDER BY state
        "#,
    )
    .fetch_all(pool)
    .await?;

    let tier_distribution = sqlx::query_as::<_, TierBucket>(
        r#"
        SELECT market_tier,
               count(*) AS zipcode_count,
               COALESCE(avg(expected_listings), 0)::DOUBLE PRECISION AS avg_expected_listings
        FROM zipcodes
        WHERE is_active
        GROUP BY market_tier
        ORDER BY market_tier
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ZipcodeStats {
        total_zipcodes,
        active_zipcodes,
        eligible_zipcodes,
        state_distribution,
        tier_distribution,
    })
}

/// Counts of epochs per status, for monitoring.
pub async fn epoch_status_counts(pool: &DbPool) -> Result<Vec<(String, i64)>, StoreError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, count(*) FROM epochs GROUP BY status ORDER BY status")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

pub async fn insert_validator_result(
    pool: &DbPool,
    result: &ValidatorResult,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO validator_results (
            id, epoch_id, validator_hotkey, validation_time, miners_evaluated,
            top_miners, total_listings, upload_path, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(result.id)
    .bind(&result.epoch_id)
    .bind(&result.validator_hotkey)
    .bind(result.validation_time)
    .bind(result.miners_evaluated)
    .bind(&result.top_miners)
    .bind(result.total_listings)
    .bind(&result.upload_path)
    .bind(&result.status)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn validator_results_for_epoch(
    pool: &DbPool,
    epoch_id: &str,
    validator_hotkey: Option<&str>,
) -> Result<Vec<ValidatorResult>, StoreError> {
    let rows = match validator_hotkey {
        Some(hotkey) => {
            sqlx::query_as::<_, ValidatorResult>(
                r#"
                SELECT * FROM validator_results
                WHERE epoch_id = $1 AND validator_hotkey = $2
                ORDER BY validation_time DESC
                "#,
            )
            .bind(epoch_id)
            .bind(hotkey)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ValidatorResult>(
                "SELECT * FROM validator_results WHERE epoch_id = $1 ORDER BY validation_time DESC",
            )
            .bind(epoch_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}
