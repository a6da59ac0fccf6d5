//! Pool construction and schema bootstrap.

use crate::error::StoreError;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Shared connection pool type.
pub type DbPool = sqlx::PgPool;

/// Connect to Postgres.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
pub async fn bootstrap_schema(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("Database schema ready");
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS zipcodes (
    zipcode                 VARCHAR(10) PRIMARY KEY,
    state                   VARCHAR(2) NOT NULL,
    city                    VARCHAR(100) NOT NULL,
    county                  VARCHAR(100),
    population              INTEGER,
    median_home_value       BIGINT,
    expected_listings       INTEGER NOT NULL,
    market_tier             VARCHAR(10) NOT NULL
        CHECK (market_tier IN ('premium', 'standard', 'emerging')),
    last_assigned           TIMESTAMPTZ,
    assignment_count        INTEGER NOT NULL DEFAULT 0,
    base_selection_weight   DOUBLE PRECISION NOT NULL DEFAULT 1.0,
    data_updated_at         TIMESTAMPTZ,
    is_active               BOOLEAN NOT NULL DEFAULT TRUE,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at              TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS ix_zipcodes_state ON zipcodes (state);
CREATE INDEX IF NOT EXISTS ix_zipcodes_market_tier ON zipcodes (market_tier);
CREATE INDEX IF NOT EXISTS ix_zipcodes_expected_listings ON zipcodes (expected_listings);
CREATE INDEX IF NOT EXISTS ix_zipcodes_last_assigned ON zipcodes (last_assigned);
CREATE INDEX IF NOT EXISTS ix_zipcodes_is_active ON zipcodes (is_active);

CREATE TABLE IF NOT EXISTS epochs (
    id                  VARCHAR(20) PRIMARY KEY,
    start_time          TIMESTAMPTZ NOT NULL,
    end_time            TIMESTAMPTZ NOT NULL,
    nonce               VARCHAR(64) NOT NULL UNIQUE,
    target_listings     INTEGER NOT NULL,
    tolerance_percent   INTEGER NOT NULL DEFAULT 10,
    status              VARCHAR(10) NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'active', 'completed', 'archived')),
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    selection_seed      BIGINT NOT NULL,
    algorithm_version   VARCHAR(10) NOT NULL DEFAULT 'v1.0',
    degraded            BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS ix_epochs_start_time ON epochs (start_time);
CREATE INDEX IF NOT EXISTS ix_epochs_status ON epochs (status);

CREATE TABLE IF NOT EXISTS epoch_assignments (
    epoch_id            VARCHAR(20) NOT NULL REFERENCES epochs (id) ON DELETE CASCADE,
    zipcode             VARCHAR(10) NOT NULL,
    expected_listings   INTEGER NOT NULL,
    state               VARCHAR(2) NOT NULL,
    city                VARCHAR(100) NOT NULL,
    county              VARCHAR(100),
    market_tier         VARCHAR(10) NOT NULL
        CHECK (market_tier IN ('premium', 'standard', 'emerging')),
    selection_weight    DOUBLE PRECISION NOT NULL DEFAULT 0,
    is_honeypot         BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (epoch_id, zipcode)
);

CREATE INDEX IF NOT EXISTS ix_epoch_assignments_epoch_id ON epoch_assignments (epoch_id);
CREATE INDEX IF NOT EXISTS ix_epoch_assignments_zipcode ON epoch_assignments (zipcode);

CREATE TABLE IF NOT EXISTS validator_results (
    id                  UUID PRIMARY KEY,
    epoch_id            VARCHAR(20) NOT NULL REFERENCES epochs (id),
    validator_hotkey    VARCHAR(64) NOT NULL,
    validation_time     TIMESTAMPTZ NOT NULL DEFAULT now(),
    miners_evaluated    INTEGER,
    top_miners          JSONB,
    total_listings      INTEGER,
    upload_path         TEXT NOT NULL,
    status              VARCHAR(20) NOT NULL DEFAULT 'credentials_issued'
);

CREATE INDEX IF NOT EXISTS ix_validator_results_epoch
    ON validator_results (epoch_id, validator_hotkey);
"#;
