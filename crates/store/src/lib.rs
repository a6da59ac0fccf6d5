//! Persistence layer: the zipcode master table, epochs, epoch assignments
//! and validator-result audit rows, all in Postgres via `sqlx`.
//!
//! The scheduler is the only writer of epochs; handlers read. Atomic epoch
//! publication is serialized with a transaction-scoped advisory lock so two
//! scheduler replicas cannot both publish the same slot.

pub mod error;
pub mod pool;
pub mod queries;
pub mod types;

pub use error::StoreError;
pub use pool::{bootstrap_schema, init_pool, DbPool};
pub use types::{
    Epoch, EpochAssignment, EpochStatus, EligibilityFilter, MarketTier, StateBucket, TierBucket,
    ValidatorResult, ZipcodeRecord, ZipcodeStats,
};
