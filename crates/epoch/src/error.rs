//! Epoch layer errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpochError {
    #[error("store error: {0}")]
    Store(#[from] gateway_store::StoreError),

    #[error("no eligible zipcodes for selection")]
    NoEligibleZipcodes,
}
