//! Object-store layer errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("credential ttl must be positive")]
    InvalidTtl,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
