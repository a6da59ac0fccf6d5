//! Chain layer errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage decode error: {0}")]
    Decode(String),

    #[error("chain view unavailable")]
    Unavailable,
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Rpc(err.to_string())
    }
}
