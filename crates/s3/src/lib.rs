//! Scoped, time-limited object-store credentials.
//!
//! Signing happens locally (AWS Signature V4); no network round-trip is
//! needed to mint a credential, so the minter is pure and fully testable.
//! The two products are POST upload policies bound to a key prefix and a
//! content-length band, and presigned list/get URLs over a prefix.

pub mod error;
pub mod minter;
pub mod sigv4;
pub mod upload;

pub use error::S3Error;
pub use minter::{miner_prefix, validator_upload_prefix, CredentialMinter, S3Config, SignedUrl, UploadPolicy};
pub use upload::{UploadGuidelines, ValidatorUploadGrant, ValidatorUploadService};
