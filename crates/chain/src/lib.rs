//! Chain-facing pieces of the gateway.
//!
//! A background task periodically pulls the subnet metagraph from a
//! [`MetagraphSource`] and publishes it as an immutable snapshot; request
//! handlers resolve hotkeys against that snapshot without locks. Signature
//! verification is a pure function over bytes, pluggable per scheme.

pub mod error;
pub mod metagraph;
pub mod mock;
pub mod source;
pub mod sync;
pub mod verify;

pub use error::ChainError;
pub use metagraph::{ChainView, Lookup, Metagraph};
pub use mock::MockSource;
pub use source::{MetagraphSource, SubtensorRpc};
pub use verify::{SignatureScheme, Verifier};
