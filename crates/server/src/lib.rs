//! HTTP surface of the gateway.
//!
//! Every authenticated endpoint is the same fixed composition: build the
//! commitment from the request fields, run the authentication pipeline,
//! consume rate-limit quota, then perform exactly one core operation
//! (credential mint or assignment read) and serialize the response.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod monitor;
pub mod ratelimit;
pub mod state;

pub use auth::{AuthConfig, Authenticator};
pub use config::Args;
pub use error::ApiError;
pub use monitor::Monitor;
pub use ratelimit::{CounterStore, MemoryCounterStore, RateLimiter, RateLimits, RedisCounterStore, Scope};
pub use state::AppState;
