//! Epoch-driven work assignment.
//!
//! [`selector`] is the pure part: given eligible master rows, an epoch id
//! and the shared secret, it produces the same assignment set and nonce on
//! every run. [`scheduler`] owns the clock: it pre-generates each epoch
//! shortly before its 4-hour UTC slot, promotes statuses atomically, and
//! serves current/historical reads.

pub mod error;
pub mod schedule;
pub mod scheduler;
pub mod selector;

pub use error::EpochError;
pub use schedule::{epoch_end, epoch_id_for, next_slot, parse_epoch_id, slot_start, EPOCH_HOURS};
pub use scheduler::{EpochScheduler, SchedulerConfig, SchedulerStats};
pub use selector::{SelectedZipcode, Selection, SelectorConfig};
