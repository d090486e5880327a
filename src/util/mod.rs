//! Small async utilities shared across the crate.

mod backoff;
mod timeout;

pub use backoff::{apply_jitter, backoff_delay};
pub use timeout::with_deadline;
