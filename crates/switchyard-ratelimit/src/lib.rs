//! Admission control: per-second request buckets and daily quotas
//!
//! Both limiters keep their counters in the shared [`switchyard_store::Store`]
//! and rely on its atomic primitives, so any number of broker instances
//! enforce one budget per subscription.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod quota;
mod rate;

pub use error::RateLimitError;
pub use quota::{QuotaStatus, QuotaTracker};
pub use rate::RateLimiter;
