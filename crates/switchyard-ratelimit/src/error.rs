use switchyard_store::StoreError;
use thiserror::Error;

/// Admission control errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Per-second request budget exhausted
    #[error("rate limit exceeded")]
    Exceeded {
        /// Seconds until the bucket refills
        retry_after: u64,
    },

    /// Daily quota cannot cover the request
    #[error("daily quota exceeded ({remaining} units left, {requested} requested)")]
    QuotaExceeded {
        /// Units left today
        remaining: u64,
        /// Units the request would have consumed
        requested: u32,
        /// Seconds until the quota resets
        retry_after: u64,
    },

    /// Shared store unavailable
    #[error(transparent)]
    Store(#[from] StoreError),
}
