use thiserror::Error;

/// Shared store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or command failure in the store backend
    #[error("store backend: {0}")]
    Backend(String),

    /// A cached value could not be encoded or decoded
    #[error("store serialization: {0}")]
    Serialization(String),

    /// A counter key holds something that is not an integer
    #[error("store key '{key}' holds a non-integer value")]
    NotAnInteger {
        /// Key as seen by the caller, without prefix
        key: String,
    },
}
