/// Errors returned by the usage pipeline
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// HTTP transport or connection error
    #[error("ledger request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The ledger returned a non-success status
    #[error("ledger API error ({status}): {message}")]
    Api {
        /// HTTP status from the ledger
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// The background drain task is gone
    #[error("usage recorder is closed")]
    Closed,
}
