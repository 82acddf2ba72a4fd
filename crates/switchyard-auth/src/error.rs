/// Credential validation errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credential unknown or revoked
    #[error("invalid credential")]
    Unauthorized,

    /// Credential valid but the subscription may not be used
    #[error("subscription not permitted: {0}")]
    Forbidden(String),

    /// The subscription directory could not be reached
    #[error("directory lookup failed: {0}")]
    Directory(#[from] reqwest::Error),

    /// The subscription directory answered with an error
    #[error("directory error ({status}): {message}")]
    DirectoryStatus {
        /// HTTP status code
        status: u16,
        /// Error body from the directory
        message: String,
    },
}
