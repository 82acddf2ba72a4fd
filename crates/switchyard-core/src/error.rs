use http::StatusCode;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by the broker's error type and the admission errors it wraps.
/// The server layer turns these into responses, so domain crates never see
/// axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `quota_exceeded`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Seconds the caller should wait before retrying, if known
    fn retry_after(&self) -> Option<u64> {
        None
    }
}
