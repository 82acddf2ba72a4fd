use std::time::Duration;

use http::StatusCode;
use switchyard_auth::AuthError;
use switchyard_core::{BackendId, HttpError};
use switchyard_ratelimit::RateLimitError;
use switchyard_routing::RoutingError;
use switchyard_store::StoreError;
use thiserror::Error;

/// Failure of a single backend invocation
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No response within the backend's timeout
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered 2xx with a body we could not read
    #[error("invalid response: {0}")]
    Decode(String),

    /// The backend could not be constructed from configuration
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl InvokeError {
    /// Whether the request should move on to the next candidate
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Errors surfaced by the inference pipeline
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Credential missing, unknown or revoked
    #[error("invalid or missing credential")]
    Unauthorized,

    /// Subscription exists but may not be used
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Per-second rate limit exhausted
    #[error("rate limit exceeded")]
    TooManyRequests {
        /// Seconds until the bucket refills
        retry_after: u64,
    },

    /// Daily quota cannot cover the request
    #[error("daily quota exceeded")]
    QuotaExceeded {
        /// Seconds until the quota resets
        retry_after: u64,
    },

    /// No backend in the plan can serve this prompt
    #[error("no eligible backend for this request")]
    NoEligibleModel,

    /// Every candidate failed
    #[error("all backends failed after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },

    /// The last remaining candidate timed out
    #[error("backend {backend} timed out")]
    UpstreamTimeout { backend: BackendId },

    /// Shared store unavailable
    #[error("shared store error: {0}")]
    Store(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for BrokerError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized => Self::Unauthorized,
            AuthError::Forbidden(reason) => Self::Forbidden(reason),
            other @ (AuthError::Directory(_) | AuthError::DirectoryStatus { .. }) => Self::Internal(other.to_string()),
        }
    }
}

impl From<RateLimitError> for BrokerError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Exceeded { retry_after } => Self::TooManyRequests { retry_after },
            RateLimitError::QuotaExceeded { retry_after, .. } => Self::QuotaExceeded { retry_after },
            RateLimitError::Store(e) => e.into(),
        }
    }
}

impl From<RoutingError> for BrokerError {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::NoEligibleBackend => Self::NoEligibleModel,
            RoutingError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for BrokerError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl HttpError for BrokerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyRequests { .. } | Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NoEligibleModel | Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::NoEligibleModel => "no_eligible_model",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Store(_) | Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::TooManyRequests { retry_after } | Self::QuotaExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
