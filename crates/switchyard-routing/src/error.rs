use switchyard_store::StoreError;

/// Routing errors
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Every backend was filtered out before scoring
    #[error("no eligible backend")]
    NoEligibleBackend,

    /// Shared store unavailable
    #[error(transparent)]
    Store(#[from] StoreError),
}
