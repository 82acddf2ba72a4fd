//! Backend selection for Switchyard
//!
//! The pieces of a routing decision, leaves first:
//! - **classifier**: prompt to task category, pure
//! - **affinity**: reuse of a session's previous backend
//! - **weights**: per-plan steering weights for the requested mode
//! - **health**: observed latency, success rate and up/degraded/down state
//! - **scoring**: eligibility filter and deterministic ranking

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod affinity;
pub mod classifier;
pub mod error;
pub mod health;
pub mod registry;
pub mod scoring;
pub mod weights;

pub use affinity::{SessionAffinityTracker, jaccard_similarity};
pub use classifier::{TaskClassifier, estimate_tokens};
pub use error::RoutingError;
pub use health::HealthTracker;
pub use registry::BackendRegistry;
pub use scoring::{Candidate, ModelSelector, ScoredBackend, eligible_backends};
pub use weights::{WeightOverrideEngine, mode_weight};
