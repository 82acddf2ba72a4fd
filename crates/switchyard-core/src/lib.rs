//! Shared domain types for Switchyard
//!
//! Everything here is plain data: backend profiles and their observed health,
//! resolved subscriber context, request classification and usage records.
//! Behaviour lives in the feature crates.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
pub mod error;
pub mod prompt;
pub mod routing;
pub mod subscription;
pub mod usage;

pub use backend::{BackendId, BackendProfile, BackendTier, HealthSnapshot, HealthState};
pub use error::HttpError;
pub use prompt::{Message, Prompt, Role};
pub use routing::{Category, RoutingMode};
pub use subscription::{PlanRouting, QuotaLimit, SubscriptionContext};
pub use usage::{Outcome, UsageRecord};
