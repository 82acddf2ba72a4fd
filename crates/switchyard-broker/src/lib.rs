//! The Switchyard inference pipeline
//!
//! [`Broker::infer`] takes a bearer credential and a prompt through
//! authentication, eligibility, admission, backend selection and execution
//! with failover, and hands one usage record per request to the recorder.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
mod broker;
mod error;
pub mod executor;
pub mod probe;

pub use backend::{Backend, BackendReply, BackendSet, build_backends};
pub use broker::{BackendStatus, Broker, InferRequest, InferResponse, SelectionMetadata, SubscriptionCounters};
pub use error::{BrokerError, InvokeError};
pub use executor::{CandidatePool, RequestExecutor, Weights};
pub use probe::HealthProbe;
