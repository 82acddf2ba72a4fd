//! Usage recording for Switchyard
//!
//! Every logical request produces exactly one [`UsageRecord`]. The broker
//! hands it to the [`UsageRecorder`], which queues it and returns
//! immediately; a background task batches records and delivers them to a
//! [`UsageSink`] with retries.
//!
//! [`UsageRecord`]: switchyard_core::UsageRecord

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod error;
pub mod recorder;
pub mod sink;

pub use error::BillingError;
pub use recorder::UsageRecorder;
pub use sink::{HttpLedger, LogLedger, UsageSink, build_sink};
