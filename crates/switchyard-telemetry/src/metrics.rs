//! Metric names and instruments recorded by the broker
//!
//! Instruments come from the global meter, so they are no-ops until
//! [`crate::init`] installs an exporting provider.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

/// Inference requests by outcome
pub const BROKER_REQUEST_COUNT: &str = "broker.request.count";
/// End-to-end inference latency in seconds
pub const BROKER_REQUEST_DURATION: &str = "broker.request.duration";
/// Requests turned away by the rate limit or the daily quota
pub const BROKER_ADMISSION_REJECTED: &str = "broker.admission.rejected";
/// Individual backend invocations by backend and result
pub const BROKER_BACKEND_ATTEMPTS: &str = "broker.backend.attempts";
/// Failovers from one backend to the next
pub const BROKER_FAILOVER_COUNT: &str = "broker.failover.count";

/// Instruments used on the inference path
#[derive(Clone)]
pub struct BrokerMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    rejected: Counter<u64>,
    attempts: Counter<u64>,
    failovers: Counter<u64>,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("switchyard");

        Self {
            requests: meter.u64_counter(BROKER_REQUEST_COUNT).build(),
            duration: meter
                .f64_histogram(BROKER_REQUEST_DURATION)
                .with_unit("s")
                .build(),
            rejected: meter.u64_counter(BROKER_ADMISSION_REJECTED).build(),
            attempts: meter.u64_counter(BROKER_BACKEND_ATTEMPTS).build(),
            failovers: meter.u64_counter(BROKER_FAILOVER_COUNT).build(),
        }
    }

    /// A finished request, `outcome` being an error type or `"success"`
    pub fn request(&self, outcome: &str, elapsed: Duration) {
        let attributes = [KeyValue::new("outcome", outcome.to_owned())];
        self.requests.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64(), &attributes);
    }

    /// An admission rejection, `reason` being `rate_limit` or `quota`
    pub fn rejected(&self, plan_id: &str, reason: &'static str) {
        self.rejected.add(
            1,
            &[KeyValue::new("plan", plan_id.to_owned()), KeyValue::new("reason", reason)],
        );
    }

    pub fn attempt(&self, backend: &str, success: bool) {
        self.attempts.add(
            1,
            &[
                KeyValue::new("backend", backend.to_owned()),
                KeyValue::new("success", success),
            ],
        );
    }

    pub fn failover(&self, from: &str) {
        self.failovers.add(1, &[KeyValue::new("from", from.to_owned())]);
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BrokerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerMetrics").finish_non_exhaustive()
    }
}
