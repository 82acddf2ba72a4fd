#![allow(clippy::must_use_candidate)]

pub mod auth;
pub mod backends;
mod duration;
mod env;
pub mod health;
mod loader;
pub mod plans;
pub mod routing;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod usage;

use indexmap::IndexMap;
use serde::Deserialize;

pub use auth::*;
pub use backends::*;
pub use health::*;
pub use plans::*;
pub use routing::*;
pub use server::*;
pub use store::*;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};
pub use usage::*;

/// Top-level Switchyard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub health: BackendHealthConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    /// Inference backends keyed by id
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
    /// Subscription plans keyed by id
    #[serde(default)]
    pub plans: IndexMap<String, PlanConfig>,
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
