use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Task category assigned to a prompt by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Simple,
    Reasoning,
    Complex,
    Multimodal,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Reasoning => "reasoning",
            Self::Complex => "complex",
            Self::Multimodal => "multimodal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steering mode requested by the caller or defaulted from the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Weights follow the task category
    #[default]
    Auto,
    /// Bias toward the highest-quality backends
    Performance,
    /// Bias toward the cheapest backends
    Efficient,
    /// Bias toward free-tier backends
    Lite,
}

impl RoutingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Performance => "performance",
            Self::Efficient => "efficient",
            Self::Lite => "lite",
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "performance" => Ok(Self::Performance),
            "efficient" => Ok(Self::Efficient),
            "lite" => Ok(Self::Lite),
            other => Err(format!("unknown routing mode: {other}")),
        }
    }
}
