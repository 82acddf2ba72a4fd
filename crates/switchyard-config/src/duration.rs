//! Human-readable durations (`"60s"`, `"5m"`, `"1h"`) in configuration

use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub(crate) fn parse(raw: &str) -> Result<Duration, String> {
    duration_str::parse(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse(&raw))
        .transpose()
        .map_err(serde::de::Error::custom)
}
