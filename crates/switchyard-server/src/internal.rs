//! Read-only observability routes

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use switchyard_broker::{BackendStatus, Broker, SubscriptionCounters};

use crate::error::ApiError;

pub(crate) async fn backends_handler(State(broker): State<Broker>) -> Result<Json<Vec<BackendStatus>>, ApiError> {
    Ok(Json(broker.backends().await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountersQuery {
    plan: Option<String>,
}

/// Counters are kept per subscription but sized by plan, so the plan is a
/// required query parameter.
pub(crate) async fn counters_handler(
    State(broker): State<Broker>,
    Path(subscription_id): Path<String>,
    Query(query): Query<CountersQuery>,
) -> Result<Json<SubscriptionCounters>, ApiError> {
    let plan_id = query
        .plan
        .ok_or_else(|| ApiError::InvalidRequest("plan query parameter is required".into()))?;

    broker
        .counters(&subscription_id, &plan_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("plan '{plan_id}'")))
}
