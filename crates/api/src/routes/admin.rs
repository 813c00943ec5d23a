//! Administrator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::FulfillmentStatus;
use domain::Notifier;
use payments::PaymentGateway;
use serde::Deserialize;
use store::StorefrontStore;

use super::orders::OrderResponse;
use super::parse_order_id;
use crate::actor::Actor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// PATCH /admin/orders/{id}/status: set the fulfillment status.
#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn update_status<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = parse_order_id(&id)?;
    let status: FulfillmentStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let tracking_number = req
        .tracking_number
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let order = state
        .fulfillment
        .update_order_status(actor.role, order_id, status, tracking_number)
        .await?;
    Ok(Json(order.into()))
}
