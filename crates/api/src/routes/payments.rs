//! Payment session, reconciliation and gateway-facing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Redirect;
use common::{OrderId, PaymentStatus};
use domain::Notifier;
use payments::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use payments::{PaymentGateway, PaymentHandle, WebhookAck};
use serde::{Deserialize, Serialize};
use store::StorefrontStore;

use super::parse_order_id;
use crate::actor::Actor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub order_id: OrderId,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /orders/{id}/payment: open a gateway session for the order.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn initiate<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PaymentHandle>), ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = parse_order_id(&id)?;
    let handle = state
        .sessions
        .initiate_payment(actor.user_id, order_id)
        .await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

/// POST /orders/{id}/payment/verify: poll the gateway and apply the result.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn verify<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = parse_order_id(&id)?;
    let payment_status = state
        .reconciler
        .verify_payment(actor.user_id, order_id)
        .await?;
    Ok(Json(VerifyResponse {
        order_id,
        payment_status,
    }))
}

/// GET /payments/callback: browser return from the gateway; always redirects.
///
/// A query string that fails to deserialize is treated as a missing order id.
#[tracing::instrument(skip(state))]
pub async fn callback<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Redirect
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "unreadable callback query");
            CallbackParams { order_id: None }
        }
    };
    let order_id = params
        .order_id
        .as_deref()
        .and_then(|id| OrderId::parse(id.trim()).ok());
    let outcome = state.reconciler.payment_callback(order_id).await;
    Redirect::to(&outcome.redirect_url(&state.redirects))
}

/// POST /payments/webhook: signed server-to-server notification.
///
/// Any verified event is acknowledged with 200 so the gateway stops retrying.
#[tracing::instrument(skip_all, fields(bytes = body.len()))]
pub async fn webhook<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let ack = state
        .reconciler
        .handle_webhook(
            header_str(&headers, SIGNATURE_HEADER),
            header_str(&headers, TIMESTAMP_HEADER),
            &body,
        )
        .await?;

    let status = match ack {
        WebhookAck::Processed => "processed",
        WebhookAck::Ignored => "ignored",
    };
    Ok(Json(WebhookResponse { status }))
}
