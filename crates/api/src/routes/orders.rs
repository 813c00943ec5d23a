//! Checkout and order query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{FulfillmentStatus, OrderId, PaymentStatus, ProductId, UserId, VariantId};
use domain::{LineItemRequest, Notifier};
use payments::PaymentGateway;
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, ShippingAddress, StorefrontStore};

use super::parse_order_id;
use crate::actor::Actor;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// Body of `POST /checkout`. Without `items` the caller's cart is used.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub items: Option<Vec<LineItemRequest>>,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
    pub total_cents: i64,
    pub shipping_address: ShippingAddress,
    pub gateway_order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    pub price_cents: i64,
    pub size: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: item.product_name,
            quantity: item.quantity,
            price_cents: item.price.cents(),
            size: item.size,
            color: item.color,
            material: item.material,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            total_cents: order.total.cents(),
            shipping_address: order.shipping_address,
            gateway_order_id: order.gateway_order_id,
            tracking_number: order.tracking_number,
            estimated_delivery: order.estimated_delivery,
            created_at: order.created_at,
            items: order.items.into_iter().map(Into::into).collect(),
        }
    }
}

// -- Handlers --

/// POST /checkout: place an order from explicit items or the stored cart.
#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn checkout<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order = match req.items {
        Some(items) => {
            state
                .checkout
                .create_order(actor.user_id, req.shipping_address, items)
                .await?
        }
        None => {
            state
                .checkout
                .checkout_cart(actor.user_id, req.shipping_address)
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let orders = state.checkout.list_orders(actor.user_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/{id}: one order, visible to its owner or an administrator.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn get<S, G, N>(
    State(state): State<Arc<AppState<S, G, N>>>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: StorefrontStore,
    G: PaymentGateway,
    N: Notifier,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .get_order(actor.user_id, actor.role, order_id)
        .await?;
    Ok(Json(order.into()))
}
