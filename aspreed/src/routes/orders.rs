//! Order handlers: listing, fulfillment updates, and the reconciliation
//! sweep that derives missing orders from paid invoices.

use aspree_api::{
    error::{ApiError, Success},
    models::{OrderListQuery, SyncOrdersResponse, UpdateOrderRequest},
    types::{ids::OrderId, status::OrderStatus},
};
use aspree_common::time::TimestampMs;
use aspree_core::store::OrderFilter;
use axum::extract::{Path, Query, State};
use serde_json::json;

use crate::{
    extract::{ApiJson, MerchantPrincipal},
    state::SharedState,
};

pub async fn list(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Query(query): Query<OrderListQuery>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let filter = OrderFilter {
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    };
    let orders = state.store.list_orders(&principal.0.id, &filter).await?;
    Ok(Success(json!({ "orders": orders })))
}

pub async fn get(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(order_id): Path<OrderId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let order = state
        .store
        .get_order(&principal.0.id, &order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown order"))?;
    Ok(Success(json!({ "order": order })))
}

/// Fulfillment update: status moves forward through the transition table,
/// stamping shipped / delivered dates; the tracking number may be set at
/// any point before delivery.
pub async fn update(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(order_id): Path<OrderId>,
    ApiJson(req): ApiJson<UpdateOrderRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let mut order = state
        .store
        .get_order(&principal.0.id, &order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown order"))?;

    if let Some(next) = req.status {
        if next != order.status && !order.status.can_transition_to(next) {
            return Err(ApiError::conflict(format!(
                "Cannot transition order from '{}' to '{next}'",
                order.status
            )));
        }
        let now = TimestampMs::now();
        match next {
            OrderStatus::Shipped if order.shipped_date.is_none() =>
                order.shipped_date = Some(now),
            OrderStatus::Delivered if order.delivered_date.is_none() =>
                order.delivered_date = Some(now),
            _ => {}
        }
        order.status = next;
    }
    if let Some(tracking) = req.tracking_number {
        order.tracking_number = Some(tracking);
    }
    order.updated_at = TimestampMs::now();
    state.store.update_order(&order).await?;

    Ok(Success(json!({ "order": order })))
}

pub async fn delete(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(order_id): Path<OrderId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let deleted =
        state.store.delete_order(&principal.0.id, &order_id).await?;
    if !deleted {
        return Err(ApiError::not_found("Unknown order"));
    }
    Ok(Success(json!({ "deleted": true })))
}

/// `POST /api/orders/sync-from-invoices`: reconcile paid invoices that
/// are missing their derived order. Idempotent.
pub async fn sync_from_invoices(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
) -> Result<Success<SyncOrdersResponse>, ApiError> {
    let result = state
        .lifecycle
        .sync_paid_invoices_to_orders(&principal.0.id)
        .await?;
    Ok(Success(result))
}
