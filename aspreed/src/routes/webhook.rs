//! The unauthenticated gateway webhook.
//!
//! Flow: parse the event, resolve the invoice number from the external id,
//! load the invoice globally by number (invoice numbers are globally
//! addressable), fetch the *owning* merchant's stored webhook token, verify
//! the shared-secret header in constant time, and only then touch state.
//! Retries are harmless: an already-paid invoice takes the idempotent path
//! and reports the same order.

use aspree_api::{
    error::{ApiError, Success},
    types::{ids::InvoiceNumber, status::{InvoiceStatus, MethodType}},
};
use aspree_core::gateway::{
    parse_webhook_event, verify_webhook_signature, WebhookStatus,
};
use axum::{body::Bytes, extract::State};
use http::HeaderMap;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    routes::payment_methods::decrypt_config,
    state::SharedState,
};

/// The gateway's shared-secret header.
const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

pub async fn xendit_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Success<serde_json::Value>, ApiError> {
    let event = parse_webhook_event(&body)
        .map_err(|e| ApiError::validation(format!("{e:#}")))?;

    let number = InvoiceNumber::from_external_id(&event.external_id)
        .map_err(|e| {
            ApiError::validation(format!("Bad external id: {e:#}"))
        })?;

    let invoice = state
        .store
        .get_invoice_by_number_global(number.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown invoice number"))?;

    // The shared secret lives in the owning merchant's gateway config.
    let mut gateway_config = state
        .store
        .get_payment_method(&invoice.merchant_id, MethodType::Gateway)
        .await?
        .ok_or_else(|| {
            ApiError::unauthorized("Merchant has no gateway configured")
        })?;
    decrypt_config(&state.vault, &mut gateway_config.config);
    let stored_token = gateway_config
        .config
        .get("webhookToken")
        .or_else(|| gateway_config.config.get("webhook_token"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            ApiError::unauthorized("Merchant has no webhook token configured")
        })?;

    let header_token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(header_token, stored_token) {
        warn!(invoice = %number, "webhook signature mismatch");
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }

    match event.status {
        WebhookStatus::Paid => {
            let outcome = state
                .lifecycle
                .update_status(
                    &invoice.merchant_id,
                    &invoice.id,
                    InvoiceStatus::Paid,
                )
                .await?;
            info!(
                invoice = %number,
                order_created = ?outcome.order_created,
                "webhook marked invoice paid"
            );
            Ok(Success(json!({
                "invoice": outcome.invoice,
                "orderCreated": outcome.order_created,
                "orderNumber":
                    outcome.order.map(|o| o.order_number),
                "orderError": outcome.order_error,
            })))
        }
        WebhookStatus::Expired => {
            info!(invoice = %number, "webhook: hosted invoice expired");
            Ok(Success(json!({ "acknowledged": true })))
        }
        WebhookStatus::Other(status) => {
            info!(invoice = %number, %status, "webhook: ignored status");
            Ok(Success(json!({ "acknowledged": true })))
        }
    }
}
