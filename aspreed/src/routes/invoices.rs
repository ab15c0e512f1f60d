//! Invoice handlers: preview/confirm, listing, lifecycle transitions, the
//! confirmation review, and the merchant-side invoice views.

use aspree_api::{
    entities::Invoice,
    error::{ApiError, Success},
    models::{
        BusinessDisplay, ConfirmInvoiceRequest, InvoiceListQuery,
        InvoiceView, PreviewInvoiceRequest, PreviewInvoiceResponse,
        ReviewConfirmationRequest, StatusUpdateResponse,
        UpdateInvoiceStatusRequest,
    },
    types::{
        ids::InvoiceId,
        status::InvoiceStatus,
    },
};
use aspree_core::{
    queue::SideEffect,
    store::{InvoiceFilter, NewAccessLog, ProductFilter},
};
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;

use crate::{
    extract::{ApiJson, ClientMeta, MerchantPrincipal, OptionalPrincipal},
    state::SharedState,
};

/// Build the display block for an invoice from the owning merchant's live
/// settings. Snapshot fields on the invoice stay untouched.
pub async fn enrich(
    state: &SharedState,
    invoice: Invoice,
) -> Result<InvoiceView, ApiError> {
    let settings =
        state.profiles.get_settings(&invoice.merchant_id).await?;
    let business: BusinessDisplay =
        state.profiles.display_for(&invoice.merchant_name, &settings);
    Ok(InvoiceView {
        invoice,
        business: Some(business),
    })
}

/// Delegate free-form text to the extractor. No persistence.
pub async fn preview(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ApiJson(req): ApiJson<PreviewInvoiceRequest>,
) -> Result<Success<PreviewInvoiceResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::validation("Message text is required"));
    }

    let catalog = state
        .store
        .list_products(
            &principal.0.id,
            &ProductFilter {
                active_only: true,
                limit: Some(500),
                ..Default::default()
            },
        )
        .await?;
    let settings = state.profiles.get_settings(&principal.0.id).await?;

    let draft = state
        .extractor
        .extract_invoice(&req.text, &catalog, Some(&settings))
        .await
        .map_err(|e| {
            ApiError::upstream(format!("Invoice extraction failed: {e:#}"))
        })?;

    Ok(Success(PreviewInvoiceResponse { draft }))
}

/// Persist a previewed draft, or update an existing editable invoice when
/// `invoiceId` is present.
pub async fn confirm(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    ApiJson(req): ApiJson<ConfirmInvoiceRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let settings = state.profiles.get_settings(&principal.0.id).await?;

    let invoice = match &req.invoice_id {
        Some(invoice_id) => {
            state
                .lifecycle
                .edit_from_draft(
                    &principal.0,
                    Some(&settings),
                    invoice_id,
                    &req.draft,
                )
                .await?
        }
        None => {
            state
                .lifecycle
                .create_from_draft(&principal.0, Some(&settings), &req.draft)
                .await?
        }
    };

    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "invoice": invoice })))
}

pub async fn list(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let filter = InvoiceFilter {
        status: query.status,
        customer_email: query.customer_email,
        date_from: query.date_from,
        date_to: query.date_to,
        limit: query.limit,
        offset: query.offset,
    };
    let invoices =
        state.store.list_invoices(&principal.0.id, &filter).await?;
    Ok(Success(json!({ "invoices": invoices })))
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// `GET /api/invoices/{id}`: merchant-authenticated, or token-gated for
/// customers holding the invoice's portal token.
pub async fn get(
    State(state): State<SharedState>,
    OptionalPrincipal(principal): OptionalPrincipal,
    ClientMeta(meta): ClientMeta,
    Path(invoice_id): Path<InvoiceId>,
    Query(query): Query<TokenQuery>,
) -> Result<Success<serde_json::Value>, ApiError> {
    if let Some(merchant) = principal {
        let invoice = state
            .store
            .get_invoice(&merchant.id, &invoice_id)
            .await?;
        return match invoice {
            Some(invoice) => {
                let view = enrich(&state, invoice).await?;
                Ok(Success(json!({ "invoice": view })))
            }
            None => {
                // The row existing under another merchant is an ownership
                // failure, not a missing resource.
                if state
                    .store
                    .invoice_exists_any_merchant(&invoice_id)
                    .await?
                {
                    Err(ApiError::forbidden("You do not own this invoice"))
                } else {
                    Err(ApiError::not_found("Unknown invoice"))
                }
            }
        };
    }

    // Token path: the opaque customer token is the capability.
    let Some(token) = query.token else {
        return Err(ApiError::unauthorized("Authentication required"));
    };
    let invoice = state
        .store
        .get_invoice_by_customer_token(&token)
        .await?
        .filter(|invoice| invoice.id == invoice_id);

    let success = invoice.is_some();
    state
        .store
        .record_access(&NewAccessLog {
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            access_type: aspree_api::types::status::AccessType::Token,
            customer_email: None,
            invoice_id: Some(invoice_id.clone()),
            success,
        })
        .await?;

    match invoice {
        Some(invoice) => {
            let view = enrich(&state, invoice).await?;
            Ok(Success(json!({ "invoice": view })))
        }
        None => Err(ApiError::not_found("Unknown invoice or token")),
    }
}

pub async fn get_by_number(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(number): Path<String>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice = state
        .store
        .get_invoice_by_number(&principal.0.id, &number)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown invoice number"))?;
    let view = enrich(&state, invoice).await?;
    Ok(Success(json!({ "invoice": view })))
}

/// Best-effort hosted checkout creation for a freshly sent invoice; a
/// gateway failure is recovered locally, never surfaced to the merchant.
async fn try_create_checkout(
    state: &SharedState,
    invoice: &Invoice,
) -> Option<String> {
    use aspree_api::types::status::MethodType;
    use aspree_core::gateway::{format_external_id, HostedInvoiceRequest};
    use rust_decimal::prelude::ToPrimitive;

    let mut gateway_config = state
        .store
        .get_payment_method(&invoice.merchant_id, MethodType::Gateway)
        .await
        .ok()
        .flatten()
        .filter(|config| config.enabled)?;
    crate::routes::payment_methods::decrypt_config(
        &state.vault,
        &mut gateway_config.config,
    );
    let secret = gateway_config
        .config
        .get("secretKey")
        .or_else(|| gateway_config.config.get("secret_key"))
        .and_then(serde_json::Value::as_str)?
        .to_owned();
    let environment = gateway_config
        .config
        .get("environment")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("production");

    let request = HostedInvoiceRequest {
        external_id: format_external_id(
            &invoice.invoice_number,
            aspree_common::time::TimestampMs::now(),
        ),
        amount: invoice.amount_due().to_f64().unwrap_or_default(),
        description: format!("Invoice {}", invoice.invoice_number),
        payer_email: invoice.customer_email.clone(),
        success_redirect_url: Some(state.config.base_url.clone()),
        failure_redirect_url: Some(state.config.base_url.clone()),
        currency: invoice.currency.clone(),
        payment_methods: Vec::new(),
    };
    match state
        .gateway
        .create_hosted_invoice(&secret, environment, &request)
        .await
    {
        Ok(hosted) => Some(hosted.invoice_url),
        Err(e) => {
            tracing::warn!(
                invoice = %invoice.invoice_number,
                "hosted checkout creation failed: {e:#}"
            );
            None
        }
    }
}

/// `PUT /api/invoices/{id}/status`: drive a lifecycle transition. The
/// envelope carries the advisory auto-order fields; notifications go onto
/// the queue after the transition is recorded.
pub async fn update_status(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
    ApiJson(req): ApiJson<UpdateInvoiceStatusRequest>,
) -> Result<Success<StatusUpdateResponse>, ApiError> {
    let outcome = state
        .lifecycle
        .update_status(&principal.0.id, &invoice_id, req.status)
        .await?;

    let mut checkout_url = None;
    match outcome.invoice.status {
        InvoiceStatus::Sent => {
            checkout_url =
                try_create_checkout(&state, &outcome.invoice).await;
            state.queue.push(SideEffect::SendInvoice {
                merchant_id: principal.0.id.clone(),
                invoice_id: invoice_id.clone(),
            });
        }
        InvoiceStatus::DpPaid =>
            state.queue.push(SideEffect::SendFinalPayment {
                merchant_id: principal.0.id.clone(),
                invoice_id: invoice_id.clone(),
            }),
        _ => {}
    }

    Ok(Success(StatusUpdateResponse {
        order_created: outcome.order_created,
        order_number: outcome.order.map(|o| o.order_number),
        order_error: outcome.order_error,
        checkout_url,
        invoice: outcome.invoice,
    }))
}

/// `POST /api/invoices/{id}/send-reminder`: queue a payment reminder for
/// an outstanding invoice.
pub async fn send_reminder(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice = state
        .store
        .get_invoice(&principal.0.id, &invoice_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;
    if invoice.status.is_terminal() {
        return Err(ApiError::conflict(
            "Invoice is no longer awaiting payment",
        ));
    }

    state.queue.push(SideEffect::SendReminder {
        merchant_id: principal.0.id.clone(),
        invoice_id,
    });
    Ok(Success(json!({ "queued": true })))
}

/// `DELETE /api/invoices/{id}`: drafts only.
pub async fn delete(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice = state
        .store
        .get_invoice(&principal.0.id, &invoice_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;
    if invoice.status != InvoiceStatus::Draft {
        return Err(ApiError::immutable(
            "Only draft invoices can be deleted",
        ));
    }
    state.store.delete_invoice(&principal.0.id, &invoice_id).await?;
    state
        .cache
        .invalidate_prefix(&format!("{}:", principal.0.id));
    Ok(Success(json!({ "deleted": true })))
}

/// Approve the pending payment confirmation; the stage decides whether the
/// invoice lands in `dp_paid` or `paid`.
pub async fn approve_confirmation(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
    ApiJson(req): ApiJson<ReviewConfirmationRequest>,
) -> Result<Success<StatusUpdateResponse>, ApiError> {
    let outcome = state
        .lifecycle
        .approve_confirmation(
            &principal.0.id,
            &invoice_id,
            req.merchant_notes,
        )
        .await?;

    if outcome.invoice.status == InvoiceStatus::DpPaid {
        state.queue.push(SideEffect::SendFinalPayment {
            merchant_id: principal.0.id.clone(),
            invoice_id: invoice_id.clone(),
        });
    }

    Ok(Success(StatusUpdateResponse {
        order_created: outcome.order_created,
        order_number: outcome.order.map(|o| o.order_number),
        order_error: outcome.order_error,
        checkout_url: None,
        invoice: outcome.invoice,
    }))
}

pub async fn reject_confirmation(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
    ApiJson(req): ApiJson<ReviewConfirmationRequest>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice = state
        .lifecycle
        .reject_confirmation(
            &principal.0.id,
            &invoice_id,
            req.merchant_notes,
        )
        .await?;
    Ok(Success(json!({ "invoice": invoice })))
}

/// `POST /api/invoices/{id}/confirm-down-payment`: approve the DP leg
/// directly (e.g. for an offline transfer the merchant verified manually).
pub async fn confirm_down_payment(
    State(state): State<SharedState>,
    principal: MerchantPrincipal,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<Success<StatusUpdateResponse>, ApiError> {
    let outcome = state
        .lifecycle
        .update_status(&principal.0.id, &invoice_id, InvoiceStatus::DpPaid)
        .await?;

    state.queue.push(SideEffect::SendFinalPayment {
        merchant_id: principal.0.id.clone(),
        invoice_id,
    });

    Ok(Success(StatusUpdateResponse {
        order_created: outcome.order_created,
        order_number: outcome.order.map(|o| o.order_number),
        order_error: outcome.order_error,
        checkout_url: None,
        invoice: outcome.invoice,
    }))
}
