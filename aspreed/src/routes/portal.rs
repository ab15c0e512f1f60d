//! Token-gated customer portal handlers: invoice views, proof-of-payment
//! uploads, and the final-payment flow. No login; the opaque token in the
//! URL is the capability, and every lookup is recorded in the access log.

use aspree_api::{
    entities::Invoice,
    error::{ApiError, Success},
    models::ConfirmationUploadResponse,
    types::{ids::InvoiceId, status::AccessType},
};
use aspree_core::store::NewAccessLog;
use axum::extract::{Multipart, Path, Query, State};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

use crate::{
    extract::ClientMeta,
    routes::invoices::{enrich, TokenQuery},
    state::SharedState,
    upload,
};

async fn log_token_access(
    state: &SharedState,
    meta: &aspree_core::auth::RequestMeta,
    invoice_id: Option<InvoiceId>,
    success: bool,
) -> Result<(), ApiError> {
    state
        .store
        .record_access(&NewAccessLog {
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            access_type: AccessType::Token,
            customer_email: None,
            invoice_id,
            success,
        })
        .await?;
    Ok(())
}

/// `GET /api/customer/invoice/{token}`.
pub async fn customer_invoice(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    Path(token): Path<String>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice =
        state.store.get_invoice_by_customer_token(&token).await?;
    log_token_access(
        &state,
        &meta,
        invoice.as_ref().map(|i| i.id.clone()),
        invoice.is_some(),
    )
    .await?;

    let invoice = invoice
        .ok_or_else(|| ApiError::not_found("Unknown invoice token"))?;
    let view = enrich(&state, invoice).await?;
    Ok(Success(json!({ "invoice": view })))
}

/// `GET /api/final-payment/{token}`: the remaining-balance summary.
pub async fn final_payment_summary(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    Path(token): Path<String>,
) -> Result<Success<serde_json::Value>, ApiError> {
    let invoice = state
        .store
        .get_invoice_by_final_payment_token(&token)
        .await?;
    log_token_access(
        &state,
        &meta,
        invoice.as_ref().map(|i| i.id.clone()),
        invoice.is_some(),
    )
    .await?;

    let invoice = invoice
        .ok_or_else(|| ApiError::not_found("Unknown final payment token"))?;
    let amount_due = invoice.amount_due();
    let view = enrich(&state, invoice).await?;
    Ok(Success(json!({
        "invoice": view,
        "amountDue": amount_due.to_f64(),
    })))
}

/// Pull the proof file + notes out of a multipart body and validate.
async fn read_confirmation_upload(
    mut multipart: Multipart,
) -> Result<(Vec<u8>, &'static str, Option<String>), ApiError> {
    let mut file: Option<Vec<u8>> = None;
    let mut notes: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::validation(format!("Bad multipart body: {e}"))
    })? {
        match field.name() {
            Some("file") | Some("paymentProof") => {
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::validation(format!("Bad multipart body: {e}"))
                })?;
                file = Some(bytes.to_vec());
            }
            Some("notes") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::validation(format!("Bad multipart body: {e}"))
                })?;
                if !text.trim().is_empty() {
                    notes = Some(text);
                }
            }
            _ => {}
        }
    }

    let bytes =
        file.ok_or_else(|| ApiError::validation("Missing proof file"))?;
    let extension = upload::validate_confirmation_file(&bytes)?;
    Ok((bytes, extension, notes))
}

async fn store_and_submit(
    state: &SharedState,
    invoice: Invoice,
    bytes: Vec<u8>,
    extension: &str,
    notes: Option<String>,
) -> Result<Success<ConfirmationUploadResponse>, ApiError> {
    let relative_path = upload::save_confirmation(
        &state.config.upload_dir,
        &invoice.id,
        &bytes,
        extension,
    )
    .await?;

    let updated = state
        .lifecycle
        .submit_confirmation(
            &invoice.id,
            &invoice.merchant_id,
            relative_path.clone(),
            notes,
        )
        .await?;

    Ok(Success(ConfirmationUploadResponse {
        file: relative_path,
        payment_status: updated.payment_status.to_string(),
    }))
}

/// `POST /api/invoices/{id}/payment-confirmation?token=`: customer-token
/// gated proof upload.
pub async fn upload_confirmation(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    Path(invoice_id): Path<InvoiceId>,
    Query(query): Query<TokenQuery>,
    multipart: Multipart,
) -> Result<Success<ConfirmationUploadResponse>, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::unauthorized("Missing invoice token"))?;
    let invoice = state
        .store
        .get_invoice_by_customer_token(&token)
        .await?
        .filter(|invoice| invoice.id == invoice_id);
    log_token_access(
        &state,
        &meta,
        Some(invoice_id),
        invoice.is_some(),
    )
    .await?;
    let invoice = invoice
        .ok_or_else(|| ApiError::not_found("Unknown invoice or token"))?;

    let (bytes, extension, notes) =
        read_confirmation_upload(multipart).await?;
    store_and_submit(&state, invoice, bytes, extension, notes).await
}

/// `POST /api/final-payment/{token}/payment-confirmation`: final-payment
/// token gated proof upload.
pub async fn upload_final_confirmation(
    State(state): State<SharedState>,
    ClientMeta(meta): ClientMeta,
    Path(token): Path<String>,
    multipart: Multipart,
) -> Result<Success<ConfirmationUploadResponse>, ApiError> {
    let invoice = state
        .store
        .get_invoice_by_final_payment_token(&token)
        .await?;
    log_token_access(
        &state,
        &meta,
        invoice.as_ref().map(|i| i.id.clone()),
        invoice.is_some(),
    )
    .await?;
    let invoice = invoice
        .ok_or_else(|| ApiError::not_found("Unknown final payment token"))?;

    let (bytes, extension, notes) =
        read_confirmation_upload(multipart).await?;
    store_and_submit(&state, invoice, bytes, extension, notes).await
}
