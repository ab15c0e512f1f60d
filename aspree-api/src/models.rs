//! Request / response models for the HTTP API.
//!
//! Everything here serializes camelCase. Success payloads are merged into
//! the `{success: true, ...}` envelope by [`crate::error::Success`].

use aspree_common::time::{serde_opt_date, TimestampMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    entities::{Invoice, InvoiceItem, Order, PaymentSchedule},
    types::{
        ids::{InvoiceId, MerchantId, OrderNumber},
        status::{InvoiceStatus, MethodType, OrderStatus},
    },
};

// --- Auth --- //

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub business_name: String,
    pub full_name: String,
    #[serde(default)]
    pub agree_terms: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub merchant_id: MerchantId,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub merchant: MerchantProfile,
}

/// The merchant view returned by auth endpoints. Deliberately a separate
/// model from [`crate::entities::Merchant`] so credential fields cannot be
/// serialized by accident.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantProfile {
    pub id: MerchantId,
    pub email: String,
    pub business_name: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email_verified: bool,
    pub subscription_plan: String,
    pub last_login: Option<TimestampMs>,
    pub created_at: TimestampMs,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub business_name: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest {
    pub email: String,
}

// --- Business settings --- //

/// The business-settings write model. Accepts both camelCase and the legacy
/// snake_case field names; only camelCase is produced on the way out.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSettingsPatch {
    #[serde(default, alias = "tax_enabled")]
    pub tax_enabled: Option<bool>,
    #[serde(
        default,
        alias = "tax_rate",
        with = "rust_decimal::serde::float_option"
    )]
    pub tax_rate: Option<Decimal>,
    #[serde(default, alias = "tax_name")]
    pub tax_name: Option<String>,
    #[serde(default, alias = "tax_description")]
    pub tax_description: Option<String>,
    #[serde(default, alias = "custom_header_text")]
    pub custom_header_text: Option<String>,
    #[serde(default, alias = "custom_header_bg_color")]
    pub custom_header_bg_color: Option<String>,
    #[serde(default, alias = "custom_footer_bg_color")]
    pub custom_footer_bg_color: Option<String>,
    #[serde(default, alias = "hide_aspree_branding")]
    pub hide_aspree_branding: Option<bool>,
    #[serde(default, alias = "premium_active")]
    pub premium_active: Option<bool>,
    #[serde(default, alias = "terms_text")]
    pub terms_text: Option<String>,
}

// --- Payment methods --- //

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodPatch {
    pub method_type: MethodType,
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionRequest {
    pub secret_key: String,
    #[serde(default)]
    pub environment: Option<String>,
}

// --- Invoices --- //

/// The structured draft produced by the natural-language extractor, echoed
/// back by `/api/preview-invoice` and accepted by `/api/confirm-invoice`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub customer: DraftCustomer,
    pub items: Vec<DraftItem>,
    #[serde(default, with = "serde_opt_date")]
    pub invoice_date: Option<Date>,
    #[serde(default, with = "serde_opt_date")]
    pub due_date: Option<Date>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub shipping_cost: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_schedule: Option<DraftSchedule>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftCustomer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub product_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

/// The schedule as submitted by a client. Both legs are required for the
/// schedule to be stored; a partial schedule is dropped with a warning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSchedule {
    pub schedule_type: String,
    #[serde(default)]
    pub down_payment: Option<DraftScheduleLeg>,
    #[serde(default)]
    pub remaining_balance: Option<DraftRemainingLeg>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftScheduleLeg {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub percentage: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRemainingLeg {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(default, with = "serde_opt_date")]
    pub due_date: Option<Date>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInvoiceRequest {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInvoiceResponse {
    pub draft: InvoiceDraft,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmInvoiceRequest {
    #[serde(flatten)]
    pub draft: InvoiceDraft,
    /// When present, updates the existing invoice instead of creating one.
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListQuery {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

/// The result of a lifecycle transition. `order_*` fields are advisory: a
/// failed auto-order creation does not fail the parent transition; the
/// reconciliation endpoint can finish the job later. `checkout_url` appears
/// when marking sent produced a hosted gateway checkout.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateResponse {
    pub invoice: Invoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<OrderNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConfirmationRequest {
    #[serde(default)]
    pub merchant_notes: Option<String>,
}

/// An invoice enriched with the merchant's live display settings. Monetary
/// and identity fields stay snapshot-bound; only presentation data is live.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<BusinessDisplay>,
}

/// Display-only business profile attached to invoice views. Custom-branding
/// fields appear only when the merchant's premium flag is active.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDisplay {
    pub business_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_header_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_header_bg_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_footer_bg_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_header_logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_footer_logo_url: Option<String>,
    pub hide_aspree_branding: bool,
}

// --- Orders --- //

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// The result of `POST /api/orders/sync-from-invoices`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOrdersResponse {
    pub created: u32,
    pub skipped: u32,
    pub orders: Vec<Order>,
}

// --- Products --- //

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[serde(default)]
    pub active_only: Option<bool>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

// --- Customers --- //

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

// --- Payment confirmation uploads --- //

/// Metadata recorded alongside a stored proof-of-payment file.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationUploadResponse {
    pub file: String,
    pub payment_status: String,
}

// --- Items helpers --- //

/// Derive invoice items (with line totals and per-line tax) from draft items.
pub fn items_from_draft(
    draft_items: &[DraftItem],
    tax_rate: Option<Decimal>,
) -> Vec<InvoiceItem> {
    use crate::types::money::round_money;

    draft_items
        .iter()
        .map(|item| {
            let line_total =
                round_money(item.unit_price * Decimal::from(item.quantity));
            let tax_amount = tax_rate
                .map(|rate| round_money(line_total * rate / Decimal::ONE_HUNDRED));
            InvoiceItem {
                product_name: item.product_name.clone(),
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total,
                tax_rate,
                tax_amount,
            }
        })
        .collect()
}

/// Derive the schedule entity from a draft schedule, or explain why it is
/// incomplete. Incomplete schedules are dropped by the caller, not stored.
pub fn schedule_from_draft(
    draft: &DraftSchedule,
) -> Result<PaymentSchedule, &'static str> {
    use crate::{
        entities::{DownPaymentLeg, RemainingBalanceLeg},
        types::status::{ScheduleLegStatus, ScheduleType},
    };

    if draft.schedule_type != "down_payment" {
        return Err("unsupported schedule type");
    }
    let dp = draft.down_payment.as_ref().ok_or("missing downPayment")?;
    let rb = draft
        .remaining_balance
        .as_ref()
        .ok_or("missing remainingBalance")?;

    let (amount, percentage) = match (dp.amount, dp.percentage) {
        (Some(a), Some(p)) => (a, p),
        _ => return Err("downPayment requires amount and percentage"),
    };
    let (rb_amount, due_date) = match (rb.amount, rb.due_date) {
        (Some(a), Some(d)) => (a, d),
        _ => return Err("remainingBalance requires amount and dueDate"),
    };

    Ok(PaymentSchedule {
        schedule_type: ScheduleType::DownPayment,
        down_payment: DownPaymentLeg {
            amount,
            percentage,
            status: ScheduleLegStatus::Pending,
            paid_date: None,
        },
        remaining_balance: RemainingBalanceLeg {
            amount: rb_amount,
            due_date,
            status: ScheduleLegStatus::Pending,
            paid_date: None,
        },
    })
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn items_from_draft_totals() {
        let items = items_from_draft(
            &[DraftItem {
                product_name: "Lollipop".to_owned(),
                sku: Some("LOLLY".to_owned()),
                quantity: 3,
                unit_price: dec!(5000),
            }],
            Some(dec!(11)),
        );
        assert_eq!(items[0].line_total, dec!(15000));
        assert_eq!(items[0].tax_amount, Some(dec!(1650)));
    }

    #[test]
    fn partial_schedule_is_rejected() {
        let draft = DraftSchedule {
            schedule_type: "down_payment".to_owned(),
            down_payment: Some(DraftScheduleLeg {
                amount: Some(dec!(20000)),
                percentage: None,
            }),
            remaining_balance: None,
        };
        assert!(schedule_from_draft(&draft).is_err());
    }

    #[test]
    fn complete_schedule_is_accepted() {
        let draft = DraftSchedule {
            schedule_type: "down_payment".to_owned(),
            down_payment: Some(DraftScheduleLeg {
                amount: Some(dec!(20000)),
                percentage: Some(dec!(20)),
            }),
            remaining_balance: Some(DraftRemainingLeg {
                amount: Some(dec!(80000)),
                due_date: Some(time::macros::date!(2024 - 02 - 01)),
            }),
        };
        let schedule = schedule_from_draft(&draft).unwrap();
        assert_eq!(schedule.down_payment.amount, dec!(20000));
        assert_eq!(schedule.remaining_balance.amount, dec!(80000));
    }

    #[test]
    fn invoice_list_query_parses_status() {
        let query: InvoiceListQuery =
            serde_json::from_str("{\"status\":\"sent\"}").unwrap();
        assert_eq!(
            query.status,
            Some(crate::types::status::InvoiceStatus::Sent)
        );
    }
}
