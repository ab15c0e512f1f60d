//! Persistent entity models.
//!
//! These are the rows the store reads and writes. Monetary and identity
//! fields on invoices/orders are *snapshots* taken at creation time: later
//! edits to a merchant's business settings must never rewrite history.
//! Display-only enrichment (logos, terms) is layered on at response assembly
//! from live settings.
//!
//! JSON serialization is camelCase (the shape the front-end and the HTTP API
//! speak); the store maps snake_case columns explicitly.

use aspree_common::time::{serde_opt_date, TimestampMs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::types::{
    ids::{
        CustomerId, CustomerToken, FinalPaymentToken, InvoiceId,
        InvoiceNumber, MerchantId, OrderId, OrderNumber, ProductId,
    },
    status::{
        AccessType, ConfirmationStatus, ExtractionMethod, InvoiceStatus,
        MerchantStatus, MethodType, OrderStatus, PaymentStage, PaymentStatus,
        ScheduleLegStatus, ScheduleType,
    },
};

/// A tenant account. Owns all data accessed through authenticated endpoints.
///
/// Credential and token fields never serialize; queries that feed the HTTP
/// layer therefore cannot leak them.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: MerchantId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub business_name: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: MerchantStatus,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires: Option<TimestampMs>,
    pub last_login: Option<TimestampMs>,
    pub login_attempts: i64,
    pub locked_until: Option<TimestampMs>,
    pub subscription_plan: String,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// Business settings, 1:1 with a merchant after the first write.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSettings {
    pub merchant_id: MerchantId,
    pub tax_enabled: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_rate: Decimal,
    pub tax_name: Option<String>,
    pub tax_description: Option<String>,
    pub logo_url: Option<String>,
    pub logo_public_id: Option<String>,
    pub logo_filename: Option<String>,
    pub custom_header_text: Option<String>,
    pub custom_header_bg_color: Option<String>,
    pub custom_footer_bg_color: Option<String>,
    pub custom_header_logo_url: Option<String>,
    pub custom_header_logo_public_id: Option<String>,
    pub custom_footer_logo_url: Option<String>,
    pub custom_footer_logo_public_id: Option<String>,
    pub hide_aspree_branding: bool,
    pub premium_active: bool,
    pub terms_text: Option<String>,
    /// 3-char code derived from the business name on first save.
    pub business_code: Option<String>,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// Per-(merchant, method type) payment configuration. Gateway secrets inside
/// `config` are stored encrypted; decryption is confined to the gateway
/// adapter and merchant-scoped reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodConfig {
    pub merchant_id: MerchantId,
    pub method_type: MethodType,
    pub enabled: bool,
    pub config: serde_json::Value,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    /// Unique per merchant.
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cost_price: Option<Decimal>,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub is_active: bool,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax_rate: Option<Decimal>,
    pub dimensions: Option<String>,
    pub weight: Option<String>,
    pub image_url: Option<String>,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub merchant_id: MerchantId,
    pub name: String,
    /// Unique per merchant (lowercased) when present.
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(with = "serde_opt_date")]
    pub first_invoice_date: Option<Date>,
    #[serde(with = "serde_opt_date")]
    pub last_invoice_date: Option<Date>,
    pub invoice_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_spent: Decimal,
    pub extraction_method: ExtractionMethod,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// A customer plus the derived aggregates attached by `search_customers`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerWithStats {
    #[serde(flatten)]
    pub customer: Customer,
    pub order_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub order_total: Decimal,
    #[serde(with = "serde_opt_date")]
    pub last_order_date: Option<Date>,
}

/// One line of an invoice. Lives inside the invoice row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax_rate: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax_amount: Option<Decimal>,
}

/// The down-payment leg of a schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownPaymentLeg {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    pub status: ScheduleLegStatus,
    #[serde(default, with = "serde_opt_date")]
    pub paid_date: Option<Date>,
}

/// The remaining-balance leg of a schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingBalanceLeg {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "aspree_common::time::serde_date")]
    pub due_date: Date,
    pub status: ScheduleLegStatus,
    #[serde(default, with = "serde_opt_date")]
    pub paid_date: Option<Date>,
}

/// A validated down-payment schedule. Partial schedules are never stored;
/// they are dropped (with a warning) at save time instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSchedule {
    pub schedule_type: ScheduleType,
    pub down_payment: DownPaymentLeg,
    pub remaining_balance: RemainingBalanceLeg,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub merchant_id: MerchantId,
    pub invoice_number: InvoiceNumber,

    // Customer snapshot
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,

    // Merchant snapshot, taken at creation time; never back-filled
    pub merchant_name: String,
    pub merchant_email: Option<String>,
    pub merchant_phone: Option<String>,
    pub merchant_address: Option<String>,

    #[serde(with = "aspree_common::time::serde_date")]
    pub invoice_date: Date,
    #[serde(with = "serde_opt_date")]
    pub due_date: Option<Date>,
    /// Preserved across edits and due-date rewrites on DP approval.
    #[serde(with = "serde_opt_date")]
    pub original_due_date: Option<Date>,

    pub status: InvoiceStatus,
    pub payment_stage: PaymentStage,
    pub payment_status: PaymentStatus,

    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
    pub currency: String,

    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<InvoiceItem>,
    pub payment_schedule: Option<PaymentSchedule>,

    pub customer_token: CustomerToken,
    pub final_payment_token: Option<FinalPaymentToken>,

    // Payment confirmation sub-flow
    pub payment_confirmation_file: Option<String>,
    pub payment_confirmation_notes: Option<String>,
    pub payment_confirmation_date: Option<TimestampMs>,
    pub confirmation_status: Option<ConfirmationStatus>,
    pub merchant_confirmation_notes: Option<String>,
    pub confirmation_reviewed_date: Option<TimestampMs>,

    pub sent_at: Option<TimestampMs>,
    pub paid_at: Option<TimestampMs>,
    pub dp_confirmed_date: Option<TimestampMs>,
    pub final_payment_confirmed_date: Option<TimestampMs>,

    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl Invoice {
    /// The amount outstanding for the current stage: the remaining balance
    /// once a down payment has cleared, otherwise the grand total.
    pub fn amount_due(&self) -> Decimal {
        match (&self.payment_stage, &self.payment_schedule) {
            (PaymentStage::FinalPayment, Some(schedule)) =>
                schedule.remaining_balance.amount,
            (PaymentStage::DownPayment, Some(schedule)) =>
                schedule.down_payment.amount,
            _ => self.grand_total,
        }
    }
}

/// One line of an order. Lives inside the order row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub merchant_id: MerchantId,
    pub order_number: OrderNumber,

    // Customer snapshot
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<String>,

    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,

    pub tracking_number: Option<String>,
    pub shipped_date: Option<TimestampMs>,
    pub delivered_date: Option<TimestampMs>,
    pub notes: Option<String>,

    /// At most one order exists per source invoice; this is the idempotence
    /// key for auto-created orders.
    pub source_invoice_id: Option<InvoiceId>,
    pub source_invoice_number: Option<InvoiceNumber>,

    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// A record of a token- or email-gated customer access attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: i64,
    pub ip: String,
    pub user_agent: Option<String>,
    pub access_type: AccessType,
    pub customer_email: Option<String>,
    pub invoice_id: Option<InvoiceId>,
    pub success: bool,
    pub created_at: TimestampMs,
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use super::*;

    #[test]
    fn invoice_item_json_is_camel_case() {
        let item = InvoiceItem {
            product_name: "Lollipop".to_owned(),
            sku: Some("LOLLY".to_owned()),
            quantity: 2,
            unit_price: dec!(5000),
            line_total: dec!(10000),
            tax_rate: None,
            tax_amount: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["productName"], "Lollipop");
        assert_eq!(json["unitPrice"], 5000.0);
        assert!(json.get("unit_price").is_none());
    }

    #[test]
    fn schedule_json_roundtrip() {
        let schedule = PaymentSchedule {
            schedule_type: ScheduleType::DownPayment,
            down_payment: DownPaymentLeg {
                amount: dec!(20000),
                percentage: dec!(20),
                status: ScheduleLegStatus::Pending,
                paid_date: None,
            },
            remaining_balance: RemainingBalanceLeg {
                amount: dec!(80000),
                due_date: date!(2024 - 02 - 01),
                status: ScheduleLegStatus::Pending,
                paid_date: None,
            },
        };
        let json = serde_json::to_string(&schedule).unwrap();
        assert!(json.contains("\"scheduleType\":\"down_payment\""));
        assert!(json.contains("\"dueDate\":\"2024-02-01\""));
        let back: PaymentSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schedule);
    }
}
