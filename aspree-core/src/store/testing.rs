//! Shared fixtures for store and service tests.

use aspree_api::{
    entities::{Customer, Invoice, InvoiceItem, Merchant, Order, Product},
    types::{
        ids::{
            CustomerId, CustomerToken, InvoiceId, InvoiceNumber, MerchantId,
            OrderId, OrderNumber, ProductId,
        },
        status::{
            ExtractionMethod, InvoiceStatus, MerchantStatus, OrderStatus,
            PaymentStage, PaymentStatus,
        },
    },
};
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use time::macros::date;

use super::Store;

pub(crate) fn test_merchant(email: &str) -> Merchant {
    let now = TimestampMs::now();
    Merchant {
        id: MerchantId::generate(),
        email: email.to_owned(),
        password_hash: "$2b$12$fakefakefakefakefakefake".to_owned(),
        business_name: "Toko Maju".to_owned(),
        full_name: "Budi Santoso".to_owned(),
        phone: None,
        address: None,
        status: MerchantStatus::Active,
        email_verified: false,
        email_verification_token: Some("verify-token".to_owned()),
        reset_token: None,
        reset_token_expires: None,
        last_login: None,
        login_attempts: 0,
        locked_until: None,
        subscription_plan: "free".to_owned(),
        created_at: now,
        updated_at: now,
    }
}

/// Create a merchant row and return its id.
pub(crate) async fn seed_merchant(store: &Store, email: &str) -> MerchantId {
    let merchant = test_merchant(email);
    store.create_merchant(&merchant).await.unwrap();
    merchant.id
}

pub(crate) fn test_product(
    merchant_id: &MerchantId,
    sku: &str,
    unit_price: Decimal,
) -> Product {
    let now = TimestampMs::now();
    Product {
        id: ProductId::generate(),
        merchant_id: merchant_id.clone(),
        sku: sku.to_owned(),
        name: format!("Product {sku}"),
        category: None,
        unit_price,
        cost_price: None,
        stock_quantity: 10,
        min_stock_level: 0,
        is_active: true,
        tax_rate: None,
        dimensions: None,
        weight: None,
        image_url: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn test_customer(
    merchant_id: &MerchantId,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Customer {
    let now = TimestampMs::now();
    Customer {
        id: CustomerId::generate(),
        merchant_id: merchant_id.clone(),
        name: name.to_owned(),
        email: email.map(str::to_owned),
        phone: phone.map(str::to_owned),
        address: None,
        first_invoice_date: None,
        last_invoice_date: None,
        invoice_count: 0,
        total_spent: Decimal::ZERO,
        extraction_method: ExtractionMethod::Auto,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn test_invoice(
    merchant_id: &MerchantId,
    number: &str,
    token: &str,
    grand_total: Decimal,
) -> Invoice {
    let now = TimestampMs::now();
    Invoice {
        id: InvoiceId::generate(),
        merchant_id: merchant_id.clone(),
        invoice_number: number.parse::<InvoiceNumber>().unwrap(),
        customer_id: None,
        customer_name: "Christy Wijaya".to_owned(),
        customer_email: Some("c@x.com".to_owned()),
        customer_phone: None,
        customer_address: None,
        merchant_name: "Toko Maju".to_owned(),
        merchant_email: Some("merchant@x.com".to_owned()),
        merchant_phone: None,
        merchant_address: None,
        invoice_date: date!(2024 - 01 - 01),
        due_date: Some(date!(2024 - 01 - 15)),
        original_due_date: Some(date!(2024 - 01 - 15)),
        status: InvoiceStatus::Draft,
        payment_stage: PaymentStage::FullPayment,
        payment_status: PaymentStatus::Pending,
        subtotal: grand_total,
        tax_amount: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        discount: Decimal::ZERO,
        grand_total,
        currency: "IDR".to_owned(),
        payment_terms: None,
        notes: None,
        items: vec![InvoiceItem {
            product_name: "Lollipop".to_owned(),
            sku: Some("LOLLY".to_owned()),
            quantity: 1,
            unit_price: grand_total,
            line_total: grand_total,
            tax_rate: None,
            tax_amount: None,
        }],
        payment_schedule: None,
        customer_token: token.parse::<CustomerToken>().unwrap(),
        final_payment_token: None,
        payment_confirmation_file: None,
        payment_confirmation_notes: None,
        payment_confirmation_date: None,
        confirmation_status: None,
        merchant_confirmation_notes: None,
        confirmation_reviewed_date: None,
        sent_at: None,
        paid_at: None,
        dp_confirmed_date: None,
        final_payment_confirmed_date: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn test_order(
    merchant_id: &MerchantId,
    number: &str,
    source_invoice: Option<&Invoice>,
) -> Order {
    let now = TimestampMs::now();
    Order {
        id: OrderId::generate(),
        merchant_id: merchant_id.clone(),
        order_number: number.parse::<OrderNumber>().unwrap(),
        customer_name: "Christy Wijaya".to_owned(),
        customer_email: Some("c@x.com".to_owned()),
        customer_phone: None,
        shipping_address: None,
        items: vec![],
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Paid,
        subtotal: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        discount: Decimal::ZERO,
        total_amount: Decimal::ZERO,
        currency: "IDR".to_owned(),
        tracking_number: None,
        shipped_date: None,
        delivered_date: None,
        notes: None,
        source_invoice_id: source_invoice.map(|i| i.id.clone()),
        source_invoice_number: source_invoice
            .map(|i| i.invoice_number.clone()),
        created_at: now,
        updated_at: now,
    }
}
