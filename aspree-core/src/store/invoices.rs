//! Invoice table access.
//!
//! Line items and the payment schedule live inside the invoice row as JSON,
//! so deleting an invoice cascades to its items by construction. Lookups by
//! customer token / final-payment token / bare number are global by design
//! (the tokens and numbers are the capability); everything else is
//! merchant-scoped.

use aspree_api::{
    entities::{Invoice, InvoiceItem, PaymentSchedule},
    types::ids::{InvoiceId, MerchantId},
};
use aspree_common::time::TimestampMs;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use super::{
    get_date, get_decimal, get_json, get_opt_date, get_opt_json,
    get_opt_parsed, get_opt_ts, get_parsed, get_ts, map_write_err,
    opt_date_str, require_merchant, Store, StoreError,
};

/// Filters for [`Store::list_invoices`].
#[derive(Clone, Debug, Default)]
pub struct InvoiceFilter {
    pub status: Option<aspree_api::types::status::InvoiceStatus>,
    pub customer_email: Option<String>,
    /// Inclusive `YYYY-MM-DD` lower bound on the invoice date.
    pub date_from: Option<String>,
    /// Inclusive `YYYY-MM-DD` upper bound on the invoice date.
    pub date_to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Store {
    pub async fn create_invoice(
        &self,
        invoice: &Invoice,
    ) -> Result<(), StoreError> {
        require_merchant(&invoice.merchant_id)?;
        let items_json = encode_items(&invoice.items)?;
        let schedule_json = encode_schedule(&invoice.payment_schedule)?;
        sqlx::query(
            "INSERT INTO invoices (
                id, merchant_id, invoice_number,
                customer_id, customer_name, customer_email, customer_phone,
                customer_address,
                merchant_name, merchant_email, merchant_phone,
                merchant_address,
                invoice_date, due_date, original_due_date,
                status, payment_stage, payment_status,
                subtotal, tax_amount, shipping_cost, discount, grand_total,
                currency, payment_terms, notes, items, payment_schedule,
                customer_token, final_payment_token,
                payment_confirmation_file, payment_confirmation_notes,
                payment_confirmation_date, confirmation_status,
                merchant_confirmation_notes, confirmation_reviewed_date,
                sent_at, paid_at, dp_confirmed_date,
                final_payment_confirmed_date, created_at, updated_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?
            )",
        )
        .bind(invoice.id.as_str())
        .bind(invoice.merchant_id.as_str())
        .bind(invoice.invoice_number.as_str())
        .bind(invoice.customer_id.as_ref().map(|id| id.as_str().to_owned()))
        .bind(&invoice.customer_name)
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_phone)
        .bind(&invoice.customer_address)
        .bind(&invoice.merchant_name)
        .bind(&invoice.merchant_email)
        .bind(&invoice.merchant_phone)
        .bind(&invoice.merchant_address)
        .bind(aspree_common::time::format_date(invoice.invoice_date))
        .bind(opt_date_str(invoice.due_date))
        .bind(opt_date_str(invoice.original_due_date))
        .bind(invoice.status.to_string())
        .bind(invoice.payment_stage.to_string())
        .bind(invoice.payment_status.to_string())
        .bind(invoice.subtotal.to_string())
        .bind(invoice.tax_amount.to_string())
        .bind(invoice.shipping_cost.to_string())
        .bind(invoice.discount.to_string())
        .bind(invoice.grand_total.to_string())
        .bind(&invoice.currency)
        .bind(&invoice.payment_terms)
        .bind(&invoice.notes)
        .bind(items_json)
        .bind(schedule_json)
        .bind(invoice.customer_token.as_str())
        .bind(
            invoice
                .final_payment_token
                .as_ref()
                .map(|t| t.as_str().to_owned()),
        )
        .bind(&invoice.payment_confirmation_file)
        .bind(&invoice.payment_confirmation_notes)
        .bind(invoice.payment_confirmation_date.map(|t| t.as_i64()))
        .bind(invoice.confirmation_status.map(|s| s.to_string()))
        .bind(&invoice.merchant_confirmation_notes)
        .bind(invoice.confirmation_reviewed_date.map(|t| t.as_i64()))
        .bind(invoice.sent_at.map(|t| t.as_i64()))
        .bind(invoice.paid_at.map(|t| t.as_i64()))
        .bind(invoice.dp_confirmed_date.map(|t| t.as_i64()))
        .bind(invoice.final_payment_confirmed_date.map(|t| t.as_i64()))
        .bind(invoice.created_at.as_i64())
        .bind(invoice.updated_at.as_i64())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "invoice number"))?;
        Ok(())
    }

    pub async fn get_invoice(
        &self,
        merchant_id: &MerchantId,
        id: &InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    /// Exists-check without scoping, used only to answer "does any invoice
    /// own this id" for 403-vs-404 decisions at the HTTP layer.
    pub async fn invoice_exists_any_merchant(
        &self,
        id: &InvoiceId,
    ) -> Result<bool, StoreError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE id = ?)",
        )
        .bind(id.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(exists != 0)
    }

    pub async fn get_invoice_by_number(
        &self,
        merchant_id: &MerchantId,
        number: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM invoices
             WHERE merchant_id = ? AND invoice_number = ?",
        )
        .bind(merchant_id.as_str())
        .bind(number)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    /// Global lookup by number. Invoice numbers are globally unique and
    /// globally addressable; this is the webhook's entry point and must stay
    /// SELECT-only.
    pub async fn get_invoice_by_number_global(
        &self,
        number: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE invoice_number = ?",
        )
        .bind(number)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    /// Global lookup by the customer portal token.
    pub async fn get_invoice_by_customer_token(
        &self,
        token: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE customer_token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    /// Global lookup by the final-payment token.
    pub async fn get_invoice_by_final_payment_token(
        &self,
        token: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE final_payment_token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_invoice).transpose()
    }

    pub async fn list_invoices(
        &self,
        merchant_id: &MerchantId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        require_merchant(merchant_id)?;
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT * FROM invoices WHERE merchant_id = ",
        );
        query.push_bind(merchant_id.as_str());
        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status.to_string());
        }
        if let Some(email) = &filter.customer_email {
            query.push(" AND LOWER(COALESCE(customer_email, '')) = ");
            query.push_bind(email.to_lowercase());
        }
        if let Some(from) = &filter.date_from {
            query.push(" AND invoice_date >= ");
            query.push_bind(from);
        }
        if let Some(to) = &filter.date_to {
            query.push(" AND invoice_date <= ");
            query.push_bind(to);
        }
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ");
        query.push_bind(filter.limit.unwrap_or(100));
        query.push(" OFFSET ");
        query.push_bind(filter.offset.unwrap_or(0));

        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(row_to_invoice).collect()
    }

    /// Full-row update, merchant-scoped.
    pub async fn update_invoice(
        &self,
        invoice: &Invoice,
    ) -> Result<(), StoreError> {
        self.update_invoice_inner(invoice, None).await.map(|_| ())
    }

    /// Conditional full-row update: only applies if the row still carries
    /// `expected_status` and `expected_updated_at` (the read fingerprint).
    /// Returns whether a row was updated; `false` means a concurrent writer
    /// won and the caller should re-read and retry.
    pub async fn update_invoice_guarded(
        &self,
        invoice: &Invoice,
        expected_status: aspree_api::types::status::InvoiceStatus,
        expected_updated_at: TimestampMs,
    ) -> Result<bool, StoreError> {
        self.update_invoice_inner(
            invoice,
            Some((expected_status, expected_updated_at)),
        )
        .await
    }

    async fn update_invoice_inner(
        &self,
        invoice: &Invoice,
        fingerprint: Option<(
            aspree_api::types::status::InvoiceStatus,
            TimestampMs,
        )>,
    ) -> Result<bool, StoreError> {
        require_merchant(&invoice.merchant_id)?;
        let items_json = encode_items(&invoice.items)?;
        let schedule_json = encode_schedule(&invoice.payment_schedule)?;

        let mut sql = String::from(
            "UPDATE invoices SET
                customer_id = ?, customer_name = ?, customer_email = ?,
                customer_phone = ?, customer_address = ?,
                invoice_date = ?, due_date = ?, original_due_date = ?,
                status = ?, payment_stage = ?, payment_status = ?,
                subtotal = ?, tax_amount = ?, shipping_cost = ?,
                discount = ?, grand_total = ?, currency = ?,
                payment_terms = ?, notes = ?, items = ?,
                payment_schedule = ?, final_payment_token = ?,
                payment_confirmation_file = ?,
                payment_confirmation_notes = ?,
                payment_confirmation_date = ?, confirmation_status = ?,
                merchant_confirmation_notes = ?,
                confirmation_reviewed_date = ?,
                sent_at = ?, paid_at = ?, dp_confirmed_date = ?,
                final_payment_confirmed_date = ?, updated_at = ?
            WHERE merchant_id = ? AND id = ?",
        );
        if fingerprint.is_some() {
            sql.push_str(" AND status = ? AND updated_at = ?");
        }

        let mut query = sqlx::query(&sql)
            .bind(
                invoice
                    .customer_id
                    .as_ref()
                    .map(|id| id.as_str().to_owned()),
            )
            .bind(&invoice.customer_name)
            .bind(&invoice.customer_email)
            .bind(&invoice.customer_phone)
            .bind(&invoice.customer_address)
            .bind(aspree_common::time::format_date(invoice.invoice_date))
            .bind(opt_date_str(invoice.due_date))
            .bind(opt_date_str(invoice.original_due_date))
            .bind(invoice.status.to_string())
            .bind(invoice.payment_stage.to_string())
            .bind(invoice.payment_status.to_string())
            .bind(invoice.subtotal.to_string())
            .bind(invoice.tax_amount.to_string())
            .bind(invoice.shipping_cost.to_string())
            .bind(invoice.discount.to_string())
            .bind(invoice.grand_total.to_string())
            .bind(&invoice.currency)
            .bind(&invoice.payment_terms)
            .bind(&invoice.notes)
            .bind(items_json)
            .bind(schedule_json)
            .bind(
                invoice
                    .final_payment_token
                    .as_ref()
                    .map(|t| t.as_str().to_owned()),
            )
            .bind(&invoice.payment_confirmation_file)
            .bind(&invoice.payment_confirmation_notes)
            .bind(invoice.payment_confirmation_date.map(|t| t.as_i64()))
            .bind(invoice.confirmation_status.map(|s| s.to_string()))
            .bind(&invoice.merchant_confirmation_notes)
            .bind(invoice.confirmation_reviewed_date.map(|t| t.as_i64()))
            .bind(invoice.sent_at.map(|t| t.as_i64()))
            .bind(invoice.paid_at.map(|t| t.as_i64()))
            .bind(invoice.dp_confirmed_date.map(|t| t.as_i64()))
            .bind(invoice.final_payment_confirmed_date.map(|t| t.as_i64()))
            .bind(invoice.updated_at.as_i64())
            .bind(invoice.merchant_id.as_str())
            .bind(invoice.id.as_str());
        if let Some((status, updated_at)) = fingerprint {
            query = query
                .bind(status.to_string())
                .bind(updated_at.as_i64());
        }

        let result = query
            .execute(self.pool())
            .await
            .map_err(|e| map_write_err(e, "invoice number"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Items live in the row, so this cascades to them by construction.
    pub async fn delete_invoice(
        &self,
        merchant_id: &MerchantId,
        id: &InvoiceId,
    ) -> Result<bool, StoreError> {
        require_merchant(merchant_id)?;
        let result = sqlx::query(
            "DELETE FROM invoices WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Paid invoices that have no derived order yet; the reconciliation
    /// sweep creates the missing orders.
    pub async fn list_paid_invoices_without_orders(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Vec<Invoice>, StoreError> {
        require_merchant(merchant_id)?;
        let rows = sqlx::query(
            "SELECT * FROM invoices i
             WHERE i.merchant_id = ? AND i.status = 'paid'
               AND NOT EXISTS (
                   SELECT 1 FROM orders o WHERE o.source_invoice_id = i.id
               )
             ORDER BY i.created_at",
        )
        .bind(merchant_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_invoice).collect()
    }

    /// Global SELECT-only probe used by the id minter: is this number taken
    /// by any invoice or order, for any merchant?
    pub async fn document_number_exists(
        &self,
        number: &str,
    ) -> Result<bool, StoreError> {
        let taken: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE invoice_number = ?)
                 OR EXISTS (SELECT 1 FROM orders WHERE order_number = ?)",
        )
        .bind(number)
        .bind(number)
        .fetch_one(self.pool())
        .await?;
        Ok(taken != 0)
    }
}

fn encode_items(items: &[InvoiceItem]) -> Result<String, StoreError> {
    serde_json::to_string(items)
        .map_err(|e| StoreError::Corrupt(format!("items: {e}")))
}

fn encode_schedule(
    schedule: &Option<PaymentSchedule>,
) -> Result<Option<String>, StoreError> {
    schedule
        .as_ref()
        .map(|s| {
            serde_json::to_string(s)
                .map_err(|e| StoreError::Corrupt(format!("schedule: {e}")))
        })
        .transpose()
}

fn row_to_invoice(row: &SqliteRow) -> Result<Invoice, StoreError> {
    Ok(Invoice {
        id: get_parsed(row, "id")?,
        merchant_id: get_parsed(row, "merchant_id")?,
        invoice_number: get_parsed(row, "invoice_number")?,
        customer_id: get_opt_parsed(row, "customer_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_address: row.try_get("customer_address")?,
        merchant_name: row.try_get("merchant_name")?,
        merchant_email: row.try_get("merchant_email")?,
        merchant_phone: row.try_get("merchant_phone")?,
        merchant_address: row.try_get("merchant_address")?,
        invoice_date: get_date(row, "invoice_date")?,
        due_date: get_opt_date(row, "due_date")?,
        original_due_date: get_opt_date(row, "original_due_date")?,
        status: get_parsed(row, "status")?,
        payment_stage: get_parsed(row, "payment_stage")?,
        payment_status: get_parsed(row, "payment_status")?,
        subtotal: get_decimal(row, "subtotal")?,
        tax_amount: get_decimal(row, "tax_amount")?,
        shipping_cost: get_decimal(row, "shipping_cost")?,
        discount: get_decimal(row, "discount")?,
        grand_total: get_decimal(row, "grand_total")?,
        currency: row.try_get("currency")?,
        payment_terms: row.try_get("payment_terms")?,
        notes: row.try_get("notes")?,
        items: get_json(row, "items")?,
        payment_schedule: get_opt_json(row, "payment_schedule")?,
        customer_token: get_parsed(row, "customer_token")?,
        final_payment_token: get_opt_parsed(row, "final_payment_token")?,
        payment_confirmation_file: row.try_get("payment_confirmation_file")?,
        payment_confirmation_notes: row
            .try_get("payment_confirmation_notes")?,
        payment_confirmation_date: get_opt_ts(
            row,
            "payment_confirmation_date",
        )?,
        confirmation_status: get_opt_parsed(row, "confirmation_status")?,
        merchant_confirmation_notes: row
            .try_get("merchant_confirmation_notes")?,
        confirmation_reviewed_date: get_opt_ts(
            row,
            "confirmation_reviewed_date",
        )?,
        sent_at: get_opt_ts(row, "sent_at")?,
        paid_at: get_opt_ts(row, "paid_at")?,
        dp_confirmed_date: get_opt_ts(row, "dp_confirmed_date")?,
        final_payment_confirmed_date: get_opt_ts(
            row,
            "final_payment_confirmed_date",
        )?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}
