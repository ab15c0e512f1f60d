//! Customer table access, merchant-scoped.
//!
//! `search_customers` attaches derived order aggregates (order count, order
//! total, last order date) in the same round-trip via correlated subqueries;
//! customers and orders are joined on the customer email snapshot.

use aspree_api::{
    entities::{Customer, CustomerWithStats},
    types::ids::{CustomerId, MerchantId},
};
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use time::Date;

use super::{
    get_decimal, get_opt_date, get_parsed, get_ts, map_write_err, opt_date_str,
    require_merchant, Store, StoreError,
};

impl Store {
    pub async fn create_customer(
        &self,
        customer: &Customer,
    ) -> Result<(), StoreError> {
        require_merchant(&customer.merchant_id)?;
        sqlx::query(
            "INSERT INTO customers (
                id, merchant_id, name, email, phone, address,
                first_invoice_date, last_invoice_date, invoice_count,
                total_spent, extraction_method, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(customer.id.as_str())
        .bind(customer.merchant_id.as_str())
        .bind(&customer.name)
        .bind(customer.email.as_ref().map(|e| e.to_lowercase()))
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(opt_date_str(customer.first_invoice_date))
        .bind(opt_date_str(customer.last_invoice_date))
        .bind(customer.invoice_count)
        .bind(customer.total_spent.to_string())
        .bind(customer.extraction_method.to_string())
        .bind(customer.created_at.as_i64())
        .bind(customer.updated_at.as_i64())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "customer email"))?;
        Ok(())
    }

    pub async fn get_customer(
        &self,
        merchant_id: &MerchantId,
        id: &CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM customers WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    pub async fn get_customer_by_email(
        &self,
        merchant_id: &MerchantId,
        email: &str,
    ) -> Result<Option<Customer>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM customers WHERE merchant_id = ? AND email = ?",
        )
        .bind(merchant_id.as_str())
        .bind(email.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    pub async fn list_customers(
        &self,
        merchant_id: &MerchantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Customer>, StoreError> {
        require_merchant(merchant_id)?;
        let rows = sqlx::query(
            "SELECT * FROM customers WHERE merchant_id = ?
             ORDER BY name LIMIT ? OFFSET ?",
        )
        .bind(merchant_id.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_customer).collect()
    }

    /// Substring search over name / email / phone with order aggregates
    /// attached, computed in the same round-trip.
    pub async fn search_customers(
        &self,
        merchant_id: &MerchantId,
        term: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CustomerWithStats>, StoreError> {
        require_merchant(merchant_id)?;
        let pattern = format!("%{}%", term.to_lowercase());
        let rows = sqlx::query(
            "SELECT c.*,
                (SELECT COUNT(*) FROM orders o
                  WHERE o.merchant_id = c.merchant_id
                    AND o.customer_email IS NOT NULL
                    AND o.customer_email = c.email) AS order_count,
                (SELECT COALESCE(SUM(CAST(o.total_amount AS REAL)), 0.0)
                   FROM orders o
                  WHERE o.merchant_id = c.merchant_id
                    AND o.customer_email IS NOT NULL
                    AND o.customer_email = c.email) AS order_total,
                (SELECT MAX(o.created_at) FROM orders o
                  WHERE o.merchant_id = c.merchant_id
                    AND o.customer_email IS NOT NULL
                    AND o.customer_email = c.email) AS last_order_ts
             FROM customers c
             WHERE c.merchant_id = ?
               AND (LOWER(c.name) LIKE ?
                    OR LOWER(COALESCE(c.email, '')) LIKE ?
                    OR COALESCE(c.phone, '') LIKE ?)
             ORDER BY c.name LIMIT ? OFFSET ?",
        )
        .bind(merchant_id.as_str())
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let customer = row_to_customer(row)?;
                let order_count: i64 = row.try_get("order_count")?;
                let order_total_f64: f64 = row.try_get("order_total")?;
                let order_total = Decimal::try_from(order_total_f64)
                    .map_err(|e| {
                        StoreError::Corrupt(format!("order_total: {e}"))
                    })?;
                let last_order_ts: Option<i64> =
                    row.try_get("last_order_ts")?;
                let last_order_date: Option<Date> = last_order_ts
                    .map(TimestampMs::from_i64)
                    .transpose()
                    .map_err(|e| {
                        StoreError::Corrupt(format!("last_order_ts: {e}"))
                    })?
                    .map(|ts| ts.utc_date());
                Ok(CustomerWithStats {
                    customer,
                    order_count,
                    order_total,
                    last_order_date,
                })
            })
            .collect()
    }

    pub async fn update_customer(
        &self,
        customer: &Customer,
    ) -> Result<(), StoreError> {
        require_merchant(&customer.merchant_id)?;
        sqlx::query(
            "UPDATE customers SET
                name = ?, email = ?, phone = ?, address = ?,
                first_invoice_date = ?, last_invoice_date = ?,
                invoice_count = ?, total_spent = ?, extraction_method = ?,
                updated_at = ?
            WHERE merchant_id = ? AND id = ?",
        )
        .bind(&customer.name)
        .bind(customer.email.as_ref().map(|e| e.to_lowercase()))
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(opt_date_str(customer.first_invoice_date))
        .bind(opt_date_str(customer.last_invoice_date))
        .bind(customer.invoice_count)
        .bind(customer.total_spent.to_string())
        .bind(customer.extraction_method.to_string())
        .bind(customer.updated_at.as_i64())
        .bind(customer.merchant_id.as_str())
        .bind(customer.id.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "customer email"))?;
        Ok(())
    }

    pub async fn delete_customer(
        &self,
        merchant_id: &MerchantId,
        id: &CustomerId,
    ) -> Result<bool, StoreError> {
        require_merchant(merchant_id)?;
        let result = sqlx::query(
            "DELETE FROM customers WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Roll a new invoice into the customer's aggregates.
    pub async fn bump_customer_invoice_stats(
        &self,
        merchant_id: &MerchantId,
        id: &CustomerId,
        invoice_date: Date,
        grand_total: Decimal,
        now: TimestampMs,
    ) -> Result<(), StoreError> {
        require_merchant(merchant_id)?;
        let date_str = aspree_common::time::format_date(invoice_date);
        sqlx::query(
            "UPDATE customers SET
                invoice_count = invoice_count + 1,
                total_spent = CAST(CAST(total_spent AS REAL) + ? AS TEXT),
                first_invoice_date =
                    COALESCE(MIN(first_invoice_date, ?), ?),
                last_invoice_date =
                    COALESCE(MAX(last_invoice_date, ?), ?),
                updated_at = ?
            WHERE merchant_id = ? AND id = ?",
        )
        .bind(
            grand_total
                .to_string()
                .parse::<f64>()
                .unwrap_or_default(),
        )
        .bind(&date_str)
        .bind(&date_str)
        .bind(&date_str)
        .bind(&date_str)
        .bind(now.as_i64())
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_customer(row: &SqliteRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: get_parsed(row, "id")?,
        merchant_id: get_parsed(row, "merchant_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        first_invoice_date: get_opt_date(row, "first_invoice_date")?,
        last_invoice_date: get_opt_date(row, "last_invoice_date")?,
        invoice_count: row.try_get("invoice_count")?,
        total_spent: get_decimal(row, "total_spent")?,
        extraction_method: get_parsed(row, "extraction_method")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::store::testing::{
        seed_merchant, test_customer, test_invoice, test_order,
    };

    use super::*;

    #[tokio::test]
    async fn email_uniqueness_is_per_merchant_and_lowercased() {
        let store = Store::open_in_memory().await.unwrap();
        let mid_a = seed_merchant(&store, "a@x.com").await;
        let mid_b = seed_merchant(&store, "b@x.com").await;

        store
            .create_customer(&test_customer(
                &mid_a,
                "Christy Wijaya",
                Some("C@x.com"),
                None,
            ))
            .await
            .unwrap();

        // Same email, same merchant: duplicate.
        let err = store
            .create_customer(&test_customer(
                &mid_a,
                "Other",
                Some("c@X.com"),
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        // Same email, different merchant: fine.
        store
            .create_customer(&test_customer(
                &mid_b,
                "Christy Wijaya",
                Some("c@x.com"),
                None,
            ))
            .await
            .unwrap();

        // Customers without email are not constrained.
        store
            .create_customer(&test_customer(&mid_a, "NoMail 1", None, None))
            .await
            .unwrap();
        store
            .create_customer(&test_customer(&mid_a, "NoMail 2", None, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_attaches_order_aggregates() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;

        let customer =
            test_customer(&mid, "Christy Wijaya", Some("c@x.com"), None);
        store.create_customer(&customer).await.unwrap();

        let invoice =
            test_invoice(&mid, "INV-20240101-AAAA", "inv_abcdefghi0", dec!(5000));
        store.create_invoice(&invoice).await.unwrap();

        let mut order =
            test_order(&mid, "ORD-20240101-AAAA", Some(&invoice));
        order.total_amount = dec!(5000);
        store.create_order(&order).await.unwrap();
        let mut order2 = test_order(&mid, "ORD-20240101-AAAB", None);
        order2.total_amount = dec!(2500);
        store.create_order(&order2).await.unwrap();

        let results = store
            .search_customers(&mid, "christy", 10, 0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].order_count, 2);
        assert_eq!(results[0].order_total, dec!(7500));
        assert!(results[0].last_order_date.is_some());

        // A term that matches nothing returns an empty page.
        let none = store.search_customers(&mid, "zzz", 10, 0).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn bump_invoice_stats() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;
        let customer = test_customer(&mid, "Budi", Some("b@x.com"), None);
        store.create_customer(&customer).await.unwrap();

        store
            .bump_customer_invoice_stats(
                &mid,
                &customer.id,
                date!(2024 - 01 - 05),
                dec!(10000),
                TimestampMs::now(),
            )
            .await
            .unwrap();
        store
            .bump_customer_invoice_stats(
                &mid,
                &customer.id,
                date!(2024 - 01 - 02),
                dec!(5000),
                TimestampMs::now(),
            )
            .await
            .unwrap();

        let back = store
            .get_customer(&mid, &customer.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.invoice_count, 2);
        assert_eq!(back.total_spent, dec!(15000));
        assert_eq!(back.first_invoice_date, Some(date!(2024 - 01 - 02)));
        assert_eq!(back.last_invoice_date, Some(date!(2024 - 01 - 05)));
    }
}
