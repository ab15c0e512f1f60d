//! Order table access, merchant-scoped. Order items live inside the order
//! row as JSON, so deletes cascade to them by construction.

use aspree_api::{
    entities::{Order, OrderItem},
    types::ids::{InvoiceId, MerchantId, OrderId},
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use super::{
    get_decimal, get_json, get_opt_parsed, get_opt_ts, get_parsed, get_ts,
    map_write_err, require_merchant, Store, StoreError,
};

/// Filters for [`Store::list_orders`].
#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    pub status: Option<aspree_api::types::status::OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Store {
    pub async fn create_order(
        &self,
        order: &Order,
    ) -> Result<(), StoreError> {
        require_merchant(&order.merchant_id)?;
        let items_json = serde_json::to_string(&order.items)
            .map_err(|e| StoreError::Corrupt(format!("items: {e}")))?;
        sqlx::query(
            "INSERT INTO orders (
                id, merchant_id, order_number, customer_name, customer_email,
                customer_phone, shipping_address, items, status,
                payment_status, subtotal, shipping_cost, discount,
                total_amount, currency, tracking_number, shipped_date,
                delivered_date, notes, source_invoice_id,
                source_invoice_number, created_at, updated_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?
            )",
        )
        .bind(order.id.as_str())
        .bind(order.merchant_id.as_str())
        .bind(order.order_number.as_str())
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(&order.shipping_address)
        .bind(items_json)
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(order.subtotal.to_string())
        .bind(order.shipping_cost.to_string())
        .bind(order.discount.to_string())
        .bind(order.total_amount.to_string())
        .bind(&order.currency)
        .bind(&order.tracking_number)
        .bind(order.shipped_date.map(|t| t.as_i64()))
        .bind(order.delivered_date.map(|t| t.as_i64()))
        .bind(&order.notes)
        .bind(
            order
                .source_invoice_id
                .as_ref()
                .map(|id| id.as_str().to_owned()),
        )
        .bind(
            order
                .source_invoice_number
                .as_ref()
                .map(|n| n.as_str().to_owned()),
        )
        .bind(order.created_at.as_i64())
        .bind(order.updated_at.as_i64())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "order source invoice"))?;
        Ok(())
    }

    pub async fn get_order(
        &self,
        merchant_id: &MerchantId,
        id: &OrderId,
    ) -> Result<Option<Order>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM orders WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    /// The idempotence lookup for auto-created orders.
    pub async fn get_order_by_source_invoice(
        &self,
        merchant_id: &MerchantId,
        invoice_id: &InvoiceId,
    ) -> Result<Option<Order>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM orders
             WHERE merchant_id = ? AND source_invoice_id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(invoice_id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    pub async fn list_orders(
        &self,
        merchant_id: &MerchantId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        require_merchant(merchant_id)?;
        let mut query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM orders WHERE merchant_id = ");
        query.push_bind(merchant_id.as_str());
        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status.to_string());
        }
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ");
        query.push_bind(filter.limit.unwrap_or(100));
        query.push(" OFFSET ");
        query.push_bind(filter.offset.unwrap_or(0));

        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(row_to_order).collect()
    }

    pub async fn update_order(
        &self,
        order: &Order,
    ) -> Result<(), StoreError> {
        require_merchant(&order.merchant_id)?;
        let items_json = serde_json::to_string(&order.items)
            .map_err(|e| StoreError::Corrupt(format!("items: {e}")))?;
        sqlx::query(
            "UPDATE orders SET
                customer_name = ?, customer_email = ?, customer_phone = ?,
                shipping_address = ?, items = ?, status = ?,
                payment_status = ?, subtotal = ?, shipping_cost = ?,
                discount = ?, total_amount = ?, currency = ?,
                tracking_number = ?, shipped_date = ?, delivered_date = ?,
                notes = ?, updated_at = ?
            WHERE merchant_id = ? AND id = ?",
        )
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(&order.shipping_address)
        .bind(items_json)
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(order.subtotal.to_string())
        .bind(order.shipping_cost.to_string())
        .bind(order.discount.to_string())
        .bind(order.total_amount.to_string())
        .bind(&order.currency)
        .bind(&order.tracking_number)
        .bind(order.shipped_date.map(|t| t.as_i64()))
        .bind(order.delivered_date.map(|t| t.as_i64()))
        .bind(&order.notes)
        .bind(order.updated_at.as_i64())
        .bind(order.merchant_id.as_str())
        .bind(order.id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_order(
        &self,
        merchant_id: &MerchantId,
        id: &OrderId,
    ) -> Result<bool, StoreError> {
        require_merchant(merchant_id)?;
        let result = sqlx::query(
            "DELETE FROM orders WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_order(row: &SqliteRow) -> Result<Order, StoreError> {
    let items: Vec<OrderItem> = get_json(row, "items")?;
    Ok(Order {
        id: get_parsed(row, "id")?,
        merchant_id: get_parsed(row, "merchant_id")?,
        order_number: get_parsed(row, "order_number")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        shipping_address: row.try_get("shipping_address")?,
        items,
        status: get_parsed(row, "status")?,
        payment_status: get_parsed(row, "payment_status")?,
        subtotal: get_decimal(row, "subtotal")?,
        shipping_cost: get_decimal(row, "shipping_cost")?,
        discount: get_decimal(row, "discount")?,
        total_amount: get_decimal(row, "total_amount")?,
        currency: row.try_get("currency")?,
        tracking_number: row.try_get("tracking_number")?,
        shipped_date: get_opt_ts(row, "shipped_date")?,
        delivered_date: get_opt_ts(row, "delivered_date")?,
        notes: row.try_get("notes")?,
        source_invoice_id: get_opt_parsed(row, "source_invoice_id")?,
        source_invoice_number: get_opt_parsed(row, "source_invoice_number")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use aspree_api::types::status::OrderStatus;
    use rust_decimal_macros::dec;

    use crate::store::testing::{seed_merchant, test_invoice, test_order};

    use super::*;

    #[tokio::test]
    async fn source_invoice_uniqueness_is_enforced() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;
        let invoice = test_invoice(
            &mid,
            "INV-20240101-AAAA",
            "inv_abcdefghi0",
            dec!(5000),
        );
        store.create_invoice(&invoice).await.unwrap();

        store
            .create_order(&test_order(&mid, "ORD-20240101-AAAA", Some(&invoice)))
            .await
            .unwrap();

        // A second order derived from the same invoice violates the unique
        // constraint even if the lifecycle's existence check was raced.
        let err = store
            .create_order(&test_order(&mid, "ORD-20240101-BBBB", Some(&invoice)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Duplicate("order source invoice")
        ));

        let found = store
            .get_order_by_source_invoice(&mid, &invoice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.order_number.as_str(), "ORD-20240101-AAAA");

        // Orders without a source invoice are unconstrained.
        store
            .create_order(&test_order(&mid, "ORD-20240101-CCCC", None))
            .await
            .unwrap();
        store
            .create_order(&test_order(&mid, "ORD-20240101-DDDD", None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_and_update_scoped() {
        let store = Store::open_in_memory().await.unwrap();
        let mid_a = seed_merchant(&store, "a@x.com").await;
        let mid_b = seed_merchant(&store, "b@x.com").await;

        let mut order = test_order(&mid_a, "ORD-20240101-AAAA", None);
        store.create_order(&order).await.unwrap();

        assert!(store
            .list_orders(&mid_b, &OrderFilter::default())
            .await
            .unwrap()
            .is_empty());

        order.status = OrderStatus::Shipped;
        order.tracking_number = Some("JNE123".to_owned());
        store.update_order(&order).await.unwrap();

        let back = store.get_order(&mid_a, &order.id).await.unwrap().unwrap();
        assert_eq!(back.status, OrderStatus::Shipped);
        assert_eq!(back.tracking_number.as_deref(), Some("JNE123"));
    }
}
