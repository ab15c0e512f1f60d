//! Product catalog access, merchant-scoped. SKUs are unique per merchant.

use aspree_api::{
    entities::Product,
    types::ids::{MerchantId, ProductId},
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use super::{
    get_decimal, get_opt_decimal, get_parsed, get_ts, map_write_err,
    require_merchant, Store, StoreError,
};

/// Filters for [`Store::list_products`].
#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub active_only: bool,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Store {
    pub async fn create_product(
        &self,
        product: &Product,
    ) -> Result<(), StoreError> {
        require_merchant(&product.merchant_id)?;
        sqlx::query(
            "INSERT INTO products (
                id, merchant_id, sku, name, category, unit_price, cost_price,
                stock_quantity, min_stock_level, is_active, tax_rate,
                dimensions, weight, image_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id.as_str())
        .bind(product.merchant_id.as_str())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price.to_string())
        .bind(product.cost_price.map(|d| d.to_string()))
        .bind(product.stock_quantity)
        .bind(product.min_stock_level)
        .bind(product.is_active)
        .bind(product.tax_rate.map(|d| d.to_string()))
        .bind(&product.dimensions)
        .bind(&product.weight)
        .bind(&product.image_url)
        .bind(product.created_at.as_i64())
        .bind(product.updated_at.as_i64())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "product sku"))?;
        Ok(())
    }

    pub async fn get_product(
        &self,
        merchant_id: &MerchantId,
        id: &ProductId,
    ) -> Result<Option<Product>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM products WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    pub async fn get_product_by_sku(
        &self,
        merchant_id: &MerchantId,
        sku: &str,
    ) -> Result<Option<Product>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM products WHERE merchant_id = ? AND sku = ?",
        )
        .bind(merchant_id.as_str())
        .bind(sku)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    pub async fn list_products(
        &self,
        merchant_id: &MerchantId,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, StoreError> {
        require_merchant(merchant_id)?;
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT * FROM products WHERE merchant_id = ",
        );
        query.push_bind(merchant_id.as_str());
        if filter.active_only {
            query.push(" AND is_active = 1");
        }
        if let Some(category) = &filter.category {
            query.push(" AND category = ");
            query.push_bind(category);
        }
        query.push(" ORDER BY name");
        query.push(" LIMIT ");
        query.push_bind(filter.limit.unwrap_or(100));
        query.push(" OFFSET ");
        query.push_bind(filter.offset.unwrap_or(0));

        let rows = query.build().fetch_all(self.pool()).await?;
        rows.iter().map(row_to_product).collect()
    }

    pub async fn update_product(
        &self,
        product: &Product,
    ) -> Result<(), StoreError> {
        require_merchant(&product.merchant_id)?;
        sqlx::query(
            "UPDATE products SET
                sku = ?, name = ?, category = ?, unit_price = ?,
                cost_price = ?, stock_quantity = ?, min_stock_level = ?,
                is_active = ?, tax_rate = ?, dimensions = ?, weight = ?,
                image_url = ?, updated_at = ?
            WHERE merchant_id = ? AND id = ?",
        )
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price.to_string())
        .bind(product.cost_price.map(|d| d.to_string()))
        .bind(product.stock_quantity)
        .bind(product.min_stock_level)
        .bind(product.is_active)
        .bind(product.tax_rate.map(|d| d.to_string()))
        .bind(&product.dimensions)
        .bind(&product.weight)
        .bind(&product.image_url)
        .bind(product.updated_at.as_i64())
        .bind(product.merchant_id.as_str())
        .bind(product.id.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "product sku"))?;
        Ok(())
    }

    /// Returns whether a row was deleted.
    pub async fn delete_product(
        &self,
        merchant_id: &MerchantId,
        id: &ProductId,
    ) -> Result<bool, StoreError> {
        require_merchant(merchant_id)?;
        let result = sqlx::query(
            "DELETE FROM products WHERE merchant_id = ? AND id = ?",
        )
        .bind(merchant_id.as_str())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_product(row: &SqliteRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: get_parsed(row, "id")?,
        merchant_id: get_parsed(row, "merchant_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        unit_price: get_decimal(row, "unit_price")?,
        cost_price: get_opt_decimal(row, "cost_price")?,
        stock_quantity: row.try_get("stock_quantity")?,
        min_stock_level: row.try_get("min_stock_level")?,
        is_active: row.try_get("is_active")?,
        tax_rate: get_opt_decimal(row, "tax_rate")?,
        dimensions: row.try_get("dimensions")?,
        weight: row.try_get("weight")?,
        image_url: row.try_get("image_url")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use crate::store::testing::{seed_merchant, test_product};

    use super::*;

    #[tokio::test]
    async fn products_are_merchant_scoped() {
        let store = Store::open_in_memory().await.unwrap();
        let mid_a = seed_merchant(&store, "a@x.com").await;
        let mid_b = seed_merchant(&store, "b@x.com").await;

        store
            .create_product(&test_product(&mid_a, "LOLLY", dec!(5000)))
            .await
            .unwrap();

        // Merchant B sees an empty catalog.
        let b_products = store
            .list_products(&mid_b, &ProductFilter::default())
            .await
            .unwrap();
        assert!(b_products.is_empty());

        let a_products = store
            .list_products(&mid_a, &ProductFilter::default())
            .await
            .unwrap();
        assert_eq!(a_products.len(), 1);
        assert_eq!(a_products[0].unit_price, dec!(5000));
    }

    #[tokio::test]
    async fn duplicate_sku_within_merchant_conflicts() {
        let store = Store::open_in_memory().await.unwrap();
        let mid_a = seed_merchant(&store, "a@x.com").await;
        let mid_b = seed_merchant(&store, "b@x.com").await;

        store
            .create_product(&test_product(&mid_a, "LOLLY", dec!(5000)))
            .await
            .unwrap();
        let err = store
            .create_product(&test_product(&mid_a, "LOLLY", dec!(6000)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("product sku")));

        // The same sku under another merchant is fine.
        store
            .create_product(&test_product(&mid_b, "LOLLY", dec!(7000)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn active_filter_and_delete() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;

        let mut p1 = test_product(&mid, "A1", dec!(1000));
        p1.is_active = false;
        store.create_product(&p1).await.unwrap();
        let p2 = test_product(&mid, "A2", dec!(2000));
        store.create_product(&p2).await.unwrap();

        let active = store
            .list_products(
                &mid,
                &ProductFilter {
                    active_only: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].sku, "A2");

        assert!(store.delete_product(&mid, &p2.id).await.unwrap());
        assert!(!store.delete_product(&mid, &p2.id).await.unwrap());
    }
}
