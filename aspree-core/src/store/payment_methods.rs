//! Payment method configuration, one row per (merchant, method type).
//!
//! The opaque `config` JSON may contain gateway secrets; they are encrypted
//! by the caller before the row reaches this module, and this module never
//! decrypts.

use aspree_api::{
    entities::PaymentMethodConfig,
    types::{ids::MerchantId, status::MethodType},
};
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    get_json, get_parsed, get_ts, require_merchant, Store, StoreError,
};

impl Store {
    pub async fn get_payment_methods(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Vec<PaymentMethodConfig>, StoreError> {
        require_merchant(merchant_id)?;
        let rows = sqlx::query(
            "SELECT * FROM payment_methods WHERE merchant_id = ?
             ORDER BY method_type",
        )
        .bind(merchant_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_method).collect()
    }

    pub async fn get_payment_method(
        &self,
        merchant_id: &MerchantId,
        method_type: MethodType,
    ) -> Result<Option<PaymentMethodConfig>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM payment_methods
             WHERE merchant_id = ? AND method_type = ?",
        )
        .bind(merchant_id.as_str())
        .bind(method_type.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_method).transpose()
    }

    pub async fn upsert_payment_method(
        &self,
        config: &PaymentMethodConfig,
    ) -> Result<(), StoreError> {
        require_merchant(&config.merchant_id)?;
        let config_json = serde_json::to_string(&config.config)
            .map_err(|e| StoreError::Corrupt(format!("config: {e}")))?;
        sqlx::query(
            "INSERT INTO payment_methods (
                merchant_id, method_type, enabled, config, created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (merchant_id, method_type) DO UPDATE SET
                enabled = excluded.enabled,
                config = excluded.config,
                updated_at = excluded.updated_at",
        )
        .bind(config.merchant_id.as_str())
        .bind(config.method_type.to_string())
        .bind(config.enabled)
        .bind(config_json)
        .bind(config.created_at.as_i64())
        .bind(config.updated_at.as_i64())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_method(row: &SqliteRow) -> Result<PaymentMethodConfig, StoreError> {
    Ok(PaymentMethodConfig {
        merchant_id: get_parsed(row, "merchant_id")?,
        method_type: get_parsed(row, "method_type")?,
        enabled: row.try_get("enabled")?,
        config: get_json(row, "config")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use aspree_common::time::TimestampMs;
    use serde_json::json;

    use crate::store::testing::seed_merchant;

    use super::*;

    fn method(
        merchant_id: &MerchantId,
        method_type: MethodType,
        config: serde_json::Value,
    ) -> PaymentMethodConfig {
        let now = TimestampMs::now();
        PaymentMethodConfig {
            merchant_id: merchant_id.clone(),
            method_type,
            enabled: true,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_semantics_per_method_type() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;

        store
            .upsert_payment_method(&method(
                &mid,
                MethodType::BankTransfer,
                json!({"bankName": "BCA", "accountNumber": "12345"}),
            ))
            .await
            .unwrap();
        store
            .upsert_payment_method(&method(
                &mid,
                MethodType::Gateway,
                json!({"secretKey": "aa:bb:cc"}),
            ))
            .await
            .unwrap();
        // Re-writing the same method type must not add a second row.
        store
            .upsert_payment_method(&method(
                &mid,
                MethodType::Gateway,
                json!({"secretKey": "dd:ee:ff"}),
            ))
            .await
            .unwrap();

        let methods = store.get_payment_methods(&mid).await.unwrap();
        assert_eq!(methods.len(), 2);

        let gateway = store
            .get_payment_method(&mid, MethodType::Gateway)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gateway.config["secretKey"], "dd:ee:ff");
    }

    #[tokio::test]
    async fn methods_are_merchant_scoped() {
        let store = Store::open_in_memory().await.unwrap();
        let mid_a = seed_merchant(&store, "a@x.com").await;
        let mid_b = seed_merchant(&store, "b@x.com").await;

        store
            .upsert_payment_method(&method(
                &mid_a,
                MethodType::Gateway,
                json!({"secretKey": "aa"}),
            ))
            .await
            .unwrap();

        assert!(store.get_payment_methods(&mid_b).await.unwrap().is_empty());
    }
}
