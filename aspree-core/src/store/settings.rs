//! Business settings access. Exactly one row per merchant after first write,
//! enforced by the primary key + upsert.

use aspree_api::{entities::BusinessSettings, types::ids::MerchantId};
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    get_decimal, get_parsed, get_ts, require_merchant, Store, StoreError,
};

impl Store {
    pub async fn get_business_settings(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Option<BusinessSettings>, StoreError> {
        require_merchant(merchant_id)?;
        let row = sqlx::query(
            "SELECT * FROM business_settings WHERE merchant_id = ?",
        )
        .bind(merchant_id.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_settings).transpose()
    }

    /// Insert-or-update keyed on merchant id; `created_at` survives updates.
    pub async fn upsert_business_settings(
        &self,
        settings: &BusinessSettings,
    ) -> Result<(), StoreError> {
        require_merchant(&settings.merchant_id)?;
        sqlx::query(
            "INSERT INTO business_settings (
                merchant_id, tax_enabled, tax_rate, tax_name,
                tax_description, logo_url, logo_public_id, logo_filename,
                custom_header_text, custom_header_bg_color,
                custom_footer_bg_color, custom_header_logo_url,
                custom_header_logo_public_id, custom_footer_logo_url,
                custom_footer_logo_public_id, hide_aspree_branding,
                premium_active, terms_text, business_code, created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (merchant_id) DO UPDATE SET
                tax_enabled = excluded.tax_enabled,
                tax_rate = excluded.tax_rate,
                tax_name = excluded.tax_name,
                tax_description = excluded.tax_description,
                logo_url = excluded.logo_url,
                logo_public_id = excluded.logo_public_id,
                logo_filename = excluded.logo_filename,
                custom_header_text = excluded.custom_header_text,
                custom_header_bg_color = excluded.custom_header_bg_color,
                custom_footer_bg_color = excluded.custom_footer_bg_color,
                custom_header_logo_url = excluded.custom_header_logo_url,
                custom_header_logo_public_id =
                    excluded.custom_header_logo_public_id,
                custom_footer_logo_url = excluded.custom_footer_logo_url,
                custom_footer_logo_public_id =
                    excluded.custom_footer_logo_public_id,
                hide_aspree_branding = excluded.hide_aspree_branding,
                premium_active = excluded.premium_active,
                terms_text = excluded.terms_text,
                business_code = excluded.business_code,
                updated_at = excluded.updated_at",
        )
        .bind(settings.merchant_id.as_str())
        .bind(settings.tax_enabled)
        .bind(settings.tax_rate.to_string())
        .bind(&settings.tax_name)
        .bind(&settings.tax_description)
        .bind(&settings.logo_url)
        .bind(&settings.logo_public_id)
        .bind(&settings.logo_filename)
        .bind(&settings.custom_header_text)
        .bind(&settings.custom_header_bg_color)
        .bind(&settings.custom_footer_bg_color)
        .bind(&settings.custom_header_logo_url)
        .bind(&settings.custom_header_logo_public_id)
        .bind(&settings.custom_footer_logo_url)
        .bind(&settings.custom_footer_logo_public_id)
        .bind(settings.hide_aspree_branding)
        .bind(settings.premium_active)
        .bind(&settings.terms_text)
        .bind(&settings.business_code)
        .bind(settings.created_at.as_i64())
        .bind(settings.updated_at.as_i64())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_settings(row: &SqliteRow) -> Result<BusinessSettings, StoreError> {
    Ok(BusinessSettings {
        merchant_id: get_parsed(row, "merchant_id")?,
        tax_enabled: row.try_get("tax_enabled")?,
        tax_rate: get_decimal(row, "tax_rate")?,
        tax_name: row.try_get("tax_name")?,
        tax_description: row.try_get("tax_description")?,
        logo_url: row.try_get("logo_url")?,
        logo_public_id: row.try_get("logo_public_id")?,
        logo_filename: row.try_get("logo_filename")?,
        custom_header_text: row.try_get("custom_header_text")?,
        custom_header_bg_color: row.try_get("custom_header_bg_color")?,
        custom_footer_bg_color: row.try_get("custom_footer_bg_color")?,
        custom_header_logo_url: row.try_get("custom_header_logo_url")?,
        custom_header_logo_public_id: row
            .try_get("custom_header_logo_public_id")?,
        custom_footer_logo_url: row.try_get("custom_footer_logo_url")?,
        custom_footer_logo_public_id: row
            .try_get("custom_footer_logo_public_id")?,
        hide_aspree_branding: row.try_get("hide_aspree_branding")?,
        premium_active: row.try_get("premium_active")?,
        terms_text: row.try_get("terms_text")?,
        business_code: row.try_get("business_code")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use aspree_common::time::TimestampMs;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::store::testing::seed_merchant;

    use super::*;

    fn default_settings(merchant_id: &MerchantId) -> BusinessSettings {
        let now = TimestampMs::now();
        BusinessSettings {
            merchant_id: merchant_id.clone(),
            tax_enabled: false,
            tax_rate: Decimal::ZERO,
            tax_name: None,
            tax_description: None,
            logo_url: None,
            logo_public_id: None,
            logo_filename: None,
            custom_header_text: None,
            custom_header_bg_color: None,
            custom_footer_bg_color: None,
            custom_header_logo_url: None,
            custom_header_logo_public_id: None,
            custom_footer_logo_url: None,
            custom_footer_logo_public_id: None,
            hide_aspree_branding: false,
            premium_active: false,
            terms_text: None,
            business_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_merchant() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;

        let mut settings = default_settings(&mid);
        settings.business_code = Some("TMJ".to_owned());
        store.upsert_business_settings(&settings).await.unwrap();

        settings.tax_enabled = true;
        settings.tax_rate = dec!(11);
        store.upsert_business_settings(&settings).await.unwrap();

        let back = store
            .get_business_settings(&mid)
            .await
            .unwrap()
            .unwrap();
        assert!(back.tax_enabled);
        assert_eq!(back.tax_rate, dec!(11));
        assert_eq!(back.business_code.as_deref(), Some("TMJ"));

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM business_settings WHERE merchant_id = ?",
        )
        .bind(mid.as_str())
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_settings_is_none() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;
        assert!(store.get_business_settings(&mid).await.unwrap().is_none());
    }
}
