//! Merchant table access.
//!
//! The merchant table is the authentication root: unlike every other entity
//! family it is keyed by its own identifiers (id, email, reset token,
//! verification token) rather than by an owning merchant id.

use aspree_api::{
    entities::Merchant,
    types::ids::MerchantId,
};
use sqlx::{sqlite::SqliteRow, Row};

use super::{
    get_opt_ts, get_parsed, get_ts, map_write_err, Store, StoreError,
};

impl Store {
    pub async fn create_merchant(
        &self,
        merchant: &Merchant,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO merchants (
                id, email, password_hash, business_name, full_name, phone,
                address, status, email_verified, email_verification_token,
                reset_token, reset_token_expires, last_login, login_attempts,
                locked_until, subscription_plan, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(merchant.id.as_str())
        .bind(merchant.email.to_lowercase())
        .bind(&merchant.password_hash)
        .bind(&merchant.business_name)
        .bind(&merchant.full_name)
        .bind(&merchant.phone)
        .bind(&merchant.address)
        .bind(merchant.status.to_string())
        .bind(merchant.email_verified)
        .bind(&merchant.email_verification_token)
        .bind(&merchant.reset_token)
        .bind(merchant.reset_token_expires.map(|t| t.as_i64()))
        .bind(merchant.last_login.map(|t| t.as_i64()))
        .bind(merchant.login_attempts)
        .bind(merchant.locked_until.map(|t| t.as_i64()))
        .bind(&merchant.subscription_plan)
        .bind(merchant.created_at.as_i64())
        .bind(merchant.updated_at.as_i64())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "merchant email"))?;
        Ok(())
    }

    pub async fn get_merchant_by_id(
        &self,
        id: &MerchantId,
    ) -> Result<Option<Merchant>, StoreError> {
        let row = sqlx::query("SELECT * FROM merchants WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_merchant).transpose()
    }

    pub async fn get_merchant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let row = sqlx::query("SELECT * FROM merchants WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_merchant).transpose()
    }

    pub async fn get_merchant_by_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let row = sqlx::query("SELECT * FROM merchants WHERE reset_token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_merchant).transpose()
    }

    pub async fn get_merchant_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Merchant>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM merchants WHERE email_verification_token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_merchant).transpose()
    }

    /// Full-row update, keyed by id. Email is re-lowercased on the way in.
    pub async fn update_merchant(
        &self,
        merchant: &Merchant,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE merchants SET
                email = ?, password_hash = ?, business_name = ?,
                full_name = ?, phone = ?, address = ?, status = ?,
                email_verified = ?, email_verification_token = ?,
                reset_token = ?, reset_token_expires = ?, last_login = ?,
                login_attempts = ?, locked_until = ?, subscription_plan = ?,
                updated_at = ?
            WHERE id = ?",
        )
        .bind(merchant.email.to_lowercase())
        .bind(&merchant.password_hash)
        .bind(&merchant.business_name)
        .bind(&merchant.full_name)
        .bind(&merchant.phone)
        .bind(&merchant.address)
        .bind(merchant.status.to_string())
        .bind(merchant.email_verified)
        .bind(&merchant.email_verification_token)
        .bind(&merchant.reset_token)
        .bind(merchant.reset_token_expires.map(|t| t.as_i64()))
        .bind(merchant.last_login.map(|t| t.as_i64()))
        .bind(merchant.login_attempts)
        .bind(merchant.locked_until.map(|t| t.as_i64()))
        .bind(&merchant.subscription_plan)
        .bind(merchant.updated_at.as_i64())
        .bind(merchant.id.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| map_write_err(e, "merchant email"))?;
        Ok(())
    }
}

fn row_to_merchant(row: &SqliteRow) -> Result<Merchant, StoreError> {
    Ok(Merchant {
        id: get_parsed(row, "id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        business_name: row.try_get("business_name")?,
        full_name: row.try_get("full_name")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        status: get_parsed(row, "status")?,
        email_verified: row.try_get("email_verified")?,
        email_verification_token: row.try_get("email_verification_token")?,
        reset_token: row.try_get("reset_token")?,
        reset_token_expires: get_opt_ts(row, "reset_token_expires")?,
        last_login: get_opt_ts(row, "last_login")?,
        login_attempts: row.try_get("login_attempts")?,
        locked_until: get_opt_ts(row, "locked_until")?,
        subscription_plan: row.try_get("subscription_plan")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

#[cfg(test)]
mod test {
    use crate::store::testing::test_merchant;

    use super::*;

    #[tokio::test]
    async fn create_and_fetch_by_keys() {
        let store = Store::open_in_memory().await.unwrap();
        let merchant = test_merchant("A@X.com");
        store.create_merchant(&merchant).await.unwrap();

        // Email is lowercased at rest and lookup is case-insensitive.
        let by_email = store
            .get_merchant_by_email("a@x.COM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, merchant.id);
        assert_eq!(by_email.email, "a@x.com");

        let by_id =
            store.get_merchant_by_id(&merchant.id).await.unwrap().unwrap();
        assert_eq!(by_id.business_name, "Toko Maju");

        let by_token = store
            .get_merchant_by_verification_token("verify-token")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_token.id, merchant.id);

        assert!(store
            .get_merchant_by_email("b@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_duplicate_error() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_merchant(&test_merchant("a@x.com")).await.unwrap();
        let err = store
            .create_merchant(&test_merchant("A@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)), "{err}");
    }

    #[tokio::test]
    async fn update_roundtrips() {
        let store = Store::open_in_memory().await.unwrap();
        let mut merchant = test_merchant("a@x.com");
        store.create_merchant(&merchant).await.unwrap();

        merchant.email_verified = true;
        merchant.email_verification_token = None;
        merchant.login_attempts = 3;
        store.update_merchant(&merchant).await.unwrap();

        let back =
            store.get_merchant_by_id(&merchant.id).await.unwrap().unwrap();
        assert!(back.email_verified);
        assert_eq!(back.email_verification_token, None);
        assert_eq!(back.login_attempts, 3);
    }
}
