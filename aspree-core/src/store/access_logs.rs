//! Access log records for token- and email-gated customer views.

use aspree_api::{
    entities::AccessLog,
    types::{ids::InvoiceId, status::AccessType},
};
use aspree_common::time::TimestampMs;
use sqlx::{sqlite::SqliteRow, Row};

use super::{get_opt_parsed, get_parsed, get_ts, Store, StoreError};

/// A new access-log entry; the id and timestamp are assigned on insert.
#[derive(Clone, Debug)]
pub struct NewAccessLog {
    pub ip: String,
    pub user_agent: Option<String>,
    pub access_type: AccessType,
    pub customer_email: Option<String>,
    pub invoice_id: Option<InvoiceId>,
    pub success: bool,
}

impl Store {
    pub async fn record_access(
        &self,
        entry: &NewAccessLog,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO access_logs (
                ip, user_agent, access_type, customer_email, invoice_id,
                success, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.access_type.to_string())
        .bind(&entry.customer_email)
        .bind(
            entry
                .invoice_id
                .as_ref()
                .map(|id| id.as_str().to_owned()),
        )
        .bind(entry.success)
        .bind(TimestampMs::now().as_i64())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn recent_access_logs(
        &self,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM access_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_access_log).collect()
    }
}

fn row_to_access_log(row: &SqliteRow) -> Result<AccessLog, StoreError> {
    Ok(AccessLog {
        id: row.try_get("id")?,
        ip: row.try_get("ip")?,
        user_agent: row.try_get("user_agent")?,
        access_type: get_parsed(row, "access_type")?,
        customer_email: row.try_get("customer_email")?,
        invoice_id: get_opt_parsed(row, "invoice_id")?,
        success: row.try_get("success")?,
        created_at: get_ts(row, "created_at")?,
    })
}
