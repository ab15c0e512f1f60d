//! Merchant-scoped persistence over SQLite.
//!
//! Every read or write for a merchant-owned entity takes a [`MerchantId`] and
//! applies it as a `WHERE merchant_id = ?` filter; an empty merchant id is a
//! programming error and fails fast with [`StoreError::MissingMerchant`].
//! The exceptions are the merchant table itself (the authentication root,
//! keyed by its own identifiers) and the token / number lookups that back
//! globally-addressable flows (customer portal, webhook); those are
//! SELECT-only and are confined to the methods named `*_global` or
//! `*_by_*_token`.
//!
//! Failure semantics: a unique-constraint violation surfaces as
//! [`StoreError::Duplicate`]; a miss on a single-row fetch returns
//! `Ok(None)`; all other database errors propagate.

use std::str::FromStr;

use aspree_api::types::ids::MerchantId;
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use thiserror::Error;
use time::Date;

mod access_logs;
mod customers;
mod invoices;
mod merchants;
mod orders;
mod payment_methods;
mod products;
mod settings;
#[cfg(test)]
pub(crate) mod testing;

pub use access_logs::NewAccessLog;
pub use invoices::InvoiceFilter;
pub use orders::OrderFilter;
pub use products::ProductFilter;

/// The embedded schema, executed at startup. `IF NOT EXISTS` keeps restarts
/// idempotent; schema evolution is append-only migrations below the baseline.
const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    /// A merchant-scoped operation was invoked without a merchant id.
    #[error("operation requires a merchant id")]
    MissingMerchant,

    /// A unique constraint was violated.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// A stored value failed to parse back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<StoreError> for aspree_api::error::ApiError {
    fn from(e: StoreError) -> Self {
        use aspree_api::error::ApiError;
        match e {
            StoreError::Duplicate(what) =>
                ApiError::conflict(format!("Duplicate {what}")),
            StoreError::MissingMerchant =>
                ApiError::internal("Operation was not merchant-scoped"),
            StoreError::Corrupt(msg) =>
                ApiError::internal(format!("Corrupt row: {msg}")),
            StoreError::Sqlx(e) =>
                ApiError::internal(format!("Database error: {e}")),
        }
    }
}

/// The single persistence component. Cheap to clone; all clones share one
/// connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `dsn` and run migrations.
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(StoreError::Sqlx)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// An isolated in-memory database, for tests.
    ///
    /// The pool is capped at one connection: each SQLite `:memory:`
    /// connection is its own database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Sqlx)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fail fast on an empty merchant id; scoping every query on an empty string
/// would silently match nothing (reads) or orphan rows (writes).
pub(crate) fn require_merchant(
    merchant_id: &MerchantId,
) -> Result<(), StoreError> {
    if merchant_id.is_empty() {
        return Err(StoreError::MissingMerchant);
    }
    Ok(())
}

/// Translate an insert/update error, mapping unique violations to
/// [`StoreError::Duplicate`] tagged with the entity name.
pub(crate) fn map_write_err(
    e: sqlx::Error,
    what: &'static str,
) -> StoreError {
    let is_unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if is_unique {
        StoreError::Duplicate(what)
    } else {
        StoreError::Sqlx(e)
    }
}

// --- Row decoding helpers --- //
//
// SQLite's type repertoire is narrower than the domain's: decimals are TEXT,
// timestamps are INTEGER millis, dates are TEXT `YYYY-MM-DD`, enums are their
// lowercase wire strings, and embedded collections are JSON TEXT. These
// helpers decode one column each and tag failures with the column name.

pub(crate) fn get_decimal(
    row: &SqliteRow,
    col: &str,
) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(col)?;
    raw.parse::<Decimal>()
        .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn get_opt_decimal(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<Decimal>, StoreError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        s.parse::<Decimal>()
            .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
    })
    .transpose()
}

pub(crate) fn get_parsed<T>(
    row: &SqliteRow,
    col: &str,
) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(col)?;
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn get_opt_parsed<T>(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<T>, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
    })
    .transpose()
}

pub(crate) fn get_ts(
    row: &SqliteRow,
    col: &str,
) -> Result<TimestampMs, StoreError> {
    let raw: i64 = row.try_get(col)?;
    TimestampMs::from_i64(raw)
        .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn get_opt_ts(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<TimestampMs>, StoreError> {
    let raw: Option<i64> = row.try_get(col)?;
    raw.map(|millis| {
        TimestampMs::from_i64(millis)
            .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
    })
    .transpose()
}

pub(crate) fn get_date(
    row: &SqliteRow,
    col: &str,
) -> Result<Date, StoreError> {
    let raw: String = row.try_get(col)?;
    aspree_common::time::parse_date(&raw)
        .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn get_opt_date(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<Date>, StoreError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        aspree_common::time::parse_date(&s)
            .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
    })
    .transpose()
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    col: &str,
) -> Result<T, StoreError> {
    let raw: String = row.try_get(col)?;
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn get_opt_json<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    col: &str,
) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
    })
    .transpose()
}

pub(crate) fn opt_date_str(date: Option<Date>) -> Option<String> {
    date.map(aspree_common::time::format_date)
}
