//! Collision-free document numbers and opaque access tokens.
//!
//! Document numbers are `INV-YYYYMMDD-XXXX` / `ORD-YYYYMMDD-XXXX`. A fresh
//! candidate is probed against both the invoices and orders tables (global,
//! SELECT-only) and retried up to 100 times; the final fallback derives the
//! suffix from the current timestamp, which cannot collide with a 4-char
//! random suffix by length alone.

use std::future::Future;

use aspree_api::types::ids::{
    CustomerToken, FinalPaymentToken, InvoiceNumber, OrderNumber,
};
use aspree_common::{
    rng::{Crng, SysRng},
    time::{format_date_compact, TimestampMs},
};
use aspree_crypto::token;
use time::Date;

use crate::store::{Store, StoreError};

/// Candidate attempts before falling back to a timestamp-derived suffix.
const MAX_ATTEMPTS: usize = 100;

const SUFFIX_LEN: usize = 4;
const SUFFIX_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone)]
pub struct IdMinter {
    store: Store,
}

impl IdMinter {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn invoice_number(&self) -> Result<InvoiceNumber, StoreError> {
        let number = self.mint("INV").await?;
        Ok(number
            .parse::<InvoiceNumber>()
            .expect("minted numbers are well-formed"))
    }

    pub async fn order_number(&self) -> Result<OrderNumber, StoreError> {
        let number = self.mint("ORD").await?;
        Ok(number
            .parse::<OrderNumber>()
            .expect("minted numbers are well-formed"))
    }

    async fn mint(&self, prefix: &str) -> Result<String, StoreError> {
        let mut rng = SysRng::new();
        let now = TimestampMs::now();
        let store = self.store.clone();
        mint_with(prefix, now.utc_date(), now, &mut rng, move |candidate| {
            let store = store.clone();
            async move { store.document_number_exists(&candidate).await }
        })
        .await
    }

    /// `inv_` + 9 random base36 chars + the mint time in base36.
    pub fn customer_token(&self) -> CustomerToken {
        let mut rng = SysRng::new();
        let body = token::random_base36(&mut rng, 9);
        let ts = token::base36_encode(TimestampMs::now().as_i64() as u64);
        format!("inv_{body}{ts}")
            .parse::<CustomerToken>()
            .expect("minted tokens are well-formed")
    }

    /// 32 random bytes as opaque hex.
    pub fn final_payment_token(&self) -> FinalPaymentToken {
        let mut rng = SysRng::new();
        token::random_token(&mut rng, 32)
            .parse::<FinalPaymentToken>()
            .expect("minted tokens are well-formed")
    }
}

fn candidate(prefix: &str, date: Date, rng: &mut impl Crng) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let mut byte = [0u8; 1];
            rng.fill_bytes(&mut byte);
            SUFFIX_ALPHABET[usize::from(byte[0]) % 36] as char
        })
        .collect();
    format!("{prefix}-{}-{suffix}", format_date_compact(date))
}

/// The candidate / probe / retry / fallback loop, parameterized over the
/// probe so the collision path is testable without a populated database.
/// `probe(candidate)` returns whether the number is already taken.
pub(crate) async fn mint_with<P, Fut>(
    prefix: &str,
    date: Date,
    now: TimestampMs,
    rng: &mut impl Crng,
    mut probe: P,
) -> Result<String, StoreError>
where
    P: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, StoreError>>,
{
    for _ in 0..MAX_ATTEMPTS {
        let number = candidate(prefix, date, rng);
        if !probe(number.clone()).await? {
            return Ok(number);
        }
    }

    // Exhausted the retry allowance; derive the suffix from the clock.
    // Longer than 4 chars, so it cannot collide with the candidates above.
    let ts_suffix =
        token::base36_encode(now.as_i64() as u64).to_ascii_uppercase();
    tracing::warn!(
        %prefix,
        "document number minting hit {MAX_ATTEMPTS} collisions, \
         falling back to timestamp suffix"
    );
    Ok(format!("{prefix}-{}-{ts_suffix}", format_date_compact(date)))
}
