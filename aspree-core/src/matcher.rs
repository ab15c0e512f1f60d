//! Deterministic + fuzzy customer resolution.
//!
//! Incoming invoice drafts carry whatever customer details the extractor
//! found. Resolution walks a strict hierarchy, stopping at the first hit:
//!
//! 1. exact case-insensitive email match within the merchant,
//! 2. normalized phone match within the merchant,
//! 3. fuzzy name match (length >= 4, similarity strictly > 0.80),
//! 4. otherwise create a new customer.
//!
//! A hit merges missing fields from the incoming record; populated fields
//! are never overwritten.

use aspree_api::{
    entities::Customer,
    models::DraftCustomer,
    types::{
        ids::{CustomerId, MerchantId},
        phone,
        status::ExtractionMethod,
    },
};
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use tracing::debug;

use crate::store::{Store, StoreError};

/// Fuzzy name matches below this length are too noisy to attempt.
const MIN_FUZZY_NAME_LEN: usize = 4;
/// Similarity must be strictly greater than this to accept a fuzzy match.
const FUZZY_THRESHOLD: f64 = 0.80;
/// Upper bound on candidates scanned for phone / name matching.
const SCAN_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct CustomerMatcher {
    store: Store,
}

impl CustomerMatcher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve an incoming customer record to an existing row or create one.
    pub async fn resolve(
        &self,
        merchant_id: &MerchantId,
        incoming: &DraftCustomer,
    ) -> Result<Customer, StoreError> {
        // 1. Email.
        if let Some(email) = nonempty(&incoming.email) {
            if let Some(found) = self
                .store
                .get_customer_by_email(merchant_id, email)
                .await?
            {
                debug!(customer = %found.id, "customer matched by email");
                return self.merge(found, incoming).await;
            }
        }

        let candidates =
            self.store.list_customers(merchant_id, SCAN_LIMIT, 0).await?;

        // 2. Normalized phone.
        if let Some(raw_phone) = nonempty(&incoming.phone) {
            let needle = phone::normalize(raw_phone);
            if !needle.is_empty() {
                let hit = candidates.iter().find(|c| {
                    c.phone
                        .as_deref()
                        .is_some_and(|p| phone::normalize(p) == needle)
                });
                if let Some(found) = hit {
                    debug!(customer = %found.id, "customer matched by phone");
                    return self.merge(found.clone(), incoming).await;
                }
            }
        }

        // 3. Fuzzy name.
        if incoming.name.chars().count() >= MIN_FUZZY_NAME_LEN {
            let best = candidates
                .iter()
                .map(|c| (name_similarity(&c.name, &incoming.name), c))
                .max_by(|(a, _), (b, _)| a.total_cmp(b));
            if let Some((score, found)) = best {
                if score > FUZZY_THRESHOLD {
                    debug!(
                        customer = %found.id,
                        score,
                        "customer matched by fuzzy name"
                    );
                    return self.merge(found.clone(), incoming).await;
                }
            }
        }

        // 4. Create.
        let now = TimestampMs::now();
        let customer = Customer {
            id: CustomerId::generate(),
            merchant_id: merchant_id.clone(),
            name: incoming.name.clone(),
            email: nonempty(&incoming.email)
                .map(|e| e.to_lowercase()),
            phone: nonempty(&incoming.phone).map(str::to_owned),
            address: nonempty(&incoming.address).map(str::to_owned),
            first_invoice_date: None,
            last_invoice_date: None,
            invoice_count: 0,
            total_spent: Decimal::ZERO,
            extraction_method: ExtractionMethod::Auto,
            created_at: now,
            updated_at: now,
        };
        self.store.create_customer(&customer).await?;
        debug!(customer = %customer.id, "created new customer");
        Ok(customer)
    }

    /// Fill missing fields from the incoming record; never overwrite.
    async fn merge(
        &self,
        mut existing: Customer,
        incoming: &DraftCustomer,
    ) -> Result<Customer, StoreError> {
        let mut changed = false;
        if existing.email.is_none() {
            if let Some(email) = nonempty(&incoming.email) {
                existing.email = Some(email.to_lowercase());
                changed = true;
            }
        }
        if existing.phone.is_none() {
            if let Some(phone) = nonempty(&incoming.phone) {
                existing.phone = Some(phone.to_owned());
                changed = true;
            }
        }
        if existing.address.is_none() {
            if let Some(address) = nonempty(&incoming.address) {
                existing.address = Some(address.to_owned());
                changed = true;
            }
        }
        if changed {
            existing.updated_at = TimestampMs::now();
            self.store.update_customer(&existing).await?;
        }
        Ok(existing)
    }
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `1 - levenshtein / max(len)`, over lowercased characters.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(&a, &b) as f64) / (max_len as f64)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row dynamic program.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution =
                prev_diag + usize::from(ca != cb);
            prev_diag = row[j + 1];
            row[j + 1] = substitution
                .min(row[j] + 1) // insertion
                .min(prev_diag + 1); // deletion
        }
    }
    row[b.len()]
}
