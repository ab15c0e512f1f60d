//! Identifier newtypes.
//!
//! Row ids are UUIDv4 strings. Document numbers ([`InvoiceNumber`],
//! [`OrderNumber`]) are human-facing, globally unique, and globally
//! addressable. Access tokens ([`CustomerToken`], [`FinalPaymentToken`]) are
//! opaque capability strings handed to customers without a login.

use std::{fmt, fmt::Display, str::FromStr};

use anyhow::{anyhow, ensure};
use serde::{Deserialize, Serialize};

/// Defines a UUID-string row id newtype.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[derive(Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ensure!(!s.is_empty(), "id must be non-empty");
                Ok(Self(s.to_owned()))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

row_id!(
    /// The tenant id. Every merchant-owned row carries one, and the store
    /// requires one on every scoped query.
    MerchantId
);
row_id!(InvoiceId);
row_id!(OrderId);
row_id!(CustomerId);
row_id!(ProductId);

/// An invoice number: `INV-YYYYMMDD-XXXX`, where `XXXX` is uppercase
/// alphanumeric (longer for timestamp-fallback numbers).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

/// An order number: `ORD-YYYYMMDD-XXXX`, same shape as [`InvoiceNumber`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

fn validate_doc_number(prefix: &str, s: &str) -> anyhow::Result<()> {
    let rest = s
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('-'))
        .ok_or_else(|| anyhow!("number must start with '{prefix}-'"))?;
    let (date, suffix) = rest
        .split_once('-')
        .ok_or_else(|| anyhow!("number must be {prefix}-YYYYMMDD-XXXX"))?;
    ensure!(
        date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()),
        "date segment must be 8 digits"
    );
    ensure!(
        !suffix.is_empty()
            && suffix
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()),
        "suffix must be uppercase alphanumeric"
    );
    Ok(())
}

impl InvoiceNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `INV-YYYYMMDD-XXXX` part of a gateway external id
    /// (`<number>-<ms_epoch>`), i.e. everything before the final dash.
    pub fn from_external_id(external_id: &str) -> anyhow::Result<Self> {
        let number = external_id
            .rsplit_once('-')
            .map(|(head, _ts)| head)
            .ok_or_else(|| anyhow!("external id has no timestamp suffix"))?;
        Self::from_str(number)
    }
}

impl FromStr for InvoiceNumber {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_doc_number("INV", s)?;
        Ok(Self(s.to_owned()))
    }
}

impl Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_doc_number("ORD", s)?;
        Ok(Self(s.to_owned()))
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The opaque token that lets a customer view a single invoice: `inv_` +
/// 9 base36 chars + a base36 ms timestamp.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerToken(String);

impl CustomerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CustomerToken {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("inv_")
            .ok_or_else(|| anyhow!("customer token must start with 'inv_'"))?;
        ensure!(
            rest.len() > 9
                && rest
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()),
            "customer token body must be base36"
        );
        Ok(Self(s.to_owned()))
    }
}

impl Display for CustomerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The opaque token that lets a customer access the remaining-balance flow
/// for one invoice. Random hex, minted when a down payment is approved.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalPaymentToken(String);

impl FinalPaymentToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FinalPaymentToken {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(
            s.len() >= 32 && s.bytes().all(|b| b.is_ascii_hexdigit()),
            "final payment token must be at least 32 hex chars"
        );
        Ok(Self(s.to_owned()))
    }
}

impl Display for FinalPaymentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
