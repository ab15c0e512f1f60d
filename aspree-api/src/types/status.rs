//! Status sum types for merchants, invoices, and orders.
//!
//! The HTTP boundary and the storage layer both serialize these as lowercase
//! snake_case strings, so each type gets a manual `Display` / `FromStr` pair
//! and derives `SerializeDisplay` / `DeserializeFromStr`. The transition
//! tables live here, next to the types, rather than inside the lifecycle
//! service.

use std::{fmt, fmt::Display, str::FromStr};

use anyhow::anyhow;
#[cfg(any(test, feature = "test-utils"))]
use proptest_derive::Arbitrary;
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Whether a merchant account is live or soft-deleted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum MerchantStatus {
    Active,
    Inactive,
}

/// The primary invoice lifecycle state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum InvoiceStatus {
    Draft,
    Sent,
    /// Down payment approved; the remaining balance is outstanding.
    DpPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// An invoice may be edited in `draft` or `sent`; anything at or past
    /// `dp_paid` is immutable.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }

    /// The transition table:
    ///
    /// - `draft -> sent` (mark sent)
    /// - `sent -> paid` (full payment approved)
    /// - `sent -> dp_paid` (down payment approved)
    /// - `dp_paid -> paid` (final payment approved)
    /// - any non-terminal `-> cancelled`
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent)
                | (Sent, Paid)
                | (Sent, DpPaid)
                | (DpPaid, Paid)
                | (Draft | Sent | DpPaid, Cancelled)
        )
    }
}

/// Which leg of the payment schedule an invoice is on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum PaymentStage {
    /// Single-payment invoice.
    FullPayment,
    /// The scheduled down payment is outstanding.
    DownPayment,
    /// The down payment cleared; the remaining balance is outstanding.
    FinalPayment,
    Completed,
}

/// Whether money has been received for the current stage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum PaymentStatus {
    Pending,
    /// A customer uploaded proof of payment; awaiting merchant review.
    ConfirmationPending,
    Partial,
    Paid,
}

/// The review state of a customer-uploaded payment confirmation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum ConfirmationStatus {
    Pending,
    Approved,
    Rejected,
}

/// The fulfillment state of an order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Invoiced,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Fulfillment moves forward only; cancel is allowed until shipment.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending | Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Processing, Cancelled)
                | (Invoiced, Processing | Shipped | Cancelled)
        )
    }
}

/// How a customer record entered the system.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum ExtractionMethod {
    Manual,
    Auto,
}

/// Configured payment method families, at most one row per merchant each.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum MethodType {
    BankTransfer,
    Gateway,
}

/// How a customer reached a token-gated invoice view.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum AccessType {
    Token,
    Email,
}

/// The only supported schedule type; kept as an enum so the wire shape stays
/// extensible.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum ScheduleType {
    DownPayment,
}

/// Whether a schedule leg has been paid.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(SerializeDisplay, DeserializeFromStr)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum ScheduleLegStatus {
    Pending,
    Paid,
}

/// Implements `FromStr` / `Display` for a unit enum using the given
/// lowercase string per variant.
macro_rules! impl_status_strings {
    ($name:ident, $err:literal, $($variant:ident => $s:literal),+ $(,)?) => {
        impl FromStr for $name {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(anyhow!($err)),
                }
            }
        }
        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($s),)+
                }
            }
        }
    };
}

impl_status_strings!(
    MerchantStatus, "Must be active|inactive",
    Active => "active",
    Inactive => "inactive",
);

impl_status_strings!(
    InvoiceStatus, "Must be draft|sent|dp_paid|paid|cancelled",
    Draft => "draft",
    Sent => "sent",
    DpPaid => "dp_paid",
    Paid => "paid",
    Cancelled => "cancelled",
);

impl_status_strings!(
    PaymentStage, "Must be full_payment|down_payment|final_payment|completed",
    FullPayment => "full_payment",
    DownPayment => "down_payment",
    FinalPayment => "final_payment",
    Completed => "completed",
);

impl_status_strings!(
    PaymentStatus, "Must be pending|confirmation_pending|partial|paid",
    Pending => "pending",
    ConfirmationPending => "confirmation_pending",
    Partial => "partial",
    Paid => "paid",
);

impl_status_strings!(
    ConfirmationStatus, "Must be pending|approved|rejected",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
);

impl_status_strings!(
    OrderStatus,
    "Must be pending|processing|shipped|delivered|cancelled|invoiced",
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Invoiced => "invoiced",
);

impl_status_strings!(
    ExtractionMethod, "Must be manual|auto",
    Manual => "manual",
    Auto => "auto",
);

impl_status_strings!(
    MethodType, "Must be bank_transfer|gateway",
    BankTransfer => "bank_transfer",
    Gateway => "gateway",
);

impl_status_strings!(
    AccessType, "Must be token|email",
    Token => "token",
    Email => "email",
);

impl_status_strings!(
    ScheduleType, "Must be down_payment",
    DownPayment => "down_payment",
);

impl_status_strings!(
    ScheduleLegStatus, "Must be pending|paid",
    Pending => "pending",
    Paid => "paid",
);
