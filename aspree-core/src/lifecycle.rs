//! The invoice lifecycle state machine.
//!
//! Each state update runs in three stages: **check** (validate the proposed
//! transition against the freshly-loaded row), **apply** (mutate the in-memory
//! invoice), **persist** (conditional update guarded by the read fingerprint,
//! retried once on a lost update). The whole read-modify-write runs under a
//! per-invoice async lock, so concurrent approvals of the same invoice
//! serialize; distinct invoices proceed in parallel. The `source_invoice_id`
//! uniqueness constraint in the orders table is the second line of defense
//! should both guards be bypassed.
//!
//! Auto-order creation is deliberately *outside* the payment transition:
//! a failed order creation never rolls back a recorded payment. The failure
//! is reported as an advisory field and `sync_paid_invoices_to_orders` can
//! finish the job later.

use std::{collections::HashMap, sync::Arc};

use aspree_api::{
    entities::{
        BusinessSettings, Invoice, Merchant, Order, OrderItem,
        PaymentSchedule,
    },
    error::ApiError,
    models::{
        schedule_from_draft, items_from_draft, InvoiceDraft,
        SyncOrdersResponse,
    },
    types::{
        ids::{InvoiceId, MerchantId, OrderId},
        money,
        status::{
            ConfirmationStatus, InvoiceStatus, OrderStatus, PaymentStage,
            PaymentStatus, ScheduleLegStatus,
        },
    },
};
use aspree_common::time::TimestampMs;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::{
    matcher::CustomerMatcher,
    minter::IdMinter,
    store::{Store, StoreError},
};

/// Outcome of a lifecycle transition, including the advisory auto-order
/// section when the transition reached `paid`.
#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub invoice: Invoice,
    /// `None` when the transition did not involve order creation.
    pub order_created: Option<bool>,
    pub order: Option<Order>,
    pub order_error: Option<String>,
}

impl TransitionOutcome {
    fn plain(invoice: Invoice) -> Self {
        Self {
            invoice,
            order_created: None,
            order: None,
            order_error: None,
        }
    }
}

#[derive(Clone)]
pub struct InvoiceLifecycle {
    store: Store,
    minter: IdMinter,
    matcher: CustomerMatcher,
    locks: Arc<tokio::sync::Mutex<LockMap>>,
}

type LockMap = HashMap<InvoiceId, Arc<tokio::sync::Mutex<()>>>;

impl InvoiceLifecycle {
    pub fn new(store: Store) -> Self {
        let minter = IdMinter::new(store.clone());
        let matcher = CustomerMatcher::new(store.clone());
        Self {
            store,
            minter,
            matcher,
            locks: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn minter(&self) -> &IdMinter {
        &self.minter
    }

    /// The per-invoice lock serializing read-modify-write transitions.
    async fn invoice_lock(
        &self,
        id: &InvoiceId,
    ) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    // --- Creation & editing --- //

    /// Build and persist a new draft invoice from an extractor draft:
    /// resolve the customer, mint the number and portal token, snapshot the
    /// merchant, compute totals, and validate (or drop) the schedule.
    pub async fn create_from_draft(
        &self,
        merchant: &Merchant,
        settings: Option<&BusinessSettings>,
        draft: &InvoiceDraft,
    ) -> Result<Invoice, ApiError> {
        if draft.items.is_empty() {
            return Err(ApiError::validation(
                "Invoice must have at least one item",
            ));
        }
        if draft.customer.name.trim().is_empty() {
            return Err(ApiError::validation("Customer name is required"));
        }

        let customer = self
            .matcher
            .resolve(&merchant.id, &draft.customer)
            .await?;

        let invoice_number = self.minter.invoice_number().await?;
        let customer_token = self.minter.customer_token();

        let now = TimestampMs::now();
        let invoice_date = draft.invoice_date.unwrap_or_else(|| now.utc_date());
        let (items, totals) = compute_items_and_totals(draft, settings);
        let payment_schedule = resolve_schedule(draft, &invoice_number);
        let payment_stage = match payment_schedule {
            Some(_) => PaymentStage::DownPayment,
            None => PaymentStage::FullPayment,
        };

        let invoice = Invoice {
            id: InvoiceId::generate(),
            merchant_id: merchant.id.clone(),
            invoice_number,
            customer_id: Some(customer.id.clone()),
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_phone: customer.phone.clone(),
            customer_address: customer.address.clone(),
            merchant_name: merchant.business_name.clone(),
            merchant_email: Some(merchant.email.clone()),
            merchant_phone: merchant.phone.clone(),
            merchant_address: merchant.address.clone(),
            invoice_date,
            due_date: draft.due_date,
            original_due_date: draft.due_date,
            status: InvoiceStatus::Draft,
            payment_stage,
            payment_status: PaymentStatus::Pending,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            shipping_cost: totals.shipping_cost,
            discount: totals.discount,
            grand_total: totals.grand_total,
            currency: "IDR".to_owned(),
            payment_terms: draft.payment_terms.clone(),
            notes: draft.notes.clone(),
            items,
            payment_schedule,
            customer_token,
            final_payment_token: None,
            payment_confirmation_file: None,
            payment_confirmation_notes: None,
            payment_confirmation_date: None,
            confirmation_status: None,
            merchant_confirmation_notes: None,
            confirmation_reviewed_date: None,
            sent_at: None,
            paid_at: None,
            dp_confirmed_date: None,
            final_payment_confirmed_date: None,
            created_at: now,
            updated_at: now,
        };

        self.store.create_invoice(&invoice).await?;
        self.store
            .bump_customer_invoice_stats(
                &merchant.id,
                &customer.id,
                invoice.invoice_date,
                invoice.grand_total,
                now,
            )
            .await?;

        info!(
            invoice = %invoice.invoice_number,
            merchant = %merchant.id,
            "created invoice"
        );
        Ok(invoice)
    }

    /// Re-derive an editable invoice from a new draft. Preserves identity:
    /// id, invoice number, creation time, customer token, and the original
    /// due date survive every edit.
    pub async fn edit_from_draft(
        &self,
        merchant: &Merchant,
        settings: Option<&BusinessSettings>,
        invoice_id: &InvoiceId,
        draft: &InvoiceDraft,
    ) -> Result<Invoice, ApiError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self
            .store
            .get_invoice(&merchant.id, invoice_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;

        if !invoice.status.is_editable() {
            return Err(ApiError::immutable(format!(
                "Invoice in status '{}' cannot be edited",
                invoice.status
            )));
        }
        if draft.items.is_empty() {
            return Err(ApiError::validation(
                "Invoice must have at least one item",
            ));
        }

        let (items, totals) = compute_items_and_totals(draft, settings);

        invoice.customer_name = draft.customer.name.clone();
        invoice.customer_email = draft
            .customer
            .email
            .as_ref()
            .map(|e| e.to_lowercase())
            .or(invoice.customer_email);
        invoice.customer_phone =
            draft.customer.phone.clone().or(invoice.customer_phone);
        invoice.customer_address =
            draft.customer.address.clone().or(invoice.customer_address);
        if let Some(date) = draft.invoice_date {
            invoice.invoice_date = date;
        }
        if let Some(due) = draft.due_date {
            invoice.due_date = Some(due);
        }
        invoice.items = items;
        invoice.subtotal = totals.subtotal;
        invoice.tax_amount = totals.tax_amount;
        invoice.shipping_cost = totals.shipping_cost;
        invoice.discount = totals.discount;
        invoice.grand_total = totals.grand_total;
        invoice.payment_terms =
            draft.payment_terms.clone().or(invoice.payment_terms);
        invoice.notes = draft.notes.clone().or(invoice.notes);
        invoice.payment_schedule =
            resolve_schedule(draft, &invoice.invoice_number)
                .or(invoice.payment_schedule);
        invoice.payment_stage = match (&invoice.payment_schedule, invoice.payment_stage) {
            // Not yet past the DP leg; keep the stage consistent with the
            // schedule's presence.
            (Some(_), PaymentStage::FullPayment) => PaymentStage::DownPayment,
            (None, PaymentStage::DownPayment) => PaymentStage::FullPayment,
            (_, stage) => stage,
        };
        invoice.updated_at = TimestampMs::now();

        self.store.update_invoice(&invoice).await?;
        Ok(invoice)
    }

    // --- Status transitions --- //

    /// Drive the invoice to `target`. Returns the refreshed invoice plus
    /// the advisory auto-order outcome when the target was `paid`.
    pub async fn update_status(
        &self,
        merchant_id: &MerchantId,
        invoice_id: &InvoiceId,
        target: InvoiceStatus,
    ) -> Result<TransitionOutcome, ApiError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        // Retry once on a lost update (e.g. a webhook racing a manual
        // approval through a different process).
        for attempt in 0..2 {
            let mut invoice = self
                .store
                .get_invoice(merchant_id, invoice_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;

            // Already there: idempotent success, no second order.
            if invoice.status == target {
                let outcome = self.outcome_for(invoice, target).await;
                return Ok(outcome);
            }

            let fingerprint = (invoice.status, invoice.updated_at);
            self.apply_transition(&mut invoice, target)?;

            if self
                .store
                .update_invoice_guarded(&invoice, fingerprint.0, fingerprint.1)
                .await?
            {
                info!(
                    invoice = %invoice.invoice_number,
                    from = %fingerprint.0,
                    to = %target,
                    "invoice transition"
                );
                let outcome = self.outcome_for(invoice, target).await;
                return Ok(outcome);
            }

            warn!(
                invoice = %invoice_id,
                attempt,
                "lost update applying invoice transition, retrying"
            );
        }

        Err(ApiError::conflict(
            "Invoice was modified concurrently; retry the operation",
        ))
    }

    /// Validate + apply the state mutation for one transition. Pure with
    /// respect to storage; the caller persists.
    fn apply_transition(
        &self,
        invoice: &mut Invoice,
        target: InvoiceStatus,
    ) -> Result<(), ApiError> {
        if !invoice.status.can_transition_to(target) {
            return Err(ApiError::conflict(format!(
                "Cannot transition invoice from '{}' to '{target}'",
                invoice.status
            )));
        }

        let now = TimestampMs::now();
        match target {
            InvoiceStatus::Sent => {
                invoice.sent_at = Some(now);
            }
            InvoiceStatus::DpPaid => {
                let Some(schedule) = invoice.payment_schedule.as_mut() else {
                    return Err(ApiError::validation(
                        "Invoice has no down-payment schedule",
                    ));
                };
                schedule.down_payment.status = ScheduleLegStatus::Paid;
                schedule.down_payment.paid_date = Some(now.utc_date());
                // Re-anchor the remaining balance on the recorded totals.
                schedule.remaining_balance.amount = money::round_money(
                    invoice.grand_total - schedule.down_payment.amount,
                );
                // The working due date becomes the balance due date; the
                // original is preserved separately.
                invoice.due_date = Some(schedule.remaining_balance.due_date);
                invoice.payment_stage = PaymentStage::FinalPayment;
                invoice.payment_status = PaymentStatus::Partial;
                invoice.dp_confirmed_date = Some(now);
                if invoice.final_payment_token.is_none() {
                    invoice.final_payment_token =
                        Some(self.minter.final_payment_token());
                }
            }
            InvoiceStatus::Paid => {
                if invoice.status == InvoiceStatus::DpPaid {
                    invoice.final_payment_confirmed_date = Some(now);
                    if let Some(schedule) = invoice.payment_schedule.as_mut()
                    {
                        schedule.remaining_balance.status =
                            ScheduleLegStatus::Paid;
                        schedule.remaining_balance.paid_date =
                            Some(now.utc_date());
                    }
                }
                invoice.paid_at = Some(now);
                invoice.payment_stage = PaymentStage::Completed;
                invoice.payment_status = PaymentStatus::Paid;
            }
            InvoiceStatus::Cancelled => {}
            InvoiceStatus::Draft =>
                unreachable!("no transition targets draft"),
        }
        invoice.status = target;
        invoice.updated_at = now;
        Ok(())
    }

    /// Attach the auto-order section when the invoice just reached `paid`.
    async fn outcome_for(
        &self,
        invoice: Invoice,
        target: InvoiceStatus,
    ) -> TransitionOutcome {
        if target != InvoiceStatus::Paid {
            return TransitionOutcome::plain(invoice);
        }
        match self.ensure_order_for_paid(&invoice).await {
            Ok((order, created)) => TransitionOutcome {
                invoice,
                order_created: Some(created),
                order: Some(order),
                order_error: None,
            },
            Err(e) => {
                // The payment stays recorded; reconciliation finishes later.
                error!(
                    invoice = %invoice.invoice_number,
                    "auto-order creation failed: {e:#}"
                );
                TransitionOutcome {
                    invoice,
                    order_created: Some(false),
                    order: None,
                    order_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Idempotently derive the order for a paid invoice: return the existing
    /// order when present, otherwise create it.
    async fn ensure_order_for_paid(
        &self,
        invoice: &Invoice,
    ) -> Result<(Order, bool), StoreError> {
        if let Some(existing) = self
            .store
            .get_order_by_source_invoice(&invoice.merchant_id, &invoice.id)
            .await?
        {
            return Ok((existing, false));
        }

        let order_number = self.minter.order_number().await?;
        let now = TimestampMs::now();
        let order = Order {
            id: OrderId::generate(),
            merchant_id: invoice.merchant_id.clone(),
            order_number,
            customer_name: invoice.customer_name.clone(),
            customer_email: invoice.customer_email.clone(),
            customer_phone: invoice.customer_phone.clone(),
            shipping_address: invoice.customer_address.clone(),
            items: invoice
                .items
                .iter()
                .map(|item| OrderItem {
                    product_name: item.product_name.clone(),
                    sku: item.sku.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Paid,
            subtotal: invoice.subtotal,
            shipping_cost: invoice.shipping_cost,
            discount: invoice.discount,
            total_amount: invoice.grand_total,
            currency: invoice.currency.clone(),
            tracking_number: None,
            shipped_date: None,
            delivered_date: None,
            notes: Some(format!(
                "Auto-created from invoice {}",
                invoice.invoice_number
            )),
            source_invoice_id: Some(invoice.id.clone()),
            source_invoice_number: Some(invoice.invoice_number.clone()),
            created_at: now,
            updated_at: now,
        };

        match self.store.create_order(&order).await {
            Ok(()) => {
                info!(
                    order = %order.order_number,
                    invoice = %invoice.invoice_number,
                    "auto-created order"
                );
                Ok((order, true))
            }
            // Raced by another writer; the unique constraint on
            // source_invoice_id guarantees the existing row is the one.
            Err(StoreError::Duplicate(_)) => {
                let existing = self
                    .store
                    .get_order_by_source_invoice(
                        &invoice.merchant_id,
                        &invoice.id,
                    )
                    .await?
                    .ok_or_else(|| {
                        StoreError::Corrupt(
                            "duplicate order vanished".to_owned(),
                        )
                    })?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    // --- Payment confirmation sub-flow --- //

    /// Record a customer-uploaded proof of payment. The file itself has
    /// already been validated and stored by the caller.
    pub async fn submit_confirmation(
        &self,
        invoice_id: &InvoiceId,
        merchant_id: &MerchantId,
        file_path: String,
        notes: Option<String>,
    ) -> Result<Invoice, ApiError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self
            .store
            .get_invoice(merchant_id, invoice_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;

        match invoice.status {
            InvoiceStatus::Sent | InvoiceStatus::DpPaid => {}
            InvoiceStatus::Draft =>
                return Err(ApiError::conflict(
                    "Invoice has not been sent yet",
                )),
            InvoiceStatus::Paid | InvoiceStatus::Cancelled =>
                return Err(ApiError::conflict(
                    "Invoice is no longer awaiting payment",
                )),
        }

        let now = TimestampMs::now();
        invoice.payment_confirmation_file = Some(file_path);
        invoice.payment_confirmation_notes = notes;
        invoice.payment_confirmation_date = Some(now);
        invoice.confirmation_status = Some(ConfirmationStatus::Pending);
        invoice.payment_status = PaymentStatus::ConfirmationPending;
        invoice.merchant_confirmation_notes = None;
        invoice.confirmation_reviewed_date = None;
        invoice.updated_at = now;

        self.store.update_invoice(&invoice).await?;
        info!(
            invoice = %invoice.invoice_number,
            "payment confirmation submitted"
        );
        Ok(invoice)
    }

    /// Merchant approves the pending confirmation, driving the transition
    /// appropriate for the invoice's stage.
    pub async fn approve_confirmation(
        &self,
        merchant_id: &MerchantId,
        invoice_id: &InvoiceId,
        merchant_notes: Option<String>,
    ) -> Result<TransitionOutcome, ApiError> {
        let target = {
            // Stage decides the target; the lock inside update_status keeps
            // the transition itself serialized.
            let invoice = self
                .store
                .get_invoice(merchant_id, invoice_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;

            if invoice.confirmation_status != Some(ConfirmationStatus::Pending)
            {
                return Err(ApiError::conflict(
                    "Invoice has no pending payment confirmation",
                ));
            }

            match invoice.payment_stage {
                PaymentStage::DownPayment => InvoiceStatus::DpPaid,
                PaymentStage::FullPayment | PaymentStage::FinalPayment =>
                    InvoiceStatus::Paid,
                PaymentStage::Completed =>
                    return Err(ApiError::conflict(
                        "Invoice is already completed",
                    )),
            }
        };

        let mut outcome =
            self.update_status(merchant_id, invoice_id, target).await?;

        // Stamp the review fields on the post-transition row.
        let now = TimestampMs::now();
        outcome.invoice.confirmation_status =
            Some(ConfirmationStatus::Approved);
        outcome.invoice.merchant_confirmation_notes = merchant_notes;
        outcome.invoice.confirmation_reviewed_date = Some(now);
        outcome.invoice.updated_at = now;
        self.store.update_invoice(&outcome.invoice).await?;

        Ok(outcome)
    }

    /// Merchant rejects the pending confirmation; the invoice stays in its
    /// current stage with payment due again.
    pub async fn reject_confirmation(
        &self,
        merchant_id: &MerchantId,
        invoice_id: &InvoiceId,
        merchant_notes: Option<String>,
    ) -> Result<Invoice, ApiError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self
            .store
            .get_invoice(merchant_id, invoice_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Unknown invoice"))?;

        if invoice.confirmation_status != Some(ConfirmationStatus::Pending) {
            return Err(ApiError::conflict(
                "Invoice has no pending payment confirmation",
            ));
        }

        let now = TimestampMs::now();
        invoice.confirmation_status = Some(ConfirmationStatus::Rejected);
        invoice.payment_status = PaymentStatus::Pending;
        invoice.merchant_confirmation_notes = merchant_notes;
        invoice.confirmation_reviewed_date = Some(now);
        invoice.updated_at = now;

        self.store.update_invoice(&invoice).await?;
        info!(
            invoice = %invoice.invoice_number,
            "payment confirmation rejected"
        );
        Ok(invoice)
    }

    // --- Reconciliation --- //

    /// Create the missing orders for paid invoices. Safe to run repeatedly;
    /// each run converges on "every paid invoice has exactly one order".
    pub async fn sync_paid_invoices_to_orders(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<SyncOrdersResponse, ApiError> {
        let missing = self
            .store
            .list_paid_invoices_without_orders(merchant_id)
            .await?;

        let mut created = 0u32;
        let mut skipped = 0u32;
        let mut orders = Vec::new();
        for invoice in &missing {
            match self.ensure_order_for_paid(invoice).await {
                Ok((order, was_created)) => {
                    if was_created {
                        created += 1;
                    } else {
                        skipped += 1;
                    }
                    orders.push(order);
                }
                Err(e) => {
                    skipped += 1;
                    warn!(
                        invoice = %invoice.invoice_number,
                        "reconciliation failed to create order: {e:#}"
                    );
                }
            }
        }

        info!(
            merchant = %merchant_id,
            created,
            skipped,
            "synced paid invoices to orders"
        );
        Ok(SyncOrdersResponse {
            created,
            skipped,
            orders,
        })
    }
}

struct Totals {
    subtotal: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    discount: Decimal,
    grand_total: Decimal,
}

fn compute_items_and_totals(
    draft: &InvoiceDraft,
    settings: Option<&BusinessSettings>,
) -> (Vec<aspree_api::entities::InvoiceItem>, Totals) {
    let tax_rate = settings
        .filter(|s| s.tax_enabled)
        .map(|s| s.tax_rate)
        .filter(|rate| !rate.is_zero());
    let items = items_from_draft(&draft.items, tax_rate);

    let subtotal = money::round_money(
        items.iter().map(|item| item.line_total).sum::<Decimal>(),
    );
    let tax_amount = money::round_money(
        items
            .iter()
            .filter_map(|item| item.tax_amount)
            .sum::<Decimal>(),
    );
    let shipping_cost = draft.shipping_cost.unwrap_or(Decimal::ZERO);
    let discount = draft.discount.unwrap_or(Decimal::ZERO);
    let grand_total =
        money::grand_total(subtotal, tax_amount, shipping_cost, discount);

    (
        items,
        Totals {
            subtotal,
            tax_amount,
            shipping_cost,
            discount,
            grand_total,
        },
    )
}

/// A complete schedule is kept; a partial one is dropped with a warning
/// rather than stored in a half-usable state.
fn resolve_schedule(
    draft: &InvoiceDraft,
    invoice_number: &aspree_api::types::ids::InvoiceNumber,
) -> Option<PaymentSchedule> {
    let draft_schedule = draft.payment_schedule.as_ref()?;
    match schedule_from_draft(draft_schedule) {
        Ok(schedule) => Some(schedule),
        Err(reason) => {
            warn!(
                invoice = %invoice_number,
                "dropping incomplete payment schedule: {reason}"
            );
            None
        }
    }
}
