//! Asynchronous side-effect queue.
//!
//! Side effects that must not block a request path (notification fan-out,
//! blob deletion after a logo replace) are pushed here after the response
//! envelope is produced, and drained by a single consumer task on a one
//! second tick. Operations are fire-and-forget with per-operation error
//! logging; insertion order is preserved for a single producer.

use std::{sync::Arc, time::Duration};

use aspree_api::types::ids::{InvoiceId, MerchantId};
use aspree_common::{shutdown::ShutdownChannel, task::AppTask};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    store::Store,
    traits::{BlobStore, Notifier},
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A queued side effect.
#[derive(Clone, Debug)]
pub enum SideEffect {
    SendInvoice {
        merchant_id: MerchantId,
        invoice_id: InvoiceId,
    },
    SendFinalPayment {
        merchant_id: MerchantId,
        invoice_id: InvoiceId,
    },
    SendReminder {
        merchant_id: MerchantId,
        invoice_id: InvoiceId,
    },
    DeleteBlob {
        public_id: String,
    },
}

/// The producer handle. Cheap to clone.
#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::UnboundedSender<SideEffect>,
}

impl SideEffectQueue {
    /// Start the queue and its single consumer task.
    pub fn start(
        store: Store,
        notifier: Arc<dyn Notifier>,
        blobs: Arc<dyn BlobStore>,
        shutdown: ShutdownChannel,
    ) -> (Self, AppTask<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            rx,
            store,
            notifier,
            blobs,
            shutdown,
        };
        let task = AppTask::spawn_named("side-effect-queue", worker.run());
        (Self { tx }, task)
    }

    /// Fire-and-forget; a closed queue (shutdown in progress) only logs.
    pub fn push(&self, effect: SideEffect) {
        if self.tx.send(effect).is_err() {
            warn!("side-effect queue is closed; dropping effect");
        }
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<SideEffect>,
    store: Store,
    notifier: Arc<dyn Notifier>,
    blobs: Arc<dyn BlobStore>,
    shutdown: ShutdownChannel,
}

impl Worker {
    async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                () = shutdown.recv() => {
                    info!("side-effect queue shutting down");
                    // Drain what is already queued before exiting.
                    self.drain().await;
                    return;
                }
                _ = tick.tick() => self.drain().await,
            }
        }
    }

    /// Run everything currently queued, in insertion order.
    async fn drain(&mut self) {
        while let Ok(effect) = self.rx.try_recv() {
            self.run_one(effect).await;
        }
    }

    async fn run_one(&self, effect: SideEffect) {
        let result = match &effect {
            SideEffect::SendInvoice {
                merchant_id,
                invoice_id,
            } =>
                self.notify(merchant_id, invoice_id, |n, i| async move {
                    n.send_invoice(&i).await
                })
                .await,
            SideEffect::SendFinalPayment {
                merchant_id,
                invoice_id,
            } =>
                self.notify(merchant_id, invoice_id, |n, i| async move {
                    n.send_final_payment(&i).await
                })
                .await,
            SideEffect::SendReminder {
                merchant_id,
                invoice_id,
            } =>
                self.notify(merchant_id, invoice_id, |n, i| async move {
                    n.send_reminder(&i).await
                })
                .await,
            SideEffect::DeleteBlob { public_id } =>
                self.blobs.delete(public_id).await,
        };

        if let Err(e) = result {
            warn!("side effect {effect:?} failed: {e:#}");
        }
    }

    async fn notify<F, Fut>(
        &self,
        merchant_id: &MerchantId,
        invoice_id: &InvoiceId,
        send: F,
    ) -> anyhow::Result<()>
    where
        F: FnOnce(Arc<dyn Notifier>, aspree_api::entities::Invoice) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let invoice = self
            .store
            .get_invoice(merchant_id, invoice_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("invoice {invoice_id} no longer exists")
            })?;
        send(self.notifier.clone(), invoice).await
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use crate::{
        store::testing::{seed_merchant, test_invoice},
        traits::mock::{RecordingBlobStore, RecordingNotifier},
    };

    use super::*;

    #[tokio::test]
    async fn drains_in_order_and_logs_failures() {
        let store = Store::open_in_memory().await.unwrap();
        let mid = seed_merchant(&store, "a@x.com").await;
        let invoice = test_invoice(
            &mid,
            "INV-20240101-AAAA",
            "inv_abcdefghi0",
            dec!(5000),
        );
        store.create_invoice(&invoice).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let blobs = Arc::new(RecordingBlobStore::default());
        let shutdown = ShutdownChannel::new();
        let (queue, task) = SideEffectQueue::start(
            store,
            notifier.clone(),
            blobs.clone(),
            shutdown.clone(),
        );

        queue.push(SideEffect::SendInvoice {
            merchant_id: mid.clone(),
            invoice_id: invoice.id.clone(),
        });
        queue.push(SideEffect::DeleteBlob {
            public_id: "logos/old".to_owned(),
        });
        queue.push(SideEffect::SendReminder {
            merchant_id: mid.clone(),
            // Unknown invoice: the effect fails, is logged, and the queue
            // keeps going.
            invoice_id: InvoiceId::generate(),
        });
        queue.push(SideEffect::SendFinalPayment {
            merchant_id: mid,
            invoice_id: invoice.id.clone(),
        });

        // Let the ticker fire.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                "invoice:INV-20240101-AAAA".to_owned(),
                "final:INV-20240101-AAAA".to_owned(),
            ]
        );
        assert_eq!(
            blobs.deletes.lock().unwrap().clone(),
            vec!["logos/old".to_owned()]
        );

        shutdown.send();
        task.await.unwrap();
    }
}
