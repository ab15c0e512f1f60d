use std::sync::Arc;

use tokio::sync::Semaphore;

/// A synchronization utility for sending / receiving shutdown signals.
///
/// - Multi-producer and multi-consumer; clone to get another handle.
/// - Consumers observe signals sent before they subscribed (unlike
///   [`tokio::sync::broadcast`]).
/// - Sending more than once is harmless.
///
/// Internally this relies on [`Semaphore::acquire`] returning an error once
/// the semaphore has been closed: closing the (zero-permit) semaphore is the
/// shutdown signal.
#[derive(Clone, Debug)]
pub struct ShutdownChannel {
    inner: Arc<Semaphore>,
}

impl ShutdownChannel {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(0)),
        }
    }

    /// Send a shutdown signal, waking all actors blocked in [`recv`].
    ///
    /// [`recv`]: ShutdownChannel::recv
    pub fn send(&self) {
        self.inner.close()
    }

    /// Wait for a shutdown signal. Returns immediately if one was already
    /// sent.
    pub async fn recv(&self) {
        match self.inner.acquire().await {
            Ok(_permit) =>
                unreachable!("Zero-permit semaphore yielded a permit"),
            Err(_closed) => (),
        }
    }

    /// Immediately returns whether a shutdown signal has been sent.
    pub fn try_recv(&self) -> bool {
        self.inner.is_closed()
    }
}
