use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

/// A thin wrapper around [`tokio::task::JoinHandle`] that adds the
/// `#[must_use]` lint to ensure that all spawned tasks are joined or
/// explicitly annotated that no joining is required, and which carries a
/// tracing span named after the task.
#[must_use]
pub struct AppTask<T>(JoinHandle<T>);

impl<T: Send + 'static> AppTask<T> {
    pub fn spawn<F>(future: F) -> AppTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
    {
        AppTask(tokio::spawn(future))
    }

    /// Spawn a task whose logs are grouped under an `(name)` span.
    pub fn spawn_named<F>(name: &str, future: F) -> AppTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let span = tracing::info_span!("task", %name);
        AppTask(tokio::spawn(future.instrument(span)))
    }

    /// Abort the underlying task.
    pub fn abort(&self) {
        self.0.abort()
    }
}

impl<T> Future for AppTask<T> {
    type Output = Result<T, JoinError>;
    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}
