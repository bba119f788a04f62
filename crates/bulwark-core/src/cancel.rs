//! Caller-owned cancellation signal
//!
//! Cloning a [`CancellationSignal`] shares the same flag. Cancelling aborts
//! whatever the operation is suspended on at that moment, whether that is the
//! transport call or a backoff delay.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::http::error::RequestError;

#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel every operation observing this signal
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // The sender lives as long as any clone; unreachable in practice.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Race a future against cancellation
    pub async fn guard<F, T>(&self, future: F) -> Result<T, RequestError>
    where
        F: Future<Output = Result<T, RequestError>>,
    {
        if self.is_cancelled() {
            return Err(RequestError::cancelled());
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RequestError::cancelled()),
            result = future => result,
        }
    }
}

/// Race a future against an optional signal
pub(crate) async fn guarded<F, T>(
    signal: Option<&CancellationSignal>,
    future: F,
) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match signal {
        Some(signal) => signal.guard(future).await,
        None => future.await,
    }
}
