//! Trailing-edge debounce for a rapidly changing value.

use std::{sync::Mutex, time::Duration};

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub struct Debouncer<T> {
    delay: Duration,
    tx: watch::Sender<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(delay: Duration, initial: T, session: &CancellationToken) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            delay,
            tx,
            pending: Mutex::new(None),
            cancel: session.child_token(),
        }
    }

    /// Restarts the timer; `value` is published once `delay` passes without another push.
    /// Must be called from within a tokio runtime.
    pub fn push(&self, value: T) {
        if self.cancel.is_cancelled() {
            return;
        }
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tx.send_replace(value);
                }
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let pending = self.pending.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}
