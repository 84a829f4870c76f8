//! Generation-counted liveness for asynchronous lookups.
//!
//! Each effect (current location, destination, search) owns an [`EffectSlot`]. Starting a
//! lookup takes a ticket; only the newest ticket of a slot may commit, and no ticket commits
//! once the session token is cancelled.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct EffectSlot {
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl EffectSlot {
    pub fn new(session: &CancellationToken) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            cancel: session.child_token(),
        }
    }

    pub fn begin(&self) -> EffectTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        EffectTicket {
            generation,
            current: Arc::clone(&self.generation),
            cancel: self.cancel.clone(),
        }
    }

    /// Supersedes every outstanding ticket without starting a new lookup.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct EffectTicket {
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl EffectTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Races `fut` against teardown. `None` means the session went away first.
    pub async fn run<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }
}
