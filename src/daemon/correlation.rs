//! Pending-request correlation table
//!
//! Turns the single duplex connection into independent request/response
//! exchanges. The issuing task registers an id and awaits the returned
//! receiver; the inbound dispatch task resolves the id when the matching
//! frame arrives.
//!
//! Resolving takes the sender out of the map under the lock, so a resolve
//! racing another resolve or a remove delivers at most once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

/// Receiving half handed to the task that registered an id
pub type ResponseSlot<M> = oneshot::Receiver<M>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Correlation id {0} already has a pending exchange")]
    Duplicate(String),
}

/// Map from request id to the one-shot slot awaiting its response
#[derive(Debug)]
pub struct CorrelationTable<M> {
    pending: Mutex<HashMap<String, oneshot::Sender<M>>>,
}

impl<M> Default for CorrelationTable<M> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> CorrelationTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh slot for `id`
    ///
    /// Fails if `id` is still live. Ids are expected to be generated per
    /// exchange, so this indicates a bug in the caller or a colliding id.
    pub fn register(&self, id: &str) -> Result<ResponseSlot<M>, CorrelationError> {
        let mut pending = self.lock();
        if pending.contains_key(id) {
            return Err(CorrelationError::Duplicate(id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver `message` to the slot registered for `id`
    ///
    /// Returns false when the id is unknown, already resolved, or its
    /// receiver was dropped. In every case the message is discarded.
    pub fn resolve(&self, id: &str, message: M) -> bool {
        let Some(sender) = self.lock().remove(id) else {
            return false;
        };

        sender.send(message).is_ok()
    }

    /// Discard the entry for `id`, if any
    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    /// Whether `id` is awaiting a response
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<M>>> {
        self.pending.lock().unwrap_or_else(|e| {
            tracing::warn!("Correlation table lock poisoned, recovering");
            PoisonError::into_inner(e)
        })
    }
}
