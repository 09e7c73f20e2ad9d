//! Request/response correlation by message id.
//!
//! Every outbound frame gets a fresh id from a per-session counter. Requests
//! register a one-shot waiter under that id; the first inbound frame echoing
//! the id resolves it. A waiter is removed exactly once: on resolution, on its
//! own timeout, or when the session closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ProtocolError, Result};

type Waiter = oneshot::Sender<Result<Bytes>>;

#[derive(Debug)]
pub struct PendingRequests {
    next_id: AtomicU32,
    waiters: Mutex<HashMap<u32, Waiter>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Next message id. Zero is skipped when the counter wraps.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Register a waiter for `id`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Custom` if `id` already has a waiter.
    pub fn register(&self, id: u32) -> Result<oneshot::Receiver<Result<Bytes>>> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(&id) {
            return Err(ProtocolError::Custom(format!("Message ID {id} already pending")));
        }
        waiters.insert(id, tx);
        Ok(rx)
    }

    /// Hand `payload` to the waiter for `id`. Returns false if none is pending.
    pub fn resolve(&self, id: u32, payload: Bytes) -> bool {
        let Some(waiter) = self.waiters.lock().remove(&id) else {
            return false;
        };
        if waiter.send(Ok(payload)).is_err() {
            debug!(id, "Response arrived after the requester gave up");
        }
        true
    }

    pub fn remove(&self, id: u32) -> bool {
        self.waiters.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.waiters.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Fail every pending waiter with `Disconnected`. Returns how many there were.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<(u32, Waiter)> = self.waiters.lock().drain().collect();
        let count = drained.len();
        for (id, waiter) in drained {
            let _ = waiter.send(Err(ProtocolError::Disconnected { id }));
        }
        count
    }

    /// Await the response for `id`, giving up after `timeout`.
    ///
    /// # Errors
    /// - `ProtocolError::RequestTimeout` if nothing arrived in time; the waiter is removed
    /// - `ProtocolError::Disconnected` if the session closed first
    pub async fn wait(
        &self,
        id: u32,
        rx: oneshot::Receiver<Result<Bytes>>,
        timeout: Duration,
    ) -> Result<Bytes> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::Disconnected { id }),
            Err(_) => {
                self.remove(id);
                Err(ProtocolError::RequestTimeout { id })
            }
        }
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
