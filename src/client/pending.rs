use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::protocol::{CorrelationId, Response};
use crate::{log_debug, Result, RpcError};

/// Sending side of a completion handle, held by the table.
type Completion = oneshot::Sender<Result<Response>>;

/// Receiving side of a completion handle, awaited by the caller.
pub(crate) type CompletionHandle = oneshot::Receiver<Result<Response>>;

/// Acquire a mutex guard, ignoring poisoning.
///
/// Every critical section below is a single map operation, so a panic while
/// holding the lock cannot leave an entry half-updated.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct State {
    requests: HashMap<CorrelationId, Completion>,
    /// Set by the first `fail_all`; the table accepts no new entries after.
    closed: Option<String>,
}

/// Tracks pending requests waiting for responses
///
/// Maps correlation IDs to oneshot channels. An entry leaves the map exactly
/// once: through `fulfill` when its response arrives, through `fail_all` when
/// the connection dies, or through `remove` when the caller gives up.
/// Completions are sent after the lock is released.
pub(crate) struct PendingRequests {
    // ---
    state: Mutex<State>,
}

impl PendingRequests {
    // ---

    /// Create a new empty pending requests tracker
    pub fn new() -> Self {
        // ---
        Self {
            state: Mutex::new(State {
                requests: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Register a new pending request
    ///
    /// Returns a receiver that resolves when the response arrives or the
    /// connection fails.
    ///
    /// # Errors
    ///
    /// - `RpcError::ConnectionClosed` once `fail_all` has run
    /// - `RpcError::InvalidRequest` if `correlation_id` is already pending
    pub fn register(&self, correlation_id: CorrelationId) -> Result<CompletionHandle> {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        if let Some(reason) = &state.closed {
            return Err(RpcError::ConnectionClosed(reason.clone()));
        }
        if state.requests.contains_key(&correlation_id) {
            return Err(RpcError::InvalidRequest(format!(
                "correlation id {correlation_id} is already pending"
            )));
        }

        let (tx, rx) = oneshot::channel();
        state.requests.insert(correlation_id, tx);
        Ok(rx)
    }

    /// Complete a pending request with its response
    ///
    /// Returns true if the correlation_id was found. An unknown id leaves
    /// every other entry untouched.
    pub fn fulfill(&self, correlation_id: &CorrelationId, response: Response) -> bool {
        // ---
        let tx = lock_ignore_poison(&self.state).requests.remove(correlation_id);

        match tx {
            Some(tx) => {
                if tx.send(Ok(response)).is_err() {
                    log_debug!(
                        "late response for abandoned request (correlation_id: {correlation_id})"
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Remove a pending request without resolving it
    pub fn remove(&self, correlation_id: &CorrelationId) -> bool {
        // ---
        lock_ignore_poison(&self.state)
            .requests
            .remove(correlation_id)
            .is_some()
    }

    /// Fail every pending request and close the table
    ///
    /// Idempotent; the first reason given is kept. Returns how many callers
    /// were failed by this call.
    pub fn fail_all(&self, reason: &str) -> usize {
        // ---
        let (drained, reason) = {
            let mut state = lock_ignore_poison(&self.state);
            let reason = state.closed.get_or_insert_with(|| reason.to_string()).clone();
            let drained: Vec<Completion> = state.requests.drain().map(|(_, tx)| tx).collect();
            (drained, reason)
        };

        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(RpcError::ConnectionClosed(reason.clone())));
        }
        count
    }

    /// Why the table was closed, if it has been.
    pub fn close_reason(&self) -> Option<String> {
        // ---
        lock_ignore_poison(&self.state).closed.clone()
    }

    /// Get the number of pending requests
    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.state).requests.len()
    }
}
