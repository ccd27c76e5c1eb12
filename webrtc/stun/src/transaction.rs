//! Pending STUN transactions.
//!
//! A socket reader owns the receive side and hands every STUN response to
//! [`TransactionMap::complete`]; requesters wait on the oneshot returned by
//! [`TransactionMap::register`]. Requests over UDP are retransmitted with a
//! doubling interval until the overall timeout elapses (RFC 5389 Section 7.2.1).

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};

use crate::errors::StunError;
use crate::message::Message;
use crate::message_header::TransactionId;

/// Initial retransmission timeout.
pub const INITIAL_RTO: Duration = Duration::from_millis(250);

/// A response matched to its transaction.
#[derive(Debug, Clone)]
pub struct Response {
    pub message: Message,
    pub from: SocketAddr,
}

#[derive(Clone, Default)]
pub struct TransactionMap {
    pending: Arc<Mutex<HashMap<TransactionId, oneshot::Sender<Response>>>>,
}

impl TransactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TransactionId, oneshot::Sender<Response>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(&self, id: TransactionId) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Delivers a response to its waiting requester.
    ///
    /// # Returns
    /// `true` if a pending transaction matched, `false` for strays and
    /// retransmitted duplicates.
    pub fn complete(&self, message: Message, from: SocketAddr) -> bool {
        let Some(tx) = self.lock().remove(&message.transaction_id()) else {
            return false;
        };
        tx.send(Response { message, from }).is_ok()
    }

    pub fn cancel(&self, id: &TransactionId) {
        self.lock().remove(id);
    }

    /// Drops every pending transaction; waiters observe `StunError::Cancelled`.
    pub fn cancel_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sends `request` through `send` and waits for the matching response.
    ///
    /// The request is retransmitted starting at [`INITIAL_RTO`], doubling
    /// each time, until `total` has elapsed.
    ///
    /// # Returns
    /// * `Ok(Response)` - Any response (success or error class) to the request
    /// * `Err(StunError::Timeout)` - No response within `total`
    /// * `Err(StunError::Cancelled)` - The transaction was cancelled
    pub async fn transact<F, Fut>(
        &self,
        request: &Message,
        total: Duration,
        mut send: F,
    ) -> Result<Response, StunError>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<(), StunError>>,
    {
        let id = request.transaction_id();
        let mut rx = self.register(id);
        let bytes = request.encode();
        let deadline = Instant::now() + total;
        let mut rto = INITIAL_RTO;

        let outcome = loop {
            if let Err(e) = send(bytes.clone()).await {
                break Err(e);
            }

            let now = Instant::now();
            if now >= deadline {
                break Err(StunError::Timeout);
            }
            let wait = rto.min(deadline - now);

            match timeout(wait, &mut rx).await {
                Ok(Ok(response)) => break Ok(response),
                Ok(Err(_)) => break Err(StunError::Cancelled),
                Err(_) if Instant::now() >= deadline => break Err(StunError::Timeout),
                Err(_) => rto *= 2,
            }
        };

        if outcome.is_err() {
            self.cancel(&id);
        }
        outcome
    }
}
