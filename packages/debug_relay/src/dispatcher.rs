//! One-directional mailbox used by both peers.
//!
//! A `Dispatcher` pairs a FIFO of pending payloads with at most one waiting
//! long poll. The moment both exist, the oldest payload is handed to the
//! waiting poll and both are cleared, so "queued and waiting" is never a
//! resting state.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// An opaque message body. `None` is a request that carried no body; it is
/// relayed as an empty response.
pub type Payload = Option<Value>;

static NEXT_POLL_ID: AtomicU64 = AtomicU64::new(1);

/// How a held long poll was completed.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A queued payload was handed over.
    Message(Payload),
    /// The poll was force-closed (superseded, reset or evicted) with no payload.
    Closed,
}

/// Server-side half of a long poll: the slot a dispatcher completes.
#[derive(Debug)]
pub struct ClientHandle {
    id: u64,
    tx: oneshot::Sender<Delivery>,
}

/// Request-side half of a long poll: resolves once the dispatcher completes
/// the matching [`ClientHandle`].
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    rx: oneshot::Receiver<Delivery>,
}

/// Open a new long poll, returning the handle to park in a dispatcher and
/// the future-like half the HTTP handler waits on.
pub fn long_poll() -> (ClientHandle, PendingResponse) {
    let id = NEXT_POLL_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    (ClientHandle { id, tx }, PendingResponse { id, rx })
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the waiting request has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn complete(self, delivery: Delivery) -> Result<(), Delivery> {
        self.tx.send(delivery)
    }
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the dispatcher to complete this poll. A handle dropped without
    /// being completed counts as closed.
    pub async fn recv(&mut self) -> Delivery {
        (&mut self.rx).await.unwrap_or(Delivery::Closed)
    }

    /// Non-blocking check, used after the poll was withdrawn from its
    /// dispatcher to pick up a delivery that raced the withdrawal.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    queue: VecDeque<Payload>,
    waiting: Option<ClientHandle>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `client` as the only poll waiting for the next message. Any poll
    /// already parked is closed first.
    pub fn set_client(&mut self, client: ClientHandle) {
        self.end();
        self.waiting = Some(client);
        self.process();
    }

    /// Append a payload; hands the oldest queued payload to the waiting poll
    /// if there is one.
    pub fn add_message(&mut self, payload: Payload) {
        self.queue.push_back(payload);
        self.process();
    }

    /// Close the waiting poll with an empty body. No-op if nothing is waiting.
    pub fn end(&mut self) {
        if let Some(client) = self.waiting.take() {
            debug!(poll_id = client.id, "Closing superseded long poll");
            let _ = client.complete(Delivery::Closed);
        }
    }

    /// Drop every queued payload. The waiting poll, if any, is left alone.
    pub fn clear_messages(&mut self) {
        self.queue.clear();
    }

    /// Withdraw the waiting poll without completing it, but only if it is
    /// still the poll identified by `poll_id`.
    pub fn cancel(&mut self, poll_id: u64) -> bool {
        if self.waiting.as_ref().is_some_and(|c| c.id == poll_id) {
            self.waiting = None;
            true
        } else {
            false
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn has_waiting_client(&self) -> bool {
        self.waiting.is_some()
    }

    fn process(&mut self) {
        if self.waiting.as_ref().is_some_and(ClientHandle::is_closed) {
            if let Some(gone) = self.waiting.take() {
                debug!(poll_id = gone.id, "Discarding long poll whose request went away");
            }
        }

        if self.queue.is_empty() {
            return;
        }
        let Some(client) = self.waiting.take() else {
            return;
        };
        let Some(payload) = self.queue.pop_front() else {
            return;
        };

        if let Err(Delivery::Message(payload)) = client.complete(Delivery::Message(payload)) {
            // Receiver dropped between the check above and the send.
            self.queue.push_front(payload);
        }
    }
}
