//! Push delivery to a session's outbound channel.
//!
//! Every session owns an unbounded outbound channel drained by its own
//! writer task. Pushing is a synchronous enqueue: it never waits on the
//! recipient's socket, so a releasing caller is never blocked by the
//! client it promotes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use roomlock_core::ClientId;
use roomlock_protocol::ServerMessage;

/// Sending half of a session's outbound message channel.
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

/// Receiving half, owned by the session's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerMessage>;

/// Creates a session outbound channel.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// Fire-and-forget delivery with failure accounting.
///
/// A failed delivery is logged and counted, never retried, and never
/// reverts the state change that triggered it.
#[derive(Debug, Default)]
pub struct Notifier {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `msg` for `client_id`. Returns false if the session is gone.
    pub fn deliver(&self, client_id: &ClientId, to: &OutboundSender, msg: ServerMessage) -> bool {
        match to.send(msg) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(client_id = %client_id, "Message enqueued");
                true
            }
            Err(mpsc::error::SendError(msg)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    client_id = %client_id,
                    message = %msg,
                    "Delivery failed: session channel closed"
                );
                false
            }
        }
    }

    /// Number of messages successfully enqueued.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of messages dropped because the recipient was gone.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
