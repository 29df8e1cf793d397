//! Lock/queue manager - the only writer of cell state.
//!
//! Every operation resolves one cell handle, takes that cell's lock, applies
//! exactly one transition, and performs its side effects (event publish,
//! grant push) before unlocking. Both side effects are non-blocking
//! enqueues, so per-cell message order always matches per-cell state order.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{debug, info};

use roomlock_core::{ClientId, DomainResult, ResourceKey, RoomId, SlotId, SlotSummary};
use roomlock_protocol::ServerMessage;

use super::cell::{Eviction, RequestOutcome, WaitEntry};
use super::events::CellEvent;
use super::notifier::{Notifier, OutboundSender};
use super::registry::ResourceRegistry;

/// Event channel buffer size
const EVENT_BUFFER: usize = 256;

/// What a disconnect cleanup did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectReport {
    /// Cells the client owned and gave up.
    pub released: usize,

    /// Of those, how many passed to a waiter.
    pub promoted: usize,

    /// Wait queues the client was removed from.
    pub dequeued: usize,
}

impl DisconnectReport {
    /// True if the client held no stake anywhere.
    pub fn is_empty(&self) -> bool {
        self.released == 0 && self.dequeued == 0
    }
}

/// Coordinates Request/Release/Disconnect over the shared registry.
///
/// Cheap to share: hold it in an `Arc` and hand clones to every
/// connection worker.
#[derive(Debug)]
pub struct LockManager {
    registry: Arc<ResourceRegistry>,
    notifier: Notifier,
    events: broadcast::Sender<CellEvent>,
}

impl LockManager {
    /// Creates a manager over `registry`.
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            registry,
            notifier: Notifier::new(),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Subscribes to cell change events.
    pub fn subscribe(&self) -> broadcast::Receiver<CellEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: CellEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Lock operations
    // ========================================================================

    /// Requests exclusive access to `key` on behalf of `client_id`.
    ///
    /// On success the outcome (`GRANTED` or `QUEUED`) is also enqueued on
    /// `notify` while the cell is still locked, so a later promotion push
    /// can never overtake it. The same channel receives the grant when the
    /// client is promoted.
    ///
    /// # Errors
    ///
    /// - `DomainError::UnknownResource` if the room/slot is not cataloged
    /// - `DomainError::AlreadyOwned` if the client holds the cell
    /// - `DomainError::AlreadyQueued` if the client is already waiting
    pub fn request(
        &self,
        client_id: &ClientId,
        key: &ResourceKey,
        notify: &OutboundSender,
    ) -> DomainResult<RequestOutcome> {
        let cell = self.registry.cell(key)?;
        let mut cell = cell.lock();

        let outcome = cell.request(client_id, notify)?;

        let (reply, event) = match outcome {
            RequestOutcome::Granted => {
                info!(client_id = %client_id, key = %key, "Cell granted");
                (
                    ServerMessage::granted(key.room.clone(), key.slot.clone()),
                    CellEvent::Granted {
                        key: key.clone(),
                        client_id: client_id.clone(),
                    },
                )
            }
            RequestOutcome::Queued { position } => {
                info!(client_id = %client_id, key = %key, position, "Client queued");
                (
                    ServerMessage::queued(key.room.clone(), key.slot.clone(), position),
                    CellEvent::Queued {
                        key: key.clone(),
                        client_id: client_id.clone(),
                        position,
                    },
                )
            }
        };

        self.notifier.deliver(client_id, notify, reply);
        self.publish(event);
        Ok(outcome)
    }

    /// Releases `key` held by `client_id`, promoting the next waiter.
    ///
    /// Returns the promoted client, if any.
    ///
    /// # Errors
    ///
    /// - `DomainError::UnknownResource` if the room/slot is not cataloged
    /// - `DomainError::NotOwner` if `client_id` does not hold the cell
    pub fn release(&self, client_id: &ClientId, key: &ResourceKey) -> DomainResult<Option<ClientId>> {
        let cell = self.registry.cell(key)?;
        let mut cell = cell.lock();

        let promoted = cell.release(client_id)?;
        Ok(self.after_release(client_id, key, promoted))
    }

    /// Removes every trace of `client_id` from every cell.
    ///
    /// Owned cells are released with promotion; queue entries are dropped
    /// without any ownership change. Idempotent.
    pub fn handle_disconnect(&self, client_id: &ClientId) -> DisconnectReport {
        let mut report = DisconnectReport::default();

        for cell in self.registry.all_cells() {
            let mut cell = cell.lock();
            let key = cell.key().clone();

            match cell.evict(client_id) {
                Eviction::Untouched => {}
                Eviction::Released { promoted } => {
                    report.released += 1;
                    if self.after_release(client_id, &key, promoted).is_some() {
                        report.promoted += 1;
                    }
                }
                Eviction::Dequeued => {
                    report.dequeued += 1;
                    debug!(client_id = %client_id, key = %key, "Removed waiter");
                    self.publish(CellEvent::WaiterRemoved {
                        key,
                        client_id: client_id.clone(),
                    });
                }
            }
        }

        if report.is_empty() {
            debug!(client_id = %client_id, "Disconnect cleanup: nothing held");
        } else {
            info!(
                client_id = %client_id,
                released = report.released,
                promoted = report.promoted,
                dequeued = report.dequeued,
                "Disconnect cleanup complete"
            );
        }

        report
    }

    /// Logs, publishes and pushes the grant for a release that already
    /// happened. Must be called with the cell still locked.
    fn after_release(
        &self,
        from: &ClientId,
        key: &ResourceKey,
        promoted: Option<WaitEntry>,
    ) -> Option<ClientId> {
        match promoted {
            Some(entry) => {
                info!(from = %from, to = %entry.client_id, key = %key, "Cell promoted");
                self.notifier.deliver(
                    &entry.client_id,
                    &entry.notify,
                    ServerMessage::granted(key.room.clone(), key.slot.clone()),
                );
                self.publish(CellEvent::Promoted {
                    key: key.clone(),
                    from: from.clone(),
                    to: entry.client_id.clone(),
                });
                Some(entry.client_id)
            }
            None => {
                info!(client_id = %from, key = %key, "Cell released");
                self.publish(CellEvent::Released {
                    key: key.clone(),
                    client_id: from.clone(),
                });
                None
            }
        }
    }

    // ========================================================================
    // Date handling and query view
    // ========================================================================

    /// Current date of the registry.
    pub fn current_date(&self) -> NaiveDate {
        self.registry.current_date()
    }

    /// Selects the displayed date. Never touches cell state.
    pub fn set_current_date(&self, date: NaiveDate) {
        self.registry.set_current_date(date);
        self.publish(CellEvent::DateSelected { date });
    }

    /// See [`ResourceRegistry::summaries`].
    pub fn all_slot_summaries(&self, date: NaiveDate) -> Vec<SlotSummary> {
        self.registry.summaries(date)
    }

    /// Waiting clients of a cell on the current date, head first.
    pub fn queue_clients(&self, room: &RoomId, slot: &SlotId) -> Vec<ClientId> {
        self.registry.current_queue_clients(room, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::notifier::{outbound_channel, OutboundReceiver};
    use roomlock_core::{Catalog, DomainError};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn manager() -> LockManager {
        LockManager::new(Arc::new(ResourceRegistry::new(Catalog::default(), day())))
    }

    fn key(room: &str, slot: &str) -> ResourceKey {
        ResourceKey::new(day(), room, slot)
    }

    fn id(s: &str) -> ClientId {
        ClientId::new(s)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            lines.push(msg.to_string());
        }
        lines
    }

    #[test]
    fn test_request_replies_on_notify_channel() {
        let manager = manager();
        let (tx1, mut rx1) = outbound_channel();
        let (tx2, mut rx2) = outbound_channel();

        manager.request(&id("u1"), &key("R1", "S1"), &tx1).unwrap();
        manager.request(&id("u2"), &key("R1", "S1"), &tx2).unwrap();

        assert_eq!(drain(&mut rx1), vec!["INFO|GRANTED|R1|S1"]);
        assert_eq!(drain(&mut rx2), vec!["INFO|QUEUED|R1|S1|1"]);
    }

    #[test]
    fn test_rejected_request_sends_nothing() {
        let manager = manager();
        let (tx, mut rx) = outbound_channel();
        manager.request(&id("u1"), &key("R1", "S1"), &tx).unwrap();
        drain(&mut rx);

        let err = manager.request(&id("u1"), &key("R1", "S1"), &tx).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyOwned { .. }));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_release_pushes_grant_to_promoted_waiter() {
        let manager = manager();
        let (tx1, _rx1) = outbound_channel();
        let (tx2, mut rx2) = outbound_channel();
        manager.request(&id("u1"), &key("R1", "S1"), &tx1).unwrap();
        manager.request(&id("u2"), &key("R1", "S1"), &tx2).unwrap();
        drain(&mut rx2);

        let promoted = manager.release(&id("u1"), &key("R1", "S1")).unwrap();

        assert_eq!(promoted, Some(id("u2")));
        assert_eq!(drain(&mut rx2), vec!["INFO|GRANTED|R1|S1"]);
        assert_eq!(manager.registry().owner(&key("R1", "S1")), Some(id("u2")));
    }

    #[test]
    fn test_release_to_departed_waiter_keeps_ownership() {
        let manager = manager();
        let (tx1, _rx1) = outbound_channel();
        let (tx2, rx2) = outbound_channel();
        manager.request(&id("u1"), &key("R1", "S1"), &tx1).unwrap();
        manager.request(&id("u2"), &key("R1", "S1"), &tx2).unwrap();
        drop(rx2);

        manager.release(&id("u1"), &key("R1", "S1")).unwrap();

        assert_eq!(manager.registry().owner(&key("R1", "S1")), Some(id("u2")));
        assert_eq!(manager.notifier().failed(), 1);
    }

    #[test]
    fn test_release_unknown_resource() {
        let manager = manager();
        let err = manager.release(&id("u1"), &key("R1", "S9")).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_RESOURCE");
    }

    #[test]
    fn test_handle_disconnect_report_and_idempotence() {
        let manager = manager();
        let (tx, _rx) = outbound_channel();
        manager.request(&id("u1"), &key("R1", "S1"), &tx).unwrap();
        manager.request(&id("u1"), &key("R1", "S2"), &tx).unwrap();
        manager.request(&id("u2"), &key("R1", "S1"), &tx).unwrap();
        manager.request(&id("u2"), &key("R2", "S1"), &tx).unwrap();
        manager.request(&id("u1"), &key("R2", "S1"), &tx).unwrap();

        let report = manager.handle_disconnect(&id("u1"));
        assert_eq!(
            report,
            DisconnectReport {
                released: 2,
                promoted: 1,
                dequeued: 1
            }
        );

        let again = manager.handle_disconnect(&id("u1"));
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_published_in_order() {
        let manager = manager();
        let mut events = manager.subscribe();
        let (tx, _rx) = outbound_channel();

        manager.request(&id("u1"), &key("R3", "S4"), &tx).unwrap();
        manager.request(&id("u2"), &key("R3", "S4"), &tx).unwrap();
        manager.release(&id("u1"), &key("R3", "S4")).unwrap();
        manager.release(&id("u2"), &key("R3", "S4")).unwrap();

        assert!(matches!(events.recv().await.unwrap(), CellEvent::Granted { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            CellEvent::Queued { position: 1, .. }
        ));
        assert!(matches!(events.recv().await.unwrap(), CellEvent::Promoted { .. }));
        assert!(matches!(events.recv().await.unwrap(), CellEvent::Released { .. }));
    }

    #[test]
    fn test_set_current_date_redirects_queue_view() {
        let manager = manager();
        let (tx, _rx) = outbound_channel();
        manager.request(&id("u1"), &key("R1", "S1"), &tx).unwrap();
        manager.request(&id("u2"), &key("R1", "S1"), &tx).unwrap();

        let (room, slot) = (RoomId::new("R1"), SlotId::new("S1"));
        assert_eq!(manager.queue_clients(&room, &slot), vec![id("u2")]);

        let tomorrow = day().succ_opt().unwrap();
        manager.set_current_date(tomorrow);
        assert!(manager.queue_clients(&room, &slot).is_empty());
        assert_eq!(manager.all_slot_summaries(tomorrow).len(), 12);

        manager.set_current_date(day());
        assert_eq!(manager.queue_clients(&room, &slot), vec![id("u2")]);
    }
}
