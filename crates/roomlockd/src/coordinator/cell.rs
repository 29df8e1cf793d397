//! Per-cell ownership and wait-queue state.
//!
//! A `ResourceCell` is plain data with synchronous transitions. It knows
//! nothing about locking or notification: the manager wraps every cell in
//! its own mutex and performs exactly one transition per critical section.
//!
//! Invariants kept by every transition:
//! - at most one owner
//! - the owner is never in the wait queue
//! - no client id appears twice in the wait queue

use std::collections::VecDeque;

use roomlock_core::{
    ClientId, DomainError, DomainResult, ResourceKey, SlotStatus, SlotSummary,
};

use super::notifier::OutboundSender;

/// A client waiting for a cell, with the channel its grant is pushed to.
#[derive(Debug, Clone)]
pub struct WaitEntry {
    pub client_id: ClientId,
    pub notify: OutboundSender,
}

/// Result of a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The cell was free and now belongs to the requester.
    Granted,

    /// The cell is held; 1-based position in the wait queue.
    Queued { position: usize },
}

/// What a disconnecting client's eviction did to one cell.
#[derive(Debug)]
pub enum Eviction {
    /// The client had no stake in this cell.
    Untouched,

    /// The client owned the cell; ownership passed to `promoted` if any.
    Released { promoted: Option<WaitEntry> },

    /// The client was removed from the wait queue.
    Dequeued,
}

/// Ownership and FIFO wait queue of a single (date, room, slot) cell.
#[derive(Debug)]
pub struct ResourceCell {
    key: ResourceKey,
    owner: Option<ClientId>,
    queue: VecDeque<WaitEntry>,
}

impl ResourceCell {
    /// Creates a free cell with an empty queue.
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            owner: None,
            queue: VecDeque::new(),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn owner(&self) -> Option<&ClientId> {
        self.owner.as_ref()
    }

    pub fn status(&self) -> SlotStatus {
        if self.owner.is_some() {
            SlotStatus::Locked
        } else {
            SlotStatus::Free
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Waiting client ids, head first.
    pub fn queue_clients(&self) -> Vec<ClientId> {
        self.queue.iter().map(|e| e.client_id.clone()).collect()
    }

    fn is_queued(&self, client_id: &ClientId) -> bool {
        self.queue.iter().any(|e| &e.client_id == client_id)
    }

    /// Grants the cell if free, otherwise appends the client to the queue.
    ///
    /// # Errors
    ///
    /// - `DomainError::AlreadyOwned` if the client holds this cell
    /// - `DomainError::AlreadyQueued` if the client is waiting for it
    pub fn request(
        &mut self,
        client_id: &ClientId,
        notify: &OutboundSender,
    ) -> DomainResult<RequestOutcome> {
        match &self.owner {
            None => {
                self.owner = Some(client_id.clone());
                Ok(RequestOutcome::Granted)
            }
            Some(owner) if owner == client_id => Err(DomainError::AlreadyOwned {
                client_id: client_id.clone(),
                key: self.key.clone(),
            }),
            Some(_) if self.is_queued(client_id) => Err(DomainError::AlreadyQueued {
                client_id: client_id.clone(),
                key: self.key.clone(),
            }),
            Some(_) => {
                self.queue.push_back(WaitEntry {
                    client_id: client_id.clone(),
                    notify: notify.clone(),
                });
                Ok(RequestOutcome::Queued {
                    position: self.queue.len(),
                })
            }
        }
    }

    /// Clears the owner and promotes the queue head, if any.
    ///
    /// Returns the promoted entry so the caller can push its grant.
    ///
    /// # Errors
    ///
    /// - `DomainError::NotOwner` if `client_id` does not hold the cell
    pub fn release(&mut self, client_id: &ClientId) -> DomainResult<Option<WaitEntry>> {
        if self.owner.as_ref() != Some(client_id) {
            return Err(DomainError::NotOwner {
                client_id: client_id.clone(),
                key: self.key.clone(),
            });
        }
        Ok(self.promote())
    }

    /// Removes every trace of `client_id` from this cell.
    ///
    /// Owners are released with promotion; waiters are dropped from the
    /// queue without any ownership change.
    pub fn evict(&mut self, client_id: &ClientId) -> Eviction {
        if self.owner.as_ref() == Some(client_id) {
            return Eviction::Released {
                promoted: self.promote(),
            };
        }

        match self.queue.iter().position(|e| &e.client_id == client_id) {
            Some(index) => {
                self.queue.remove(index);
                Eviction::Dequeued
            }
            None => Eviction::Untouched,
        }
    }

    fn promote(&mut self) -> Option<WaitEntry> {
        let next = self.queue.pop_front();
        self.owner = next.as_ref().map(|e| e.client_id.clone());
        next
    }

    /// Point-in-time projection for the query view.
    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            room: self.key.room.clone(),
            slot: self.key.slot.clone(),
            date: self.key.date,
            status: self.status(),
            owner: self.owner.clone(),
            queue_length: self.queue.len(),
        }
    }
}
