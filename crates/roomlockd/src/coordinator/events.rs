//! Change events published after every cell mutation.
//!
//! Subscribers (dashboards, admin tooling, the daemon's debug log) receive
//! these over a broadcast channel. Publishing never blocks and having no
//! subscriber is not an error.

use chrono::NaiveDate;
use std::fmt;

use roomlock_core::{ClientId, ResourceKey};

/// Events published by the lock manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellEvent {
    /// A free cell was granted to its requester.
    Granted { key: ResourceKey, client_id: ClientId },

    /// A requester joined a cell's wait queue.
    Queued {
        key: ResourceKey,
        client_id: ClientId,
        position: usize,
    },

    /// The owner gave the cell up and nobody was waiting.
    Released { key: ResourceKey, client_id: ClientId },

    /// Ownership passed from `from` to the head of the queue.
    Promoted {
        key: ResourceKey,
        from: ClientId,
        to: ClientId,
    },

    /// A waiter left the queue by disconnecting.
    WaiterRemoved { key: ResourceKey, client_id: ClientId },

    /// The displayed date changed.
    DateSelected { date: NaiveDate },
}

impl CellEvent {
    /// The cell this event concerns, if any.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Self::Granted { key, .. }
            | Self::Queued { key, .. }
            | Self::Released { key, .. }
            | Self::Promoted { key, .. }
            | Self::WaiterRemoved { key, .. } => Some(key),
            Self::DateSelected { .. } => None,
        }
    }
}

impl fmt::Display for CellEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted { key, client_id } => write!(f, "{key} granted to {client_id}"),
            Self::Queued {
                key,
                client_id,
                position,
            } => write!(f, "{client_id} queued for {key} at #{position}"),
            Self::Released { key, client_id } => write!(f, "{key} released by {client_id}"),
            Self::Promoted { key, from, to } => write!(f, "{key} passed from {from} to {to}"),
            Self::WaiterRemoved { key, client_id } => {
                write!(f, "{client_id} left the queue for {key}")
            }
            Self::DateSelected { date } => write!(f, "date {date} selected"),
        }
    }
}
