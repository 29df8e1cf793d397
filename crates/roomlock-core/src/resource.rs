//! Resource cell identity and the static room/slot catalog.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a bookable room (e.g. "R1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a time slot within a day (e.g. "S1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SlotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a bookable cell: one room, one slot, one date.
///
/// Immutable once constructed; used as the registry's map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub date: NaiveDate,
    pub room: RoomId,
    pub slot: SlotId,
}

impl ResourceKey {
    pub fn new(date: NaiveDate, room: impl Into<RoomId>, slot: impl Into<SlotId>) -> Self {
        Self {
            date,
            room: room.into(),
            slot: slot.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.room, self.slot)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Errors raised when building a catalog from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog has no {0}")]
    Empty(&'static str),

    #[error("blank {0} id in catalog")]
    Blank(&'static str),

    #[error("duplicate {kind} id in catalog: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} id contains the field separator '|': {id}")]
    Separator { kind: &'static str, id: String },
}

/// The fixed set of rooms and slots every date is materialized from.
///
/// Order is significant: summaries are listed room-major in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    rooms: Vec<RoomId>,
    slots: Vec<SlotId>,
}

impl Catalog {
    /// Builds a catalog, rejecting empty, blank, duplicate or unprintable ids.
    pub fn new(rooms: Vec<RoomId>, slots: Vec<SlotId>) -> Result<Self, CatalogError> {
        validate_ids("room", rooms.iter().map(RoomId::as_str))?;
        validate_ids("slot", slots.iter().map(SlotId::as_str))?;
        Ok(Self { rooms, slots })
    }

    pub fn rooms(&self) -> &[RoomId] {
        &self.rooms
    }

    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    /// Number of cells per date.
    pub fn len(&self) -> usize {
        self.rooms.len() * self.slots.len()
    }

    /// A valid catalog is never empty; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if both ids are cataloged.
    pub fn contains(&self, room: &str, slot: &str) -> bool {
        self.rooms.iter().any(|r| r.as_str() == room) && self.slots.iter().any(|s| s.as_str() == slot)
    }

    /// Every key for `date`, room-major in catalog order.
    pub fn keys_for(&self, date: NaiveDate) -> impl Iterator<Item = ResourceKey> + '_ {
        self.rooms.iter().flat_map(move |room| {
            self.slots.iter().map(move |slot| ResourceKey {
                date,
                room: room.clone(),
                slot: slot.clone(),
            })
        })
    }
}

impl Default for Catalog {
    /// Three rooms by four slots.
    fn default() -> Self {
        Self {
            rooms: ["R1", "R2", "R3"].into_iter().map(RoomId::from).collect(),
            slots: ["S1", "S2", "S3", "S4"].into_iter().map(SlotId::from).collect(),
        }
    }
}

fn validate_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(CatalogError::Blank(kind));
        }
        if id.contains('|') {
            return Err(CatalogError::Separator {
                kind,
                id: id.to_string(),
            });
        }
        if !seen.insert(id) {
            return Err(CatalogError::Duplicate {
                kind,
                id: id.to_string(),
            });
        }
    }
    if seen.is_empty() {
        return Err(CatalogError::Empty(kind));
    }
    Ok(())
}
