//! Read-only projections of cell state for display and admin tooling.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClientId, RoomId, SlotId};

/// Derived status of a cell: `Free` iff it has no owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Free,
    Locked,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "Free"),
            Self::Locked => write!(f, "Locked"),
        }
    }
}

/// One row of the slot overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub room: RoomId,
    pub slot: SlotId,
    pub date: NaiveDate,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ClientId>,
    pub queue_length: usize,
}

impl SlotSummary {
    /// Returns true if nobody holds the cell.
    pub fn is_free(&self) -> bool {
        self.status == SlotStatus::Free
    }
}
