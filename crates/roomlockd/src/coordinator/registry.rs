//! Resource registry: lazily materialized cells, partitioned by date.
//!
//! # Concurrency Model
//!
//! - `DashMap` from key to cell handle; the shard lock is held only long
//!   enough to clone the handle out
//! - one `parking_lot::Mutex` per cell, so operations on different cells
//!   never wait on each other
//! - no code path holds two cell locks at once
//!
//! The registry hands out cell handles; only the lock manager mutates them.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use roomlock_core::{
    Catalog, ClientId, DomainError, DomainResult, ResourceKey, RoomId, SlotId, SlotStatus,
    SlotSummary,
};

use super::cell::ResourceCell;

/// Shared handle to one cell and its exclusion.
pub type CellHandle = Arc<Mutex<ResourceCell>>;

/// Catalog of cells for every date touched so far.
#[derive(Debug)]
pub struct ResourceRegistry {
    catalog: Catalog,
    cells: DashMap<ResourceKey, CellHandle>,
    current_date: RwLock<NaiveDate>,
}

impl ResourceRegistry {
    /// Creates a registry and materializes `initial_date`.
    pub fn new(catalog: Catalog, initial_date: NaiveDate) -> Self {
        let registry = Self {
            catalog,
            cells: DashMap::new(),
            current_date: RwLock::new(initial_date),
        };
        registry.materialize(initial_date);
        registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The date protocol commands and the default views resolve against.
    pub fn current_date(&self) -> NaiveDate {
        *self.current_date.read()
    }

    /// Selects the displayed date.
    ///
    /// Never resets any cell, including the selected date's own: a date
    /// seen before keeps its owners and queues.
    pub fn set_current_date(&self, date: NaiveDate) {
        *self.current_date.write() = date;
        let created = self.materialize(date);
        info!(date = %date, created, "Current date selected");
    }

    /// Creates any missing cells of `date`. Returns how many were created.
    fn materialize(&self, date: NaiveDate) -> usize {
        let mut created = 0;
        for key in self.catalog.keys_for(date) {
            self.cells.entry(key.clone()).or_insert_with(|| {
                created += 1;
                Arc::new(Mutex::new(ResourceCell::new(key)))
            });
        }
        if created > 0 {
            debug!(date = %date, created, "Materialized cells");
        }
        created
    }

    /// Returns the cell for `key`, creating it on first reference.
    ///
    /// # Errors
    ///
    /// - `DomainError::UnknownResource` if room or slot is not cataloged
    pub fn cell(&self, key: &ResourceKey) -> DomainResult<CellHandle> {
        if !self.catalog.contains(key.room.as_str(), key.slot.as_str()) {
            return Err(DomainError::UnknownResource {
                room: key.room.to_string(),
                slot: key.slot.to_string(),
            });
        }

        if let Some(cell) = self.cells.get(key) {
            return Ok(Arc::clone(cell.value()));
        }

        let cell = self
            .cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ResourceCell::new(key.clone()))));
        Ok(Arc::clone(cell.value()))
    }

    /// Handles to every materialized cell, in no particular order.
    ///
    /// The map is not locked while the caller works through the handles.
    pub fn all_cells(&self) -> Vec<CellHandle> {
        self.cells.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Number of materialized cells across all dates.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    // ========================================================================
    // Query view
    // ========================================================================

    /// One summary per cataloged cell of `date`, in catalog order.
    ///
    /// Each row is read under its own cell lock; the sequence as a whole is
    /// not one atomic snapshot. Reading never materializes cells: an
    /// untouched cell reports as free.
    pub fn summaries(&self, date: NaiveDate) -> Vec<SlotSummary> {
        self.catalog
            .keys_for(date)
            .map(|key| match self.existing(&key) {
                Some(cell) => {
                    let summary = cell.lock().summary();
                    summary
                }
                None => SlotSummary {
                    room: key.room,
                    slot: key.slot,
                    date,
                    status: SlotStatus::Free,
                    owner: None,
                    queue_length: 0,
                },
            })
            .collect()
    }

    /// Waiting clients of one cell, head first. Empty if unknown.
    pub fn queue_clients(&self, date: NaiveDate, room: &RoomId, slot: &SlotId) -> Vec<ClientId> {
        let key = ResourceKey::new(date, room.clone(), slot.clone());
        match self.existing(&key) {
            Some(cell) => {
                let clients = cell.lock().queue_clients();
                clients
            }
            None => Vec::new(),
        }
    }

    /// Waiting clients of one cell on the current date.
    pub fn current_queue_clients(&self, room: &RoomId, slot: &SlotId) -> Vec<ClientId> {
        self.queue_clients(self.current_date(), room, slot)
    }

    /// Current owner of one cell, if materialized and held.
    pub fn owner(&self, key: &ResourceKey) -> Option<ClientId> {
        let cell = self.existing(key)?;
        let owner = cell.lock().owner().cloned();
        owner
    }

    fn existing(&self, key: &ResourceKey) -> Option<CellHandle> {
        self.cells.get(key).map(|cell| Arc::clone(cell.value()))
    }
}
