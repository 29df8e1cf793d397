//! Lock/queue coordinator for room × slot × date cells.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ConnectionHandler │────▶│   LockManager    │────▶│ Broadcast Channel│
//! └──────────────────┘     └────────┬─────────┘     └──────────────────┘
//!         ▲                         │                        │
//!         │  ServerMessage          │ one cell lock          │ CellEvent
//!         │  (outbound mpsc)        ▼ per operation          ▼
//!    ┌────┴─────┐         ┌──────────────────┐       Dashboards, debug log
//!    │ Notifier │◀────────│ ResourceRegistry │
//!    └──────────┘ promote │ DashMap<Key,Cell>│
//!                         └──────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Closed session channels are counted and logged, never propagated

mod cell;
mod events;
mod manager;
mod notifier;
mod registry;

pub use cell::{RequestOutcome, ResourceCell, WaitEntry};
pub use events::CellEvent;
pub use manager::{DisconnectReport, LockManager};
pub use notifier::{outbound_channel, Notifier, OutboundReceiver, OutboundSender};
pub use registry::{CellHandle, ResourceRegistry};
