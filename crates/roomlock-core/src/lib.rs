//! roomlock core - shared domain types for the booking coordinator
//!
//! This crate provides the types shared between the coordinator daemon
//! (`roomlockd`) and the wire protocol (`roomlock-protocol`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod resource;
pub mod summary;
pub mod user;

// Re-exports for convenience
pub use error::{CredentialError, DomainError, DomainResult};
pub use resource::{Catalog, CatalogError, ResourceKey, RoomId, SlotId};
pub use summary::{SlotStatus, SlotSummary};
pub use user::{ClientId, UserAccount, UserType, UserTypeParseError};
