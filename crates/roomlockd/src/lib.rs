//! roomlock daemon - lock/queue coordinator and TCP line server
//!
//! This crate provides the core infrastructure for the roomlock daemon:
//! - `coordinator` - per-cell ownership, FIFO wait queues and promotion
//! - `credentials` - user accounts consulted at login
//! - `session` - one live connection per client id
//! - `server` - TCP server and per-connection protocol handler
//! - `config` - TOML configuration with environment overrides
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      roomlockd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   LockServer    │────▶│        LockManager          │   │
//! │  │  (TCP socket)   │     │  (only writer of cells)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ events            │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │   broadcast::Sender         │   │
//! │  │  (per client)   │     │   (CellEvent distribution)  │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod server;
pub mod session;
