//! TCP line server for the coordinator.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler and a writer task for each client
//! - Supports graceful shutdown via CancellationToken, waiting for every
//!   open connection to finish its disconnect cleanup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   LockServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│   LockManager   │
//! │   (per client)  │     │ CredentialStore │
//! └───────┬─────────┘     │  SessionTable   │
//!         │ mpsc          └────────┬────────┘
//!         ▼                        │ promotion push
//! ┌─────────────────┐              │
//! │   writer task   │◀─────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{spawn_writer, ConnectionError, ConnectionHandler, DEFAULT_WRITE_TIMEOUT};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::{outbound_channel, LockManager};
use crate::credentials::CredentialStore;
use crate::session::SessionTable;

/// State shared by every connection.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub manager: Arc<LockManager>,
    pub credentials: Arc<CredentialStore>,
    pub sessions: Arc<SessionTable>,
    pub write_timeout: Duration,
}

impl ServerContext {
    /// Creates a context with an empty session table.
    pub fn new(manager: Arc<LockManager>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            manager,
            credentials,
            sessions: Arc::new(SessionTable::new()),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(self, write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            ..self
        }
    }
}

/// TCP server for the lock coordinator.
pub struct LockServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Shared coordinator state
    context: ServerContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for numbering connections
    connection_counter: AtomicU64,
}

impl LockServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address cannot be bound
    pub async fn bind(
        addr: SocketAddr,
        context: ServerContext,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            context,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every connection to finish its cleanup.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Lock server listening");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            debug!(connection = conn_num, peer = %peer, "Accepted connection");
                            self.handle_connection(&mut connections, stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        let open = connections.len();
        if open > 0 {
            info!(open, "Waiting for connections to close");
        }
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Connection task failed");
            }
        }

        info!("Server cleanup complete");
        Ok(())
    }

    /// Handles a new client connection by spawning its reader and writer.
    fn handle_connection(
        &self,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        connection_number: u64,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = connection_number, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = outbound_channel();
        let token = self.cancel_token.child_token();

        let writer_task = spawn_writer(
            writer,
            outbound_rx,
            self.context.write_timeout,
            connection_number,
            token.clone(),
        );
        let handler = ConnectionHandler::new(
            reader,
            outbound_tx,
            self.context.clone(),
            connection_number,
            token,
        );

        connections.spawn(async move {
            let client_id = handler.run().await;

            // Let the writer flush whatever is still queued
            if let Err(e) = writer_task.await {
                warn!(connection = connection_number, error = %e, "Writer task failed");
            }

            debug!(
                connection = connection_number,
                client_id = ?client_id,
                "Connection finished"
            );
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}
