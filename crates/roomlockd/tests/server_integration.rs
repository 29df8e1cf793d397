//! Integration tests for the TCP lock server.
//!
//! These tests drive the LockServer as a complete system over real loopback
//! sockets: login, request/queue/release, promotion pushes to idle
//! connections, disconnect cleanup, protocol errors and graceful shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use roomlock_core::{Catalog, ClientId, ResourceKey, RoomId, SlotId, UserType};
use roomlock_protocol::{parse_server_line, ServerMessage};
use roomlockd::coordinator::{LockManager, ResourceRegistry};
use roomlockd::credentials::CredentialStore;
use roomlockd::server::{LockServer, ServerContext, DEFAULT_WRITE_TIMEOUT};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for any single reply
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to watch for a message that must not arrive
const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Interval between state checks while waiting for cleanup
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for a stalled connection to be dropped and cleaned up
const STALL_DEADLINE: Duration = Duration::from_secs(15);

// ============================================================================
// Test Helpers
// ============================================================================

fn booking_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

fn key(room: &str, slot: &str) -> ResourceKey {
    ResourceKey::new(booking_date(), room, slot)
}

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    manager: Arc<LockManager>,
    context: ServerContext,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawns a server on an ephemeral port with users u1..u4 (password "pw").
    async fn spawn() -> Self {
        Self::spawn_with_write_timeout(DEFAULT_WRITE_TIMEOUT).await
    }

    async fn spawn_with_write_timeout(write_timeout: Duration) -> Self {
        let registry = Arc::new(ResourceRegistry::new(Catalog::default(), booking_date()));
        let manager = Arc::new(LockManager::new(registry));

        let credentials = CredentialStore::new();
        for user in ["u1", "u2", "u3", "u4"] {
            credentials
                .create_user(user, user, UserType::Student, "pw")
                .unwrap();
        }
        credentials
            .create_user("prof", "Professor", UserType::Lecturer, "pw")
            .unwrap();

        let context = ServerContext::new(Arc::clone(&manager), Arc::new(credentials))
            .with_write_timeout(write_timeout);
        let cancel_token = CancellationToken::new();
        let server = LockServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            context.clone(),
            cancel_token.clone(),
        )
        .await
        .expect("bind test server");
        let addr = server.local_addr();

        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            manager,
            context,
            cancel_token,
            handle,
        }
    }

    /// Creates a client connection to the server.
    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and logs in as `user`.
    async fn login(&self, user: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(&format!("LOGIN|{user}|pw")).await;
        assert!(matches!(client.recv().await, ServerMessage::LoginOk { .. }));
        client
    }

    fn owner(&self, room: &str, slot: &str) -> Option<ClientId> {
        self.manager.registry().owner(&key(room, slot))
    }

    fn queue(&self, room: &str, slot: &str) -> Vec<ClientId> {
        self.manager
            .queue_clients(&RoomId::new(room), &SlotId::new(slot))
    }

    /// Waits until `user` no longer has a live session.
    async fn wait_for_logout(&self, user: &str) {
        let id = ClientId::new(user);
        let start = tokio::time::Instant::now();
        while self.context.sessions.holder(&id).is_some() {
            assert!(start.elapsed() < RECV_TIMEOUT, "{user} was never cleaned up");
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Shuts down the server and waits for it to finish.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(RECV_TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends one protocol line.
    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives one raw line, without the newline.
    async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        assert!(read > 0, "server closed the connection");
        line.trim_end().to_string()
    }

    /// Receives and parses one server message.
    async fn recv(&mut self) -> ServerMessage {
        let line = self.recv_line().await;
        parse_server_line(&line).unwrap()
    }

    /// Sends a line and returns the raw reply.
    async fn call(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv_line().await
    }

    /// Asserts nothing arrives for a short while.
    async fn expect_silence(&mut self) {
        let mut line = String::new();
        let result = timeout(QUIET_PERIOD, self.reader.read_line(&mut line)).await;
        assert!(result.is_err(), "unexpected message: {line:?}");
    }
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_reports_user_type() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("LOGIN|prof|pw").await, "INFO|LOGIN_OK|Lecturer");

    server.shutdown().await;
}

#[tokio::test]
async fn test_login_failures() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("LOGIN|ghost|pw").await, "INFO|LOGIN_FAIL|UNKNOWN_USER");
    assert_eq!(client.call("LOGIN|u1|nope").await, "INFO|LOGIN_FAIL|BAD_PASSWORD");
    assert_eq!(client.call("LOGIN|u1").await, "INFO|LOGIN_FAIL|Invalid format");

    assert_eq!(client.call("LOGIN|u1|pw").await, "INFO|LOGIN_OK|Student");
    assert_eq!(
        client.call("LOGIN|u2|pw").await,
        "INFO|LOGIN_FAIL|ALREADY_AUTHENTICATED"
    );
    assert_eq!(client.call("login|U1|pw").await, "INFO|LOGIN_OK|Student");

    server.shutdown().await;
}

#[tokio::test]
async fn test_second_connection_for_same_user_is_refused() {
    let server = TestServer::spawn().await;
    let first = server.login("u1").await;

    let mut second = server.connect().await;
    assert_eq!(
        second.call("LOGIN|U1|pw").await,
        "INFO|LOGIN_FAIL|ALREADY_CONNECTED"
    );

    drop(first);
    server.wait_for_logout("u1").await;
    assert_eq!(second.call("LOGIN|u1|pw").await, "INFO|LOGIN_OK|Student");

    server.shutdown().await;
}

// ============================================================================
// Lock protocol scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_release_promotes_waiter() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;
    let mut u2 = server.login("u2").await;

    assert_eq!(u1.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(server.owner("R1", "S1"), Some(ClientId::new("u1")));

    assert_eq!(u2.call("REQUEST|u2|R1|S1").await, "INFO|QUEUED|R1|S1|1");

    assert_eq!(u1.call("RELEASE|u1|R1|S1").await, "INFO|RELEASED|R1|S1");
    assert_eq!(u2.recv().await, ServerMessage::granted("R1".into(), SlotId::new("S1")));

    assert_eq!(server.owner("R1", "S1"), Some(ClientId::new("u2")));
    assert!(server.queue("R1", "S1").is_empty());
    u1.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_scenario_owner_disconnect_promotes_head() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;
    let mut u2 = server.login("u2").await;
    let mut u3 = server.login("u3").await;

    assert_eq!(u1.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(u2.call("REQUEST|u2|R1|S1").await, "INFO|QUEUED|R1|S1|1");
    assert_eq!(u3.call("REQUEST|u3|R1|S1").await, "INFO|QUEUED|R1|S1|2");

    drop(u1);

    assert_eq!(u2.recv_line().await, "INFO|GRANTED|R1|S1");
    server.wait_for_logout("u1").await;
    assert_eq!(server.owner("R1", "S1"), Some(ClientId::new("u2")));
    assert_eq!(server.queue("R1", "S1"), vec![ClientId::new("u3")]);
    u3.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_scenario_request_without_login() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(
        client.call("REQUEST|u1|R1|S1").await,
        "INFO|ERROR|NOT_AUTHENTICATED"
    );
    assert_eq!(
        client.call("RELEASE|u1|R1|S1").await,
        "INFO|ERROR|NOT_AUTHENTICATED"
    );
    assert_eq!(server.owner("R1", "S1"), None);

    server.shutdown().await;
}

#[tokio::test]
async fn test_waiter_disconnect_shifts_queue_without_promotion() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;
    let mut u2 = server.login("u2").await;
    let mut u3 = server.login("u3").await;

    u1.call("REQUEST|u1|R2|S3").await;
    u2.call("REQUEST|u2|R2|S3").await;
    u3.call("REQUEST|u3|R2|S3").await;

    drop(u2);
    server.wait_for_logout("u2").await;

    assert_eq!(server.owner("R2", "S3"), Some(ClientId::new("u1")));
    assert_eq!(server.queue("R2", "S3"), vec![ClientId::new("u3")]);
    u3.expect_silence().await;

    assert_eq!(u1.call("RELEASE|u1|R2|S3").await, "INFO|RELEASED|R2|S3");
    assert_eq!(u3.recv_line().await, "INFO|GRANTED|R2|S3");

    server.shutdown().await;
}

#[tokio::test]
async fn test_domain_errors() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;
    let mut u2 = server.login("u2").await;

    u1.call("REQUEST|u1|R3|S4").await;
    assert_eq!(u1.call("REQUEST|u1|R3|S4").await, "INFO|ERROR|ALREADY_OWNED");

    u2.call("REQUEST|u2|R3|S4").await;
    assert_eq!(u2.call("REQUEST|u2|R3|S4").await, "INFO|ERROR|ALREADY_QUEUED");
    assert_eq!(u2.call("RELEASE|u2|R3|S4").await, "INFO|ERROR|NOT_OWNER");
    assert_eq!(u2.call("REQUEST|u2|R7|S4").await, "INFO|ERROR|UNKNOWN_RESOURCE");
    assert_eq!(u2.call("REQUEST|u1|R3|S4").await, "INFO|ERROR|USER_MISMATCH");

    assert_eq!(server.owner("R3", "S4"), Some(ClientId::new("u1")));
    assert_eq!(server.queue("R3", "S4"), vec![ClientId::new("u2")]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_one_client_may_hold_several_cells() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;

    assert_eq!(u1.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(u1.call("REQUEST|u1|R1|S2").await, "INFO|GRANTED|R1|S2");
    assert_eq!(u1.call("REQUEST|u1|R2|S1").await, "INFO|GRANTED|R2|S1");

    drop(u1);
    server.wait_for_logout("u1").await;

    let summaries = server.manager.all_slot_summaries(booking_date());
    assert!(summaries.iter().all(|s| s.is_free()));

    server.shutdown().await;
}

#[tokio::test]
async fn test_commands_follow_current_date() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;

    u1.call("REQUEST|u1|R1|S1").await;

    let next_day = booking_date().succ_opt().unwrap();
    server.manager.set_current_date(next_day);

    assert_eq!(u1.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(server.owner("R1", "S1"), Some(ClientId::new("u1")));
    assert_eq!(
        server
            .manager
            .registry()
            .owner(&ResourceKey::new(next_day, "R1", "S1")),
        Some(ClientId::new("u1"))
    );

    server.shutdown().await;
}

// ============================================================================
// Protocol robustness
// ============================================================================

#[tokio::test]
async fn test_malformed_lines_keep_connection_open() {
    let server = TestServer::spawn().await;
    let mut client = server.login("u1").await;

    assert_eq!(client.call("PING").await, "INFO|ERROR|Unknown command");
    assert_eq!(client.call("REQUEST|u1").await, "INFO|ERROR|Invalid REQUEST format");
    assert_eq!(
        client.call("RELEASE|u1|R1|S1|extra").await,
        "INFO|ERROR|Invalid RELEASE format"
    );
    assert_eq!(client.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_padded_user_id_acts_for_session() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.call("LOGIN| u1 |pw").await, "INFO|LOGIN_OK|Student");
    assert_eq!(client.call("REQUEST| u1 |R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(client.call("RELEASE|U1 |R1|S1").await, "INFO|RELEASED|R1|S1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_is_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.login("u1").await;

    let long = format!("REQUEST|u1|{}|S1", "R".repeat(10_000));
    assert_eq!(client.call(&long).await, "INFO|ERROR|Line too long");
    assert_eq!(client.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");

    server.shutdown().await;
}

// ============================================================================
// Stalled clients
// ============================================================================

#[tokio::test]
async fn test_stalled_reader_is_disconnected_and_cleaned_up() {
    let server = TestServer::spawn_with_write_timeout(Duration::from_secs(1)).await;
    let mut u1 = server.login("u1").await;
    let mut u2 = server.login("u2").await;

    assert_eq!(u1.call("REQUEST|u1|R1|S1").await, "INFO|GRANTED|R1|S1");
    assert_eq!(u2.call("REQUEST|u2|R1|S1").await, "INFO|QUEUED|R1|S1|1");

    // Every line earns an error reply that u1 never reads
    let TestClient { reader, mut writer } = u1;
    let flood = tokio::spawn(async move {
        let chunk = "HELLO|x\n".repeat(20_000);
        for _ in 0..1_000 {
            if writer.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let start = tokio::time::Instant::now();
    while server.owner("R1", "S1") == Some(ClientId::new("u1")) {
        assert!(start.elapsed() < STALL_DEADLINE, "stalled client kept its cell");
        sleep(POLL_INTERVAL).await;
    }

    assert_eq!(u2.recv_line().await, "INFO|GRANTED|R1|S1");
    assert_eq!(server.owner("R1", "S1"), Some(ClientId::new("u2")));
    server.wait_for_logout("u1").await;

    flood.abort();
    drop(reader);
    server.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_connections_and_cleans_up() {
    let server = TestServer::spawn().await;
    let mut u1 = server.login("u1").await;
    u1.call("REQUEST|u1|R1|S1").await;

    let manager = Arc::clone(&server.manager);
    server.shutdown().await;

    assert_eq!(manager.registry().owner(&key("R1", "S1")), None);

    let mut line = String::new();
    let read = timeout(RECV_TIMEOUT, u1.reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(read, 0);
}
