//! roomlock daemon - centralized lock/queue coordinator for room slots
//!
//! This binary runs the coordinator, accepting line-protocol clients over
//! TCP and pushing grants to queued clients as cells are released.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! roomlockd start
//!
//! # Start with a config file and a fixed booking date
//! roomlockd start --config roomlock.toml --date 2025-03-14
//!
//! # Start the daemon (background/daemonized)
//! roomlockd start -d
//!
//! # Stop the daemon
//! roomlockd stop
//!
//! # Check daemon status, catalog and booking date
//! roomlockd status --config roomlock.toml
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use roomlockd::config::Config;
use roomlockd::coordinator::{LockManager, ResourceRegistry};
use roomlockd::credentials::CredentialStore;
use roomlockd::server::{LockServer, ServerContext};

/// roomlock daemon - room slot lock coordinator
#[derive(Parser, Debug)]
#[command(name = "roomlockd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file (defaults to $ROOMLOCK_CONFIG, then built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Booking date commands apply to (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status and the catalog it serves
    Status {
        /// Config file the daemon was started with
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("roomlock")
}

fn log_file_path() -> PathBuf {
    state_dir().join("roomlockd.log")
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// PID file marking the single running daemon.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn locate() -> Self {
        Self {
            path: state_dir().join("roomlockd.pid"),
        }
    }

    /// PID of the live daemon. A file left by a dead process is removed.
    fn running(&self) -> Option<u32> {
        let pid: u32 = fs::read_to_string(&self.path).ok()?.trim().parse().ok()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        self.remove();
        None
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        fs::write(&self.path, process::id().to_string()).context("Failed to write PID file")
    }

    fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Sends SIGTERM and waits up to five seconds for the daemon to exit.
fn stop_daemon(pid: u32) -> Result<bool> {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            bail!("Invalid PID {pid}");
        };
        if unsafe { libc::kill(raw, libc::SIGTERM) } != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }

    for _ in 0..50 {
        if !is_process_running(pid) {
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(false)
}

/// Prints what a daemon started with `config` serves.
fn print_status(pid: u32, config: Option<&Path>) {
    println!("Daemon is running (PID {pid})");

    let config = match Config::load(config) {
        Ok(config) => config,
        Err(e) => {
            println!("Config: unreadable ({e})");
            return;
        }
    };
    println!("Listen: {}", config.listen);
    println!("Rooms:  {}", config.rooms.join(", "));
    println!("Slots:  {}", config.slots.join(", "));
    match config.date {
        Some(date) => println!("Date:   {date}"),
        None => println!("Date:   {} (today)", Local::now().date_naive()),
    }
    println!("Users:  {} seeded", config.users.len());
}

fn main() -> Result<()> {
    let args = Args::parse();
    let pid_file = PidFile::locate();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        date: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            date,
        } => {
            if let Some(pid) = pid_file.running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'roomlockd stop' to stop it first.");
                process::exit(1);
            }

            // Fail on a bad config before forking, while stderr is still a terminal
            let config = Config::load(config.as_deref()).context("Failed to load configuration")?;

            if daemon {
                daemonize()?;
            }

            pid_file.write()?;
            let result = run_daemon(config, date);
            pid_file.remove();
            result
        }
        Command::Stop => {
            let Some(pid) = pid_file.running() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            if !stop_daemon(pid)? {
                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            }
            println!("Daemon stopped.");
            Ok(())
        }
        Command::Status { config } => {
            let Some(pid) = pid_file.running() else {
                println!("Daemon is not running.");
                process::exit(1);
            };
            print_status(pid, config.as_deref());
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file")?;
    let stderr = stdout.try_clone().context("Failed to share log file")?;

    daemonize::Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")
}

#[tokio::main]
async fn run_daemon(config: Config, date: Option<NaiveDate>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("roomlockd=info".parse()?)
                .add_directive("roomlock_core=info".parse()?)
                .add_directive("roomlock_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "roomlock daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let catalog = config.catalog()?;
    let start_date = date.unwrap_or_else(|| config.start_date(Local::now().date_naive()));
    info!(
        rooms = catalog.rooms().len(),
        slots = catalog.slots().len(),
        date = %start_date,
        "Resource registry ready"
    );
    let registry = Arc::new(ResourceRegistry::new(catalog, start_date));
    let manager = Arc::new(LockManager::new(registry));

    let credentials = Arc::new(CredentialStore::new());
    let seeded = config.seed_users(&credentials)?;
    info!(users = seeded, "Credential store ready");

    spawn_event_logger(manager.subscribe(), cancel_token.clone());

    let context =
        ServerContext::new(manager, credentials).with_write_timeout(config.write_timeout());
    let server = LockServer::bind(config.listen_addr()?, context, cancel_token).await?;

    info!(addr = %server.local_addr(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("roomlock daemon stopped");
    Ok(())
}

/// Logs every cell event at debug level until shutdown.
fn spawn_event_logger(
    mut events: broadcast::Receiver<roomlockd::coordinator::CellEvent>,
    cancel_token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,

                result = events.recv() => {
                    match result {
                        Ok(event) => debug!(event = %event, "Cell event"),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Event logger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
