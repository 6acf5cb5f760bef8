//! Entry point for `minitcp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, file I/O).

use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use minitcp::{
    socket, AddressFamily, Config, CongestionMemory, Connection, ConnectionState, Simulator,
    SimulatorConfig, SocketKind,
};

/// TCP-like reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and receive until the peer closes.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Write received bytes here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Connect, send one message or file, then close.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: SocketAddr,
        /// File to send.
        #[arg(short, long, conflicts_with = "message")]
        input: Option<PathBuf>,
        /// Text to send.
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[derive(Args)]
struct Tuning {
    /// Maximum segment payload in bytes.
    #[arg(long, global = true, default_value_t = minitcp::config::DEFAULT_MSS)]
    mss: usize,
    /// Advertised receive window in bytes.
    #[arg(long, global = true, default_value_t = minitcp::config::DEFAULT_WINDOW)]
    window: usize,
    /// Acknowledgment timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 200)]
    ack_timeout_ms: u64,
    /// Keep congestion state across send calls.
    #[arg(long, global = true)]
    persistent_congestion: bool,
    /// Drop this fraction of outgoing datagrams.
    #[arg(long, global = true, default_value_t = 0.0)]
    loss_rate: f64,
    /// Corrupt this fraction of outgoing datagrams.
    #[arg(long, global = true, default_value_t = 0.0)]
    corrupt_rate: f64,
    /// Seed for the fault generator.
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,
}

impl Tuning {
    fn config(&self) -> Config {
        Config {
            mss: self.mss,
            window: self.window,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            congestion_memory: if self.persistent_congestion {
                CongestionMemory::PerConnection
            } else {
                CongestionMemory::PerCall
            },
            ..Config::default()
        }
    }

    fn faults(&self) -> SimulatorConfig {
        SimulatorConfig {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            seed: self.seed,
            ..SimulatorConfig::default()
        }
    }

    fn open(&self, family: AddressFamily) -> Result<Connection<Simulator<std::net::UdpSocket>>> {
        let sock = socket::open(family, SocketKind::Datagram).context("creating UDP socket")?;
        let transport = Simulator::new(sock, self.faults());
        Ok(Connection::with_transport(transport, self.config())?)
    }
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, output } => {
            log::info!("Starting server on {bind}");
            run_server(&cli.tuning, bind, output)
        }
        Mode::Client {
            server,
            input,
            message,
        } => {
            log::info!("Starting client, connecting to {server}");
            let data = match (input, message) {
                (Some(path), _) => {
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?
                }
                (None, Some(text)) => text.into_bytes(),
                (None, None) => bail!("one of --input or --message is required"),
            };
            run_client(&cli.tuning, server, &data)
        }
    }
}

fn run_server(tuning: &Tuning, bind: SocketAddr, output: Option<PathBuf>) -> Result<()> {
    let mut conn = tuning.open(AddressFamily::of(&bind))?;
    conn.bind(bind)?;
    let peer = conn.accept().context("accepting connection")?;
    log::info!("Connection from {peer}");

    let mut received = Vec::new();
    let mut chunk = vec![0u8; tuning.window];
    loop {
        let n = conn.recv(&mut chunk)?;
        received.extend_from_slice(&chunk[..n]);
        if conn.state() == ConnectionState::ClosingByPeer && n == 0 {
            break;
        }
    }
    conn.shutdown().context("closing connection")?;

    match output {
        Some(path) => fs::write(&path, &received)
            .with_context(|| format!("writing {}", path.display()))?,
        None => io::stdout().write_all(&received)?,
    }
    let stats = conn.stats();
    log::info!(
        "Received {} bytes ({} duplicate ACKs sent, {} corrupt segments)",
        received.len(),
        stats.duplicate_acks_sent,
        stats.corrupt_segments
    );
    Ok(())
}

fn run_client(tuning: &Tuning, server: SocketAddr, data: &[u8]) -> Result<()> {
    let mut conn = tuning.open(AddressFamily::of(&server))?;
    conn.connect(server).context("connecting")?;
    let sent = conn.send(data)?;
    conn.shutdown().context("closing connection")?;

    let stats = conn.stats();
    let faults = conn.transport().stats();
    log::info!(
        "Sent {sent} bytes: {} segments, {} retransmitted, {} timeouts, {} fast retransmits ({} datagrams dropped by simulator)",
        stats.data_segments_sent,
        stats.retransmitted_segments,
        stats.timeouts,
        stats.fast_retransmits,
        faults.dropped
    );
    Ok(())
}
