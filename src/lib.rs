//! `minitcp`: a TCP-like reliable byte stream implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!   application
//!       │ open / bind / connect / accept / send / recv / shutdown
//!  ┌────▼──────────────────────────────────────────────┐
//!  │                    Connection                     │
//!  │  state, counters, windows, buffer, statistics     │
//!  └──┬───────────┬────────────┬────────────┬──────────┘
//!     │           │            │            │
//!  handshake   sender ───▶ congestion   receiver    teardown
//!     │           │                         │            │
//!  ┌──▼───────────▼─────────────────────────▼────────────▼──┐
//!  │          packet (32-byte header, CRC-32)               │
//!  └──────────────────────────┬─────────────────────────────┘
//!                             │ raw datagrams
//!                     ┌───────▼───────┐
//!                     │ socket (UDP)  │  or simulator (faults)
//!                     └───────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise / verify)
//! - [`checksum`]: CRC-32 integrity code
//! - [`connection`]: per-connection lifecycle and public API
//! - [`state`]: finite-state-machine types
//! - [`handshake`]: three-message establishment
//! - [`teardown`]: four-message graceful close
//! - [`sender`]: round-based, congestion-controlled send engine
//! - [`congestion`]: slow start / congestion avoidance / fast recovery
//! - [`receiver`]: in-order receive engine with flow control
//! - [`buffer`]: owned receive buffer
//! - [`config`]: tunables and defaults
//! - [`isn`]: initial sequence number sources
//! - [`socket`]: blocking datagram transport abstraction
//! - [`simulator`]: lossy/corrupting transport for tests and demos
//!
//! # Example
//!
//! ```no_run
//! use minitcp::{AddressFamily, Connection, SocketKind};
//!
//! # fn main() -> Result<(), minitcp::ConnError> {
//! let mut conn = Connection::open(AddressFamily::Inet, SocketKind::Datagram)?;
//! conn.connect("127.0.0.1:9000".parse().unwrap())?;
//! conn.send(b"hello")?;
//! conn.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod checksum;
pub mod config;
pub mod congestion;
pub mod connection;
mod handshake;
pub mod isn;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
mod teardown;

pub use config::{Config, CongestionMemory};
pub use congestion::{CongestionControl, CongestionState};
pub use connection::{ConnError, Connection, Stats};
pub use isn::{FixedIsn, IsnGenerator, RandomIsn};
pub use packet::{flags, Header, PacketError, Segment, HEADER_LEN};
pub use simulator::{FaultStats, Simulator, SimulatorConfig};
pub use socket::{AddressFamily, Datagram, SocketKind};
pub use state::{ConnectionState, Role};
