//! Per-connection lifecycle manager.
//!
//! A [`Connection`] owns the complete state for one logical peer-to-peer
//! session: the datagram handle, the sequence/acknowledgment counters, the
//! negotiated and current windows, the congestion controller and the receive
//! buffer.  Its public methods are the library's API:
//!
//! | call        | protocol module          |
//! |-------------|--------------------------|
//! | `open`      | here                     |
//! | `bind`      | here                     |
//! | `connect`   | [`crate::handshake`]     |
//! | `accept`    | [`crate::handshake`]     |
//! | `send`      | [`crate::sender`]        |
//! | `recv`      | [`crate::receiver`]      |
//! | `shutdown`  | [`crate::teardown`]      |
//!
//! Every call blocks the calling thread until the datagram exchange it needs
//! completes or times out.  A connection is driven by one thread at a time;
//! it does not send and receive reliably at the same moment.

use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::buffer::ReceiveBuffer;
use crate::config::{Config, CongestionMemory};
use crate::congestion::CongestionControl;
use crate::isn::{IsnGenerator, RandomIsn};
use crate::packet::{flags, Segment};
use crate::socket::{self, AddressFamily, Datagram, SocketKind};
use crate::state::{ConnectionState, Role};
use crate::{handshake, receiver, sender, teardown};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The datagram handle could not be created.
    #[error("failed to create datagram handle: {0}")]
    SocketCreate(#[source] io::Error),
    /// The receive buffer could not be allocated.
    #[error("failed to allocate a {requested}-byte receive buffer")]
    Alloc { requested: usize },
    /// The transport refused the local address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Send or receive failed for a reason other than a timeout.
    #[error("socket I/O error: {0}")]
    Io(#[source] io::Error),
    /// The call is not valid in the connection's current state.
    #[error("{op} is not allowed in state {state}")]
    BadState {
        op: &'static str,
        state: ConnectionState,
    },
    /// A handshake or teardown segment failed its integrity check.
    #[error("control segment failed integrity verification")]
    Corrupt,
    /// A handshake or teardown segment carried the wrong flags.
    #[error("expected a {expected} segment, got {got}")]
    UnexpectedFlags {
        expected: &'static str,
        got: &'static str,
    },
    /// A handshake or teardown segment acknowledged the wrong position.
    #[error("acknowledgment mismatch: expected {expected}, got {got}")]
    AckMismatch { expected: u32, got: u32 },
    /// No handshake or teardown reply within the control timeout.
    #[error("no reply from peer within the control timeout")]
    Timeout,
    /// Shutdown on the passive side before the peer asked to close.
    #[error("peer has not requested shutdown")]
    PeerNotClosing,
    /// Rejected [`Config`] value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A send round came out with no chunks to transmit.
    #[error("send round planned zero chunks")]
    EmptyRound,
    /// [`Config::max_consecutive_timeouts`] was exceeded.
    #[error("gave up after {0} consecutive retransmission timeouts")]
    RetriesExhausted(u32),
    /// [`Config::zero_window_poll_limit`] was exceeded.
    #[error("peer window stayed closed for {0} polls")]
    WindowStalled(u32),
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Transfer counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Every datagram handed to the transport.
    pub segments_sent: u64,
    /// Every datagram received from the peer, valid or not.
    pub segments_received: u64,
    /// Data segments sent, first transmissions only.
    pub data_segments_sent: u64,
    /// Payload bytes sent, first transmissions only.
    pub bytes_sent: u64,
    /// Payload bytes accepted in order.
    pub bytes_received: u64,
    pub retransmitted_segments: u64,
    pub retransmitted_bytes: u64,
    /// Acknowledgment waits that expired.
    pub timeouts: u64,
    /// Triple-duplicate-ACK retransmissions.
    pub fast_retransmits: u64,
    /// Datagrams that failed to decode.
    pub corrupt_segments: u64,
    pub duplicate_acks_sent: u64,
}

// ---------------------------------------------------------------------------
// Inbound datagram, as seen by the protocol engines
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum Incoming {
    /// A segment that passed integrity verification.
    Segment(Segment, SocketAddr),
    /// A datagram that did not decode (truncated or checksum mismatch).
    Corrupt,
    /// The wait expired.
    Timeout,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A reliable connection over a datagram transport.
///
/// Create one with [`Connection::open`] (UDP) or
/// [`Connection::with_transport`] (any [`Datagram`]).
pub struct Connection<D: Datagram = UdpSocket> {
    pub(crate) socket: D,
    pub(crate) state: ConnectionState,
    pub(crate) role: Role,
    pub(crate) peer: Option<SocketAddr>,

    /// Next sequence number to send.
    pub(crate) seq: u32,
    /// Next sequence number expected from the peer.
    pub(crate) ack: u32,
    /// Highest sequence number the peer has acknowledged.
    pub(crate) snd_una: u32,

    /// Window the peer advertised during the handshake.
    pub(crate) init_window: usize,
    /// Window from the peer's latest acknowledgment.
    pub(crate) flow_window: usize,
    /// Window this side last advertised in an ACK.
    pub(crate) advertised: usize,
    /// A window update went out after a zero window and no data has
    /// arrived since to confirm the peer saw it.
    pub(crate) window_update_pending: bool,

    pub(crate) cc: CongestionControl,
    /// Set once the per-connection congestion state has been initialised.
    pub(crate) cc_primed: bool,

    pub(crate) buffer: Option<ReceiveBuffer>,
    /// The latest `recv` stopped at the peer's FIN.
    pub(crate) eof: bool,

    pub(crate) config: Config,
    pub(crate) isn: Box<dyn IsnGenerator>,
    pub(crate) stats: Stats,
}

impl<D: Datagram + fmt::Debug> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("socket", &self.socket)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("seq", &self.seq)
            .field("ack", &self.ack)
            .field("flow_window", &self.flow_window)
            .field("cc", &self.cc)
            .finish_non_exhaustive()
    }
}

impl Connection<UdpSocket> {
    /// Create a UDP-backed connection in the `Closed` state with the default
    /// [`Config`].
    ///
    /// Handle-creation and buffer-allocation failures are reported as
    /// distinct errors ([`ConnError::SocketCreate`], [`ConnError::Alloc`]).
    pub fn open(family: AddressFamily, kind: SocketKind) -> Result<Self, ConnError> {
        Self::open_with(family, kind, Config::default())
    }

    /// [`Connection::open`] with an explicit configuration.
    pub fn open_with(
        family: AddressFamily,
        kind: SocketKind,
        config: Config,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let sock = socket::open(family, kind).map_err(ConnError::SocketCreate)?;
        Self::with_transport(sock, config)
    }
}

impl<D: Datagram> Connection<D> {
    /// Wrap an existing datagram handle.  Counters start at zero and the
    /// state is `Closed`.
    pub fn with_transport(socket: D, config: Config) -> Result<Self, ConnError> {
        config.validate()?;
        let capacity = config.buffer_capacity(config.window);
        let buffer = ReceiveBuffer::new(capacity)
            .map_err(|_| ConnError::Alloc { requested: capacity })?;
        let cc = CongestionControl::new(config.mss, config.window);
        Ok(Self {
            socket,
            state: ConnectionState::Closed,
            role: Role::Active,
            peer: None,
            seq: 0,
            ack: 0,
            snd_una: 0,
            init_window: config.window,
            flow_window: config.window,
            advertised: config.window,
            window_update_pending: false,
            cc,
            cc_primed: false,
            buffer: Some(buffer),
            eof: false,
            config,
            isn: Box::new(RandomIsn),
            stats: Stats::default(),
        })
    }

    /// Replace the initial-sequence-number source.
    pub fn with_isn_generator(mut self, isn: impl IsnGenerator + 'static) -> Self {
        self.isn = Box::new(isn);
        self
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Bind to `local` and wait for a peer (passive side).  Any connection
    /// that is not `Invalid` may be re-bound.
    pub fn bind(&mut self, local: SocketAddr) -> Result<(), ConnError> {
        if self.state == ConnectionState::Invalid {
            return Err(ConnError::BadState {
                op: "bind",
                state: self.state,
            });
        }
        self.socket.rebind(local).map_err(|source| ConnError::Bind {
            addr: local,
            source,
        })?;
        self.state = ConnectionState::Listen;
        self.role = Role::Passive;
        log::debug!("[conn] bound to {local}, listening");
        Ok(())
    }

    /// Active open: three-way handshake with `peer`.
    pub fn connect(&mut self, peer: SocketAddr) -> Result<(), ConnError> {
        handshake::active_open(self, peer)
    }

    /// Passive open: wait for one SYN and complete the handshake.  Returns
    /// the peer's address.
    pub fn accept(&mut self) -> Result<SocketAddr, ConnError> {
        handshake::passive_open(self)
    }

    /// Reliably deliver `data` to the peer, then send FIN.  Returns the
    /// number of bytes sent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, ConnError> {
        sender::send(self, data)
    }

    /// Receive up to `buf.len()` bytes.  Returns early when no data arrives
    /// within the ack timeout or when the peer finishes; check
    /// [`peer_finished`](Self::peer_finished) and [`state`](Self::state).
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ConnError> {
        receiver::recv(self, buf)
    }

    /// Graceful close.  Initiates teardown on the active side, or completes
    /// it after the peer's FIN+ACK was seen by `recv`.
    pub fn shutdown(&mut self) -> Result<(), ConnError> {
        teardown::shutdown(self)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnError> {
        self.socket.local_addr().map_err(ConnError::Io)
    }

    /// Next sequence number this side will send.
    pub fn seq_number(&self) -> u32 {
        self.seq
    }

    /// Next sequence number expected from the peer.
    pub fn ack_number(&self) -> u32 {
        self.ack
    }

    /// Highest position the peer has acknowledged.
    pub fn acknowledged(&self) -> u32 {
        self.snd_una
    }

    /// Window the peer advertised during the handshake.
    pub fn init_window(&self) -> usize {
        self.init_window
    }

    /// Window from the peer's latest acknowledgment.
    pub fn flow_window(&self) -> usize {
        self.flow_window
    }

    pub fn congestion(&self) -> &CongestionControl {
        &self.cc
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// `false` once teardown has released the receive buffer.
    pub fn has_receive_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// The latest `recv` ended at the peer's FIN.
    pub fn peer_finished(&self) -> bool {
        self.eof
    }

    /// Underlying datagram handle.
    pub fn transport(&self) -> &D {
        &self.socket
    }

    // -----------------------------------------------------------------------
    // Engine helpers
    // -----------------------------------------------------------------------

    /// Window this side advertises in handshake segments.
    pub(crate) fn local_window(&self) -> u32 {
        // Config::validate guarantees the window fits in 32 bits.
        self.config.window as u32
    }

    /// Reject data-path calls outside `Established`.
    pub(crate) fn require_established(&self, op: &'static str) -> Result<(), ConnError> {
        if self.state == ConnectionState::Established {
            Ok(())
        } else {
            Err(ConnError::BadState {
                op,
                state: self.state,
            })
        }
    }

    /// Prepare congestion state for a new `send` call.
    pub(crate) fn prime_congestion(&mut self) {
        match self.config.congestion_memory {
            CongestionMemory::PerCall => self.cc.reset(self.config.window),
            CongestionMemory::PerConnection if !self.cc_primed => {
                self.cc.reset(self.config.window)
            }
            CongestionMemory::PerConnection => {}
        }
        self.cc_primed = true;
    }

    /// Encode `seg` and send it to the peer.
    ///
    /// A transport failure leaves the connection `Invalid`.
    pub(crate) fn transmit(&mut self, seg: &Segment) -> Result<(), ConnError> {
        let peer = self.peer.ok_or(ConnError::BadState {
            op: "transmit",
            state: self.state,
        })?;
        let bytes = seg.encode();
        if let Err(e) = self.socket.send_to(&bytes, peer) {
            self.state = ConnectionState::Invalid;
            return Err(ConnError::Io(e));
        }
        self.stats.segments_sent += 1;
        let h = &seg.header;
        log::debug!(
            "→ {} seq={} ack={} win={} len={}",
            flags::name(h.flags),
            h.seq,
            h.ack,
            h.window,
            seg.payload.len()
        );
        Ok(())
    }

    /// Wait up to `timeout` for one datagram from the peer.
    ///
    /// Datagrams from any other address are discarded once the peer is
    /// known.  A transport failure leaves the connection `Invalid`.
    pub(crate) fn poll(&mut self, timeout: Option<Duration>) -> Result<Incoming, ConnError> {
        let Some(buffer) = self.buffer.as_mut() else {
            return Err(ConnError::BadState {
                op: "receive",
                state: self.state,
            });
        };
        loop {
            let (n, from) =
                match socket::recv_timeout(&self.socket, buffer.scratch_mut(), timeout) {
                    Ok(Some(v)) => v,
                    Ok(None) => return Ok(Incoming::Timeout),
                    Err(e) => {
                        self.state = ConnectionState::Invalid;
                        return Err(ConnError::Io(e));
                    }
                };
            if self.peer.is_some_and(|p| p != from) {
                log::debug!("ignoring {n}-byte datagram from stranger {from}");
                continue;
            }
            self.stats.segments_received += 1;
            return match Segment::decode(buffer.received(n)) {
                Ok(seg) => {
                    let h = &seg.header;
                    log::debug!(
                        "← {} seq={} ack={} win={} len={}",
                        flags::name(h.flags),
                        h.seq,
                        h.ack,
                        h.window,
                        seg.payload.len()
                    );
                    Ok(Incoming::Segment(seg, from))
                }
                Err(e) => {
                    self.stats.corrupt_segments += 1;
                    log::debug!("← {n}-byte datagram rejected: {e}");
                    Ok(Incoming::Corrupt)
                }
            };
        }
    }

    /// Wait for one handshake/teardown reply; corruption and silence are
    /// errors here.
    pub(crate) fn await_control(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Segment, SocketAddr), ConnError> {
        match self.poll(timeout)? {
            Incoming::Segment(seg, from) => Ok((seg, from)),
            Incoming::Corrupt => Err(ConnError::Corrupt),
            Incoming::Timeout => Err(ConnError::Timeout),
        }
    }

    /// Free the receive buffer and enter `Closed`.
    pub(crate) fn release(&mut self) {
        if self.buffer.take().is_some() {
            log::debug!("[conn] receive buffer released");
        }
        self.state = ConnectionState::Closed;
        let s = &self.stats;
        log::info!(
            "[conn] closed: sent {} bytes in {} data segments ({} retransmitted, {} timeouts, {} fast retransmits), received {} bytes ({} corrupt segments)",
            s.bytes_sent,
            s.data_segments_sent,
            s.retransmitted_segments,
            s.timeouts,
            s.fast_retransmits,
            s.bytes_received,
            s.corrupt_segments
        );
    }
}
