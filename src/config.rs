//! Per-connection tunables.
//!
//! [`Config`] collects the sizes and timeouts that the handshake, send and
//! receive engines consult.  The defaults reproduce the reference protocol
//! parameters; the demo binary maps its command-line flags onto this struct.

use std::time::Duration;

use crate::connection::ConnError;
use crate::packet::HEADER_LEN;

/// Default maximum payload bytes per segment.
pub const DEFAULT_MSS: usize = 1400;

/// Default receive window and receive-buffer size in bytes.
pub const DEFAULT_WINDOW: usize = 8192;

/// Default bounded wait for one acknowledgment (also the receive poll).
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// Default bounded wait for one handshake or teardown reply.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long congestion-control state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CongestionMemory {
    /// Reset to slow start with cwnd = 1 MSS at the start of every `send`.
    #[default]
    PerCall,
    /// Initialise once and carry cwnd / ssthresh across `send` calls.
    PerConnection,
}

/// Adjustable protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum segment payload (MSS) in bytes.
    pub mss: usize,
    /// Locally advertised receive window in bytes.  Also the initial
    /// slow-start threshold.
    pub window: usize,
    /// Wait for one acknowledgment before declaring a loss.  The receive
    /// engine uses the same value as its "no more data right now" poll.
    pub ack_timeout: Duration,
    /// Wait for one handshake/teardown reply; `None` blocks indefinitely.
    pub control_timeout: Option<Duration>,
    /// Wait for the opening SYN in `accept`; `None` blocks indefinitely.
    pub accept_timeout: Option<Duration>,
    /// Congestion state lifetime.
    pub congestion_memory: CongestionMemory,
    /// Give up a `send` after this many back-to-back timeouts without
    /// progress; `None` keeps retransmitting.
    pub max_consecutive_timeouts: Option<u32>,
    /// Give up waiting for a nonzero window after this many empty polls;
    /// `None` keeps polling.
    pub zero_window_poll_limit: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            window: DEFAULT_WINDOW,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            control_timeout: Some(DEFAULT_CONTROL_TIMEOUT),
            accept_timeout: None,
            congestion_memory: CongestionMemory::PerCall,
            max_consecutive_timeouts: None,
            zero_window_poll_limit: None,
        }
    }
}

impl Config {
    /// Receive-buffer capacity needed to hold one full datagram for a window
    /// of `window` bytes.
    ///
    /// A peer never sends more payload than the window it was given, whatever
    /// its own MSS, so the window bounds the datagram as well as our MSS does.
    pub fn buffer_capacity(&self, window: usize) -> usize {
        HEADER_LEN + window.max(self.mss)
    }

    /// Reject parameters the engines cannot work with.
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.mss == 0 {
            return Err(ConnError::InvalidConfig("mss must be nonzero"));
        }
        if self.window == 0 {
            return Err(ConnError::InvalidConfig("window must be nonzero"));
        }
        if u32::try_from(self.window).is_err() || u32::try_from(self.mss).is_err() {
            return Err(ConnError::InvalidConfig("mss and window must fit in 32 bits"));
        }
        if self.ack_timeout.is_zero() {
            return Err(ConnError::InvalidConfig("ack_timeout must be nonzero"));
        }
        if self.control_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConnError::InvalidConfig("control_timeout must be nonzero"));
        }
        if self.accept_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConnError::InvalidConfig("accept_timeout must be nonzero"));
        }
        // Largest UDP payload over IPv4.
        if HEADER_LEN + self.mss > 65_507 {
            return Err(ConnError::InvalidConfig("mss does not fit in one datagram"));
        }
        Ok(())
    }
}
