//! Send-side congestion-control state machine.
//!
//! [`CongestionControl`] owns cwnd, ssthresh, the sub-state and the
//! duplicate-ACK counter.  It never touches a socket: the send engine reports
//! events (`on_ack`, `on_timeout`, `on_duplicate_ack`) and asks how many bytes
//! the next round may carry.
//!
//! ```text
//!              cwnd >= ssthresh                     3 dup ACKs
//!  SLOW_START ─────────────────▶ CONGESTION_AVOIDANCE ─────────▶ FAST_RECOVERY
//!     ▲  │ 3 dup ACKs                    ▲                              │
//!     │  └───────────────────────────────┼──────────────────────────────┤
//!     │                                  └──────── new ACK ─────────────┘
//!     └──────────────── timeout (from any state) ───────────────────────
//! ```
//!
//! cwnd and ssthresh are kept in bytes; "one unit" is one MSS.

/// Duplicate acknowledgments that trigger a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Congestion-control sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

/// Congestion window bookkeeping for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionControl {
    state: CongestionState,
    cwnd: usize,
    ssthresh: usize,
    mss: usize,
    dup_acks: u32,
}

impl CongestionControl {
    /// Slow start with cwnd = 1 MSS and the given threshold.
    pub fn new(mss: usize, ssthresh: usize) -> Self {
        Self {
            state: CongestionState::SlowStart,
            cwnd: mss,
            ssthresh,
            mss,
            dup_acks: 0,
        }
    }

    /// Back to the initial state.
    pub fn reset(&mut self, ssthresh: usize) {
        *self = Self::new(self.mss, ssthresh);
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    pub fn mss(&self) -> usize {
        self.mss
    }

    pub fn duplicate_acks(&self) -> u32 {
        self.dup_acks
    }

    /// Bytes the next round may put on the wire.
    pub fn sendable(&self, remaining: usize, flow_window: usize) -> usize {
        remaining.min(flow_window).min(self.cwnd)
    }

    /// The duplicate counter is scoped to one round.
    pub fn begin_round(&mut self) {
        self.dup_acks = 0;
    }

    /// A matching (new) acknowledgment arrived.
    pub fn on_ack(&mut self) {
        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += self.mss;
                if self.cwnd >= self.ssthresh {
                    log::debug!(
                        "[cc] slow start -> congestion avoidance cwnd={} ssthresh={}",
                        self.cwnd,
                        self.ssthresh
                    );
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
            CongestionState::CongestionAvoidance => {
                // One MSS per window's worth of ACKs.
                self.cwnd += (self.mss * self.mss / self.cwnd.max(1)).max(1);
                self.dup_acks = 0;
            }
            CongestionState::FastRecovery => {
                log::debug!(
                    "[cc] fast recovery -> congestion avoidance cwnd={}",
                    self.ssthresh
                );
                self.state = CongestionState::CongestionAvoidance;
                self.cwnd = self.ssthresh;
                self.dup_acks = 0;
            }
        }
    }

    /// No acknowledgment within the timeout.
    pub fn on_timeout(&mut self) {
        self.ssthresh = self.cwnd / 2;
        self.cwnd = self.mss;
        self.dup_acks = 0;
        if self.state != CongestionState::SlowStart {
            log::debug!("[cc] {:?} -> slow start (timeout)", self.state);
        }
        self.state = CongestionState::SlowStart;
    }

    /// A non-matching acknowledgment arrived.
    ///
    /// Returns `true` when this one completes a triple duplicate and the
    /// caller must retransmit.
    pub fn on_duplicate_ack(&mut self) -> bool {
        self.dup_acks += 1;
        if self.dup_acks < DUP_ACK_THRESHOLD {
            return false;
        }
        if self.state == CongestionState::FastRecovery {
            self.cwnd += self.mss;
        } else {
            log::debug!("[cc] {:?} -> fast recovery", self.state);
            self.ssthresh = self.cwnd / 2;
            self.cwnd = self.ssthresh + 3 * self.mss;
            self.state = CongestionState::FastRecovery;
        }
        self.dup_acks = 0;
        true
    }
}
