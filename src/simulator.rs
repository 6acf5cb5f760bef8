//! Fault-injecting datagram transport.
//!
//! Real networks drop, corrupt and duplicate datagrams.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Datagram`] handle and applies a fault model to
//! everything it *sends*:
//!
//! | Fault       | Trigger                                              |
//! |-------------|------------------------------------------------------|
//! | Loss        | probability `loss_rate`, or index in `drop_at`       |
//! | Corruption  | probability `corrupt_rate`, or index in `corrupt_at` |
//! | Duplication | probability `duplicate_rate`                         |
//!
//! Indices count every datagram handed to the simulator, starting at 0.
//! The random generator is seeded from `seed` so failing runs reproduce.
//! Receives pass straight through.

use std::cell::{Cell, RefCell};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::HEADER_LEN;
use crate::socket::Datagram;

/// Fault model.  All probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that one byte of a datagram is flipped.
    pub corrupt_rate: f64,
    /// Probability that a datagram is sent twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
    /// Datagram indices that are always dropped.
    pub drop_at: Vec<u64>,
    /// Datagram indices that are always corrupted.
    pub corrupt_at: Vec<u64>,
}

/// Counters of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub sent: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

/// A [`Datagram`] wrapper that misbehaves on purpose.
#[derive(Debug)]
pub struct Simulator<D> {
    inner: D,
    config: SimulatorConfig,
    rng: RefCell<StdRng>,
    stats: Cell<FaultStats>,
}

impl<D: Datagram> Simulator<D> {
    pub fn new(inner: D, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng: RefCell::new(rng),
            stats: Cell::new(FaultStats::default()),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats.get()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn roll(&self, p: f64) -> bool {
        p > 0.0 && self.rng.borrow_mut().random_bool(p.min(1.0))
    }

    /// Flip one byte: a payload byte when there is a payload, else a header
    /// byte.
    fn corrupt(&self, bytes: &mut [u8]) {
        if bytes.is_empty() {
            return;
        }
        let idx = if bytes.len() > HEADER_LEN {
            self.rng.borrow_mut().random_range(HEADER_LEN..bytes.len())
        } else {
            self.rng.borrow_mut().random_range(0..bytes.len())
        };
        bytes[idx] ^= 0xFF;
    }
}

impl<D: Datagram> Datagram for Simulator<D> {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        let mut stats = self.stats.get();
        let index = stats.sent;
        stats.sent += 1;

        if self.config.drop_at.contains(&index) || self.roll(self.config.loss_rate) {
            stats.dropped += 1;
            self.stats.set(stats);
            log::debug!("[sim] dropped datagram #{index} ({} bytes)", buf.len());
            return Ok(buf.len());
        }

        let mut bytes = buf.to_vec();
        if self.config.corrupt_at.contains(&index) || self.roll(self.config.corrupt_rate) {
            self.corrupt(&mut bytes);
            stats.corrupted += 1;
            log::debug!("[sim] corrupted datagram #{index}");
        }
        let n = self.inner.send_to(&bytes, dest)?;
        if self.roll(self.config.duplicate_rate) {
            self.inner.send_to(&bytes, dest)?;
            stats.duplicated += 1;
            log::debug!("[sim] duplicated datagram #{index}");
        }
        self.stats.set(stats);
        Ok(n)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf)
    }

    fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_receive_timeout(timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn rebind(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.inner.rebind(addr)
    }
}
