//! Owned receive buffer.
//!
//! One [`ReceiveBuffer`] per connection.  It holds the scratch space a
//! datagram is read into and any in-order payload bytes that were accepted
//! but did not fit the caller's buffer.  All copies are bounds-checked; the
//! buffer never grows past the capacity chosen at allocation time.

use std::collections::TryReserveError;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct ReceiveBuffer {
    /// Datagram scratch space; `len() == capacity`.
    datagram: Vec<u8>,
    /// Accepted payload waiting for the next `recv` call.
    pending: VecDeque<u8>,
}

impl ReceiveBuffer {
    /// Allocate a buffer able to hold a datagram of `capacity` bytes.
    ///
    /// Allocation failure is reported rather than aborting the process.
    pub fn new(capacity: usize) -> Result<Self, TryReserveError> {
        let mut datagram = Vec::new();
        datagram.try_reserve_exact(capacity)?;
        datagram.resize(capacity, 0);
        Ok(Self {
            datagram,
            pending: VecDeque::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.datagram.len()
    }

    /// Whole scratch area, for the socket to read into.
    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.datagram
    }

    /// First `n` bytes of the scratch area, clamped to the capacity.
    pub fn received(&self, n: usize) -> &[u8] {
        &self.datagram[..n.min(self.datagram.len())]
    }

    /// Keep payload bytes that the caller had no room for.
    pub fn stash(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    /// Number of stashed bytes.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Move up to `dst.len()` stashed bytes into `dst`, oldest first.
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.pending.len());
        for (d, s) in dst[..n].iter_mut().zip(self.pending.drain(..n)) {
            *d = s;
        }
        n
    }
}
