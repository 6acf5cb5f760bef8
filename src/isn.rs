//! Initial sequence number (ISN) sources.
//!
//! The handshake never seeds or touches a global generator; it asks the
//! connection's [`IsnGenerator`] for a value.  Production code uses
//! [`RandomIsn`]; tests inject [`FixedIsn`] to get reproducible sequence
//! numbers.

use rand::Rng;

/// Capability that hands out initial sequence numbers.
pub trait IsnGenerator: Send {
    /// Produce the ISN for the next handshake.
    fn next_isn(&mut self) -> u32;
}

/// Draws ISNs from the thread-local OS-seeded generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIsn;

impl IsnGenerator for RandomIsn {
    fn next_isn(&mut self) -> u32 {
        rand::rng().random()
    }
}

/// Always returns the same ISN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIsn(pub u32);

impl IsnGenerator for FixedIsn {
    fn next_isn(&mut self) -> u32 {
        self.0
    }
}

impl<F> IsnGenerator for F
where
    F: FnMut() -> u32 + Send,
{
    fn next_isn(&mut self) -> u32 {
        self()
    }
}
