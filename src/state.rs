//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy.  Transitions are driven by [`crate::handshake`],
//! [`crate::teardown`] and [`crate::receiver`]; this module only names them.
//!
//! ```text
//!  INVALID (construction or transport failure)
//!
//!  CLOSED ──bind──▶ LISTEN ──accept──▶ ESTABLISHED
//!    │                                    │  │
//!    └────────────connect─────────────────┘  │
//!                                            │
//!            shutdown (active side) ◀────────┤────▶ FIN+ACK seen in recv
//!                    │                              (passive side)
//!                    ▼                                    ▼
//!            CLOSING_BY_HOST                      CLOSING_BY_PEER
//!                    │                                    │
//!                    └──────────▶ CLOSED ◀──── shutdown ──┘
//! ```

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// The connection cannot be used: construction failed or a transport
    /// error interrupted a protocol step.
    Invalid,
    /// No peer; initial and terminal state.
    #[default]
    Closed,
    /// Bound to a local address and waiting for a SYN (passive side only).
    Listen,
    /// Three-way handshake complete; data transfer in progress.
    Established,
    /// Local side sent FIN+ACK and had it acknowledged; waiting for the
    /// peer's own FIN+ACK.
    ClosingByHost,
    /// Peer's FIN+ACK was observed during a receive; the local side must
    /// call shutdown to finish the exchange.
    ClosingByPeer,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invalid => "INVALID",
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::Established => "ESTABLISHED",
            Self::ClosingByHost => "CLOSING_BY_HOST",
            Self::ClosingByPeer => "CLOSING_BY_PEER",
        };
        f.write_str(s)
    }
}

/// Which side of the handshake this connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Sends the SYN (client).
    #[default]
    Active,
    /// Bound and waiting for the SYN (server).
    Passive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
        assert_eq!(Role::default(), Role::Active);
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(ConnectionState::ClosingByPeer.to_string(), "CLOSING_BY_PEER");
        assert_eq!(ConnectionState::Established.to_string(), "ESTABLISHED");
    }
}
