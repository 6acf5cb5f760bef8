//! Four-message graceful close.
//!
//! ```text
//!  host (active)                                  peer (passive)
//!    │ ── FIN|ACK seq=s ─────────────────────────────▶ │  recv: CLOSING_BY_PEER
//!    │ ◀─ ACK     seq=p   ack=s+1 ──────────────────── │  shutdown
//!  CLOSING_BY_HOST                                     │
//!    │ ◀─ FIN|ACK seq=p+1 ack=s+1 ──────────────────── │
//!    │ ── ACK     seq=s+1 ack=p+2 ───────────────────▶ │
//!  CLOSED                                            CLOSED
//! ```
//!
//! Every teardown segment consumes one sequence number.  Late pure ACKs left
//! over from the data phase (acknowledging positions before the one being
//! waited for) are skipped; any other unexpected segment aborts teardown.

use crate::connection::{ConnError, Connection};
use crate::packet::{flags, seq_lt, Segment};
use crate::socket::Datagram;
use crate::state::{ConnectionState, Role};

pub(crate) fn shutdown<D: Datagram>(conn: &mut Connection<D>) -> Result<(), ConnError> {
    match (conn.state, conn.role) {
        (ConnectionState::Closed, _) => {
            log::debug!("[teardown] already closed");
            Ok(())
        }
        (ConnectionState::ClosingByPeer, _) => peer_close(conn),
        (ConnectionState::Established, Role::Active) => host_close(conn),
        (ConnectionState::Established, Role::Passive) => {
            log::warn!("[teardown] shutdown requested before the peer's FIN; connection stays open");
            Err(ConnError::PeerNotClosing)
        }
        (state, _) => Err(ConnError::BadState {
            op: "shutdown",
            state,
        }),
    }
}

/// This side initiates the close.
fn host_close<D: Datagram>(conn: &mut Connection<D>) -> Result<(), ConnError> {
    let fin = Segment::control(conn.seq, conn.ack, flags::FIN | flags::ACK, conn.local_window());
    conn.transmit(&fin)?;
    conn.seq = conn.seq.wrapping_add(1);

    let ack = await_reply(conn, flags::ACK)?;
    conn.ack = ack.header.seq.wrapping_add(1);
    conn.state = ConnectionState::ClosingByHost;
    log::debug!("[teardown] FIN acknowledged, waiting for peer FIN");

    let fin = await_reply(conn, flags::FIN | flags::ACK)?;
    conn.ack = fin.header.seq.wrapping_add(1);

    let last = Segment::control(conn.seq, conn.ack, flags::ACK, conn.local_window());
    conn.transmit(&last)?;
    conn.seq = conn.seq.wrapping_add(1);

    conn.release();
    Ok(())
}

/// The peer's FIN|ACK was already consumed by `recv`; answer it.
fn peer_close<D: Datagram>(conn: &mut Connection<D>) -> Result<(), ConnError> {
    let ack = Segment::control(conn.seq, conn.ack, flags::ACK, conn.local_window());
    conn.transmit(&ack)?;
    conn.seq = conn.seq.wrapping_add(1);

    let fin = Segment::control(conn.seq, conn.ack, flags::FIN | flags::ACK, conn.local_window());
    conn.transmit(&fin)?;
    conn.seq = conn.seq.wrapping_add(1);

    let last = await_reply(conn, flags::ACK)?;
    conn.ack = last.header.seq.wrapping_add(1);

    conn.release();
    Ok(())
}

/// Wait for a segment carrying exactly `want` and acknowledging everything
/// this side has sent.
fn await_reply<D: Datagram>(conn: &mut Connection<D>, want: u16) -> Result<Segment, ConnError> {
    let expected = conn.seq;
    loop {
        let timeout = conn.config.control_timeout;
        let (seg, _) = conn.await_control(timeout)?;
        let h = seg.header;
        if h.control() == flags::ACK && seg.payload.is_empty() && seq_lt(h.ack, expected) {
            log::debug!("[teardown] skipping stale ACK {}", h.ack);
            continue;
        }
        if h.control() != want {
            return Err(ConnError::UnexpectedFlags {
                expected: flags::name(want),
                got: flags::name(h.flags),
            });
        }
        if h.ack != expected {
            return Err(ConnError::AckMismatch {
                expected,
                got: h.ack,
            });
        }
        return Ok(seg);
    }
}
