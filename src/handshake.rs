//! Three-message connection establishment.
//!
//! ```text
//!  active                                   passive (LISTEN)
//!    │ ── SYN        seq=x ────────────────────▶ │
//!    │ ◀─ SYN|ACK    seq=y ack=x+1 win=W_p ───── │
//!    │ ── ACK        seq=x+1 ack=y+1 win=W_a ──▶ │
//!  ESTABLISHED                               ESTABLISHED
//! ```
//!
//! SYN and each handshake ACK consume one sequence number, so the first data
//! byte from the active side is numbered `x + 2` and from the passive side
//! `y + 1`.  Both sides record the window the other advertised as the initial
//! flow-control window.

use std::net::SocketAddr;

use crate::buffer::ReceiveBuffer;
use crate::connection::{ConnError, Connection};
use crate::packet::{flags, Segment};
use crate::socket::Datagram;
use crate::state::{ConnectionState, Role};

pub(crate) fn active_open<D: Datagram>(
    conn: &mut Connection<D>,
    peer: SocketAddr,
) -> Result<(), ConnError> {
    if conn.state != ConnectionState::Closed {
        return Err(ConnError::BadState {
            op: "connect",
            state: conn.state,
        });
    }
    conn.peer = Some(peer);
    conn.role = Role::Active;

    let isn = conn.isn.next_isn();
    conn.seq = isn;
    let syn = Segment::control(conn.seq, 0, flags::SYN, conn.local_window());
    conn.transmit(&syn)?;
    conn.seq = conn.seq.wrapping_add(1);

    let timeout = conn.config.control_timeout;
    let (reply, _) = conn.await_control(timeout)?;
    let h = reply.header;
    if h.control() != (flags::SYN | flags::ACK) {
        return Err(ConnError::UnexpectedFlags {
            expected: "SYN|ACK",
            got: flags::name(h.flags),
        });
    }
    if h.ack != conn.seq {
        return Err(ConnError::AckMismatch {
            expected: conn.seq,
            got: h.ack,
        });
    }
    conn.init_window = h.window as usize;
    conn.flow_window = conn.init_window;
    conn.ack = h.seq.wrapping_add(1);

    let ack = Segment::control(conn.seq, conn.ack, flags::ACK, conn.local_window());
    conn.transmit(&ack)?;
    conn.seq = conn.seq.wrapping_add(1);
    conn.snd_una = conn.seq;
    conn.advertised = conn.config.window;
    conn.state = ConnectionState::Established;
    log::info!(
        "[handshake] connected to {peer} (isn={isn}, peer window={})",
        conn.init_window
    );
    Ok(())
}

pub(crate) fn passive_open<D: Datagram>(
    conn: &mut Connection<D>,
) -> Result<SocketAddr, ConnError> {
    if conn.state != ConnectionState::Listen {
        return Err(ConnError::BadState {
            op: "accept",
            state: conn.state,
        });
    }

    let timeout = conn.config.accept_timeout;
    let (syn, from) = conn.await_control(timeout)?;
    let h = syn.header;
    if h.control() != flags::SYN {
        return Err(ConnError::UnexpectedFlags {
            expected: "SYN",
            got: flags::name(h.flags),
        });
    }
    conn.peer = Some(from);
    conn.init_window = h.window as usize;
    conn.flow_window = conn.init_window;

    // Sized for both windows: ours bounds what the peer sends.
    let capacity = conn
        .config
        .buffer_capacity(conn.init_window.max(conn.config.window));
    let buffer =
        ReceiveBuffer::new(capacity).map_err(|_| ConnError::Alloc { requested: capacity })?;
    conn.buffer = Some(buffer);

    let isn = conn.isn.next_isn();
    conn.seq = isn;
    conn.ack = h.seq.wrapping_add(1);
    let syn_ack = Segment::control(
        conn.seq,
        conn.ack,
        flags::SYN | flags::ACK,
        conn.local_window(),
    );
    conn.transmit(&syn_ack)?;
    conn.seq = conn.seq.wrapping_add(1);

    let timeout = conn.config.control_timeout;
    let (ack, _) = conn.await_control(timeout)?;
    let h = ack.header;
    if h.control() != flags::ACK {
        return Err(ConnError::UnexpectedFlags {
            expected: "ACK",
            got: flags::name(h.flags),
        });
    }
    if h.ack != conn.seq {
        return Err(ConnError::AckMismatch {
            expected: conn.seq,
            got: h.ack,
        });
    }
    conn.ack = h.seq.wrapping_add(1);
    conn.snd_una = conn.seq;
    conn.advertised = conn.config.window;
    conn.state = ConnectionState::Established;
    log::info!(
        "[handshake] accepted {from} (isn={isn}, peer window={})",
        conn.init_window
    );
    Ok(from)
}
