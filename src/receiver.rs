//! Receive engine with flow control.
//!
//! `recv` accepts in-order payload into the caller's buffer and acknowledges
//! every segment it sees.  Its window for one call is
//! `min(buf.len(), config.window)`; each accepted byte shrinks it and the
//! remainder is advertised in every ACK.  The call returns when the window
//! is used up, when no datagram arrives within the ack timeout, or when the
//! peer signals the end of its data.
//!
//! Segments that fail verification or arrive out of order are dropped and
//! answered with a duplicate ACK for the last in-order position, which is
//! what drives the sender's fast retransmit.  Accepted bytes that do not fit
//! the caller's buffer are kept and handed out first on the next call.
//!
//! After advertising a zero window, the next call reopens it with a window
//! update.  That update is repeated on every idle poll until in-order data
//! arrives, so losing it cannot leave the sender waiting forever.

use crate::connection::{ConnError, Connection, Incoming};
use crate::packet::{flags, Segment};
use crate::socket::Datagram;
use crate::state::{ConnectionState, Role};

/// What to do with one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvAction {
    /// Drop it and repeat the last acknowledgment.
    DuplicateAck,
    /// The peer started teardown; acknowledge position `ack` later.
    PeerClosing { ack: u32 },
    /// The peer has no more data for now.
    EndOfStream { ack: u32 },
    /// In-order payload; the acknowledgment number becomes `ack`.
    Deliver { ack: u32 },
    /// Nothing to do (stray control segment or empty data).
    Ignore,
}

/// Decide how to treat `segment` given the next expected sequence number.
///
/// `None` stands for a datagram that failed to decode.
pub fn classify(segment: Option<&Segment>, expected: u32, role: Role) -> RecvAction {
    let Some(seg) = segment else {
        return RecvAction::DuplicateAck;
    };
    let h = &seg.header;
    if !flags::is_valid(h.flags) {
        return RecvAction::DuplicateAck;
    }
    let fin_ack = flags::FIN | flags::ACK;
    if h.control() == fin_ack && role == Role::Passive {
        return RecvAction::PeerClosing {
            ack: h.seq.wrapping_add(1),
        };
    }
    if h.has(flags::FIN) {
        return RecvAction::EndOfStream {
            ack: h.seq.wrapping_add(1),
        };
    }
    if h.control() != 0 || seg.payload.is_empty() {
        return RecvAction::Ignore;
    }
    if h.seq != expected {
        return RecvAction::DuplicateAck;
    }
    RecvAction::Deliver {
        ack: seg.end_seq(),
    }
}

pub(crate) fn recv<D: Datagram>(
    conn: &mut Connection<D>,
    buf: &mut [u8],
) -> Result<usize, ConnError> {
    // After the peer's FIN|ACK only leftover bytes can be handed out.
    if conn.state == ConnectionState::ClosingByPeer {
        return Ok(conn.buffer.as_mut().map_or(0, |b| b.drain_into(buf)));
    }
    conn.require_established("recv")?;
    conn.eof = false;

    let mut filled = match conn.buffer.as_mut() {
        Some(b) => b.drain_into(buf),
        None => 0,
    };
    let mut window = buf.len().min(conn.config.window).saturating_sub(filled);
    if window == 0 {
        return Ok(filled);
    }

    if conn.advertised == 0 {
        log::debug!("[recv] reopening window to {window}");
        send_ack(conn, window)?;
        conn.window_update_pending = true;
    }

    while window > 0 {
        let timeout = conn.config.ack_timeout;
        let incoming = conn.poll(Some(timeout))?;
        let (segment, action) = match incoming {
            Incoming::Timeout => {
                // Repeated until data shows the peer saw the new window.
                if conn.window_update_pending {
                    log::debug!("[recv] repeating window update ({window})");
                    send_ack(conn, window)?;
                }
                break;
            }
            Incoming::Corrupt => (None, classify(None, conn.ack, conn.role)),
            Incoming::Segment(seg, _) => {
                let action = classify(Some(&seg), conn.ack, conn.role);
                (Some(seg), action)
            }
        };
        match action {
            RecvAction::Ignore => {}
            RecvAction::DuplicateAck => {
                conn.stats.duplicate_acks_sent += 1;
                send_ack(conn, window)?;
            }
            RecvAction::PeerClosing { ack } => {
                conn.window_update_pending = false;
                conn.ack = ack;
                conn.eof = true;
                conn.state = ConnectionState::ClosingByPeer;
                log::info!("[recv] peer requested shutdown");
                break;
            }
            RecvAction::EndOfStream { ack } => {
                conn.window_update_pending = false;
                conn.ack = ack;
                conn.eof = true;
                log::debug!("[recv] end of stream");
                break;
            }
            RecvAction::Deliver { ack } => {
                let Some(seg) = segment else { continue };
                let payload = &seg.payload;
                let take = payload.len().min(buf.len() - filled);
                buf[filled..filled + take].copy_from_slice(&payload[..take]);
                filled += take;
                if take < payload.len() {
                    if let Some(b) = conn.buffer.as_mut() {
                        b.stash(&payload[take..]);
                    }
                }
                conn.ack = ack;
                conn.window_update_pending = false;
                conn.stats.bytes_received += payload.len() as u64;
                window = window.saturating_sub(payload.len());
                send_ack(conn, window)?;
            }
        }
    }
    Ok(filled)
}

/// Acknowledge the current in-order position.  Data-phase ACKs do not
/// consume a sequence number.
fn send_ack<D: Datagram>(conn: &mut Connection<D>, window: usize) -> Result<(), ConnError> {
    let ack = Segment::control(conn.seq, conn.ack, flags::ACK, window as u32);
    conn.transmit(&ack)?;
    conn.advertised = window;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(seq: u32, len: usize) -> Segment {
        Segment::data(seq, 0, vec![0xAB; len])
    }

    #[test]
    fn corrupt_datagram_draws_duplicate_ack() {
        assert_eq!(classify(None, 10, Role::Active), RecvAction::DuplicateAck);
    }

    #[test]
    fn in_order_data_is_delivered() {
        let seg = data(500, 100);
        assert_eq!(
            classify(Some(&seg), 500, Role::Passive),
            RecvAction::Deliver { ack: 600 }
        );
    }

    #[test]
    fn gap_or_replay_draws_duplicate_ack() {
        assert_eq!(
            classify(Some(&data(600, 100)), 500, Role::Passive),
            RecvAction::DuplicateAck
        );
        assert_eq!(
            classify(Some(&data(400, 100)), 500, Role::Passive),
            RecvAction::DuplicateAck
        );
    }

    #[test]
    fn fin_ack_on_passive_side_starts_teardown() {
        let seg = Segment::control(900, 1, flags::FIN | flags::ACK, 0);
        assert_eq!(
            classify(Some(&seg), 900, Role::Passive),
            RecvAction::PeerClosing { ack: 901 }
        );
        // The active side treats it as a plain end of stream.
        assert_eq!(
            classify(Some(&seg), 900, Role::Active),
            RecvAction::EndOfStream { ack: 901 }
        );
    }

    #[test]
    fn impossible_flag_mix_is_treated_as_damage() {
        let seg = Segment::control(500, 0, flags::SYN | flags::FIN, 0);
        assert_eq!(
            classify(Some(&seg), 500, Role::Passive),
            RecvAction::DuplicateAck
        );
    }

    #[test]
    fn bare_fin_ends_stream() {
        let seg = Segment::control(77, 0, flags::FIN, 0);
        assert_eq!(
            classify(Some(&seg), 77, Role::Passive),
            RecvAction::EndOfStream { ack: 78 }
        );
    }

    #[test]
    fn stray_control_is_ignored() {
        let ack = Segment::control(5, 5, flags::ACK, 100);
        assert_eq!(classify(Some(&ack), 5, Role::Active), RecvAction::Ignore);
        let syn = Segment::control(5, 0, flags::SYN, 100);
        assert_eq!(classify(Some(&syn), 5, Role::Passive), RecvAction::Ignore);
        assert_eq!(classify(Some(&data(5, 0)), 5, Role::Passive), RecvAction::Ignore);
    }
}
