//! Congestion-controlled send engine.
//!
//! `send` moves the caller's bytes in *rounds*.  Each round:
//!
//! 1. sizes itself as `min(remaining, flow window, cwnd)`;
//! 2. splits that budget into MSS-sized chunks (the last one may be short);
//! 3. transmits every chunk back to back, remembering the acknowledgment
//!    number each chunk should produce;
//! 4. waits for those acknowledgments in order, feeding every outcome into
//!    [`CongestionControl`].
//!
//! Acknowledgments are cumulative: an ACK for chunk `j` also covers every
//! earlier chunk still outstanding.  A timeout or a triple duplicate
//! retransmits everything from the first unacknowledged chunk with the
//! original sequence numbers.  After the last round a FIN is sent.
//!
//! [`CongestionControl`]: crate::congestion::CongestionControl

use std::ops::Range;

use crate::connection::{ConnError, Connection, Incoming};
use crate::packet::{flags, Segment};
use crate::socket::Datagram;

/// Split `len` bytes into consecutive ranges of at most `mss` bytes.
///
/// Every range but the last is exactly `mss` long.
pub fn plan_chunks(len: usize, mss: usize) -> Vec<Range<usize>> {
    if mss == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(mss)
        .map(|start| start..(start + mss).min(len))
        .collect()
}

/// One segment of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequence number of the first byte.
    pub seq: u32,
    /// Byte range within the data passed to `send`.
    pub range: Range<usize>,
}

impl Chunk {
    /// Acknowledgment number that confirms this chunk.
    pub fn expected_ack(&self) -> u32 {
        self.seq.wrapping_add(self.range.len() as u32)
    }
}

/// The chunks of one round, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    chunks: Vec<Chunk>,
}

impl Round {
    /// Lay out `budget` bytes starting at `offset` in the caller's data and
    /// at sequence number `seq`.
    pub fn plan(seq: u32, offset: usize, budget: usize, mss: usize) -> Result<Self, ConnError> {
        let chunks: Vec<Chunk> = plan_chunks(budget, mss)
            .into_iter()
            .map(|r| Chunk {
                seq: seq.wrapping_add(r.start as u32),
                range: offset + r.start..offset + r.end,
            })
            .collect();
        let round = Self { chunks };
        if round.is_empty() {
            return Err(ConnError::EmptyRound);
        }
        Ok(round)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sequence number following the round's last byte.
    pub fn end_seq(&self) -> u32 {
        self.chunks
            .last()
            .map_or(0, |c| c.expected_ack())
    }

    /// Index of the chunk at or after `from` whose expected acknowledgment
    /// equals `ack`.
    pub fn match_ack(&self, from: usize, ack: u32) -> Option<usize> {
        self.chunks
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, c)| c.expected_ack() == ack)
            .map(|(i, _)| i)
    }
}

pub(crate) fn send<D: Datagram>(conn: &mut Connection<D>, data: &[u8]) -> Result<usize, ConnError> {
    conn.require_established("send")?;
    conn.prime_congestion();

    let mut sent = 0;
    while sent < data.len() {
        if conn.flow_window == 0 {
            wait_for_window(conn)?;
        }
        let budget = conn.cc.sendable(data.len() - sent, conn.flow_window);
        let round = Round::plan(conn.seq, sent, budget, conn.config.mss)?;
        log::debug!(
            "[send] round of {budget} bytes in {} chunk(s), {:?} cwnd={} ssthresh={} window={}",
            round.len(),
            conn.cc.state(),
            conn.cc.cwnd(),
            conn.cc.ssthresh(),
            conn.flow_window
        );

        conn.cc.begin_round();
        for chunk in round.chunks() {
            transmit_chunk(conn, data, chunk, false)?;
            conn.seq = chunk.expected_ack();
        }
        await_round(conn, data, &round)?;
        sent += budget;
    }

    let fin = Segment::control(conn.seq, conn.ack, flags::FIN, 0);
    conn.transmit(&fin)?;
    conn.seq = conn.seq.wrapping_add(1);
    log::info!("[send] delivered {sent} bytes");
    Ok(sent)
}

/// Collect the acknowledgments for `round`, retransmitting as needed.
fn await_round<D: Datagram>(
    conn: &mut Connection<D>,
    data: &[u8],
    round: &Round,
) -> Result<(), ConnError> {
    let mut next = 0;
    let mut idle_timeouts = 0u32;
    while next < round.len() {
        let timeout = conn.config.ack_timeout;
        let retransmit = match conn.poll(Some(timeout))? {
            Incoming::Timeout => {
                idle_timeouts += 1;
                if let Some(max) = conn.config.max_consecutive_timeouts {
                    if idle_timeouts > max {
                        return Err(ConnError::RetriesExhausted(max));
                    }
                }
                conn.stats.timeouts += 1;
                log::warn!(
                    "[send] ack timeout, resending from seq {}",
                    round.chunks()[next].seq
                );
                conn.cc.on_timeout();
                true
            }
            Incoming::Corrupt => duplicate(conn),
            // Only a pure ACK can acknowledge data.
            Incoming::Segment(seg, _) if seg.header.control() != flags::ACK => duplicate(conn),
            Incoming::Segment(seg, _) => {
                let h = seg.header;
                conn.flow_window = h.window as usize;
                let retransmit = match round.match_ack(next, h.ack) {
                    Some(j) => {
                        advance(conn, &mut next, j, h.ack);
                        idle_timeouts = 0;
                        false
                    }
                    None => duplicate(conn),
                };
                if conn.flow_window == 0 && next < round.len() {
                    // The update that reopens the window may also carry news.
                    let opener = wait_for_window(conn)?;
                    if let Some(j) = round.match_ack(next, opener) {
                        advance(conn, &mut next, j, opener);
                        idle_timeouts = 0;
                    }
                }
                retransmit
            }
        };
        if retransmit && next < round.len() {
            for chunk in &round.chunks()[next..] {
                transmit_chunk(conn, data, chunk, true)?;
            }
        }
    }
    Ok(())
}

/// Chunks `next..=j` are acknowledged.
fn advance<D: Datagram>(conn: &mut Connection<D>, next: &mut usize, j: usize, ack: u32) {
    for _ in *next..=j {
        conn.cc.on_ack();
    }
    *next = j + 1;
    conn.snd_una = ack;
}

/// Returns `true` when the caller must fast-retransmit.
fn duplicate<D: Datagram>(conn: &mut Connection<D>) -> bool {
    if !conn.cc.on_duplicate_ack() {
        return false;
    }
    conn.stats.fast_retransmits += 1;
    log::warn!(
        "[send] triple duplicate ACK, fast retransmit from seq {}",
        conn.snd_una
    );
    true
}

/// Block until the peer advertises a nonzero window.  Returns the
/// acknowledgment number carried by the reopening segment.
fn wait_for_window<D: Datagram>(conn: &mut Connection<D>) -> Result<u32, ConnError> {
    log::debug!("[send] peer window closed, waiting for update");
    let mut polls = 0u32;
    loop {
        let timeout = conn.config.ack_timeout;
        match conn.poll(Some(timeout))? {
            Incoming::Segment(seg, _)
                if seg.header.control() == flags::ACK && seg.header.window > 0 =>
            {
                conn.flow_window = seg.header.window as usize;
                log::debug!("[send] peer window reopened to {}", conn.flow_window);
                return Ok(seg.header.ack);
            }
            Incoming::Timeout => {
                polls += 1;
                if let Some(limit) = conn.config.zero_window_poll_limit {
                    if polls >= limit {
                        return Err(ConnError::WindowStalled(limit));
                    }
                }
            }
            _ => {}
        }
    }
}

fn transmit_chunk<D: Datagram>(
    conn: &mut Connection<D>,
    data: &[u8],
    chunk: &Chunk,
    retransmission: bool,
) -> Result<(), ConnError> {
    let payload = data[chunk.range.clone()].to_vec();
    let len = payload.len() as u64;
    let seg = Segment::data(chunk.seq, conn.ack, payload);
    conn.transmit(&seg)?;
    if retransmission {
        conn.stats.retransmitted_segments += 1;
        conn.stats.retransmitted_bytes += len;
    } else {
        conn.stats.data_segments_sent += 1;
        conn.stats.bytes_sent += len;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_mss_sized_with_short_tail() {
        assert_eq!(plan_chunks(1792, 512), vec![0..512, 512..1024, 1024..1536, 1536..1792]);
        assert_eq!(plan_chunks(1024, 512), vec![0..512, 512..1024]);
        assert_eq!(plan_chunks(10, 512), vec![0..10]);
        assert!(plan_chunks(0, 512).is_empty());
    }

    #[test]
    fn round_numbers_chunks_from_seq() {
        let round = Round::plan(1000, 300, 250, 100).unwrap();
        let seqs: Vec<u32> = round.chunks().iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![1000, 1100, 1200]);
        assert_eq!(round.chunks()[0].range, 300..400);
        assert_eq!(round.chunks()[2].range, 500..550);
        assert_eq!(round.end_seq(), 1250);
    }

    #[test]
    fn empty_budget_is_an_error() {
        assert!(matches!(Round::plan(0, 0, 0, 100), Err(ConnError::EmptyRound)));
    }

    #[test]
    fn acks_match_cumulatively_from_cursor() {
        let round = Round::plan(0, 0, 400, 100).unwrap();
        assert_eq!(round.match_ack(0, 100), Some(0));
        assert_eq!(round.match_ack(0, 300), Some(2));
        // Already acknowledged chunks do not match again.
        assert_eq!(round.match_ack(2, 100), None);
        // Mid-chunk positions never match.
        assert_eq!(round.match_ack(0, 150), None);
    }

    #[test]
    fn sequence_wraps() {
        let round = Round::plan(u32::MAX - 49, 0, 200, 100).unwrap();
        assert_eq!(round.chunks()[1].seq, 50);
        assert_eq!(round.end_seq(), 150);
    }
}
