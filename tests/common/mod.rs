//! Shared fixtures for integration tests.
//!
//! [`ScriptedPeer`] is an in-memory [`Datagram`] that plays the remote end of
//! a connection: it answers the handshake and teardown, acknowledges
//! in-order data and can be told to drop chosen segments or close its
//! window.  Replies are queued and handed back on the next `recv_from`; an
//! empty queue behaves like an expired receive timeout, so tests run
//! without real waits.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use minitcp::{flags, Config, Datagram, Segment};

pub const PEER_ADDR: &str = "10.9.8.7:4000";
pub const LOCAL_ADDR: &str = "10.9.8.6:5000";

#[derive(Debug, Default)]
struct Script {
    isn: u32,
    seq: u32,
    window: u32,
    /// Next in-order sequence number expected from the connection.
    expected: u32,
    data_start: u32,
    received: Vec<u8>,
    saw_fin: bool,
    /// Relative offsets whose first transmission is lost.
    drop_once: HashSet<u32>,
    dropped: HashSet<u32>,
    drop_all_data: bool,
    /// Data segments seen so far, lost ones included.
    data_seen: usize,
    /// Every data segment after this many is lost.
    silent_after: Option<usize>,
    /// After this many payload bytes, advertise a zero window.
    close_window_at: Option<usize>,
    window_closed: bool,
    /// Empty polls while closed before a window update is queued.
    reopen_after_polls: Option<u32>,
    empty_polls: u32,
    inbox: VecDeque<Vec<u8>>,
    log: Vec<Segment>,
}

#[derive(Debug)]
pub struct ScriptedPeer {
    addr: SocketAddr,
    local: SocketAddr,
    script: RefCell<Script>,
}

impl ScriptedPeer {
    pub fn new(isn: u32, window: u32) -> Self {
        Self {
            addr: PEER_ADDR.parse().unwrap(),
            local: LOCAL_ADDR.parse().unwrap(),
            script: RefCell::new(Script {
                isn,
                seq: isn,
                window,
                ..Script::default()
            }),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Lose the first transmission of the segment starting at byte `offset`
    /// of the stream.
    pub fn drop_once(self, offset: u32) -> Self {
        self.script.borrow_mut().drop_once.insert(offset);
        self
    }

    pub fn drop_all_data(self) -> Self {
        self.script.borrow_mut().drop_all_data = true;
        self
    }

    /// Lose every data segment after the first `n`.
    pub fn go_silent_after(self, n: usize) -> Self {
        self.script.borrow_mut().silent_after = Some(n);
        self
    }

    pub fn close_window_at(self, bytes: usize, reopen_after_polls: Option<u32>) -> Self {
        {
            let mut s = self.script.borrow_mut();
            s.close_window_at = Some(bytes);
            s.reopen_after_polls = reopen_after_polls;
        }
        self
    }

    /// Queue a datagram for the connection to receive.
    pub fn push(&self, seg: &Segment) {
        self.script.borrow_mut().inbox.push_back(seg.encode());
    }

    pub fn push_raw(&self, bytes: Vec<u8>) {
        self.script.borrow_mut().inbox.push_back(bytes);
    }

    /// Everything the connection sent, in order.
    pub fn sent(&self) -> Vec<Segment> {
        self.script.borrow().log.clone()
    }

    /// Data segments the connection sent, in order.
    pub fn data_sent(&self) -> Vec<Segment> {
        self.sent()
            .into_iter()
            .filter(|s| s.header.control() == 0 && !s.payload.is_empty())
            .collect()
    }

    /// Payload accepted in order.
    pub fn received(&self) -> Vec<u8> {
        self.script.borrow().received.clone()
    }

    pub fn saw_fin(&self) -> bool {
        self.script.borrow().saw_fin
    }

    /// First sequence number of the connection's data.
    pub fn data_start(&self) -> u32 {
        self.script.borrow().data_start
    }

    /// Sequence number the peer will put on its next segment.
    pub fn next_seq(&self) -> u32 {
        self.script.borrow().seq
    }

    pub fn pending(&self) -> usize {
        self.script.borrow().inbox.len()
    }

    fn respond(&self, seg: &Segment) {
        let mut s = self.script.borrow_mut();
        let h = seg.header;
        let control = h.control();
        if control == flags::SYN {
            s.expected = h.seq.wrapping_add(2);
            s.data_start = s.expected;
            let reply = Segment::control(s.seq, h.seq.wrapping_add(1), flags::SYN | flags::ACK, s.window);
            s.seq = s.seq.wrapping_add(1);
            s.inbox.push_back(reply.encode());
        } else if control == flags::FIN | flags::ACK {
            let ack = h.seq.wrapping_add(1);
            let first = Segment::control(s.seq, ack, flags::ACK, s.window);
            let second = Segment::control(s.seq.wrapping_add(1), ack, flags::FIN | flags::ACK, s.window);
            s.seq = s.seq.wrapping_add(2);
            s.inbox.push_back(first.encode());
            s.inbox.push_back(second.encode());
        } else if control == flags::FIN {
            s.saw_fin = true;
            s.expected = h.seq.wrapping_add(1);
        } else if control == 0 && !seg.payload.is_empty() {
            let offset = h.seq.wrapping_sub(s.data_start);
            s.data_seen += 1;
            let silent = s.silent_after.is_some_and(|n| s.data_seen > n);
            if s.drop_all_data
                || silent
                || (s.drop_once.contains(&offset) && s.dropped.insert(offset))
            {
                return;
            }
            if h.seq == s.expected {
                s.received.extend_from_slice(&seg.payload);
                s.expected = seg.end_seq();
                if s.close_window_at.is_some_and(|n| s.received.len() >= n) && !s.window_closed {
                    s.window_closed = true;
                }
            }
            let window = if s.window_closed { 0 } else { s.window };
            let reply = Segment::control(s.seq, s.expected, flags::ACK, window);
            s.inbox.push_back(reply.encode());
        }
    }
}

impl Datagram for ScriptedPeer {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        assert_eq!(dest, self.addr, "segment sent to the wrong address");
        let seg = Segment::decode(buf).expect("connection sent a malformed segment");
        self.script.borrow_mut().log.push(seg.clone());
        self.respond(&seg);
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut s = self.script.borrow_mut();
        if let Some(bytes) = s.inbox.pop_front() {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            return Ok((n, self.addr));
        }
        if s.window_closed {
            s.empty_polls += 1;
            if s.reopen_after_polls.is_some_and(|k| s.empty_polls >= k) {
                s.window_closed = false;
                s.close_window_at = None;
                let update = Segment::control(s.seq, s.expected, flags::ACK, s.window);
                s.inbox.push_back(update.encode());
            }
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "scripted peer is idle"))
    }

    fn set_receive_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn rebind(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.local = addr;
        Ok(())
    }
}

/// Loopback configuration with short timeouts.
pub fn loopback_config() -> Config {
    Config {
        ack_timeout: Duration::from_millis(50),
        control_timeout: Some(Duration::from_secs(2)),
        accept_timeout: Some(Duration::from_secs(5)),
        ..Config::default()
    }
}

/// A loopback UDP socket address that nothing listens on.
pub fn unused_addr() -> SocketAddr {
    let s = UdpSocket::bind("127.0.0.1:0").unwrap();
    s.local_addr().unwrap()
}

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
