//! Datagram transport abstraction.
//!
//! [`Datagram`] is the only view the protocol engines have of the network:
//! send a datagram to an address, receive one with a bounded wait.  It is
//! implemented for [`std::net::UdpSocket`] and for the fault-injecting
//! [`crate::simulator::Simulator`]; tests can supply scripted peers.
//!
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Address family for a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Inet,
    Inet6,
}

impl AddressFamily {
    /// Unspecified address with an OS-chosen port.
    pub fn any_addr(self) -> SocketAddr {
        match self {
            Self::Inet => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            Self::Inet6 => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }

    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() {
            Self::Inet
        } else {
            Self::Inet6
        }
    }
}

/// Socket kind requested at open time.  Only datagram sockets can carry
/// this protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketKind {
    #[default]
    Datagram,
    Stream,
}

/// Unreliable, unordered datagram transport.
pub trait Datagram {
    /// Send `buf` as one datagram to `dest`.
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram into `buf`, truncating anything longer.
    ///
    /// Blocks at most for the duration last passed to
    /// [`set_receive_timeout`](Self::set_receive_timeout); expiry surfaces
    /// as `WouldBlock` or `TimedOut`.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Bound the next receive; `None` waits indefinitely.
    fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Address this handle is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Re-bind the handle to `addr`.  On failure the old binding stays.
    fn rebind(&mut self, addr: SocketAddr) -> io::Result<()>;
}

impl Datagram for UdpSocket {
    fn rebind(&mut self, addr: SocketAddr) -> io::Result<()> {
        *self = UdpSocket::bind(addr)?;
        Ok(())
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, dest)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }

    fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Create a UDP handle of the given family, bound to an ephemeral port.
pub fn open(family: AddressFamily, kind: SocketKind) -> io::Result<UdpSocket> {
    if kind != SocketKind::Datagram {
        return Err(io::Error::new(
            ErrorKind::Unsupported,
            "only datagram sockets can carry segments",
        ));
    }
    UdpSocket::bind(family.any_addr())
}

/// `true` for the error kinds a receive timeout produces (platform
/// dependent: `WouldBlock` on Unix, `TimedOut` on Windows).
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Set the receive timeout, then receive one datagram.
///
/// Returns `Ok(None)` when the wait expires with nothing received.
pub fn recv_timeout<D: Datagram + ?Sized>(
    sock: &D,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> io::Result<Option<(usize, SocketAddr)>> {
    sock.set_receive_timeout(timeout)?;
    loop {
        match sock.recv_from(buf) {
            Ok(v) => return Ok(Some(v)),
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
