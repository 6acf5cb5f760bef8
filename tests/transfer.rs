//! End-to-end transfers over loopback UDP, with and without injected faults.

mod common;

use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};

use common::{loopback_config, pattern};
use minitcp::{
    socket, AddressFamily, Config, Connection, ConnectionState, Datagram, Simulator,
    SimulatorConfig, SocketKind, Stats,
};

/// Accept one connection on a background thread and receive until the peer
/// closes.  Returns the bytes and the server's statistics.
fn spawn_receiver<D>(mut server: Connection<D>) -> JoinHandle<(Vec<u8>, Stats)>
where
    D: Datagram + Send + 'static,
{
    thread::spawn(move || {
        server.accept().expect("accept");
        let mut received = Vec::new();
        let mut chunk = vec![0u8; 4096];
        loop {
            let n = server.recv(&mut chunk).expect("recv");
            received.extend_from_slice(&chunk[..n]);
            if server.state() == ConnectionState::ClosingByPeer && n == 0 {
                break;
            }
        }
        server.shutdown().expect("server shutdown");
        assert_eq!(server.state(), ConnectionState::Closed);
        (received, server.stats())
    })
}

fn listening(config: Config) -> (Connection, SocketAddr) {
    let mut server =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, config).unwrap();
    server.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

fn faulty_client(faults: SimulatorConfig) -> Connection<Simulator<UdpSocket>> {
    let sock = socket::open(AddressFamily::Inet, SocketKind::Datagram).unwrap();
    Connection::with_transport(Simulator::new(sock, faults), loopback_config()).unwrap()
}

#[test]
fn small_message_round_trip() {
    let (server, addr) = listening(loopback_config());
    let handle = spawn_receiver(server);

    let mut client =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, loopback_config())
            .unwrap();
    client.connect(addr).unwrap();
    assert_eq!(client.send(b"hello, world").unwrap(), 12);
    client.shutdown().unwrap();

    let (received, _) = handle.join().unwrap();
    assert_eq!(received, b"hello, world");
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[test]
fn bulk_transfer_spans_many_windows() {
    let (server, addr) = listening(loopback_config());
    let handle = spawn_receiver(server);

    let data = pattern(100_000);
    let mut client =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, loopback_config())
            .unwrap();
    client.connect(addr).unwrap();
    assert_eq!(client.send(&data).unwrap(), data.len());
    client.shutdown().unwrap();

    let (received, server_stats) = handle.join().unwrap();
    assert_eq!(received.len(), data.len());
    assert_eq!(received, data);
    assert_eq!(server_stats.bytes_received, data.len() as u64);
    assert!(client.stats().data_segments_sent >= (data.len() / 1400) as u64);
}

#[test]
fn several_sends_on_one_connection() {
    let (server, addr) = listening(loopback_config());
    let handle = spawn_receiver(server);

    let mut client =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, loopback_config())
            .unwrap();
    client.connect(addr).unwrap();
    client.send(b"first ").unwrap();
    client.send(b"second ").unwrap();
    client.send(&pattern(5000)).unwrap();
    client.shutdown().unwrap();

    let (received, _) = handle.join().unwrap();
    let mut expected = b"first second ".to_vec();
    expected.extend(pattern(5000));
    assert_eq!(received, expected);
}

#[test]
fn recovers_from_loss_and_corruption() {
    let (server, addr) = listening(loopback_config());
    let handle = spawn_receiver(server);

    // Datagrams 0 and 1 are the handshake; the rest are data.
    let mut client = faulty_client(SimulatorConfig {
        drop_at: vec![4, 9],
        corrupt_at: vec![6],
        ..SimulatorConfig::default()
    });
    let data = pattern(20_000);
    client.connect(addr).unwrap();
    client.send(&data).unwrap();
    client.shutdown().unwrap();

    let (received, server_stats) = handle.join().unwrap();
    assert_eq!(received, data);
    assert!(server_stats.corrupt_segments >= 1);
    assert!(server_stats.duplicate_acks_sent >= 1);

    let stats = client.stats();
    assert!(stats.retransmitted_segments >= 2);
    let faults = client.transport().stats();
    assert_eq!(faults.dropped, 2);
    assert_eq!(faults.corrupted, 1);
}
