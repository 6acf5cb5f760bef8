//! Graceful close over loopback UDP.

mod common;

use std::net::SocketAddr;
use std::thread;

use common::loopback_config;
use minitcp::{AddressFamily, ConnError, Connection, ConnectionState, FixedIsn, SocketKind};

fn pair() -> (Connection, Connection) {
    let mut server =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, loopback_config())
            .unwrap()
            .with_isn_generator(FixedIsn(7000));
    server.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr: SocketAddr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        server.accept().unwrap();
        server
    });
    let mut client =
        Connection::open_with(AddressFamily::Inet, SocketKind::Datagram, loopback_config())
            .unwrap()
            .with_isn_generator(FixedIsn(3000));
    client.connect(addr).unwrap();
    (client, handle.join().unwrap())
}

/// Passive side: read until the peer's FIN|ACK, then finish the close.
fn drain_and_close(mut server: Connection) -> Connection {
    let mut buf = [0u8; 1024];
    while server.state() != ConnectionState::ClosingByPeer {
        server.recv(&mut buf).unwrap();
    }
    server.shutdown().unwrap();
    server
}

#[test]
fn both_sides_close_and_release_buffers() {
    let (mut client, server) = pair();
    let handle = thread::spawn(move || drain_and_close(server));

    client.shutdown().unwrap();
    let server = handle.join().unwrap();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.state(), ConnectionState::Closed);
    assert!(!client.has_receive_buffer());
    assert!(!server.has_receive_buffer());

    // Every teardown segment consumed one sequence number.
    assert_eq!(client.seq_number(), 3002 + 2);
    assert_eq!(server.seq_number(), 7001 + 2);
    assert_eq!(client.ack_number(), server.seq_number());
    assert_eq!(server.ack_number(), client.seq_number());
}

#[test]
fn close_after_data() {
    let (mut client, server) = pair();
    let handle = thread::spawn(move || drain_and_close(server));

    client.send(&common::pattern(10_000)).unwrap();
    client.shutdown().unwrap();
    let server = handle.join().unwrap();

    assert_eq!(server.stats().bytes_received, 10_000);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.state(), ConnectionState::Closed);
}

#[test]
fn passive_side_cannot_close_first() {
    let (_client, mut server) = pair();
    assert!(matches!(server.shutdown(), Err(ConnError::PeerNotClosing)));
    assert_eq!(server.state(), ConnectionState::Established);
}

#[test]
fn closed_connection_refuses_data_but_closes_again() {
    let (mut client, server) = pair();
    let handle = thread::spawn(move || drain_and_close(server));
    client.shutdown().unwrap();
    handle.join().unwrap();

    assert!(client.shutdown().is_ok());
    assert!(matches!(
        client.send(b"late"),
        Err(ConnError::BadState { op: "send", .. })
    ));
    let mut buf = [0u8; 8];
    assert!(matches!(
        client.recv(&mut buf),
        Err(ConnError::BadState { op: "recv", .. })
    ));
}

#[test]
fn host_close_times_out_without_peer() {
    let (mut client, _server) = pair();
    // The server never calls recv, so the FIN|ACK is never answered.
    assert!(matches!(client.shutdown(), Err(ConnError::Timeout)));
    assert!(client.has_receive_buffer());
}
