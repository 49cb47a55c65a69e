//! Socket tests: descriptor table, listen queue, validity sentinel.

use crate::packet::Packet;
use crate::socket::{Socket, SocketDomain, SocketProtocol, SocketType, LISTEN_QUEUE_CAPACITY};
use crate::types::NetError;

fn datagram_socket(id: u32) -> Socket {
    Socket::new(
        id,
        SocketDomain::Inet,
        SocketType::Datagram,
        SocketProtocol::Udp,
    )
}

#[test]
fn invalidate_sets_the_all_ones_sentinel() {
    let sock = datagram_socket(7);
    assert!(sock.is_valid());
    assert_eq!(sock.id(), 7);

    sock.invalidate();
    assert!(!sock.is_valid());
    assert_eq!(sock.id(), u32::MAX);
}

#[test]
fn register_packet_assigns_increasing_descriptors() {
    let sock = datagram_socket(1);

    let fd0 = sock.register_packet(Packet::new(8, true).unwrap());
    let fd1 = sock.register_packet(Packet::new(8, true).unwrap());
    let fd2 = sock.register_packet(Packet::new(8, true).unwrap());

    assert_eq!((fd0, fd1, fd2), (0, 1, 2));
    assert!(sock.has_packet(fd1));

    // The registered packet carries its descriptor.
    let fd = sock.with_packet_mut(fd2, |p| p.fd()).unwrap();
    assert_eq!(fd, fd2);
}

#[test]
fn take_and_erase_remove_descriptors() {
    let sock = datagram_socket(1);
    let fd = sock.register_packet(Packet::new(8, true).unwrap());

    let pkt = sock.take_packet(fd).unwrap();
    assert_eq!(pkt.fd(), fd);
    assert!(!sock.has_packet(fd));
    assert!(sock.take_packet(fd).is_none());

    let fd = sock.register_packet(Packet::new(8, true).unwrap());
    sock.erase_packet(fd);
    assert!(!sock.has_packet(fd));
}

#[test]
fn deliver_queues_in_arrival_order() {
    let sock = datagram_socket(2);

    let mut first = Packet::new(4, false).unwrap();
    first.bytes_mut()[0] = 1;
    let mut second = Packet::new(4, false).unwrap();
    second.bytes_mut()[0] = 2;

    sock.deliver(first);
    sock.deliver(second);
    assert_eq!(sock.pending_arrivals(), 2);

    assert_eq!(sock.try_take_arrival().unwrap().bytes()[0], 1);
    assert_eq!(sock.try_take_arrival().unwrap().bytes()[0], 2);
    assert!(sock.try_take_arrival().is_none());
}

#[test]
fn listen_queue_is_bounded() {
    let sock = datagram_socket(3);

    for _ in 0..LISTEN_QUEUE_CAPACITY + 3 {
        sock.deliver(Packet::new(4, false).unwrap());
    }
    assert_eq!(sock.pending_arrivals(), LISTEN_QUEUE_CAPACITY as u32);
}

#[test]
fn nonblocking_wait_fails_immediately_when_empty() {
    let sock = datagram_socket(4);
    match sock.wait_arrival_timeout(0) {
        Err(NetError::SocketTimeout) => {}
        other => panic!("expected SocketTimeout, got {:?}", other.map(|p| p.len())),
    }
}

#[test]
fn listening_flag_gates_delivery_decisions() {
    let sock = datagram_socket(5);
    assert!(!sock.is_listening());
    sock.set_listening(true);
    assert!(sock.is_listening());
    sock.set_listening(false);
    assert!(!sock.is_listening());
}
