//! Datagram transport (UDP).
//!
//! A socket binds to a remote endpoint, which allocates a connection with a
//! fresh ephemeral local port.  The decode path demultiplexes arrivals to
//! the bound socket's listen queue; `recv` blocks on that queue.

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use driftos_lib::{klog_debug, klog_trace};

use crate::connection::{ConnectionTable, PortPair};
use crate::dns;
use crate::ip;
use crate::netdev::{self, Iface};
use crate::packet::{Layer, Packet};
use crate::socket::{ConnData, Socket};
use crate::types::{IpProtocol, Ipv4Addr, NetError, Port};
use crate::checksum;

/// UDP header: source port, target port, length, checksum.
pub const HEADER_LEN: usize = 8;

/// Datagram connection record: endpoints only, no sequence state.
pub struct UdpConnection {
    local_port: Port,
    remote_port: Port,
    remote_addr: Ipv4Addr,
    connected: AtomicBool,
    socket: Weak<Socket>,
}

impl UdpConnection {
    #[inline]
    pub fn remote_addr(&self) -> Ipv4Addr {
        self.remote_addr
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl PortPair for UdpConnection {
    fn local_port(&self) -> Port {
        self.local_port
    }

    fn remote_port(&self) -> Port {
        self.remote_port
    }
}

static CONNECTIONS: ConnectionTable<UdpConnection> = ConnectionTable::new();

/// Ephemeral port counter, incremented before use: the first bind gets 1024.
static LOCAL_PORT: AtomicU16 = AtomicU16::new(1023);

fn alloc_local_port() -> Port {
    Port(LOCAL_PORT.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
}

/// Bind `sock` to a remote endpoint.  Returns the ephemeral local port.
pub fn bind(sock: &Arc<Socket>, remote_port: Port, remote_addr: Ipv4Addr) -> Result<Port, NetError> {
    let connection = CONNECTIONS.insert(UdpConnection {
        local_port: alloc_local_port(),
        remote_port,
        remote_addr,
        connected: AtomicBool::new(true),
        socket: Arc::downgrade(sock),
    });

    sock.set_connection(ConnData::Udp(connection.clone()));
    Ok(connection.local_port)
}

/// Tear the binding down and drop the connection.
pub fn unbind(sock: &Arc<Socket>) -> Result<(), NetError> {
    let connection = sock.udp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    connection.connected.store(false, Ordering::Release);
    CONNECTIONS.remove(&connection);
    sock.clear_connection();
    Ok(())
}

/// Decode a received datagram.  Called from the internet layer with the
/// cursor at the UDP header.
pub fn decode(iface: &Arc<Iface>, pkt: &mut Packet) {
    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);

    let b = pkt.bytes();
    if b.len() < start + HEADER_LEN {
        klog_debug!("udp: truncated header");
        return;
    }

    let source_port = u16::from_be_bytes([b[start], b[start + 1]]);
    let target_port = u16::from_be_bytes([b[start + 2], b[start + 3]]);
    let length = u16::from_be_bytes([b[start + 4], b[start + 5]]) as usize;

    klog_trace!("udp: datagram {} -> {} ({} bytes)", source_port, target_port, length);

    if length < HEADER_LEN || start + length > b.len() {
        klog_debug!("udp: bad length {}", length);
        return;
    }

    pkt.advance(HEADER_LEN);

    // Name-server answers also go to the resolver.
    if source_port == dns::DNS_PORT {
        dns::deliver(iface, pkt);
    }

    match CONNECTIONS.get(Port(target_port), Port(source_port)) {
        Some(connection) => {
            if let Some(sock) = connection.socket.upgrade() {
                if sock.is_listening() {
                    sock.deliver(pkt.clone());
                }
            }
        }
        None => {
            klog_debug!("udp: no connection for {} -> {}", source_port, target_port);
        }
    }
}

fn prepare_for(connection: &UdpConnection, payload_size: usize, user_owned: bool) -> Result<Packet, NetError> {
    let mut pkt = ip::prepare(
        &ip::PacketDescriptor {
            payload_size: HEADER_LEN + payload_size,
            target: connection.remote_addr,
            protocol: IpProtocol::Udp,
        },
        user_owned,
    )?;

    let start = pkt.index();
    pkt.set_tag(Layer::Transport, start);
    {
        let length = (HEADER_LEN + payload_size) as u16;
        let b = pkt.bytes_mut();
        b[start..start + 2].copy_from_slice(&connection.local_port.to_network_bytes());
        b[start + 2..start + 4].copy_from_slice(&connection.remote_port.to_network_bytes());
        b[start + 4..start + 6].copy_from_slice(&length.to_be_bytes());
        b[start + 6..start + 8].copy_from_slice(&[0, 0]);
    }
    pkt.advance(HEADER_LEN);
    Ok(pkt)
}

fn compute_checksum(pkt: &mut Packet) {
    let start = pkt.tag(Layer::Transport);
    let src = ip::source_addr(pkt);
    let dst = {
        let l3 = pkt.tag(Layer::Net);
        let b = pkt.bytes();
        Ipv4Addr([
            b[l3 + ip::DST_OFFSET],
            b[l3 + ip::DST_OFFSET + 1],
            b[l3 + ip::DST_OFFSET + 2],
            b[l3 + ip::DST_OFFSET + 3],
        ])
    };

    let b = pkt.bytes_mut();
    let length = u16::from_be_bytes([b[start + 4], b[start + 5]]) as usize;
    b[start + 6..start + 8].copy_from_slice(&[0, 0]);

    let mut sum = checksum::pseudo_header_sum(src, dst, IpProtocol::Udp.as_u8(), length);
    sum = sum.wrapping_add(checksum::add_bytes(&b[start..start + length]));
    let csum = checksum::finalize_nonzero(sum);
    b[start + 6..start + 8].copy_from_slice(&csum.to_be_bytes());
}

/// Checksum the datagram (pseudo-header, header, payload) and pass it down.
pub fn finalize(iface: &Iface, pkt: &mut Packet) -> Result<(), NetError> {
    let start = pkt.tag(Layer::Transport);
    pkt.retreat(pkt.index() - start);
    compute_checksum(pkt);
    ip::finalize(iface, pkt)
}

/// Send `buf` as one datagram.
pub fn send(sock: &Arc<Socket>, buf: &[u8]) -> Result<(), NetError> {
    let connection = sock.udp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let iface = netdev::select_iface(connection.remote_addr)?;
    let mut pkt = prepare_for(&connection, buf.len(), false)?;

    let at = pkt.index();
    pkt.bytes_mut()[at..at + buf.len()].copy_from_slice(buf);

    finalize(&iface, &mut pkt)
}

fn read_payload(pkt: &Packet, buf: &mut [u8]) -> Result<usize, NetError> {
    let start = pkt.tag(Layer::Transport);
    let b = pkt.bytes();
    let length = u16::from_be_bytes([b[start + 4], b[start + 5]]) as usize;
    let payload_len = length.saturating_sub(HEADER_LEN);

    if payload_len > buf.len() {
        // Current policy: the datagram is consumed and lost.
        return Err(NetError::BufferSmall);
    }

    let at = pkt.index();
    buf[..payload_len].copy_from_slice(&b[at..at + payload_len]);
    Ok(payload_len)
}

/// Receive one datagram, blocking until one arrives.
pub fn receive(sock: &Arc<Socket>, buf: &mut [u8]) -> Result<usize, NetError> {
    let connection = sock.udp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = sock.wait_arrival()?;
    read_payload(&pkt, buf)
}

/// Receive one datagram, blocking at most `ms` milliseconds.
pub fn receive_timed(sock: &Arc<Socket>, buf: &mut [u8], ms: u64) -> Result<usize, NetError> {
    let connection = sock.udp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = sock.wait_arrival_timeout(ms)?;
    read_payload(&pkt, buf)
}

/// Prepare a user-owned datagram of `payload_size` bytes and register it on
/// the socket.  Returns the packet descriptor.
pub fn prepare_packet(sock: &Arc<Socket>, payload_size: usize) -> Result<usize, NetError> {
    let connection = sock.udp_connection()?;
    if !connection.is_connected() {
        return Err(NetError::NotConnected);
    }

    let pkt = prepare_for(&connection, payload_size, true)?;
    Ok(sock.register_packet(pkt))
}

/// Finalise and transmit a previously prepared packet.
pub fn finalize_packet(sock: &Arc<Socket>, fd: usize) -> Result<(), NetError> {
    let connection = sock.udp_connection()?;
    let mut pkt = sock.take_packet(fd).ok_or(NetError::InvalidDescriptor)?;
    let iface = netdev::select_iface(connection.remote_addr)?;
    finalize(&iface, &mut pkt)
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    CONNECTIONS.clear();
    LOCAL_PORT.store(1023, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) fn connection_count() -> usize {
    CONNECTIONS.len()
}
