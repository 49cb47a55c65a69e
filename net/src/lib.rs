#![no_std]

//! DriftOS kernel network stack.
//!
//! A layered packet engine over tagged in-place buffers: ingress frames are
//! decoded up the stack (link → internet → transport) and egress packets
//! are composed back down, each layer recursively sizing the buffer for its
//! own header.  On top sit the two transports, connection-oriented (TCP,
//! client side) and connectionless (UDP), and the socket layer that binds
//! them to callers, with blocking and waking built on the scheduler's
//! primitives.
//!
//! External collaborators (scheduler, platform timer, driver, DNS resolver)
//! are late-bound: see `driftos_lib::kernel_services`, [`netdev`], and
//! [`dns`].

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod checksum;
pub mod connection;
pub mod dns;
pub mod ethernet;
pub mod icmp;
pub mod ingress;
pub mod ip;
pub mod neighbor;
pub mod netdev;
pub mod packet;
pub mod socket;
pub mod tcp;
pub mod types;
pub mod udp;

pub use ingress::net_rx;
pub use netdev::{register_iface, select_iface, Iface, TxFn};
pub use packet::{Layer, Packet, INVALID_FD};
pub use socket::{ConnData, Socket, SocketDomain, SocketProtocol, SocketType};
pub use types::{DevIndex, EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError, Port};

#[cfg(test)]
mod testutil;

#[cfg(test)]
mod checksum_tests;
#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod socket_tests;
