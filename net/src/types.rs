//! Wire-level primitive types.
//!
//! Addresses, ports, and protocol discriminators move through the stack as
//! dedicated wrapper types, so a host-order and a network-order value, or
//! a port and a device index, can never be swapped silently.  Everything
//! here is `Copy` and fits in a register or two.

use core::fmt;

/// An IPv4 address, kept as its four wire bytes (big-endian).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    /// The limited broadcast address, `255.255.255.255`.
    pub const BROADCAST: Self = Self([0xff; 4]);

    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// `true` for the limited broadcast address.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 4]
    }

    /// `true` anywhere in `127.0.0.0/8`.
    #[inline]
    pub const fn is_loopback(&self) -> bool {
        self.0[0] == 127
    }

    /// `true` for `0.0.0.0`, the "no address yet" value.
    #[inline]
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A transport port in host byte order; conversion to the wire is always
/// explicit.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(pub u16);

impl Port {
    /// Big-endian bytes for a header field.
    #[inline]
    pub const fn to_network_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 48-bit Ethernet address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// `ff:ff:ff:ff:ff:ff`, received by every station on the segment.
    pub const BROADCAST: Self = Self([0xff; 6]);

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Position of an interface in the device registry.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevIndex(pub usize);

/// The ethertypes the link layer dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
}

impl EtherType {
    /// Recognise a wire value; anything else stays a raw `u16` and is
    /// dropped by the caller.
    #[inline]
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            0x0800 => Some(Self::Ipv4),
            0x0806 => Some(Self::Arp),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// The protocol numbers the internet layer routes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IpProtocol {
    Icmp = 0x01,
    Tcp = 0x06,
    Udp = 0x11,
}

impl IpProtocol {
    #[inline]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Icmp),
            0x06 => Some(Self::Tcp),
            0x11 => Some(Self::Udp),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Network error type.
///
/// Internal code uses `NetError` exclusively.  Conversion to POSIX errno
/// happens at the syscall boundary via [`to_errno`](NetError::to_errno).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetError {
    /// Operation requires a connected state that is absent.
    NotConnected,
    /// Caller's read buffer cannot hold the inbound payload.
    BufferSmall,
    /// No packet available within the requested deadline.
    SocketTimeout,
    /// Stream transport operation exhausted its retries.
    TcpError,
    /// The interface refused to transmit (link down).
    InterfaceDown,
    /// No usable interface or no link address for the destination.
    NoRoute,
    /// Packet allocation failed.
    OutOfMemory,
    /// Unknown prepared-packet descriptor.
    InvalidDescriptor,
}

impl NetError {
    /// Convert to a POSIX errno value (negative) for the syscall boundary.
    pub const fn to_errno(&self) -> i32 {
        match self {
            Self::NotConnected => -107,      // ENOTCONN
            Self::BufferSmall => -90,        // EMSGSIZE
            Self::SocketTimeout => -110,     // ETIMEDOUT
            Self::TcpError => -103,          // ECONNABORTED
            Self::InterfaceDown => -100,     // ENETDOWN
            Self::NoRoute => -113,           // EHOSTUNREACH
            Self::OutOfMemory => -12,        // ENOMEM
            Self::InvalidDescriptor => -9,   // EBADF
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "socket not connected"),
            Self::BufferSmall => write!(f, "buffer too small for payload"),
            Self::SocketTimeout => write!(f, "socket operation timed out"),
            Self::TcpError => write!(f, "tcp operation failed"),
            Self::InterfaceDown => write!(f, "interface is down"),
            Self::NoRoute => write!(f, "no route to host"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidDescriptor => write!(f, "invalid packet descriptor"),
        }
    }
}
