//! Client-side UDP transport.
//!
//! This module provides a thin UDP-based sender for OSC packets. It handles
//! serialization and datagram delivery, while leaving packet construction
//! and any reply handling to the caller.

use core::net::SocketAddr;
use osc_proto::{Packet, codec};

/// A UDP sender for OSC packets.
///
/// This type encapsulates a UDP socket used to send packets to one or more
/// destinations. It deliberately does **not** expose a receive API; packet
/// reception is the [`server`](crate::server) module's job.
///
/// The client itself is agnostic to whether packets are sent via unicast,
/// multicast, or broadcast addresses.
#[derive(Debug)]
pub struct Client {
    sock: std::net::UdpSocket,
}

impl Client {
    /// Creates a new client backed by the given UDP socket.
    #[inline(always)]
    pub fn new(sock: std::net::UdpSocket) -> Self {
        Self { sock }
    }

    /// Creates a new client on an OS-assigned local port.
    pub fn bind_ephemeral() -> std::io::Result<Self> {
        std::net::UdpSocket::bind(("0.0.0.0", 0)).map(Self::new)
    }

    /// Serializes and sends a packet to the specified destination address as
    /// a single UDP datagram.
    ///
    /// The destination address may be unicast, multicast, or broadcast.
    pub fn send(&self, packet: &Packet, dest_addr: SocketAddr) -> std::io::Result<()> {
        let bytes = codec::serialize(packet);

        let res = self.sock.send_to(&bytes, dest_addr);

        res.and_then(|n| {
            (n == bytes.len())
                .then_some(())
                .ok_or(std::io::ErrorKind::FileTooLarge.into())
        })
    }
}
