//! Internal utilities.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Create and bind a UDP socket.
///
/// For IPv6 addresses, sets `IPV6_V6ONLY = false` to enable dual-stack mode.
/// Port 0 lets the kernel choose an ephemeral source port.
pub(crate) fn bind_udp_socket(
    addr: SocketAddr,
    recv_buffer_size: Option<usize>,
) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    if let Some(size) = recv_buffer_size {
        // Kernel caps at rmem_max
        let _ = socket.set_recv_buffer_size(size);
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Fill `buf` from the OS random source.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| Error::Io {
        target: None,
        source: io::Error::other(format!("random source unavailable: {}", e)),
    })
}

/// A random 32-bit value from the OS random source.
pub(crate) fn random_u32() -> Result<u32> {
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Hex encoding helpers.
pub mod hex {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    /// Lowercase hex rendering of `data` with no separators.
    pub fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len() * 2);
        for &b in data {
            out.push(char::from(DIGITS[usize::from(b >> 4)]));
            out.push(char::from(DIGITS[usize::from(b & 0x0F)]));
        }
        out
    }
}
