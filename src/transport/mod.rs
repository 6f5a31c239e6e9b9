//! Transport layer abstraction.
//!
//! A session owns one datagram transport shared by all of its requests.
//! Requests go to `target:port`, notifications to `target:trap_port`, and
//! replies may arrive from either.

mod udp;

pub use udp::UdpTransport;

use std::future::Future;
use std::net::SocketAddr;

use crate::error::Result;

/// Address family of the socket a session binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Udp4,
    Udp6,
}

impl TransportKind {
    /// Wildcard bind address for this family.
    pub fn unspecified(self) -> std::net::IpAddr {
        match self {
            TransportKind::Udp4 => std::net::Ipv4Addr::UNSPECIFIED.into(),
            TransportKind::Udp6 => std::net::Ipv6Addr::UNSPECIFIED.into(),
        }
    }
}

/// Datagram transport used by a session task.
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram to `target`.
    fn send_to(&self, data: &[u8], target: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Receive one datagram from any source.
    ///
    /// Must be cancel safe: the session drops this future whenever another
    /// event is ready.
    fn recv_from(&self, buf: &mut [u8])
    -> impl Future<Output = Result<(usize, SocketAddr)>> + Send;

    /// Local bind address.
    fn local_addr(&self) -> SocketAddr;
}
