//! UDP transport implementation.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::Transport;
use crate::error::{Error, Result};
use crate::util::bind_udp_socket;

/// UDP socket transport.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a socket on `addr` (port 0 for an ephemeral port).
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = bind_udp_socket(addr, None).map_err(|e| Error::Io {
            target: None,
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io {
            target: None,
            source: e,
        })?;

        tracing::debug!(target: "snmp_session::transport", { snmp.local_addr = %local_addr }, "UDP transport bound");

        Ok(Self { socket, local_addr })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        tracing::trace!(target: "snmp_session::transport", { snmp.target = %target, snmp.bytes = data.len() }, "UDP send");
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| Error::Io {
                target: Some(target),
                source: e,
            })?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (len, source) = self.socket.recv_from(buf).await.map_err(|e| Error::Io {
            target: None,
            source: e,
        })?;
        tracing::trace!(target: "snmp_session::transport", { snmp.source = %source, snmp.bytes = len }, "UDP recv");
        Ok((len, source))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
