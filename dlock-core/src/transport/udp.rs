//! UDP datagram transport.

use std::net::SocketAddr;

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::trace;

use crate::Transport;
use crate::error::TransportError;

/// Largest datagram accepted by [`UdpTransport::recv`]; longer ones are
/// truncated by the socket and then fail to decode.
pub const MAX_DATAGRAM: usize = 2048;

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the socket cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, Report<TransportError>> {
        let socket = UdpSocket::bind(addr)
            .await
            .change_context(TransportError::Io)
            .attach("failed to bind UDP socket")?;
        Ok(Self { socket })
    }

    #[must_use]
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, Report<TransportError>> {
        self.socket.local_addr().change_context(TransportError::Io)
    }
}

impl Transport for UdpTransport {
    type Addr = SocketAddr;

    async fn send(&self, to: &SocketAddr, payload: Bytes) -> Result<(), Report<TransportError>> {
        self.socket
            .send_to(&payload, to)
            .await
            .change_context(TransportError::Io)
            .attach_with(|| format!("sending to {to}"))?;
        trace!(%to, len = payload.len(), "datagram sent");
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, Report<TransportError>> {
        let mut buf = vec![0; MAX_DATAGRAM];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .change_context(TransportError::Io)?;
        buf.truncate(len);
        trace!(%from, len, "datagram received");
        Ok(Bytes::from(buf))
    }
}
