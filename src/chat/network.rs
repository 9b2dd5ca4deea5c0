//! Datagram socket abstraction.
//!
//! The session reaches the network only through these traits, so tests
//! can inject an in-memory transport and exercise the whole gossip loop
//! without touching real sockets.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};

use crate::chat::netutil::listen_spec;

/// One bound datagram socket.
///
/// All methods take `&self` so the socket can be shared across tasks.
#[async_trait]
pub trait PacketSocket: Send + Sync {
    /// Receive the next datagram into `buf`, returning its length and
    /// source address.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to `addr`.
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// The address this socket is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Factory for sockets and peer-address resolution.
#[async_trait]
pub trait Network: Send + Sync {
    /// Bind a datagram socket to the given listen spec.
    async fn listen(&self, addr: &str) -> io::Result<Arc<dyn PacketSocket>>;

    /// Resolve a peer spec (`host:port`) to a concrete address.
    async fn resolve(&self, addr: &str) -> io::Result<SocketAddr>;
}

/// The real UDP stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpNetwork;

#[async_trait]
impl Network for UdpNetwork {
    async fn listen(&self, addr: &str) -> io::Result<Arc<dyn PacketSocket>> {
        let socket = UdpSocket::bind(listen_spec(addr)).await?;
        Ok(Arc::new(socket))
    }

    async fn resolve(&self, addr: &str) -> io::Result<SocketAddr> {
        lookup_host(addr.trim()).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr:?}"))
        })
    }
}

#[async_trait]
impl PacketSocket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}
