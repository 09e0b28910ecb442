//! Datagram channel for the lossy path
//!
//! One packet per datagram on a connected UDP socket. Loss, duplication and
//! reordering are left to the caller (or an FEC layer in front of it).

use crate::error::TransportError;
use crate::transport::{PacketSink, PacketSource};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Largest datagram we accept
const MAX_DATAGRAM: usize = 65_507;

pub struct UdpSink {
    socket: Arc<UdpSocket>,
}

pub struct UdpSource {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

/// Bind `local`, connect to `remote` and split into halves
pub async fn connect(
    local: SocketAddr,
    remote: SocketAddr,
) -> Result<(UdpSink, UdpSource), TransportError> {
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(from_socket(socket))
}

/// Split an already connected socket
pub fn from_socket(socket: UdpSocket) -> (UdpSink, UdpSource) {
    let socket = Arc::new(socket);
    (
        UdpSink {
            socket: socket.clone(),
        },
        UdpSource {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        },
    )
}

#[async_trait]
impl PacketSink for UdpSink {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.socket.send(&data).await?;
        Ok(())
    }
}

#[async_trait]
impl PacketSource for UdpSource {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let len = self.socket.recv(&mut self.buf).await?;
        Ok(Bytes::copy_from_slice(&self.buf[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_datagram_round_trip() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.connect(b.local_addr().unwrap()).await.unwrap();
        b.connect(a.local_addr().unwrap()).await.unwrap();

        let (mut a_tx, _a_rx) = from_socket(a);
        let (_b_tx, mut b_rx) = from_socket(b);

        a_tx.send(Bytes::from_static(&[2, 0, 0, 0, 1, 9])).await.unwrap();
        let got = b_rx.recv().await.unwrap();
        assert_eq!(&got[..], &[2, 0, 0, 0, 1, 9]);
    }
}
