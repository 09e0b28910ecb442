//! In-process channels backed by tokio mpsc
//!
//! The reliable flavor waits for capacity; the lossy flavor drops packets
//! when the receiver falls behind, like a congested datagram link.

use crate::error::TransportError;
use crate::transport::{InboundChannels, OutboundChannels, PacketSink, PacketSource, TransportAdapter};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc;

pub struct MemorySink {
    tx: mpsc::Sender<Bytes>,
    lossy: bool,
    dropped: u64,
}

impl MemorySink {
    /// Packets discarded because the lossy channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl PacketSink for MemorySink {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if !self.lossy {
            return self.tx.send(data).await.map_err(|_| TransportError::Closed);
        }
        match self.tx.try_send(data) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!("memory channel full, dropped packet ({} total)", self.dropped);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

pub struct MemorySource {
    rx: mpsc::Receiver<Bytes>,
}

#[async_trait]
impl PacketSource for MemorySource {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

/// Channel that never loses packets
pub fn reliable_pair(capacity: usize) -> (MemorySink, MemorySource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        MemorySink {
            tx,
            lossy: false,
            dropped: 0,
        },
        MemorySource { rx },
    )
}

/// Channel that drops packets when `capacity` are in flight
pub fn lossy_pair(capacity: usize) -> (MemorySink, MemorySource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        MemorySink {
            tx,
            lossy: true,
            dropped: 0,
        },
        MemorySource { rx },
    )
}

/// Two connected peers: whatever one sends, the other receives
pub fn loopback(capacity: usize) -> (TransportAdapter, TransportAdapter) {
    let (a_reliable_tx, b_reliable_rx) = reliable_pair(capacity);
    let (a_lossy_tx, b_lossy_rx) = lossy_pair(capacity);
    let (b_reliable_tx, a_reliable_rx) = reliable_pair(capacity);
    let (b_lossy_tx, a_lossy_rx) = lossy_pair(capacity);

    let a = TransportAdapter::new(
        OutboundChannels {
            reliable: Box::new(a_reliable_tx),
            lossy: Box::new(a_lossy_tx),
        },
        InboundChannels {
            reliable: Box::new(a_reliable_rx),
            lossy: Box::new(a_lossy_rx),
        },
    );
    let b = TransportAdapter::new(
        OutboundChannels {
            reliable: Box::new(b_reliable_tx),
            lossy: Box::new(b_lossy_tx),
        },
        InboundChannels {
            reliable: Box::new(b_reliable_rx),
            lossy: Box::new(b_lossy_rx),
        },
    );
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lossy_drops_when_full() {
        let (mut tx, mut rx) = lossy_pair(2);
        for i in 0..5u8 {
            tx.send(Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(tx.dropped(), 3);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from(vec![0]));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from(vec![1]));
    }

    #[tokio::test]
    async fn test_closed_is_reported() {
        let (tx, mut rx) = reliable_pair(1);
        drop(tx);
        assert!(matches!(rx.recv().await, Err(TransportError::Closed)));

        let (mut tx, rx) = lossy_pair(1);
        drop(rx);
        assert!(matches!(
            tx.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_loopback_routes_both_channels() {
        let (mut a, mut b) = loopback(8);
        a.send_reliable(Bytes::from_static(b"cfg")).await.unwrap();
        a.send_lossy(Bytes::from_static(b"vid")).await.unwrap();
        b.send_reliable(Bytes::from_static(b"back")).await.unwrap();

        assert_eq!(&b.recv_reliable().await.unwrap()[..], b"cfg");
        assert_eq!(&b.recv_lossy().await.unwrap()[..], b"vid");
        assert_eq!(&a.recv_reliable().await.unwrap()[..], b"back");
    }
}
