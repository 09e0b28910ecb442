//! Transport adapter
//!
//! Moves framed packets over two delivery channels: a reliable one carrying
//! config and audio packets, and a lossy (FEC coded) one carrying video
//! packets. Connecting and reconnecting the underlying sockets is the
//! caller's business; a channel only moves bytes and reports closure.

pub mod memory;
pub mod udp;
pub mod ws;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

/// Writing half of a delivery channel
#[async_trait]
pub trait PacketSink: Send {
    /// Send one framed packet
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError>;
}

/// Reading half of a delivery channel
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next framed packet. `TransportError::Closed` is terminal.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;
}

/// Sending halves of both channels
pub struct OutboundChannels {
    pub reliable: Box<dyn PacketSink>,
    pub lossy: Box<dyn PacketSink>,
}

/// Receiving halves of both channels
pub struct InboundChannels {
    pub reliable: Box<dyn PacketSource>,
    pub lossy: Box<dyn PacketSource>,
}

/// Both channels of one peer connection
pub struct TransportAdapter {
    outbound: OutboundChannels,
    inbound: InboundChannels,
}

impl TransportAdapter {
    pub fn new(outbound: OutboundChannels, inbound: InboundChannels) -> Self {
        Self { outbound, inbound }
    }

    pub async fn send_reliable(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.outbound.reliable.send(data).await
    }

    pub async fn send_lossy(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.outbound.lossy.send(data).await
    }

    pub async fn recv_reliable(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.reliable.recv().await
    }

    pub async fn recv_lossy(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.lossy.recv().await
    }

    /// Separate the halves so independent loops can own them
    pub fn split(self) -> (OutboundChannels, InboundChannels) {
        (self.outbound, self.inbound)
    }
}
