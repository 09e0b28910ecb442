//! Transmit stages for the sender pipeline
//!
//! One stage per transport channel drains a packet queue into its
//! `PacketSink`. The reliable stage carries config and audio packets; once a
//! config packet is on the wire it marks the kind sent in the handshake and
//! transmits whatever data was held back for it, before anything newer.

use crate::error::{PipelineError, TransportError};
use crate::pipeline::PipelineStage;
use crate::pipeline::handshake::ConfigHandshake;
use crate::pipeline::health::{DropReason, PipelineHealth};
use crate::pipeline::MediaKind;
use crate::transport::PacketSink;
use crate::wire::{Packet, PacketType};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Channel a packet travels on
fn is_lossy(packet: &Packet) -> bool {
    matches!(
        packet.packet_type,
        PacketType::VideoKey | PacketType::VideoDelta
    )
}

/// Queues feeding the two transmit stages
#[derive(Clone)]
pub struct Outbound {
    reliable_tx: mpsc::Sender<Packet>,
    lossy_tx: mpsc::Sender<Packet>,
}

impl Outbound {
    /// Queues plus their receiving ends (reliable, lossy)
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Packet>, mpsc::Receiver<Packet>) {
        let (reliable_tx, reliable_rx) = mpsc::channel(capacity);
        let (lossy_tx, lossy_rx) = mpsc::channel(capacity);
        (
            Self {
                reliable_tx,
                lossy_tx,
            },
            reliable_rx,
            lossy_rx,
        )
    }

    /// Sender half of the lossy queue, for the reliable stage's releases
    pub fn lossy_sender(&self) -> mpsc::Sender<Packet> {
        self.lossy_tx.clone()
    }

    /// Queue a data packet without waiting. A full queue drops the packet.
    pub fn route(&self, packet: Packet) -> Result<(), DropReason> {
        let tx = if is_lossy(&packet) {
            &self.lossy_tx
        } else {
            &self.reliable_tx
        };
        match tx.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DropReason::QueueFull),
            Err(TrySendError::Closed(_)) => Err(DropReason::Inactive),
        }
    }

    /// Queue a config packet, waiting for room
    pub async fn send_config(&self, packet: Packet) -> Result<(), PipelineError> {
        self.reliable_tx
            .send(packet)
            .await
            .map_err(|_| PipelineError::ChannelClosed("reliable"))
    }
}

/// Drains one packet queue into a transport channel
pub struct TransmitStage {
    name: &'static str,
    sink: Box<dyn PacketSink>,
    input_rx: Option<mpsc::Receiver<Packet>>,
    /// Set on the reliable stage only
    handshake: Option<Arc<ConfigHandshake>>,
    /// Where held-back video goes once its config is out
    lossy_tx: Option<mpsc::Sender<Packet>>,
    health: Arc<PipelineHealth>,
    cancel: CancellationToken,
}

impl TransmitStage {
    pub fn reliable(
        sink: Box<dyn PacketSink>,
        input_rx: mpsc::Receiver<Packet>,
        handshake: Arc<ConfigHandshake>,
        lossy_tx: mpsc::Sender<Packet>,
        health: Arc<PipelineHealth>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: "ReliableTransmitStage",
            sink,
            input_rx: Some(input_rx),
            handshake: Some(handshake),
            lossy_tx: Some(lossy_tx),
            health,
            cancel,
        }
    }

    pub fn lossy(
        sink: Box<dyn PacketSink>,
        input_rx: mpsc::Receiver<Packet>,
        health: Arc<PipelineHealth>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: "LossyTransmitStage",
            sink,
            input_rx: Some(input_rx),
            handshake: None,
            lossy_tx: None,
            health,
            cancel,
        }
    }

    fn is_reliable(&self) -> bool {
        self.handshake.is_some()
    }

    async fn transmit(&mut self, packet: &Packet) -> Result<()> {
        let data = packet.encode();
        let len = data.len();
        match self.sink.send(data).await {
            Ok(()) => {
                self.health.record_packet_sent(len);
                Ok(())
            }
            Err(TransportError::Closed) => {
                Err(PipelineError::ChannelClosed(if self.is_reliable() { "reliable" } else { "lossy" }).into())
            }
            Err(e) if self.is_reliable() => Err(e.into()),
            Err(e) => {
                warn!("{}: {}", self.name, e);
                Ok(())
            }
        }
    }

    /// The config for `kind` is out: release held-back data, oldest first.
    /// Returns reliable-channel packets to transmit right away.
    fn release_pending(&self, kind: MediaKind, config: &Packet) -> Vec<Packet> {
        let (Some(handshake), Some(lossy_tx)) = (&self.handshake, &self.lossy_tx) else {
            return Vec::new();
        };
        // a newer descriptor may have superseded this one while queued
        if handshake.descriptor(kind).as_ref() != config.descriptor().ok().as_ref() {
            debug!("{}: superseded {} config sent", self.name, kind);
            return Vec::new();
        }

        let mut reliable = Vec::new();
        let (flushed, dropped) = handshake.mark_sent_with(kind, |packet| {
            if !is_lossy(&packet) {
                reliable.push(packet);
                true
            } else {
                lossy_tx.try_send(packet).is_ok()
            }
        });
        for _ in 0..dropped {
            self.health.record_drop(DropReason::QueueFull);
        }
        if dropped > 0 {
            warn!(
                "{}: {} of {} held {} packets dropped, waiting for a keyframe",
                self.name, dropped, flushed, kind
            );
        }
        info!(
            "{}: {} config sent, {} held packets released",
            self.name, kind, flushed - dropped
        );
        reliable
    }
}

#[async_trait]
impl PipelineStage for TransmitStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No input channel"))?;

        info!("{}: started", self.name);
        let mut sent = 0u64;

        loop {
            let packet = tokio::select! {
                _ = self.cancel.cancelled() => break,
                packet = input_rx.recv() => match packet {
                    Some(packet) => packet,
                    None => break,
                },
            };

            if let Err(e) = self.transmit(&packet).await {
                error!("{}: {}", self.name, e);
                return Err(e);
            }
            sent += 1;

            if packet.is_config() {
                for held in self.release_pending(packet.kind(), &packet) {
                    self.transmit(&held).await?;
                    sent += 1;
                }
            }
        }

        info!("{}: finished, {} packets transmitted", self.name, sent);
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
