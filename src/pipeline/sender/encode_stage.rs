//! Encode stage for the sender pipeline
//!
//! Drives one `MediaEncoder` over raw frames of its kind. The first output
//! carrying encoder metadata becomes a config packet on the reliable queue;
//! data chunks pass the config handshake before they are routed.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{EncoderOutput, MediaEncoder};
use crate::pipeline::PipelineStage;
use crate::pipeline::handshake::{Admission, ConfigHandshake};
use crate::pipeline::health::{DropReason, PipelineHealth};
use crate::pipeline::sender::transmit_stage::Outbound;
use crate::pipeline::session::SessionFlags;
use crate::pipeline::types::{MediaKind, RawFrame};
use crate::wire::Packet;

/// Encode stage: raw frames in, config and data packets out
pub struct EncodeStage {
    /// Force a keyframe on the next video frame
    pub force_keyframe: Arc<AtomicBool>,
    encoder: Box<dyn MediaEncoder>,
    kind: MediaKind,
    keyframe_interval: u32,
    frame_index: u64,
    handshake: Arc<ConfigHandshake>,
    flags: SessionFlags,
    health: Arc<PipelineHealth>,
    cancel: CancellationToken,
    input_rx: Option<mpsc::Receiver<RawFrame>>,
    outbound: Option<Outbound>,
}

impl EncodeStage {
    pub fn new(
        encoder: Box<dyn MediaEncoder>,
        keyframe_interval: u32,
        handshake: Arc<ConfigHandshake>,
        flags: SessionFlags,
        health: Arc<PipelineHealth>,
        cancel: CancellationToken,
    ) -> Self {
        let kind = encoder.kind();
        Self {
            force_keyframe: Arc::new(AtomicBool::new(false)),
            encoder,
            kind,
            keyframe_interval: keyframe_interval.max(1),
            frame_index: 0,
            handshake,
            flags,
            health,
            cancel,
            input_rx: None,
            outbound: None,
        }
    }

    /// Share a keyframe request flag with the owner of this stage
    pub fn with_force_keyframe(mut self, flag: Arc<AtomicBool>) -> Self {
        self.force_keyframe = flag;
        self
    }

    /// Set the input channel (raw frames from capture)
    pub fn set_input(&mut self, rx: mpsc::Receiver<RawFrame>) {
        self.input_rx = Some(rx);
    }

    /// Set the queues packets are routed to
    pub fn set_output(&mut self, outbound: Outbound) {
        self.outbound = Some(outbound);
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Whether the next video frame must be self-contained
    fn next_is_keyframe(&mut self) -> bool {
        if self.kind != MediaKind::Video {
            return false;
        }
        let forced = self.force_keyframe.swap(false, Ordering::AcqRel);
        let cadence = self.frame_index % u64::from(self.keyframe_interval) == 0;
        self.frame_index += 1;
        forced || cadence
    }

    /// Package encoder outputs and hand them on
    async fn dispatch(&mut self, outbound: &Outbound, outputs: Vec<EncoderOutput>) -> Result<()> {
        for output in outputs {
            if let Some(descriptor) = output.metadata {
                if self.handshake.record_config(descriptor.clone()) {
                    let packet = Packet::config(&descriptor)?;
                    info!(
                        "EncodeStage({}): config {} queued ({} bytes)",
                        self.kind,
                        descriptor.codec(),
                        packet.wire_len()
                    );
                    outbound.send_config(packet).await?;
                }
            }

            let is_keyframe = output.chunk.is_keyframe;
            self.health.record_encoded(is_keyframe);

            let mut routed = Ok(());
            let admission = self
                .handshake
                .admit(Packet::data(&output.chunk), |packet| routed = outbound.route(packet));

            let reason = match (admission, routed) {
                (Admission::Dropped(reason), _) | (Admission::Forwarded, Err(reason)) => reason,
                _ => continue,
            };
            self.health.record_drop(reason);
            if reason == DropReason::QueueFull && self.kind == MediaKind::Video {
                // later deltas would reference the lost frame
                self.force_keyframe.store(true, Ordering::Release);
            }
            debug!("EncodeStage({}): chunk dropped ({:?})", self.kind, reason);
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStage for EncodeStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No input channel"))?;
        let outbound = self
            .outbound
            .take()
            .ok_or_else(|| anyhow::anyhow!("No output channel"))?;

        info!("EncodeStage({}): started", self.kind);
        let mut encoded = 0u64;
        let mut was_sending = true;

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = input_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if frame.kind() != self.kind {
                warn!("EncodeStage({}): {} frame ignored", self.kind, frame.kind());
                continue;
            }

            if !self.flags.is_sending() {
                was_sending = false;
                self.health.record_drop(DropReason::Inactive);
                continue;
            }
            if !was_sending {
                // the receiver missed every frame in between
                was_sending = true;
                self.force_keyframe.store(true, Ordering::Release);
            }

            let keyframe = self.next_is_keyframe();
            match self.encoder.encode(frame, keyframe) {
                Ok(outputs) => {
                    encoded += 1;
                    self.dispatch(&outbound, outputs).await?;
                }
                Err(e) => {
                    self.health.record_encode_error();
                    warn!("EncodeStage({}): frame skipped: {}", self.kind, e);
                    if keyframe {
                        self.force_keyframe.store(true, Ordering::Release);
                    }
                }
            }
        }

        match self.encoder.flush() {
            Ok(outputs) => self.dispatch(&outbound, outputs).await?,
            Err(e) => warn!("EncodeStage({}): flush failed: {}", self.kind, e),
        }

        info!("EncodeStage({}): finished, {} frames encoded", self.kind, encoded);
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.kind {
            MediaKind::Video => "VideoEncodeStage",
            MediaKind::Audio => "AudioEncodeStage",
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.encoder.close();
        Ok(())
    }
}
