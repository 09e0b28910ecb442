//! Receive loops
//!
//! Two independent stages, one per transport channel:
//! - `ReliableReceiveStage` reads config and audio packets. It owns the
//!   audio lane and forwards video configs to the lossy loop over a watch
//!   channel, which never blocks and keeps only the latest descriptor.
//! - `LossyReceiveStage` reads video packets and owns the video lane.
//!
//! Neither waits on the other, so a stall on one channel never starves the
//! other. A closed channel ends only its own loop.

use crate::error::{PipelineError, TransportError};
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::receiver::decode_stage::{DecodeLane, DecodedSink};
use crate::pipeline::{DecodedAudioBuffer, DecodedVideoFrame};
use crate::transport::PacketSource;
use crate::wire::{ConfigDescriptor, Packet, PacketType};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Decode a packet, counting it; malformed input is logged and dropped
fn parse(health: &PipelineHealth, data: Bytes) -> Option<Packet> {
    health.record_packet_received(data.len());
    match Packet::decode(data) {
        Ok(packet) => Some(packet),
        Err(e) => {
            health.record_malformed();
            debug!("{}", PipelineError::MalformedPacket(e));
            None
        }
    }
}

fn config_of(health: &PipelineHealth, packet: &Packet) -> Option<ConfigDescriptor> {
    match packet.descriptor() {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            health.record_malformed();
            warn!("{}", PipelineError::MalformedPacket(e));
            None
        }
    }
}

/// Loop over the reliable channel: configs and audio
pub struct ReliableReceiveStage<S> {
    source: Box<dyn PacketSource>,
    audio: DecodeLane<DecodedAudioBuffer, S>,
    video_config_tx: watch::Sender<Option<ConfigDescriptor>>,
    health: Arc<PipelineHealth>,
    cancel: CancellationToken,
}

impl<S: DecodedSink<DecodedAudioBuffer>> ReliableReceiveStage<S> {
    pub fn new(
        source: Box<dyn PacketSource>,
        audio: DecodeLane<DecodedAudioBuffer, S>,
        video_config_tx: watch::Sender<Option<ConfigDescriptor>>,
        health: Arc<PipelineHealth>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            audio,
            video_config_tx,
            health,
            cancel,
        }
    }

    pub fn audio_lane(&self) -> &DecodeLane<DecodedAudioBuffer, S> {
        &self.audio
    }

    fn handle(&mut self, data: Bytes) {
        let Some(packet) = parse(&self.health, data) else {
            return;
        };
        match packet.packet_type {
            PacketType::VideoConfig => {
                if let Some(descriptor) = config_of(&self.health, &packet) {
                    info!("ReliableReceiveStage: video config {}", descriptor);
                    self.video_config_tx.send_replace(Some(descriptor));
                }
            }
            PacketType::AudioConfig => {
                if let Some(descriptor) = config_of(&self.health, &packet)
                    && let Err(e) = self.audio.on_config(descriptor)
                {
                    error!("ReliableReceiveStage: {}", e);
                }
            }
            PacketType::Audio => {
                if let Some(chunk) = packet.into_chunk() {
                    self.audio.on_data(chunk);
                }
            }
            PacketType::VideoKey | PacketType::VideoDelta => {
                self.health.record_malformed();
                debug!("ReliableReceiveStage: video data on reliable channel, dropping");
            }
        }
    }
}

#[async_trait]
impl<S> PipelineStage for ReliableReceiveStage<S>
where
    S: DecodedSink<DecodedAudioBuffer>,
{
    async fn run(&mut self) -> Result<()> {
        info!("ReliableReceiveStage: started");
        let mut total = 0u64;

        loop {
            let data = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = self.source.recv() => received,
            };
            match data {
                Ok(data) => {
                    total += 1;
                    if total == 1 {
                        info!("ReliableReceiveStage: first packet received");
                    }
                    self.handle(data);
                }
                Err(TransportError::Closed) => {
                    info!("ReliableReceiveStage: finished ({} packets)", total);
                    return Err(PipelineError::ChannelClosed("reliable").into());
                }
                Err(e) => {
                    error!("ReliableReceiveStage: {}", e);
                    return Err(e.into());
                }
            }
        }

        info!("ReliableReceiveStage: cancelled ({} packets)", total);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReliableReceiveStage"
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.audio.flush();
        if self.cancel.is_cancelled() {
            self.audio.reset();
        }
        Ok(())
    }
}

/// Loop over the lossy channel: video data
pub struct LossyReceiveStage<S> {
    source: Box<dyn PacketSource>,
    video: DecodeLane<DecodedVideoFrame, S>,
    config_rx: watch::Receiver<Option<ConfigDescriptor>>,
    health: Arc<PipelineHealth>,
    cancel: CancellationToken,
}

impl<S: DecodedSink<DecodedVideoFrame>> LossyReceiveStage<S> {
    pub fn new(
        source: Box<dyn PacketSource>,
        video: DecodeLane<DecodedVideoFrame, S>,
        config_rx: watch::Receiver<Option<ConfigDescriptor>>,
        health: Arc<PipelineHealth>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            video,
            config_rx,
            health,
            cancel,
        }
    }

    pub fn video_lane(&self) -> &DecodeLane<DecodedVideoFrame, S> {
        &self.video
    }

    fn apply_latest_config(&mut self) {
        let latest = self.config_rx.borrow_and_update().clone();
        if let Some(descriptor) = latest
            && let Err(e) = self.video.on_config(descriptor)
        {
            error!("LossyReceiveStage: {}", e);
        }
    }

    fn handle(&mut self, data: Bytes) {
        let Some(packet) = parse(&self.health, data) else {
            return;
        };
        match packet.packet_type {
            PacketType::VideoKey | PacketType::VideoDelta => {
                if let Some(chunk) = packet.into_chunk() {
                    self.video.on_data(chunk);
                }
            }
            other => {
                self.health.record_malformed();
                debug!("LossyReceiveStage: {:?} on lossy channel, dropping", other);
            }
        }
    }
}

#[async_trait]
impl<S> PipelineStage for LossyReceiveStage<S>
where
    S: DecodedSink<DecodedVideoFrame>,
{
    async fn run(&mut self) -> Result<()> {
        info!("LossyReceiveStage: started");
        let mut total = 0u64;
        let mut configs_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                changed = self.config_rx.changed(), if configs_open => {
                    match changed {
                        Ok(()) => self.apply_latest_config(),
                        Err(_) => {
                            debug!("LossyReceiveStage: config channel closed");
                            configs_open = false;
                        }
                    }
                }
                received = self.source.recv() => match received {
                    Ok(data) => {
                        total += 1;
                        if total == 1 {
                            info!("LossyReceiveStage: first packet received");
                        }
                        self.handle(data);
                    }
                    Err(TransportError::Closed) => {
                        info!("LossyReceiveStage: finished ({} packets)", total);
                        return Err(PipelineError::ChannelClosed("lossy").into());
                    }
                    // datagram errors are per packet
                    Err(e) => warn!("LossyReceiveStage: {}", e),
                },
            }
        }

        info!("LossyReceiveStage: cancelled ({} packets)", total);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LossyReceiveStage"
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.video.flush();
        if self.cancel.is_cancelled() {
            self.video.reset();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::passthrough::{
        AUDIO_CODEC, PassthroughAudioDecoder, PassthroughVideoDecoder, VIDEO_CODEC,
        samples_to_bytes,
    };
    use crate::display::ChannelPresenter;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::handshake::ConfigHandshake;
    use crate::pipeline::receiver::decoder_handle::DecoderHandle;
    use crate::pipeline::receiver::playback::AudioScheduler;
    use crate::pipeline::session::SessionFlags;
    use crate::pipeline::{EncodedChunk, MediaKind, Timestamp};
    use crate::transport::PacketSink;
    use crate::transport::memory::{lossy_pair, reliable_pair};
    use crate::wire::{AudioDescriptor, VideoDescriptor};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn video_config() -> Bytes {
        Packet::config(&ConfigDescriptor::Video(VideoDescriptor {
            codec: VIDEO_CODEC.into(),
            coded_width: 64,
            coded_height: 48,
            frame_rate: None,
            description: None,
            orientation: None,
        }))
        .unwrap()
        .encode()
    }

    fn audio_config() -> Bytes {
        Packet::config(&ConfigDescriptor::Audio(AudioDescriptor {
            codec: AUDIO_CODEC.into(),
            sample_rate: 48_000,
            number_of_channels: 1,
            description: None,
        }))
        .unwrap()
        .encode()
    }

    fn video(ms: i64, key: bool) -> Bytes {
        Packet::data(&EncodedChunk::video(
            Bytes::from_static(b"frame"),
            Timestamp::from_micros(ms * 1000),
            key,
        ))
        .encode()
    }

    #[tokio::test]
    async fn test_video_config_reaches_lossy_loop() {
        let health = Arc::new(PipelineHealth::new());
        let flags = SessionFlags::new();
        let cancel = CancellationToken::new();
        let (config_tx, config_rx) = watch::channel(None);

        let (mut reliable_tx, reliable_rx) = reliable_pair(16);
        let (mut lossy_tx, lossy_rx) = lossy_pair(16);
        let (presenter, mut frames) = ChannelPresenter::channel(8);

        let video_lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Video, PassthroughVideoDecoder::factory(), 15),
            presenter,
            Arc::new(ConfigHandshake::new(8)),
            flags.clone(),
            health.clone(),
        );
        let clock = ManualClock::new();
        let audio_lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Audio, PassthroughAudioDecoder::factory(), 15),
            AudioScheduler::new(
                clock.clone(),
                crate::display::RingAudioOutput::new(4096, clock),
                flags.clone(),
                health.clone(),
                Duration::from_millis(100),
                Duration::from_millis(20),
            ),
            Arc::new(ConfigHandshake::new(8)),
            flags.clone(),
            health.clone(),
        );

        let mut reliable = ReliableReceiveStage::new(
            Box::new(reliable_rx),
            audio_lane,
            config_tx,
            health.clone(),
            cancel.clone(),
        );
        let mut lossy = LossyReceiveStage::new(
            Box::new(lossy_rx),
            video_lane,
            config_rx,
            health.clone(),
            cancel.clone(),
        );

        reliable_tx.send(video_config()).await.unwrap();
        reliable_tx.send(audio_config()).await.unwrap();
        reliable_tx
            .send(Packet::data(&EncodedChunk::audio(samples_to_bytes(&[0.0; 480]), Timestamp::default())).encode())
            .await
            .unwrap();
        reliable_tx.send(Bytes::from_static(&[9, 1, 2])).await.unwrap();
        drop(reliable_tx);

        let reliable_result = reliable.run().await;
        assert!(reliable_result.is_err(), "closed channel ends the loop");
        assert_eq!(health.audio_scheduled.load(Ordering::Relaxed), 1);
        assert_eq!(health.malformed_packets.load(Ordering::Relaxed), 1);

        // the reliable loop is gone; the lossy loop still works
        drop(reliable);
        lossy_tx.send(video(0, false)).await.unwrap();
        lossy_tx.send(video(33, true)).await.unwrap();
        lossy_tx.send(video(66, false)).await.unwrap();
        drop(lossy_tx);

        let lossy_result = lossy.run().await;
        let err = lossy_result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ChannelClosed("lossy"))
        ));

        let mut shown = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            shown.push(frame.timestamp.micros / 1000);
        }
        assert_eq!(shown, vec![33, 66]);
        assert_eq!(lossy.video_lane().handle().descriptor().map(|d| d.codec().to_string()), Some(VIDEO_CODEC.to_string()));
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_loop_and_resets_lane() {
        let health = Arc::new(PipelineHealth::new());
        let handshake = Arc::new(ConfigHandshake::new(8));
        let cancel = CancellationToken::new();
        let (_config_tx, config_rx) = watch::channel(None);
        let (_lossy_tx, lossy_rx) = lossy_pair(4);
        let (presenter, _frames) = ChannelPresenter::channel(1);

        let mut lossy = LossyReceiveStage::new(
            Box::new(lossy_rx),
            DecodeLane::new(
                DecoderHandle::new(MediaKind::Video, PassthroughVideoDecoder::factory(), 15),
                presenter,
                handshake.clone(),
                SessionFlags::new(),
                health.clone(),
            ),
            config_rx,
            health,
            cancel.clone(),
        );
        let descriptor = Packet::decode(video_config()).unwrap().descriptor().unwrap();
        lossy.video.on_config(descriptor).unwrap();
        assert!(handshake.is_ready(MediaKind::Video));

        cancel.cancel();
        assert!(lossy.run().await.is_ok());
        lossy.shutdown().await.unwrap();

        assert_eq!(
            lossy.video.handle().state(),
            crate::pipeline::receiver::decoder_handle::HandleState::Unconfigured
        );
        assert!(!handshake.is_ready(MediaKind::Video));
    }
}
