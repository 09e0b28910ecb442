//! Sender pipeline coordinator
//!
//! Chains encode → transmit stages per media kind and manages their lifecycle.

use anyhow::{Result, bail};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::MediaEncoder;
use crate::config::SessionConfig;
use crate::pipeline::handshake::ConfigHandshake;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::sender::encode_stage::EncodeStage;
use crate::pipeline::sender::transmit_stage::{Outbound, TransmitStage};
use crate::pipeline::session::SessionFlags;
use crate::pipeline::stage::spawn_stage;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{MediaKind, RawFrame};
use crate::transport::OutboundChannels;

/// Coordinates the sender pipeline: Encode → Transmit (reliable + lossy)
pub struct SenderCoordinator {
    config: SessionConfig,
    flags: SessionFlags,
    handshake: Arc<ConfigHandshake>,
    health: Arc<PipelineHealth>,
    state: PipelineState,
    cancel: CancellationToken,
    /// Keyframe request shared with the video encode stage
    force_keyframe: Arc<AtomicBool>,
    outbound: Option<Outbound>,
    encoders: Vec<JoinHandle<()>>,
    writers: Vec<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl SenderCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        let handshake = Arc::new(ConfigHandshake::new(config.pending_limit));
        Self {
            config,
            flags: SessionFlags::new(),
            handshake,
            health: Arc::new(PipelineHealth::new()),
            state: PipelineState::Idle,
            cancel: CancellationToken::new(),
            force_keyframe: Arc::new(AtomicBool::new(false)),
            outbound: None,
            encoders: Vec::new(),
            writers: Vec::new(),
            monitor: None,
        }
    }

    /// Get the pipeline health metrics
    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Get the current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags.clone()
    }

    /// Whether the config of `kind` has gone out
    pub fn is_kind_ready(&self, kind: MediaKind) -> bool {
        self.handshake.is_ready(kind)
    }

    /// Ask the video encoder for a keyframe on its next frame
    pub fn request_keyframe(&self) {
        self.force_keyframe.store(true, Ordering::Release);
    }

    /// Spawn the transmit stages over the transport sinks
    pub fn launch(&mut self, channels: OutboundChannels) -> Result<()> {
        if !self.state.can_transition_to(&PipelineState::Initializing) {
            bail!("cannot launch sender while {}", self.state);
        }
        self.state = PipelineState::Initializing;
        self.cancel = CancellationToken::new();
        self.flags.set_sending(true);

        let (outbound, reliable_rx, lossy_rx) = Outbound::channel(self.config.channel_capacity);
        let reliable = TransmitStage::reliable(
            channels.reliable,
            reliable_rx,
            self.handshake.clone(),
            outbound.lossy_sender(),
            self.health.clone(),
            self.cancel.clone(),
        );
        let lossy = TransmitStage::lossy(
            channels.lossy,
            lossy_rx,
            self.health.clone(),
            self.cancel.clone(),
        );
        self.writers = vec![spawn_stage(reliable), spawn_stage(lossy)];
        self.outbound = Some(outbound);

        // Log health metrics periodically
        let health = self.health.clone();
        let flags = self.flags.clone();
        let cancel = self.cancel.clone();
        let period = self.config.health_log_interval();
        self.monitor = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        info!("Sender pipeline health: {}", health.summary());
                        if flags.is_sending() && health.is_stalled(period) {
                            warn!("Sender pipeline stalled: nothing sent for {:?}", period);
                        }
                    }
                }
            }
        }));

        self.state = PipelineState::Running {
            started_at: Instant::now(),
        };
        info!("SenderCoordinator: pipeline started");
        Ok(())
    }

    /// Encode frames from `frames` with `encoder` until the source is
    /// exhausted or the session stops
    pub fn start(
        &mut self,
        encoder: Box<dyn MediaEncoder>,
        frames: mpsc::Receiver<RawFrame>,
    ) -> Result<()> {
        let Some(outbound) = self.outbound.clone() else {
            bail!("sender not launched");
        };
        let kind = encoder.kind();
        let mut stage = EncodeStage::new(
            encoder,
            self.config.keyframe_interval,
            self.handshake.clone(),
            self.flags.clone(),
            self.health.clone(),
            self.cancel.clone(),
        );
        if kind == MediaKind::Video {
            stage = stage.with_force_keyframe(self.force_keyframe.clone());
        }
        stage.set_input(frames);
        stage.set_output(outbound);
        self.encoders.push(spawn_stage(stage));
        info!("SenderCoordinator: {} encoding started", kind);
        Ok(())
    }

    /// Pause streaming; frames arriving meanwhile are dropped
    pub fn pause(&mut self) {
        if self.state.is_running() {
            let ran = self.state.elapsed().unwrap_or_default();
            self.flags.set_sending(false);
            self.state = PipelineState::Paused {
                paused_at: Instant::now(),
            };
            info!("SenderCoordinator: pipeline paused after {:?}", ran);
        }
    }

    /// Resume from pause
    pub fn resume(&mut self) {
        if self.state.is_paused() {
            let idle = self.state.elapsed().unwrap_or_default();
            self.flags.set_sending(true);
            self.state = PipelineState::Running {
                started_at: Instant::now(),
            };
            info!("SenderCoordinator: pipeline resumed after {:?} paused", idle);
        }
    }

    /// Wait for every frame source to end and every queued packet to go out
    pub async fn join(&mut self) {
        for handle in self.encoders.drain(..) {
            let _ = handle.await;
        }
        // writers end once no encoder can queue anything
        self.outbound = None;
        for handle in self.writers.drain(..) {
            let _ = handle.await;
        }
    }

    /// Cancel all stages and forget handshake state
    pub async fn stop(&mut self) {
        if !self.state.can_transition_to(&PipelineState::Stopping) {
            return;
        }
        self.state = PipelineState::Stopping;
        self.flags.set_sending(false);
        self.cancel.cancel();
        self.join().await;
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
        self.handshake.reset_all();
        self.force_keyframe.store(false, Ordering::Release);
        self.state = PipelineState::Stopped;
        info!(
            "SenderCoordinator: pipeline stopped ({})",
            self.health.summary()
        );
    }
}
