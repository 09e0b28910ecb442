//! Receiver session coordinator
//!
//! Builds both decode lanes, wires them to the two receive loops and manages
//! the session lifecycle.

use crate::codec::DecoderFactory;
use crate::config::SessionConfig;
use crate::display::{AudioOutput, PresentationSink};
use crate::pipeline::clock::OutputClock;
use crate::pipeline::handshake::ConfigHandshake;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::receiver::decode_stage::DecodeLane;
use crate::pipeline::receiver::decoder_handle::DecoderHandle;
use crate::pipeline::receiver::playback::AudioScheduler;
use crate::pipeline::receiver::receive_stage::{LossyReceiveStage, ReliableReceiveStage};
use crate::pipeline::session::SessionFlags;
use crate::pipeline::stage::spawn_stage;
use crate::pipeline::state::PipelineState;
use crate::pipeline::{DecodedAudioBuffer, DecodedVideoFrame, MediaKind};
use crate::transport::InboundChannels;
use anyhow::{Result, bail};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Decoder factories for both media kinds
#[derive(Clone)]
pub struct DecoderFactories {
    pub video: DecoderFactory<DecodedVideoFrame>,
    pub audio: DecoderFactory<DecodedAudioBuffer>,
}

/// Coordinates the receiver: reliable loop → audio lane → scheduler, lossy
/// loop → video lane → presenter
pub struct ReceiverCoordinator {
    config: SessionConfig,
    flags: SessionFlags,
    handshake: Arc<ConfigHandshake>,
    health: Arc<PipelineHealth>,
    state: PipelineState,
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl ReceiverCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        let handshake = Arc::new(ConfigHandshake::new(config.pending_limit));
        Self {
            config,
            flags: SessionFlags::new(),
            handshake,
            health: Arc::new(PipelineHealth::new()),
            state: PipelineState::Idle,
            cancel: CancellationToken::new(),
            loops: Vec::new(),
            monitor: None,
        }
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags.clone()
    }

    /// Whether each announced media kind has its config applied
    pub fn is_ready(&self) -> bool {
        let present = self.handshake.present_kinds();
        !present.is_empty() && self.handshake.all_ready(&present)
    }

    pub fn is_kind_ready(&self, kind: MediaKind) -> bool {
        self.handshake.is_ready(kind)
    }

    /// Spawn both receive loops.
    ///
    /// Decoders are created on the first config packet of their kind.
    pub fn launch<P, C, A>(
        &mut self,
        inbound: InboundChannels,
        decoders: DecoderFactories,
        presenter: P,
        clock: C,
        output: A,
    ) -> Result<()>
    where
        P: PresentationSink + 'static,
        C: OutputClock + 'static,
        A: AudioOutput + 'static,
    {
        if !self.state.can_transition_to(&PipelineState::Initializing) {
            bail!("cannot launch receiver while {}", self.state);
        }
        self.state = PipelineState::Initializing;
        self.cancel = CancellationToken::new();
        self.flags.set_receiving(true);

        let video_lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Video, decoders.video, self.config.max_decode_queue),
            presenter,
            self.handshake.clone(),
            self.flags.clone(),
            self.health.clone(),
        );
        let scheduler = AudioScheduler::new(
            clock,
            output,
            self.flags.clone(),
            self.health.clone(),
            self.config.latency_ceiling(),
            self.config.min_lookahead(),
        );
        let audio_lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Audio, decoders.audio, self.config.max_decode_queue),
            scheduler,
            self.handshake.clone(),
            self.flags.clone(),
            self.health.clone(),
        );

        let (config_tx, config_rx) = watch::channel(None);
        let reliable = ReliableReceiveStage::new(
            inbound.reliable,
            audio_lane,
            config_tx,
            self.health.clone(),
            self.cancel.clone(),
        );
        let lossy = LossyReceiveStage::new(
            inbound.lossy,
            video_lane,
            config_rx,
            self.health.clone(),
            self.cancel.clone(),
        );

        self.loops = vec![spawn_stage(reliable), spawn_stage(lossy)];

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
                        info!("Receiver pipeline health: {}", health.summary());
                        if flags.is_receiving() && health.is_stalled(period) {
                            warn!("Receiver pipeline stalled: nothing received for {:?}", period);
                        }
                    }
                }
            }
        }));

        self.state = PipelineState::Running {
            started_at: Instant::now(),
        };
        info!("ReceiverCoordinator: pipeline started");
        Ok(())
    }

    /// Stop delivering data; decoders stay configured
    pub fn pause(&mut self) {
        if self.state.is_running() {
            let ran = self.state.elapsed().unwrap_or_default();
            self.flags.set_receiving(false);
            self.state = PipelineState::Paused {
                paused_at: Instant::now(),
            };
            info!("ReceiverCoordinator: pipeline paused after {:?}", ran);
        }
    }

    pub fn resume(&mut self) {
        if self.state.is_paused() {
            let idle = self.state.elapsed().unwrap_or_default();
            self.flags.set_receiving(true);
            self.state = PipelineState::Running {
                started_at: Instant::now(),
            };
            info!("ReceiverCoordinator: pipeline resumed after {:?} paused", idle);
        }
    }

    /// Wait until both receive loops have ended (channels closed)
    pub async fn join(&mut self) {
        for handle in self.loops.drain(..) {
            let _ = handle.await;
        }
    }

    /// Cancel the loops and tear down decoders and handshake state
    ///
    /// Both lanes are reset on the way out, so a later `launch` starts from
    /// unconfigured decoders and a fresh audio cursor.
    pub async fn stop(&mut self) {
        if !self.state.can_transition_to(&PipelineState::Stopping) {
            return;
        }
        self.state = PipelineState::Stopping;
        self.flags.set_receiving(false);
        self.cancel.cancel();
        self.join().await;
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
        self.handshake.reset_all();
        self.state = PipelineState::Stopped;
        info!(
            "ReceiverCoordinator: pipeline stopped ({})",
            self.health.summary()
        );
    }
}
