//! Decode lane for one media kind
//!
//! Ties a `DecoderHandle` to the receiver side of the config handshake, the
//! session flags and a downstream sink. Each lane is owned by exactly one
//! receive loop, so its decoder is never touched from two tasks.

use crate::display::{AudioOutput, PresentationSink};
use crate::error::PipelineError;
use crate::pipeline::clock::OutputClock;
use crate::pipeline::handshake::ConfigHandshake;
use crate::pipeline::health::{DropReason, PipelineHealth};
use crate::pipeline::receiver::decoder_handle::{DecoderHandle, HandleState, Submit};
use crate::pipeline::receiver::playback::{AudioScheduler, ScheduleOutcome};
use crate::pipeline::session::SessionFlags;
use crate::pipeline::{DecodedAudioBuffer, DecodedVideoFrame, EncodedChunk, MediaKind};
use crate::wire::ConfigDescriptor;
use log::{debug, info, warn};
use std::sync::Arc;

/// Where a lane delivers decoded output
pub trait DecodedSink<O>: Send {
    /// Take one decoded unit, or report why it was shed
    fn accept(&mut self, item: O) -> Result<(), DropReason>;

    /// Forget timing state tied to the previous decoder
    fn reset(&mut self) {}
}

/// Video frames are dropped, not queued, when the surface has no room
impl<P: PresentationSink> DecodedSink<DecodedVideoFrame> for P {
    fn accept(&mut self, frame: DecodedVideoFrame) -> Result<(), DropReason> {
        if self.desired_size() <= 0 {
            return Err(DropReason::Backpressure);
        }
        self.present(frame);
        Ok(())
    }
}

impl<C, A> DecodedSink<DecodedAudioBuffer> for AudioScheduler<C, A>
where
    C: OutputClock,
    A: AudioOutput,
{
    fn accept(&mut self, buffer: DecodedAudioBuffer) -> Result<(), DropReason> {
        match self.schedule(buffer) {
            ScheduleOutcome::Scheduled { .. } => Ok(()),
            ScheduleOutcome::Discarded => Err(DropReason::Inactive),
        }
    }

    fn reset(&mut self) {
        self.resync();
    }
}

pub struct DecodeLane<O, S> {
    handle: DecoderHandle<O>,
    sink: S,
    handshake: Arc<ConfigHandshake>,
    flags: SessionFlags,
    health: Arc<PipelineHealth>,
}

impl<O, S: DecodedSink<O>> DecodeLane<O, S> {
    pub fn new(
        handle: DecoderHandle<O>,
        sink: S,
        handshake: Arc<ConfigHandshake>,
        flags: SessionFlags,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            handle,
            sink,
            handshake,
            flags,
            health,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.handle.kind()
    }

    pub fn handle(&self) -> &DecoderHandle<O> {
        &self.handle
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Apply a config packet's descriptor. Data for the kind flows only
    /// after this succeeds.
    pub fn on_config(&mut self, descriptor: ConfigDescriptor) -> Result<(), PipelineError> {
        let kind = self.kind();
        self.handshake.record_config(descriptor.clone());
        self.handshake.mark_unapplied(kind);
        self.handle.apply_config(descriptor)?;
        self.handshake.mark_applied(kind);
        Ok(())
    }

    /// Feed one data chunk through gating, decode and delivery
    pub fn on_data(&mut self, chunk: EncodedChunk) {
        let kind = self.kind();
        if !self.flags.is_receiving() {
            self.health.record_drop(DropReason::Inactive);
            return;
        }
        if !self.handshake.is_ready(kind) {
            debug!("{} data before config applied, dropping", kind);
            self.health.record_drop(DropReason::NotReady);
            return;
        }

        let is_keyframe = chunk.is_keyframe;
        match self.handle.submit(chunk) {
            Submit::Decoded(items) => {
                self.health.record_decode_submitted(is_keyframe);
                self.deliver(items);
            }
            Submit::Dropped(reason) => self.health.record_drop(reason),
            Submit::Rejected(e) => {
                self.health.record_decode_error();
                debug!("{} decoder rejected chunk: {}", kind, e);
            }
            Submit::Faulted { error, respawned } => {
                self.health.record_fault(respawned);
                let fault = PipelineError::CodecRuntimeFault {
                    kind,
                    source: error,
                };
                warn!("{}", fault);
                if self.handle.state() != HandleState::Configured {
                    self.handshake.mark_unapplied(kind);
                }
            }
        }
    }

    fn deliver(&mut self, items: Vec<O>) {
        for item in items {
            self.health.record_decoded();
            if let Err(reason) = self.sink.accept(item) {
                self.health.record_drop(reason);
            }
        }
    }

    /// Drain decoder output into the sink
    pub fn flush(&mut self) {
        match self.handle.flush() {
            Ok(items) => self.deliver(items),
            Err(e) => warn!("{} decoder flush failed: {}", self.kind(), e),
        }
    }

    /// Tear down the decoder, the sink's timing and the kind's handshake
    /// state
    pub fn reset(&mut self) {
        info!("{} lane reset", self.kind());
        self.handle.reset();
        self.sink.reset();
        self.handshake.reset(self.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::passthrough::{PassthroughAudioDecoder, PassthroughVideoDecoder, samples_to_bytes};
    use crate::pipeline::Timestamp;
    use crate::pipeline::clock::ManualClock;
    use crate::wire::{AudioDescriptor, VideoDescriptor};
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Surface with a settable capacity that records what it shows
    struct TestSurface {
        room: isize,
        shown: Vec<i64>,
    }

    impl PresentationSink for TestSurface {
        fn desired_size(&self) -> isize {
            self.room
        }

        fn present(&mut self, frame: DecodedVideoFrame) {
            self.shown.push(frame.timestamp.micros / 1000);
        }
    }

    #[derive(Default)]
    struct CountingOutput {
        played: usize,
    }

    impl AudioOutput for CountingOutput {
        fn play_at(&mut self, _buffer: DecodedAudioBuffer, _start: Duration) {
            self.played += 1;
        }
    }

    fn video_desc() -> ConfigDescriptor {
        ConfigDescriptor::Video(VideoDescriptor {
            codec: crate::codec::passthrough::VIDEO_CODEC.into(),
            coded_width: 320,
            coded_height: 240,
            frame_rate: None,
            description: None,
            orientation: None,
        })
    }

    fn video_lane(room: isize) -> (DecodeLane<DecodedVideoFrame, TestSurface>, Arc<PipelineHealth>, SessionFlags) {
        let health = Arc::new(PipelineHealth::new());
        let flags = SessionFlags::new();
        let lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Video, PassthroughVideoDecoder::factory(), 15),
            TestSurface {
                room,
                shown: Vec::new(),
            },
            Arc::new(ConfigHandshake::new(8)),
            flags.clone(),
            health.clone(),
        );
        (lane, health, flags)
    }

    fn video(ms: i64, key: bool) -> EncodedChunk {
        EncodedChunk::video(Bytes::from_static(b"px"), Timestamp::from_micros(ms * 1000), key)
    }

    #[test]
    fn test_data_before_config_is_dropped() {
        let (mut lane, health, _) = video_lane(4);
        lane.on_data(video(0, true));
        lane.on_config(video_desc()).unwrap();
        lane.on_data(video(1, false));
        lane.on_data(video(2, true));

        assert_eq!(lane.sink().shown, vec![2]);
        assert_eq!(health.not_ready_drops.load(Ordering::Relaxed), 1);
        assert_eq!(health.keyframe_wait_drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_backpressure_drops_decoded_frames() {
        let (mut lane, health, _) = video_lane(0);
        lane.on_config(video_desc()).unwrap();
        lane.on_data(video(0, true));
        lane.on_data(video(1, false));

        assert!(lane.sink().shown.is_empty());
        assert_eq!(health.backpressure_drops.load(Ordering::Relaxed), 2);
        // decoding itself went ahead
        assert!(!lane.handle().is_waiting_for_keyframe());

        lane.sink_mut().room = 1;
        lane.on_data(video(2, false));
        assert_eq!(lane.sink().shown, vec![2]);
    }

    #[test]
    fn test_not_receiving_drops_before_decode() {
        let (mut lane, health, flags) = video_lane(4);
        lane.on_config(video_desc()).unwrap();
        flags.set_receiving(false);
        lane.on_data(video(0, true));
        assert_eq!(health.inactive_drops.load(Ordering::Relaxed), 1);
        // keyframe never reached the decoder
        assert!(lane.handle().is_waiting_for_keyframe());

        flags.set_receiving(true);
        lane.on_data(video(1, true));
        assert_eq!(lane.sink().shown, vec![1]);
    }

    #[test]
    fn test_configure_failure_keeps_kind_closed() {
        let (mut lane, _, _) = video_lane(4);
        let foreign = ConfigDescriptor::Video(VideoDescriptor {
            codec: "h264".into(),
            coded_width: 320,
            coded_height: 240,
            frame_rate: None,
            description: None,
            orientation: None,
        });
        assert!(lane.on_config(foreign).is_err());
        assert!(lane.handle().is_disabled());
        lane.on_data(video(0, true));
        assert!(lane.sink().shown.is_empty());
    }

    #[test]
    fn test_audio_lane_schedules_until_flag_flip() {
        let health = Arc::new(PipelineHealth::new());
        let flags = SessionFlags::new();
        let scheduler = AudioScheduler::new(
            ManualClock::new(),
            CountingOutput::default(),
            flags.clone(),
            health.clone(),
            Duration::from_millis(100),
            Duration::from_millis(20),
        );
        let mut lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Audio, PassthroughAudioDecoder::factory(), 15),
            scheduler,
            Arc::new(ConfigHandshake::new(8)),
            flags.clone(),
            health.clone(),
        );

        lane.on_config(ConfigDescriptor::Audio(AudioDescriptor {
            codec: crate::codec::passthrough::AUDIO_CODEC.into(),
            sample_rate: 48_000,
            number_of_channels: 1,
            description: None,
        }))
        .unwrap();

        let chunk = EncodedChunk::audio(samples_to_bytes(&[0.1; 480]), Timestamp::default());
        lane.on_data(chunk.clone());
        lane.on_data(chunk.clone());
        assert_eq!(lane.sink().output().played, 2);

        flags.set_receiving(false);
        lane.on_data(chunk);
        assert_eq!(lane.sink().output().played, 2);
        assert_eq!(health.audio_scheduled.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_reset_unconfigures_and_resyncs_audio() {
        let health = Arc::new(PipelineHealth::new());
        let flags = SessionFlags::new();
        let handshake = Arc::new(ConfigHandshake::new(8));
        let scheduler = AudioScheduler::new(
            ManualClock::new(),
            CountingOutput::default(),
            flags.clone(),
            health.clone(),
            Duration::from_millis(100),
            Duration::from_millis(20),
        );
        let mut lane = DecodeLane::new(
            DecoderHandle::new(MediaKind::Audio, PassthroughAudioDecoder::factory(), 15),
            scheduler,
            handshake.clone(),
            flags,
            health.clone(),
        );
        lane.on_config(ConfigDescriptor::Audio(AudioDescriptor {
            codec: crate::codec::passthrough::AUDIO_CODEC.into(),
            sample_rate: 48_000,
            number_of_channels: 1,
            description: None,
        }))
        .unwrap();
        lane.on_data(EncodedChunk::audio(samples_to_bytes(&[0.1; 480]), Timestamp::default()));
        assert!(lane.sink().cursor().is_some());

        lane.reset();
        assert_eq!(lane.handle().state(), HandleState::Unconfigured);
        assert!(lane.sink().cursor().is_none());
        assert!(!handshake.is_ready(MediaKind::Audio));

        // data stays gated until a new config arrives
        lane.on_data(EncodedChunk::audio(samples_to_bytes(&[0.1; 480]), Timestamp::default()));
        assert_eq!(lane.sink().output().played, 1);
        assert_eq!(health.not_ready_drops.load(Ordering::Relaxed), 1);
    }
}
