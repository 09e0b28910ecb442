//! Audio playback scheduler
//!
//! Keeps a cursor with the start time of the next buffer on the output
//! clock. Latency stays inside a small window without a jitter buffer:
//!
//! - cursor more than `latency_ceiling` away from now: resync to
//!   now + `min_lookahead`
//! - cursor behind now (within the ceiling): catch up, start at now
//! - otherwise: start exactly at the cursor
//!
//! The cursor then advances by the buffer duration.

use crate::display::AudioOutput;
use crate::pipeline::DecodedAudioBuffer;
use crate::pipeline::clock::OutputClock;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::session::SessionFlags;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Buffer handed to the output at `start`
    Scheduled { start: Duration },
    /// Session not receiving; buffer released unplayed
    Discarded,
}

pub struct AudioScheduler<C, A> {
    clock: C,
    output: A,
    flags: SessionFlags,
    health: Arc<PipelineHealth>,
    cursor: Option<Duration>,
    latency_ceiling: Duration,
    min_lookahead: Duration,
}

impl<C: OutputClock, A: AudioOutput> AudioScheduler<C, A> {
    pub fn new(
        clock: C,
        output: A,
        flags: SessionFlags,
        health: Arc<PipelineHealth>,
        latency_ceiling: Duration,
        min_lookahead: Duration,
    ) -> Self {
        Self {
            clock,
            output,
            flags,
            health,
            cursor: None,
            latency_ceiling,
            min_lookahead,
        }
    }

    /// Next scheduled start time, if anything was scheduled since the last
    /// resync
    pub fn cursor(&self) -> Option<Duration> {
        self.cursor
    }

    /// Forget the cursor; the next buffer starts at now + lookahead
    pub fn resync(&mut self) {
        self.cursor = None;
    }

    pub fn output(&self) -> &A {
        &self.output
    }

    pub fn schedule(&mut self, buffer: DecodedAudioBuffer) -> ScheduleOutcome {
        if !self.flags.is_receiving() {
            return ScheduleOutcome::Discarded;
        }

        let now = self.clock.now();
        let start = match self.cursor {
            None => now + self.min_lookahead,
            Some(cursor) if cursor.abs_diff(now) > self.latency_ceiling => {
                debug!(
                    "audio cursor {:?} drifted from output clock {:?}, resyncing",
                    cursor, now
                );
                self.health.record_audio_resync();
                now + self.min_lookahead
            }
            Some(cursor) if cursor < now => {
                self.health.record_audio_catch_up();
                now
            }
            Some(cursor) => cursor,
        };

        self.cursor = Some(start + buffer.duration());
        self.output.play_at(buffer, start);
        self.health.record_audio_scheduled();
        ScheduleOutcome::Scheduled { start }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Timestamp;
    use crate::pipeline::clock::ManualClock;

    /// Output that remembers every start time it was given
    #[derive(Default)]
    struct RecordingOutput {
        starts: Vec<Duration>,
    }

    impl AudioOutput for RecordingOutput {
        fn play_at(&mut self, _buffer: DecodedAudioBuffer, start: Duration) {
            self.starts.push(start);
        }
    }

    fn buffer_20ms() -> DecodedAudioBuffer {
        DecodedAudioBuffer {
            timestamp: Timestamp::default(),
            sample_rate: 48_000,
            channels: 1,
            samples: vec![0.0; 960],
        }
    }

    fn scheduler(clock: ManualClock, flags: SessionFlags) -> AudioScheduler<ManualClock, RecordingOutput> {
        AudioScheduler::new(
            clock,
            RecordingOutput::default(),
            flags,
            Arc::new(PipelineHealth::new()),
            Duration::from_millis(100),
            Duration::from_millis(20),
        )
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_buffer_starts_after_lookahead() {
        let clock = ManualClock::new();
        clock.set(ms(1000));
        let mut s = scheduler(clock, SessionFlags::new());

        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Scheduled { start: ms(1020) });
        assert_eq!(s.cursor(), Some(ms(1040)));
    }

    #[test]
    fn test_back_to_back_buffers_follow_cursor() {
        let clock = ManualClock::new();
        let mut s = scheduler(clock.clone(), SessionFlags::new());

        s.schedule(buffer_20ms());
        clock.advance(ms(5));
        s.schedule(buffer_20ms());
        clock.advance(ms(5));
        s.schedule(buffer_20ms());
        assert_eq!(s.output().starts, vec![ms(20), ms(40), ms(60)]);
    }

    #[test]
    fn test_cursor_behind_snaps_to_now() {
        let clock = ManualClock::new();
        let mut s = scheduler(clock.clone(), SessionFlags::new());

        s.schedule(buffer_20ms()); // cursor 40
        clock.set(ms(90));
        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Scheduled { start: ms(90) });
        assert_eq!(s.cursor(), Some(ms(110)));
    }

    #[test]
    fn test_far_behind_resyncs_with_lookahead() {
        let clock = ManualClock::new();
        let mut s = scheduler(clock.clone(), SessionFlags::new());

        // cursor at T = 40ms, now = T + 150ms
        s.schedule(buffer_20ms());
        clock.set(ms(190));
        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Scheduled { start: ms(210) });
    }

    #[test]
    fn test_far_ahead_resyncs_with_lookahead() {
        let clock = ManualClock::new();
        let mut s = scheduler(clock.clone(), SessionFlags::new());

        // burst of 5 buffers while the clock stands still: cursor at 120ms
        for _ in 0..5 {
            s.schedule(buffer_20ms());
        }
        assert_eq!(s.cursor(), Some(ms(120)));
        clock.set(ms(10));
        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Scheduled { start: ms(30) });
    }

    #[test]
    fn test_not_receiving_discards() {
        let clock = ManualClock::new();
        let flags = SessionFlags::new();
        let mut s = scheduler(clock, flags.clone());

        s.schedule(buffer_20ms());
        flags.set_receiving(false);
        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Discarded);
        assert_eq!(s.schedule(buffer_20ms()), ScheduleOutcome::Discarded);
        assert_eq!(s.output().starts.len(), 1);
    }
}
