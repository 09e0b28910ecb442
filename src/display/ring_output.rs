//! Ring-buffer audio output
//!
//! Renders scheduled buffers into one interleaved sample ring that a device
//! callback drains through `AudioReader`. The ring is consumed in real time
//! on the output clock, so whatever it holds plays from "now" onward. A start
//! time past the end of the queued audio is reached by padding silence; a
//! start time at or before it plays right after the queued audio. When the
//! ring is full the oldest samples are dropped.

use crate::display::AudioOutput;
use crate::pipeline::DecodedAudioBuffer;
use crate::pipeline::clock::OutputClock;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
    samples_dropped: u64,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            read_pos: 0,
            len: 0,
            samples_dropped: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn push_one(&mut self, sample: f32) {
        let capacity = self.capacity();
        if self.len >= capacity {
            self.read_pos = (self.read_pos + 1) % capacity;
            self.samples_dropped += 1;
        } else {
            self.len += 1;
        }
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % capacity;
    }

    fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push_one(sample);
        }
    }

    fn push_silence(&mut self, count: usize) {
        for _ in 0..count {
            self.push_one(0.0);
        }
    }

    /// Fill `output`, padding with silence on underrun
    fn read(&mut self, output: &mut [f32]) -> usize {
        let capacity = self.capacity();
        let mut read = 0;
        for sample in output.iter_mut() {
            if self.len > 0 {
                *sample = self.buffer[self.read_pos];
                self.read_pos = (self.read_pos + 1) % capacity;
                self.len -= 1;
                read += 1;
            } else {
                *sample = 0.0;
            }
        }
        read
    }

    fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.len = 0;
    }
}

struct OutputState {
    ring: SampleRing,
    format: Option<(u32, u16)>,
    silence_padded: u64,
}

fn lock(state: &Mutex<OutputState>) -> MutexGuard<'_, OutputState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Audio output rendering into a shared sample ring
pub struct RingAudioOutput {
    state: Arc<Mutex<OutputState>>,
    /// Clock of the device draining the ring
    clock: Box<dyn OutputClock>,
}

impl RingAudioOutput {
    /// Ring holding at most `capacity` interleaved samples, drained on `clock`
    pub fn new(capacity: usize, clock: impl OutputClock + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(OutputState {
                ring: SampleRing::new(capacity),
                format: None,
                silence_padded: 0,
            })),
            clock: Box::new(clock),
        }
    }

    /// Reading end for the device callback
    pub fn reader(&self) -> AudioReader {
        AudioReader {
            state: self.state.clone(),
        }
    }

    /// Samples dropped because the ring overflowed
    pub fn samples_dropped(&self) -> u64 {
        lock(&self.state).ring.samples_dropped
    }

    /// Silent samples inserted to honor start times
    pub fn silence_padded(&self) -> u64 {
        lock(&self.state).silence_padded
    }
}

impl AudioOutput for RingAudioOutput {
    fn play_at(&mut self, buffer: DecodedAudioBuffer, start: Duration) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let format = (buffer.sample_rate, buffer.channels);
        if state.format != Some(format) {
            debug!(
                "audio output format now {} Hz x{}",
                buffer.sample_rate, buffer.channels
            );
            state.ring.clear();
            state.format = Some(format);
        }

        let channels = buffer.channels.max(1) as u128;
        let rate = buffer.sample_rate.max(1) as u128;

        // output time at which the queued audio runs out
        let queued_frames = state.ring.len as u128 / channels;
        let queued_end = now + Duration::from_nanos((queued_frames * 1_000_000_000 / rate) as u64);

        if start > queued_end {
            let gap = start - queued_end;
            let frames = (gap.as_nanos() * rate / 1_000_000_000) as usize;
            let count = (frames * channels as usize).min(state.ring.capacity());
            state.ring.push_silence(count);
            state.silence_padded += count as u64;
        }

        state.ring.push(&buffer.samples);
    }
}

/// Device-side view of a `RingAudioOutput`
#[derive(Clone)]
pub struct AudioReader {
    state: Arc<Mutex<OutputState>>,
}

impl AudioReader {
    /// Fill `output` with interleaved samples; returns how many were real
    /// (the rest is silence)
    pub fn read(&self, output: &mut [f32]) -> usize {
        lock(&self.state).ring.read(output)
    }

    /// Samples waiting to be read
    pub fn available(&self) -> usize {
        lock(&self.state).ring.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Timestamp;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::health::PipelineHealth;
    use crate::pipeline::receiver::playback::{AudioScheduler, ScheduleOutcome};
    use crate::pipeline::session::SessionFlags;

    fn buffer(samples: Vec<f32>) -> DecodedAudioBuffer {
        DecodedAudioBuffer {
            timestamp: Timestamp::default(),
            sample_rate: 1000,
            channels: 1,
            samples,
        }
    }

    #[test]
    fn test_contiguous_buffers_play_back_to_back() {
        let clock = ManualClock::new();
        clock.set(Duration::from_millis(10));
        let mut output = RingAudioOutput::new(64, clock.clone());
        let reader = output.reader();

        output.play_at(buffer(vec![1.0; 4]), Duration::from_millis(10));
        output.play_at(buffer(vec![2.0; 4]), Duration::from_millis(14));
        assert_eq!(output.silence_padded(), 0);

        let mut out = [0.0; 10];
        assert_eq!(reader.read(&mut out), 8);
        assert_eq!(&out[..8], &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(&out[8..], &[0.0, 0.0]);
    }

    #[test]
    fn test_gap_is_filled_with_silence() {
        let mut output = RingAudioOutput::new(64, ManualClock::new());
        let reader = output.reader();

        output.play_at(buffer(vec![1.0; 2]), Duration::from_millis(0));
        // 3 ms gap at 1 kHz mono
        output.play_at(buffer(vec![2.0; 2]), Duration::from_millis(5));
        assert_eq!(output.silence_padded(), 3);

        let mut out = [9.0; 7];
        reader.read(&mut out);
        assert_eq!(out, [1.0, 1.0, 0.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_late_start_plays_after_queued_audio() {
        let clock = ManualClock::new();
        let mut output = RingAudioOutput::new(64, clock.clone());
        let reader = output.reader();

        output.play_at(buffer(vec![1.0; 4]), Duration::ZERO);
        clock.set(Duration::from_millis(2));
        // already due: no silence, appended behind what is queued
        output.play_at(buffer(vec![2.0; 2]), Duration::from_millis(1));
        assert_eq!(output.silence_padded(), 0);
        assert_eq!(reader.available(), 6);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut output = RingAudioOutput::new(4, ManualClock::new());
        let reader = output.reader();

        output.play_at(buffer(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), Duration::ZERO);
        assert_eq!(output.samples_dropped(), 2);
        assert_eq!(reader.available(), 4);

        let mut out = [0.0; 4];
        reader.read(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_resync_after_underrun_adds_only_lookahead() {
        let clock = ManualClock::new();
        let output = RingAudioOutput::new(1000, clock.clone());
        let reader = output.reader();
        let mut scheduler = AudioScheduler::new(
            clock.clone(),
            output,
            SessionFlags::new(),
            Arc::new(PipelineHealth::new()),
            Duration::from_millis(100),
            Duration::from_millis(20),
        );

        // 20 ms at 1 kHz mono, starting at the 20 ms lookahead
        scheduler.schedule(buffer(vec![1.0; 20]));
        assert_eq!(reader.available(), 40);
        let mut device = [0.0; 40];
        reader.read(&mut device);
        assert_eq!(reader.available(), 0);

        // the device ran dry for a while before the next buffer arrived
        clock.set(Duration::from_millis(190));
        let outcome = scheduler.schedule(buffer(vec![2.0; 20]));
        assert_eq!(
            outcome,
            ScheduleOutcome::Scheduled {
                start: Duration::from_millis(210)
            }
        );

        // 20 ms of lookahead silence then the buffer, not the stale gap
        assert_eq!(reader.available(), 40);
        let mut out = [9.0; 40];
        reader.read(&mut out);
        assert!(out[..20].iter().all(|s| *s == 0.0));
        assert!(out[20..].iter().all(|s| *s == 2.0));
    }
}
