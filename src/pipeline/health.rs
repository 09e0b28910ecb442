//! Health monitoring and metrics for pipeline

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Why a unit of media was dropped instead of processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Delta frame while waiting for a keyframe
    KeyframeWait,
    /// Decoder queue above the shedding threshold
    Overload,
    /// Presentation sink reported no spare capacity
    Backpressure,
    /// Data for a kind whose config is not sent/applied yet
    NotReady,
    /// Session flag turned off
    Inactive,
    /// Send-side pending queue full
    QueueFull,
}

/// Health metrics for a pipeline
///
/// Tracks counters to monitor pipeline health.
/// All counters use atomic operations for thread-safe access.
pub struct PipelineHealth {
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub frames_encoded: AtomicU64,
    pub encode_errors: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub keyframes_processed: AtomicU64,
    pub bytes_processed: AtomicU64,

    pub keyframe_wait_drops: AtomicU64,
    pub overload_drops: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub not_ready_drops: AtomicU64,
    pub inactive_drops: AtomicU64,
    pub queue_full_drops: AtomicU64,

    pub decoder_faults: AtomicU64,
    pub respawns: AtomicU64,

    pub audio_scheduled: AtomicU64,
    pub audio_catch_ups: AtomicU64,
    pub audio_resyncs: AtomicU64,

    last_activity: Mutex<Instant>,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            malformed_packets: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            keyframes_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            keyframe_wait_drops: AtomicU64::new(0),
            overload_drops: AtomicU64::new(0),
            backpressure_drops: AtomicU64::new(0),
            not_ready_drops: AtomicU64::new(0),
            inactive_drops: AtomicU64::new(0),
            queue_full_drops: AtomicU64::new(0),
            decoder_faults: AtomicU64::new(0),
            respawns: AtomicU64::new(0),
            audio_scheduled: AtomicU64::new(0),
            audio_catch_ups: AtomicU64::new(0),
            audio_resyncs: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Instant::now();
    }

    /// Record a packet handed to a transport channel
    pub fn record_packet_sent(&self, size: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed
            .fetch_add(size as u64, Ordering::Relaxed);
        self.touch();
    }

    /// Record a packet read from a transport channel
    pub fn record_packet_received(&self, size: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed
            .fetch_add(size as u64, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk produced by an encoder
    pub fn record_encoded(&self, is_keyframe: bool) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
        if is_keyframe {
            self.keyframes_processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an output produced by a decoder
    pub fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a chunk accepted by a decoder
    pub fn record_decode_submitted(&self, is_keyframe: bool) {
        if is_keyframe {
            self.keyframes_processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an intentionally dropped unit of media
    pub fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::KeyframeWait => &self.keyframe_wait_drops,
            DropReason::Overload => &self.overload_drops,
            DropReason::Backpressure => &self.backpressure_drops,
            DropReason::NotReady => &self.not_ready_drops,
            DropReason::Inactive => &self.inactive_drops,
            DropReason::QueueFull => &self.queue_full_drops,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a codec fault and whether the instance was replaced
    pub fn record_fault(&self, respawned: bool) {
        self.decoder_faults.fetch_add(1, Ordering::Relaxed);
        if respawned {
            self.respawns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audio_scheduled(&self) {
        self.audio_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_catch_up(&self) {
        self.audio_catch_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_resync(&self) {
        self.audio_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Total number of dropped units across all reasons
    pub fn total_drops(&self) -> u64 {
        [
            &self.keyframe_wait_drops,
            &self.overload_drops,
            &self.backpressure_drops,
            &self.not_ready_drops,
            &self.inactive_drops,
            &self.queue_full_drops,
        ]
        .iter()
        .map(|c| c.load(Ordering::Relaxed))
        .sum()
    }

    /// Drop rate as a percentage of everything that reached the pipeline
    pub fn drop_rate(&self) -> f64 {
        let drops = self.total_drops();
        let handled = drops
            + self.frames_decoded.load(Ordering::Relaxed)
            + self.frames_encoded.load(Ordering::Relaxed);
        if handled == 0 {
            return 0.0;
        }
        (drops as f64 / handled as f64) * 100.0
    }

    /// Check if the pipeline has stalled (no activity for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last = self
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last.elapsed() > threshold
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        HealthSummary {
            packets_sent: load(&self.packets_sent),
            packets_received: load(&self.packets_received),
            malformed_packets: load(&self.malformed_packets),
            frames_encoded: load(&self.frames_encoded),
            frames_decoded: load(&self.frames_decoded),
            encode_errors: load(&self.encode_errors),
            decode_errors: load(&self.decode_errors),
            drops: self.total_drops(),
            backpressure_drops: load(&self.backpressure_drops),
            respawns: load(&self.respawns),
            audio_scheduled: load(&self.audio_scheduled),
            audio_resyncs: load(&self.audio_resyncs),
            bytes_processed: load(&self.bytes_processed),
            drop_rate: self.drop_rate(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub malformed_packets: u64,
    pub frames_encoded: u64,
    pub frames_decoded: u64,
    pub encode_errors: u64,
    pub decode_errors: u64,
    pub drops: u64,
    pub backpressure_drops: u64,
    pub respawns: u64,
    pub audio_scheduled: u64,
    pub audio_resyncs: u64,
    pub bytes_processed: u64,
    pub drop_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} sent / {} received packets ({} malformed), {} encoded, {} decoded, {} drops ({:.2}%, {} backpressure), {} respawns, {} audio scheduled ({} resyncs), {} bytes",
            self.packets_sent,
            self.packets_received,
            self.malformed_packets,
            self.frames_encoded,
            self.frames_decoded,
            self.drops,
            self.drop_rate,
            self.backpressure_drops,
            self.respawns,
            self.audio_scheduled,
            self.audio_resyncs,
            self.bytes_processed
        )
    }
}
