//! Core types for the pipeline system

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timestamp representation for media frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Microseconds since capture start
    pub micros: i64,
}

impl Timestamp {
    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a timestamp from a duration since capture start
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    /// Rebuild a timestamp from the 32-bit millisecond field carried on the wire
    pub fn from_wire_millis(millis: u32) -> Self {
        Self {
            micros: millis as i64 * 1000,
        }
    }

    /// Millisecond value for the wire header.
    ///
    /// The header only has 32 bits, so the value wraps after ~49.7 days.
    pub fn wire_millis(&self) -> u32 {
        (self.micros.max(0) / 1000) as u64 as u32
    }

    /// Convert to duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl MediaKind {
    /// Both kinds, video first
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    pub(crate) fn index(self) -> usize {
        match self {
            MediaKind::Video => 0,
            MediaKind::Audio => 1,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Layout of a raw (not yet encoded) frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// Planar picture of the given size
    Video { width: u32, height: u32 },
    /// Interleaved samples
    Audio {
        sample_rate: u32,
        channels: u16,
        frames: u32,
    },
}

/// A raw capture frame handed to the encode pipeline
#[derive(Clone)]
pub struct RawFrame {
    /// Capture timestamp
    pub timestamp: Timestamp,
    /// Pixel or sample payload
    pub data: Bytes,
    /// What `data` holds
    pub format: RawFormat,
}

impl RawFrame {
    /// Create a new raw video frame
    pub fn video(data: Bytes, timestamp: Timestamp, width: u32, height: u32) -> Self {
        Self {
            timestamp,
            data,
            format: RawFormat::Video { width, height },
        }
    }

    /// Create a new raw audio frame
    pub fn audio(
        data: Bytes,
        timestamp: Timestamp,
        sample_rate: u32,
        channels: u16,
        frames: u32,
    ) -> Self {
        Self {
            timestamp,
            data,
            format: RawFormat::Audio {
                sample_rate,
                channels,
                frames,
            },
        }
    }

    /// Kind of media held by this frame
    pub fn kind(&self) -> MediaKind {
        match self.format {
            RawFormat::Video { .. } => MediaKind::Video,
            RawFormat::Audio { .. } => MediaKind::Audio,
        }
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("timestamp", &self.timestamp)
            .field("format", &self.format)
            .field("size", &self.size())
            .finish()
    }
}

/// Encoded bitstream unit exchanged between codecs and the wire layer
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Kind of media (video or audio)
    pub kind: MediaKind,

    /// Whether the chunk is decodable on its own.
    /// Audio chunks are always independent and report `true`.
    pub is_keyframe: bool,

    /// Presentation timestamp
    pub timestamp: Timestamp,

    /// Encoded bytes
    pub data: Bytes,
}

impl EncodedChunk {
    /// Create a video chunk
    pub fn video(data: Bytes, timestamp: Timestamp, is_keyframe: bool) -> Self {
        Self {
            kind: MediaKind::Video,
            is_keyframe,
            timestamp,
            data,
        }
    }

    /// Create an audio chunk
    pub fn audio(data: Bytes, timestamp: Timestamp) -> Self {
        Self {
            kind: MediaKind::Audio,
            is_keyframe: true,
            timestamp,
            data,
        }
    }

    /// Get the size of the chunk data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for EncodedChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedChunk")
            .field("kind", &self.kind)
            .field("is_keyframe", &self.is_keyframe)
            .field("timestamp", &self.timestamp)
            .field("size", &self.size())
            .finish()
    }
}

/// Decoded picture ready for presentation
#[derive(Debug, Clone)]
pub struct DecodedVideoFrame {
    pub timestamp: Timestamp,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Decoded PCM block ready for scheduling
#[derive(Debug, Clone)]
pub struct DecodedAudioBuffer {
    pub timestamp: Timestamp,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, `frames() * channels` long
    pub samples: Vec<f32>,
}

impl DecodedAudioBuffer {
    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration: frames / sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}
