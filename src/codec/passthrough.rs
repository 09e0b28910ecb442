//! Passthrough codec
//!
//! A deterministic stand-in for a real codec: the "bitstream" is the raw
//! payload itself. It keeps real codec semantics where the pipeline depends
//! on them: metadata is reported on keyframes, decoders refuse data before
//! `configure`, and a delta frame without a preceding keyframe is rejected.
//!
//! Audio payloads are interleaved little-endian `f32` samples.

use crate::codec::{DecoderFactory, EncoderOutput, MediaDecoder, MediaEncoder};
use crate::error::CodecError;
use crate::pipeline::{
    DecodedAudioBuffer, DecodedVideoFrame, EncodedChunk, MediaKind, RawFormat, RawFrame,
};
use crate::wire::{AudioDescriptor, ConfigDescriptor, VideoDescriptor};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

pub const VIDEO_CODEC: &str = "passthrough-video";
pub const AUDIO_CODEC: &str = "passthrough-audio";

/// Init blob carried in the descriptor's `description`
const INIT_BLOB: &[u8] = b"castwire/passthrough/1";

/// Pack interleaved samples as little-endian `f32` bytes
pub fn samples_to_bytes(samples: &[f32]) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * 4);
    for sample in samples {
        out.put_f32_le(*sample);
    }
    out.freeze()
}

fn bytes_to_samples(data: &[u8]) -> Result<Vec<f32>, CodecError> {
    if data.len() % 4 != 0 {
        return Err(CodecError::Rejected(format!(
            "audio payload of {} bytes is not whole f32 samples",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Video encoder. Reports its descriptor with every keyframe and forces a
/// keyframe when the picture size changes.
pub struct PassthroughVideoEncoder {
    size: Option<(u32, u32)>,
    frame_rate: Option<f64>,
    closed: bool,
}

impl PassthroughVideoEncoder {
    pub fn new(frame_rate: Option<f64>) -> Self {
        Self {
            size: None,
            frame_rate,
            closed: false,
        }
    }

    fn descriptor(&self, width: u32, height: u32) -> ConfigDescriptor {
        ConfigDescriptor::Video(VideoDescriptor {
            codec: VIDEO_CODEC.to_string(),
            coded_width: width,
            coded_height: height,
            frame_rate: self.frame_rate,
            description: Some(Bytes::from_static(INIT_BLOB)),
            orientation: None,
        })
    }
}

impl MediaEncoder for PassthroughVideoEncoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn encode(
        &mut self,
        frame: RawFrame,
        keyframe: bool,
    ) -> Result<Vec<EncoderOutput>, CodecError> {
        if self.closed {
            return Err(CodecError::Fault("encoder closed".into()));
        }
        let RawFormat::Video { width, height } = frame.format else {
            return Err(CodecError::Rejected("audio frame sent to video encoder".into()));
        };
        if width == 0 || height == 0 {
            return Err(CodecError::Rejected(format!("invalid picture size {width}x{height}")));
        }

        let resized = self.size != Some((width, height));
        self.size = Some((width, height));
        let keyframe = keyframe || resized;

        let chunk = EncodedChunk::video(frame.data, frame.timestamp, keyframe);
        let output = if keyframe {
            EncoderOutput::with_metadata(chunk, self.descriptor(width, height))
        } else {
            EncoderOutput::new(chunk)
        };
        Ok(vec![output])
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Audio encoder. Every chunk is independently decodable; the descriptor is
/// reported on the first output and whenever the sample format changes.
pub struct PassthroughAudioEncoder {
    format: Option<(u32, u16)>,
    closed: bool,
}

impl PassthroughAudioEncoder {
    pub fn new() -> Self {
        Self {
            format: None,
            closed: false,
        }
    }
}

impl Default for PassthroughAudioEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEncoder for PassthroughAudioEncoder {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn encode(
        &mut self,
        frame: RawFrame,
        _keyframe: bool,
    ) -> Result<Vec<EncoderOutput>, CodecError> {
        if self.closed {
            return Err(CodecError::Fault("encoder closed".into()));
        }
        let RawFormat::Audio {
            sample_rate,
            channels,
            ..
        } = frame.format
        else {
            return Err(CodecError::Rejected("video frame sent to audio encoder".into()));
        };
        if sample_rate == 0 || channels == 0 {
            return Err(CodecError::Rejected("invalid sample format".into()));
        }

        let chunk = EncodedChunk::audio(frame.data, frame.timestamp);
        if self.format == Some((sample_rate, channels)) {
            return Ok(vec![EncoderOutput::new(chunk)]);
        }
        self.format = Some((sample_rate, channels));
        let descriptor = ConfigDescriptor::Audio(AudioDescriptor {
            codec: AUDIO_CODEC.to_string(),
            sample_rate,
            number_of_channels: channels,
            description: Some(Bytes::from_static(INIT_BLOB)),
        });
        Ok(vec![EncoderOutput::with_metadata(chunk, descriptor)])
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Video decoder
#[derive(Default)]
pub struct PassthroughVideoDecoder {
    config: Option<VideoDescriptor>,
    has_reference: bool,
}

impl PassthroughVideoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> DecoderFactory<DecodedVideoFrame> {
        Arc::new(|| -> Result<Box<dyn MediaDecoder<DecodedVideoFrame>>, CodecError> {
            Ok(Box::new(PassthroughVideoDecoder::new()))
        })
    }
}

impl MediaDecoder<DecodedVideoFrame> for PassthroughVideoDecoder {
    fn configure(&mut self, descriptor: &ConfigDescriptor) -> Result<(), CodecError> {
        let ConfigDescriptor::Video(desc) = descriptor else {
            return Err(CodecError::Configure("audio descriptor for video decoder".into()));
        };
        if desc.codec != VIDEO_CODEC {
            return Err(CodecError::Configure(format!("unsupported codec {}", desc.codec)));
        }
        self.config = Some(desc.clone());
        self.has_reference = false;
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<Vec<DecodedVideoFrame>, CodecError> {
        let (width, height) = match &self.config {
            Some(config) => (config.coded_width, config.coded_height),
            None => return Err(CodecError::NotConfigured),
        };
        if chunk.kind != MediaKind::Video {
            return Err(CodecError::Rejected("audio chunk sent to video decoder".into()));
        }
        if chunk.is_keyframe {
            self.has_reference = true;
        } else if !self.has_reference {
            return Err(CodecError::Rejected("delta frame without reference".into()));
        }
        Ok(vec![DecodedVideoFrame {
            timestamp: chunk.timestamp,
            width,
            height,
            data: chunk.data,
        }])
    }

    fn close(&mut self) {
        self.config = None;
        self.has_reference = false;
    }
}

/// Audio decoder
#[derive(Default)]
pub struct PassthroughAudioDecoder {
    config: Option<AudioDescriptor>,
}

impl PassthroughAudioDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> DecoderFactory<DecodedAudioBuffer> {
        Arc::new(|| -> Result<Box<dyn MediaDecoder<DecodedAudioBuffer>>, CodecError> {
            Ok(Box::new(PassthroughAudioDecoder::new()))
        })
    }
}

impl MediaDecoder<DecodedAudioBuffer> for PassthroughAudioDecoder {
    fn configure(&mut self, descriptor: &ConfigDescriptor) -> Result<(), CodecError> {
        let ConfigDescriptor::Audio(desc) = descriptor else {
            return Err(CodecError::Configure("video descriptor for audio decoder".into()));
        };
        if desc.codec != AUDIO_CODEC {
            return Err(CodecError::Configure(format!("unsupported codec {}", desc.codec)));
        }
        if desc.sample_rate == 0 || desc.number_of_channels == 0 {
            return Err(CodecError::Configure("invalid sample format".into()));
        }
        self.config = Some(desc.clone());
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<Vec<DecodedAudioBuffer>, CodecError> {
        let config = self.config.as_ref().ok_or(CodecError::NotConfigured)?;
        if chunk.kind != MediaKind::Audio {
            return Err(CodecError::Rejected("video chunk sent to audio decoder".into()));
        }
        let samples = bytes_to_samples(&chunk.data)?;
        Ok(vec![DecodedAudioBuffer {
            timestamp: chunk.timestamp,
            sample_rate: config.sample_rate,
            channels: config.number_of_channels,
            samples,
        }])
    }

    fn close(&mut self) {
        self.config = None;
    }
}
