//! Codec collaborator seams
//!
//! Encoders and decoders are external collaborators (hardware or software).
//! The pipeline only drives them through these traits: configure,
//! encode/decode, flush and close. Errors come back as return values instead
//! of callbacks.

pub mod passthrough;

use crate::error::CodecError;
use crate::pipeline::{EncodedChunk, MediaKind, RawFrame};
use crate::wire::ConfigDescriptor;
use std::sync::Arc;

/// One unit produced by an encoder
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub chunk: EncodedChunk,
    /// Decoder configuration reported alongside the chunk, if any
    pub metadata: Option<ConfigDescriptor>,
}

impl EncoderOutput {
    pub fn new(chunk: EncodedChunk) -> Self {
        Self {
            chunk,
            metadata: None,
        }
    }

    pub fn with_metadata(chunk: EncodedChunk, metadata: ConfigDescriptor) -> Self {
        Self {
            chunk,
            metadata: Some(metadata),
        }
    }
}

/// Encoder for one media kind
///
/// `encode` consumes the raw frame whatever the outcome, so frame resources
/// are released on every path.
pub trait MediaEncoder: Send {
    fn kind(&self) -> MediaKind;

    /// Encode one frame. `keyframe` forces a self-contained video frame.
    fn encode(&mut self, frame: RawFrame, keyframe: bool)
    -> Result<Vec<EncoderOutput>, CodecError>;

    /// Drain buffered output at end of stream
    fn flush(&mut self) -> Result<Vec<EncoderOutput>, CodecError> {
        Ok(Vec::new())
    }

    fn close(&mut self);
}

/// Decoder producing `O` (decoded video frames or audio buffers)
///
/// A `CodecError::Rejected` leaves the instance usable; any other error
/// from `decode` means the instance is broken and gets replaced.
pub trait MediaDecoder<O>: Send {
    fn configure(&mut self, descriptor: &ConfigDescriptor) -> Result<(), CodecError>;

    fn decode(&mut self, chunk: EncodedChunk) -> Result<Vec<O>, CodecError>;

    /// Inputs submitted but not yet decoded
    fn queue_depth(&self) -> usize {
        0
    }

    fn flush(&mut self) -> Result<Vec<O>, CodecError> {
        Ok(Vec::new())
    }

    fn close(&mut self);
}

/// Creates fresh decoder instances, used on first configure and on respawn
pub type DecoderFactory<O> =
    Arc<dyn Fn() -> Result<Box<dyn MediaDecoder<O>>, CodecError> + Send + Sync>;
