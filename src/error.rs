//! Error types for the media pipeline
//!
//! Leaf errors come from the wire codec, the codec collaborators and the
//! transport channels. `PipelineError` is the session-level taxonomy the
//! loops act on: malformed packets are dropped, runtime faults trigger a
//! respawn, configure failures end one media kind and a closed channel ends
//! the owning loop.

use crate::pipeline::MediaKind;
use thiserror::Error;

/// Failure to parse a wire packet. Never fatal: the packet is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer shorter than the header implied by its type byte
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    /// Leading byte is not a known packet type
    #[error("unknown packet type {0}")]
    UnknownType(u8),

    /// Config payload is not a valid descriptor document
    #[error("invalid config payload: {0}")]
    InvalidConfig(String),
}

/// Error reported by an encoder or decoder implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The codec rejected its configuration
    #[error("codec configure failed: {0}")]
    Configure(String),

    /// The codec instance is broken and must be replaced
    #[error("codec fault: {0}")]
    Fault(String),

    /// A single input could not be processed; the instance is still usable
    #[error("codec rejected input: {0}")]
    Rejected(String),

    /// Operation requires a configured codec
    #[error("codec not configured")]
    NotConfigured,
}

/// Error surfaced by a transport channel
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer or the local owner closed the channel
    #[error("channel closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Session-level error taxonomy
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Too short or unknown packet; dropped and processing continues
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] ParseError),

    /// Codec could not be configured; fatal for this media kind only
    #[error("{kind} codec configure failure: {source}")]
    CodecConfigureFailure { kind: MediaKind, source: CodecError },

    /// Codec instance died; handled by respawning it
    #[error("{kind} codec runtime fault: {source}")]
    CodecRuntimeFault { kind: MediaKind, source: CodecError },

    /// Transport channel closed; terminal for the owning loop
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

impl PipelineError {
    /// Whether the owning loop should stop after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineError::ChannelClosed(_))
    }
}
