//! Per-kind decoder handle
//!
//! Owns the live decoder for one media kind and its state machine:
//!
//! ```text
//! Unconfigured ──config──▶ Configured ──fault──▶ Faulted ──respawn──▶ Configured
//! ```
//!
//! The last applied descriptor is kept so a respawned instance can be
//! reconfigured without a new config packet. Video additionally waits for a
//! keyframe after every configure and every fault.

use crate::codec::{DecoderFactory, MediaDecoder};
use crate::error::{CodecError, PipelineError};
use crate::pipeline::health::DropReason;
use crate::pipeline::{EncodedChunk, MediaKind};
use crate::wire::ConfigDescriptor;
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unconfigured,
    Configured,
    Faulted,
}

/// Result of submitting one chunk
#[derive(Debug)]
pub enum Submit<O> {
    /// The decoder accepted the chunk
    Decoded(Vec<O>),
    /// Shed before reaching the decoder
    Dropped(DropReason),
    /// The decoder refused this chunk but is still usable
    Rejected(CodecError),
    /// The decoder died; a replacement was attempted
    Faulted { error: CodecError, respawned: bool },
}

pub struct DecoderHandle<O> {
    kind: MediaKind,
    factory: DecoderFactory<O>,
    decoder: Option<Box<dyn MediaDecoder<O>>>,
    state: HandleState,
    descriptor: Option<ConfigDescriptor>,
    waiting_for_keyframe: bool,
    max_queue_depth: usize,
    disabled: bool,
}

impl<O> DecoderHandle<O> {
    /// Handle for `kind`. No decoder is created until the first config.
    pub fn new(kind: MediaKind, factory: DecoderFactory<O>, max_queue_depth: usize) -> Self {
        Self {
            kind,
            factory,
            decoder: None,
            state: HandleState::Unconfigured,
            descriptor: None,
            waiting_for_keyframe: true,
            max_queue_depth,
            disabled: false,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn descriptor(&self) -> Option<&ConfigDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_waiting_for_keyframe(&self) -> bool {
        self.waiting_for_keyframe
    }

    /// A configure failure ended this kind for the session
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn configure_failure(&self, source: CodecError) -> PipelineError {
        PipelineError::CodecConfigureFailure {
            kind: self.kind,
            source,
        }
    }

    fn close_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
    }

    fn disable(&mut self, source: CodecError) -> PipelineError {
        error!("{} decoder disabled: {}", self.kind, source);
        self.close_decoder();
        self.disabled = true;
        self.state = HandleState::Unconfigured;
        self.configure_failure(source)
    }

    /// Apply a configuration, creating the decoder instance if needed.
    ///
    /// A failure disables the handle: later data and configs for this kind
    /// are refused.
    pub fn apply_config(&mut self, descriptor: ConfigDescriptor) -> Result<(), PipelineError> {
        if self.disabled {
            return Err(self.configure_failure(CodecError::Configure(
                "decoder disabled by an earlier configure failure".into(),
            )));
        }
        if descriptor.kind() != self.kind {
            return Err(self.configure_failure(CodecError::Configure(format!(
                "{} descriptor for {} decoder",
                descriptor.kind(),
                self.kind
            ))));
        }

        if self.decoder.is_none() {
            match (self.factory)() {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(e) => return Err(self.disable(e)),
            }
        }
        let result = match self.decoder.as_mut() {
            Some(decoder) => decoder.configure(&descriptor),
            None => Err(CodecError::NotConfigured),
        };
        if let Err(e) = result {
            return Err(self.disable(e));
        }

        info!("{} decoder configured: {}", self.kind, descriptor);
        self.descriptor = Some(descriptor);
        self.state = HandleState::Configured;
        self.waiting_for_keyframe = true;
        Ok(())
    }

    /// Offer one chunk to the decoder, applying keyframe gating and overload
    /// shedding first. Runtime faults are recovered before returning.
    pub fn submit(&mut self, chunk: EncodedChunk) -> Submit<O> {
        if self.state != HandleState::Configured {
            return Submit::Dropped(DropReason::NotReady);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Submit::Dropped(DropReason::NotReady);
        };

        let is_keyframe = chunk.is_keyframe;
        if self.waiting_for_keyframe && !is_keyframe {
            return Submit::Dropped(DropReason::KeyframeWait);
        }
        if !is_keyframe && decoder.queue_depth() > self.max_queue_depth {
            return Submit::Dropped(DropReason::Overload);
        }

        match decoder.decode(chunk) {
            Ok(output) => {
                if is_keyframe && self.waiting_for_keyframe {
                    self.waiting_for_keyframe = false;
                    info!("{} decoder: keyframe accepted", self.kind);
                }
                Submit::Decoded(output)
            }
            Err(CodecError::Rejected(reason)) => {
                // the reference chain is broken
                if self.kind == MediaKind::Video {
                    self.waiting_for_keyframe = true;
                }
                Submit::Rejected(CodecError::Rejected(reason))
            }
            Err(error) => {
                let respawned = self.recover(&error);
                Submit::Faulted { error, respawned }
            }
        }
    }

    /// Replace a broken decoder and reapply the last descriptor.
    ///
    /// Returns whether a new instance was created. Without a cached
    /// descriptor the handle stays unconfigured until the next config.
    pub fn recover(&mut self, cause: &CodecError) -> bool {
        warn!("{} decoder fault: {}, respawning", self.kind, cause);
        self.state = HandleState::Faulted;
        self.waiting_for_keyframe = true;
        self.close_decoder();

        let mut decoder = match (self.factory)() {
            Ok(decoder) => decoder,
            Err(e) => {
                self.disable(e);
                return false;
            }
        };

        match self.descriptor.clone() {
            Some(descriptor) => {
                if let Err(e) = decoder.configure(&descriptor) {
                    decoder.close();
                    self.disable(e);
                    return false;
                }
                self.state = HandleState::Configured;
                info!("{} decoder respawned and reconfigured", self.kind);
            }
            None => self.state = HandleState::Unconfigured,
        }
        self.decoder = Some(decoder);
        true
    }

    /// Drain pending output
    pub fn flush(&mut self) -> Result<Vec<O>, CodecError> {
        match self.decoder.as_mut() {
            Some(decoder) if self.state == HandleState::Configured => decoder.flush(),
            _ => Ok(Vec::new()),
        }
    }

    /// Tear down the decoder and forget the descriptor
    pub fn reset(&mut self) {
        self.close_decoder();
        self.state = HandleState::Unconfigured;
        self.descriptor = None;
        self.waiting_for_keyframe = true;
        self.disabled = false;
    }
}

impl<O> Drop for DecoderHandle<O> {
    fn drop(&mut self) {
        self.close_decoder();
    }
}
