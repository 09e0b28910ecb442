//! Output surfaces for decoded media
//!
//! The decode pipeline hands video frames to a `PresentationSink` and
//! scheduled audio buffers to an `AudioOutput`. Both are external
//! collaborators; the implementations here are channel and ring-buffer
//! backed.

pub mod presenter;
pub mod ring_output;

pub use presenter::ChannelPresenter;
pub use ring_output::{AudioReader, RingAudioOutput};

use crate::pipeline::{DecodedAudioBuffer, DecodedVideoFrame};
use std::time::Duration;

/// Surface that displays decoded video
pub trait PresentationSink: Send {
    /// Frames the surface can still take without queuing. Zero or less
    /// means the caller must drop instead of presenting.
    fn desired_size(&self) -> isize;

    fn present(&mut self, frame: DecodedVideoFrame);
}

/// Device that plays audio at positions on the output clock
pub trait AudioOutput: Send {
    /// Play `buffer` starting at `start` on the output clock
    fn play_at(&mut self, buffer: DecodedAudioBuffer, start: Duration);
}
