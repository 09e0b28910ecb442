//! Media session pipeline
//!
//! Separates the concerns of a live call:
//! - Control: session flags, lifecycle state, config handshake
//! - Processing: encode and decode lanes per media kind
//! - Timing: the output clock and the audio playback scheduler
//! - Health: counters for drops, faults and throughput
//!
//! # Architecture
//!
//! ```text
//! sender:   raw frames → EncodeStage → TransmitStage → reliable / lossy channel
//! receiver: reliable channel → ReliableReceiveStage → audio lane → scheduler
//!                                   │ (video configs, latest wins)
//!           lossy channel    → LossyReceiveStage    → video lane → presenter
//! ```
//!
//! Each stage runs in its own task; coordinators wire and spawn them.

pub mod clock;
pub mod handshake;
pub mod health;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stage;
pub mod state;
pub mod types;

pub use clock::{ManualClock, MonotonicClock, OutputClock};
pub use handshake::{Admission, ConfigHandshake};
pub use health::{DropReason, HealthSummary, PipelineHealth};
pub use session::SessionFlags;
pub use stage::{PipelineStage, spawn_stage};
pub use state::PipelineState;
pub use types::{
    DecodedAudioBuffer, DecodedVideoFrame, EncodedChunk, MediaKind, RawFormat, RawFrame, Timestamp,
};
