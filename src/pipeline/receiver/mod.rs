//! Receiver pipeline components
//!
//! - ReliableReceiveStage / LossyReceiveStage: one loop per channel
//! - DecodeLane: gating, decode and delivery for one media kind
//! - DecoderHandle: per-kind decoder state machine with self-healing
//! - AudioScheduler: places audio buffers on the output clock
//!
//! ```text
//! reliable → ReliableReceiveStage → audio lane → AudioScheduler → AudioOutput
//!                 │ video config (watch)
//! lossy    → LossyReceiveStage    → video lane → PresentationSink
//! ```

pub mod coordinator;
pub mod decode_stage;
pub mod decoder_handle;
pub mod playback;
pub mod receive_stage;

pub use coordinator::{DecoderFactories, ReceiverCoordinator};
pub use decode_stage::{DecodeLane, DecodedSink};
pub use decoder_handle::{DecoderHandle, HandleState, Submit};
pub use playback::{AudioScheduler, ScheduleOutcome};
pub use receive_stage::{LossyReceiveStage, ReliableReceiveStage};
