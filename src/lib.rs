//! Real-time media transport and adaptive decode pipeline.
//!
//! A sender turns raw frames into config and data packets on two channels
//! (reliable for configs and audio, lossy for video); a receiver gates them
//! through per-kind decoder state machines and schedules the output.

pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod wire;
