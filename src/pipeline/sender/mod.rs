//! Sender pipeline components
//!
//! - EncodeStage: drives one encoder, packages chunks, applies the config gate
//! - TransmitStage: drains a packet queue into a transport channel
//!
//! ```text
//! raw frames → EncodeStage ─ config, audio → ReliableTransmitStage → reliable
//!                          └ video         → LossyTransmitStage    → lossy
//! ```

pub mod coordinator;
pub mod encode_stage;
pub mod transmit_stage;

pub use coordinator::SenderCoordinator;
pub use encode_stage::EncodeStage;
pub use transmit_stage::{Outbound, TransmitStage};
