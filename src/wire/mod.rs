//! Wire format: packet framing and config descriptors

pub mod descriptor;
pub mod packet;

pub use descriptor::{AudioDescriptor, ConfigDescriptor, VideoDescriptor};
pub use packet::{CONFIG_HEADER_LEN, DATA_HEADER_LEN, Packet, PacketType, decode, encode};
