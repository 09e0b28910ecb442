//! Binary packet framing
//!
//! ```text
//! config:  | type (1) | JSON descriptor ...         |
//! data:    | type (1) | timestamp ms (4, BE) | payload ... |
//! ```
//!
//! | code | packet       | header |
//! |------|--------------|--------|
//! | 0    | video config | 1      |
//! | 1    | audio config | 1      |
//! | 2    | video key    | 5      |
//! | 3    | video delta  | 5      |
//! | 4    | audio        | 5      |
//!
//! Encoding and decoding are pure functions over byte buffers and can be
//! called from any thread.

use crate::error::ParseError;
use crate::pipeline::{EncodedChunk, MediaKind, Timestamp};
use crate::wire::ConfigDescriptor;
use bytes::{BufMut, Bytes, BytesMut};

/// Header size of config packets
pub const CONFIG_HEADER_LEN: usize = 1;
/// Header size of data packets: type byte + big-endian timestamp
pub const DATA_HEADER_LEN: usize = 5;

/// Packet type carried in the first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    VideoConfig = 0,
    AudioConfig = 1,
    VideoKey = 2,
    VideoDelta = 3,
    Audio = 4,
}

impl PacketType {
    /// Wire code of this type
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Header length implied by this type
    pub fn header_len(self) -> usize {
        if self.is_config() {
            CONFIG_HEADER_LEN
        } else {
            DATA_HEADER_LEN
        }
    }

    pub fn is_config(self) -> bool {
        matches!(self, PacketType::VideoConfig | PacketType::AudioConfig)
    }

    /// Media kind the packet belongs to
    pub fn kind(self) -> MediaKind {
        match self {
            PacketType::VideoConfig | PacketType::VideoKey | PacketType::VideoDelta => {
                MediaKind::Video
            }
            PacketType::AudioConfig | PacketType::Audio => MediaKind::Audio,
        }
    }

    /// Config packet type for a media kind
    pub fn config_for(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => PacketType::VideoConfig,
            MediaKind::Audio => PacketType::AudioConfig,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ParseError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PacketType::VideoConfig),
            1 => Ok(PacketType::AudioConfig),
            2 => Ok(PacketType::VideoKey),
            3 => Ok(PacketType::VideoDelta),
            4 => Ok(PacketType::Audio),
            other => Err(ParseError::UnknownType(other)),
        }
    }
}

/// One framed unit on the wire.
///
/// Config packets carry no timestamp; their `timestamp` is always zero.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    /// Milliseconds, data packets only
    pub timestamp: u32,
    pub payload: Bytes,
}

impl Packet {
    /// Build the config packet announcing `descriptor`
    pub fn config(descriptor: &ConfigDescriptor) -> serde_json::Result<Self> {
        Ok(Self {
            packet_type: PacketType::config_for(descriptor.kind()),
            timestamp: 0,
            payload: Bytes::from(descriptor.to_json()?),
        })
    }

    /// Build the data packet carrying `chunk`
    pub fn data(chunk: &EncodedChunk) -> Self {
        let packet_type = match (chunk.kind, chunk.is_keyframe) {
            (MediaKind::Video, true) => PacketType::VideoKey,
            (MediaKind::Video, false) => PacketType::VideoDelta,
            (MediaKind::Audio, _) => PacketType::Audio,
        };
        Self {
            packet_type,
            timestamp: chunk.timestamp.wire_millis(),
            payload: chunk.data.clone(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.packet_type.kind()
    }

    pub fn is_config(&self) -> bool {
        self.packet_type.is_config()
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self.packet_type, PacketType::VideoKey | PacketType::Audio)
    }

    /// Total encoded length
    pub fn wire_len(&self) -> usize {
        self.packet_type.header_len() + self.payload.len()
    }

    /// Parse the descriptor of a config packet
    pub fn descriptor(&self) -> Result<ConfigDescriptor, ParseError> {
        if !self.is_config() {
            return Err(ParseError::InvalidConfig(format!(
                "{:?} packet has no descriptor",
                self.packet_type
            )));
        }
        ConfigDescriptor::from_json(self.kind(), &self.payload)
    }

    /// Turn a data packet into the chunk a decoder consumes
    pub fn into_chunk(self) -> Option<EncodedChunk> {
        if self.is_config() {
            return None;
        }
        Some(EncodedChunk {
            kind: self.kind(),
            is_keyframe: self.is_keyframe(),
            timestamp: Timestamp::from_wire_millis(self.timestamp),
            data: self.payload,
        })
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(self.packet_type.code());
        if !self.is_config() {
            buf.put_u32(self.timestamp);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse wire bytes. The payload shares the input buffer.
    pub fn decode(data: Bytes) -> Result<Self, ParseError> {
        let Some(&code) = data.first() else {
            return Err(ParseError::TooShort {
                needed: CONFIG_HEADER_LEN,
                actual: 0,
            });
        };
        let packet_type = PacketType::try_from(code)?;
        let header_len = packet_type.header_len();
        if data.len() < header_len {
            return Err(ParseError::TooShort {
                needed: header_len,
                actual: data.len(),
            });
        }

        let timestamp = if packet_type.is_config() {
            0
        } else {
            u32::from_be_bytes([data[1], data[2], data[3], data[4]])
        };

        Ok(Self {
            packet_type,
            timestamp,
            payload: data.slice(header_len..),
        })
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type)
            .field("timestamp", &self.timestamp)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// Serialize a packet to wire bytes
pub fn encode(packet: &Packet) -> Bytes {
    packet.encode()
}

/// Parse wire bytes into a packet
pub fn decode(data: Bytes) -> Result<Packet, ParseError> {
    Packet::decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::AudioDescriptor;

    fn data_packet(packet_type: PacketType, timestamp: u32, payload: &'static [u8]) -> Packet {
        Packet {
            packet_type,
            timestamp,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_data_header_layout() {
        let packet = data_packet(PacketType::VideoDelta, 0x0102_0304, b"xyz");
        let bytes = encode(&packet);
        assert_eq!(&bytes[..], &[3, 1, 2, 3, 4, b'x', b'y', b'z']);
    }

    #[test]
    fn test_config_header_layout() {
        let packet = Packet {
            packet_type: PacketType::AudioConfig,
            timestamp: 0,
            payload: Bytes::from_static(b"{}"),
        };
        assert_eq!(&encode(&packet)[..], &[1, b'{', b'}']);
    }

    #[test]
    fn test_round_trip_all_types() {
        let packets = [
            Packet {
                packet_type: PacketType::VideoConfig,
                timestamp: 0,
                payload: Bytes::from_static(b"{\"codec\":\"vp8\"}"),
            },
            Packet {
                packet_type: PacketType::AudioConfig,
                timestamp: 0,
                payload: Bytes::new(),
            },
            data_packet(PacketType::VideoKey, 0, b"key"),
            data_packet(PacketType::VideoDelta, u32::MAX, b"delta"),
            data_packet(PacketType::Audio, 20, b""),
        ];
        for packet in packets {
            assert_eq!(decode(encode(&packet)).unwrap(), packet);
        }
    }

    #[test]
    fn test_short_buffers_rejected() {
        assert_eq!(
            decode(Bytes::new()),
            Err(ParseError::TooShort {
                needed: 1,
                actual: 0
            })
        );
        for code in [2u8, 3, 4] {
            for len in 1..DATA_HEADER_LEN {
                let mut buf = vec![0u8; len];
                buf[0] = code;
                assert_eq!(
                    decode(Bytes::from(buf)),
                    Err(ParseError::TooShort {
                        needed: DATA_HEADER_LEN,
                        actual: len
                    })
                );
            }
        }
        // a bare config type byte is a complete (empty) config packet
        assert!(decode(Bytes::from_static(&[0])).is_ok());
    }

    #[test]
    fn test_unknown_type_rejected() {
        for code in [5u8, 17, 255] {
            assert_eq!(
                decode(Bytes::from(vec![code, 0, 0, 0, 0, 1])),
                Err(ParseError::UnknownType(code))
            );
        }
    }

    #[test]
    fn test_chunk_conversion() {
        let chunk = EncodedChunk::video(Bytes::from_static(b"k"), Timestamp::from_micros(66_000), true);
        let packet = Packet::data(&chunk);
        assert_eq!(packet.packet_type, PacketType::VideoKey);
        assert_eq!(packet.timestamp, 66);
        assert_eq!(packet.into_chunk().unwrap(), chunk);

        let audio = EncodedChunk::audio(Bytes::from_static(b"a"), Timestamp::from_micros(20_000));
        assert_eq!(Packet::data(&audio).packet_type, PacketType::Audio);
    }

    #[test]
    fn test_config_packet_carries_descriptor() {
        let desc = ConfigDescriptor::Audio(AudioDescriptor {
            codec: "opus".into(),
            sample_rate: 48_000,
            number_of_channels: 1,
            description: None,
        });
        let packet = Packet::config(&desc).unwrap();
        assert_eq!(packet.packet_type, PacketType::AudioConfig);
        let parsed = decode(encode(&packet)).unwrap();
        assert_eq!(parsed.descriptor().unwrap(), desc);
        assert!(parsed.into_chunk().is_none());
    }
}
