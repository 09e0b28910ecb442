//! Decoder configuration descriptors
//!
//! A descriptor is what an encoder reports about its output and what the
//! remote decoder needs before it can accept any data of that kind. On the
//! wire it travels as the JSON payload of a config packet, with the opaque
//! codec initialization blob base64-encoded under `description`.

use crate::error::ParseError;
use crate::pipeline::MediaKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Video decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDescriptor {
    /// Codec string, e.g. `avc1.42001f`
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// Codec specific initialization data (avcC box, VP9 codec private, ...)
    #[serde(default, with = "base64_blob", skip_serializing_if = "Option::is_none")]
    pub description: Option<Bytes>,
    /// Clockwise rotation in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u16>,
}

/// Audio decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDescriptor {
    /// Codec string, e.g. `opus`
    pub codec: String,
    pub sample_rate: u32,
    pub number_of_channels: u16,
    #[serde(default, with = "base64_blob", skip_serializing_if = "Option::is_none")]
    pub description: Option<Bytes>,
}

/// Per-kind decoder configuration.
///
/// Immutable once built; a newer descriptor of the same kind replaces the old
/// one as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDescriptor {
    Video(VideoDescriptor),
    Audio(AudioDescriptor),
}

impl ConfigDescriptor {
    /// Media kind this descriptor configures
    pub fn kind(&self) -> MediaKind {
        match self {
            ConfigDescriptor::Video(_) => MediaKind::Video,
            ConfigDescriptor::Audio(_) => MediaKind::Audio,
        }
    }

    /// Codec identifier string
    pub fn codec(&self) -> &str {
        match self {
            ConfigDescriptor::Video(v) => &v.codec,
            ConfigDescriptor::Audio(a) => &a.codec,
        }
    }

    /// Opaque initialization blob, if the codec has one
    pub fn description(&self) -> Option<&Bytes> {
        match self {
            ConfigDescriptor::Video(v) => v.description.as_ref(),
            ConfigDescriptor::Audio(a) => a.description.as_ref(),
        }
    }

    /// Serialize to the JSON document carried by a config packet
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            ConfigDescriptor::Video(v) => serde_json::to_vec(v),
            ConfigDescriptor::Audio(a) => serde_json::to_vec(a),
        }
    }

    /// Parse a config packet payload for the given kind
    pub fn from_json(kind: MediaKind, json: &[u8]) -> Result<Self, ParseError> {
        let parsed = match kind {
            MediaKind::Video => serde_json::from_slice(json).map(ConfigDescriptor::Video),
            MediaKind::Audio => serde_json::from_slice(json).map(ConfigDescriptor::Audio),
        };
        parsed.map_err(|e| ParseError::InvalidConfig(e.to_string()))
    }
}

impl std::fmt::Display for ConfigDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigDescriptor::Video(v) => {
                write!(f, "{} {}x{}", v.codec, v.coded_width, v.coded_height)
            }
            ConfigDescriptor::Audio(a) => {
                write!(
                    f,
                    "{} {}Hz/{}ch",
                    a.codec, a.sample_rate, a.number_of_channels
                )
            }
        }
    }
}

mod base64_blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(blob) => serializer.serialize_some(&STANDARD.encode(blob)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| {
                STANDARD
                    .decode(text.as_bytes())
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
