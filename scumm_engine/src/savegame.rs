//! Save file framing.
//!
//! A save file is a fixed-size header followed by a MessagePack payload.
//! The header carries the magic, the format version and the payload length
//! so truncated or foreign files are rejected before any decoding happens.

use bytes::Buf;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::error::FatalError;

/// Bytes that prefix every save file ("SCVM").
pub const SAVE_MAGIC: [u8; 4] = *b"SCVM";

/// Payload layout written by this build.
pub const SAVE_VERSION: u16 = 3;

/// Length of the binary header in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    pub version: u16,
    pub length: u32,
}

impl SaveHeader {
    /// Encode the header as big-endian bytes. The reserved word is zero.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&SAVE_MAGIC);
        out[4..6].copy_from_slice(&self.version.to_be_bytes());
        out[8..12].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn decode(input: &[u8]) -> Result<Self, SaveError> {
        if input.len() < HEADER_LEN {
            return Err(SaveError::TruncatedHeader);
        }
        if input[..4] != SAVE_MAGIC {
            return Err(SaveError::BadMagic);
        }
        let mut rest = &input[4..HEADER_LEN];
        let version = rest.get_u16();
        let _reserved = rest.get_u16();
        let length = rest.get_u32();
        Ok(SaveHeader { version, length })
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save file smaller than {HEADER_LEN} bytes")]
    TruncatedHeader,
    #[error("not a save file (magic mismatch)")]
    BadMagic,
    #[error("save format {found} is not supported, expected {SAVE_VERSION}")]
    UnsupportedVersion { found: u16 },
    #[error("payload length mismatch: header declared {expected} bytes but found {actual}")]
    LengthMismatch { expected: u32, actual: usize },
    #[error("payload decode error: {0}")]
    PayloadDecode(#[from] rmp_serde::decode::Error),
    #[error("payload encode error: {0}")]
    PayloadEncode(#[from] rmp_serde::encode::Error),
    #[error("save does not fit this game: {0}")]
    Mismatch(String),
    #[error(transparent)]
    Vm(#[from] FatalError),
}

/// Serializes `payload` and prefixes the header.
pub fn encode_save<T: Serialize>(payload: &T) -> Result<Vec<u8>, SaveError> {
    let payload_bytes = rmp_serde::to_vec_named(payload)?;
    let length = u32::try_from(payload_bytes.len()).map_err(|_| SaveError::LengthMismatch {
        expected: u32::MAX,
        actual: payload_bytes.len(),
    })?;
    let header = SaveHeader {
        version: SAVE_VERSION,
        length,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload_bytes.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&payload_bytes);
    Ok(out)
}

/// Checks the header and decodes the payload.
pub fn decode_save<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SaveError> {
    let header = SaveHeader::decode(bytes)?;
    if header.version != SAVE_VERSION {
        return Err(SaveError::UnsupportedVersion {
            found: header.version,
        });
    }
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != header.length as usize {
        return Err(SaveError::LengthMismatch {
            expected: header.length,
            actual: payload.len(),
        });
    }
    Ok(rmp_serde::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        room: i32,
        names: Vec<String>,
    }

    #[test]
    fn header_layout_is_big_endian() {
        let header = SaveHeader {
            version: 3,
            length: 0x0102_0304,
        };
        let bytes = header.encode();
        assert_eq!(&bytes, b"SCVM\x00\x03\x00\x00\x01\x02\x03\x04");
        assert_eq!(SaveHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn framed_payload_decodes() {
        let sample = Sample {
            room: 12,
            names: vec!["dock".into()],
        };
        let bytes = encode_save(&sample).unwrap();
        assert_eq!(decode_save::<Sample>(&bytes).unwrap(), sample);
    }

    #[test]
    fn damaged_files_are_rejected() {
        let bytes = encode_save(&Sample {
            room: 1,
            names: Vec::new(),
        })
        .unwrap();
        assert!(matches!(
            decode_save::<Sample>(&bytes[..6]),
            Err(SaveError::TruncatedHeader)
        ));
        assert!(matches!(
            decode_save::<Sample>(&bytes[..bytes.len() - 1]),
            Err(SaveError::LengthMismatch { .. })
        ));

        let mut foreign = bytes.clone();
        foreign[0] = b'X';
        assert!(matches!(decode_save::<Sample>(&foreign), Err(SaveError::BadMagic)));

        let mut old = bytes;
        old[5] = 2;
        assert!(matches!(
            decode_save::<Sample>(&old),
            Err(SaveError::UnsupportedVersion { found: 2 })
        ));
    }
}
