//! Descriptor codec
//!
//! Frames bincode payloads with a checksummed header.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StratumError};

use super::{FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// What a descriptor holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorKind {
    Table = 0x01,
    Snapshot = 0x02,
}

impl DescriptorKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(DescriptorKind::Table),
            0x02 => Some(DescriptorKind::Snapshot),
            _ => None,
        }
    }
}

/// Encode a descriptor
///
/// Format: magic (4) + kind (1) + version (2) + len (4) + crc (4) + payload
pub fn encode_descriptor<T: Serialize>(kind: DescriptorKind, value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        StratumError::Serialization(format!(
            "descriptor payload too large: {} bytes",
            payload.len()
        ))
    })?;
    let crc = crc32fast::hash(&payload);

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(kind as u8);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&payload);

    Ok(bytes)
}

/// Decode a descriptor, verifying magic, kind, version, length and checksum
pub fn decode_descriptor<T: DeserializeOwned>(expected: DescriptorKind, bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_SIZE {
        return Err(StratumError::Corruption(format!(
            "descriptor truncated: expected at least {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(StratumError::Corruption(format!(
            "invalid descriptor magic: expected STRM, got {:?}",
            &bytes[0..4]
        )));
    }

    match DescriptorKind::from_byte(bytes[4]) {
        Some(kind) if kind == expected => {}
        Some(kind) => {
            return Err(StratumError::Corruption(format!(
                "descriptor kind mismatch: expected {:?}, got {:?}",
                expected, kind
            )))
        }
        None => {
            return Err(StratumError::Corruption(format!(
                "unknown descriptor kind: {:#04x}",
                bytes[4]
            )))
        }
    }

    let version = u16::from_le_bytes([bytes[5], bytes[6]]);
    if version != FORMAT_VERSION {
        return Err(StratumError::Corruption(format!(
            "unsupported descriptor version: {}",
            version
        )));
    }

    let payload_len = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;
    let crc = u32::from_le_bytes([bytes[11], bytes[12], bytes[13], bytes[14]]);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(StratumError::Corruption(format!(
            "descriptor length mismatch: header says {} bytes, found {}",
            payload_len,
            payload.len()
        )));
    }

    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(StratumError::Corruption(format!(
            "descriptor checksum mismatch: expected {:#010x}, got {:#010x}",
            crc, actual
        )));
    }

    Ok(bincode::deserialize(payload)?)
}
