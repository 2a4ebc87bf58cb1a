//! Record framing for the file store
//!
//! Every stored value is written as a codec byte followed by the payload,
//! either raw or zstd-compressed depending on the store configuration.

use crate::config::StoreConfig;
use crate::{Error, Result};

/// How a record's payload is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Zstd,
}

impl Codec {
    pub fn as_byte(&self) -> u8 {
        match self {
            Codec::Raw => 0,
            Codec::Zstd => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Codec::Raw),
            1 => Some(Codec::Zstd),
            _ => None,
        }
    }
}

/// Frame `data` for storage
pub fn encode(data: &[u8], config: &StoreConfig) -> Result<Vec<u8>> {
    let codec = if config.compression && data.len() >= config.compression_threshold {
        Codec::Zstd
    } else {
        Codec::Raw
    };

    let mut output = Vec::with_capacity(data.len() + 1);
    output.push(codec.as_byte());
    match codec {
        Codec::Raw => output.extend_from_slice(data),
        Codec::Zstd => output.extend(zstd::encode_all(data, config.compression_level)?),
    }
    Ok(output)
}

/// Recover the payload of a framed record
pub fn decode(frame: &[u8]) -> Result<Vec<u8>> {
    let (&tag, payload) = frame
        .split_first()
        .ok_or_else(|| Error::Corruption("Empty record".into()))?;

    match Codec::from_byte(tag) {
        Some(Codec::Raw) => Ok(payload.to_vec()),
        Some(Codec::Zstd) => Ok(zstd::decode_all(payload)?),
        None => Err(Error::Corruption(format!("Invalid record codec: {}", tag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let config = StoreConfig::default();
        let small = b"hello world".to_vec();
        let large = vec![7u8; 4096];

        let framed = encode(&small, &config).unwrap();
        assert_eq!(framed[0], Codec::Raw.as_byte());
        assert_eq!(decode(&framed).unwrap(), small);

        let framed = encode(&large, &config).unwrap();
        assert_eq!(framed[0], Codec::Zstd.as_byte());
        assert!(framed.len() < large.len());
        assert_eq!(decode(&framed).unwrap(), large);
    }

    #[test]
    fn test_uncompressed_config() {
        let large = vec![7u8; 4096];
        let framed = encode(&large, &StoreConfig::uncompressed()).unwrap();
        assert_eq!(framed[0], Codec::Raw.as_byte());
        assert_eq!(framed.len(), large.len() + 1);
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(decode(&[]), Err(Error::Corruption(_))));
        assert!(matches!(decode(&[9, 1, 2]), Err(Error::Corruption(_))));
    }
}
