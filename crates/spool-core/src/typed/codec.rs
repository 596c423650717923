//! PayloadCodec - versioned frame around serde_json payload bytes.
//!
//! Frame layout:
//!
//! ```text
//! +---------+----------------+------------------+
//! | version | length (u32 BE)| JSON body        |
//! | 1 byte  | 4 bytes        | `length` bytes   |
//! +---------+----------------+------------------+
//! ```
//!
//! Payload compatibility therefore depends on JSON and this header only, not
//! on any runtime's native serialization.

use serde::Serialize;
use serde::de::DeserializeOwned;

pub const CODEC_VERSION: u8 = 1;

const HEADER_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("payload frame truncated: header says {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload frame has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("payload body of {0} bytes does not fit the frame header")]
    TooLarge(usize),
}

pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
        let body = serde_json::to_vec(value).map_err(CodecError::Encode)?;
        let len = u32::try_from(body.len()).map_err(|_| CodecError::TooLarge(body.len()))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.push(CODEC_VERSION);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
        if frame.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: HEADER_LEN,
                actual: frame.len(),
            });
        }

        let version = frame[0];
        if version != CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        let body = &frame[HEADER_LEN..];
        if body.len() < len {
            return Err(CodecError::Truncated {
                expected: len,
                actual: body.len(),
            });
        }
        if body.len() > len {
            return Err(CodecError::TrailingBytes(body.len() - len));
        }

        serde_json::from_slice(body).map_err(CodecError::Decode)
    }
}
