//! Typed - the boundary between caller types and stored payload bytes.
//!
//! Items carry opaque bytes; producers and workers work with serde types.
//! `PayloadCodec` is the only place that converts between the two.

pub mod codec;

pub use self::codec::{CODEC_VERSION, CodecError, PayloadCodec};
