//! Values attached to detailed frames, decoded on first access

use clr_value::{DecodeError, DecodeLimits, Value, ValueReader};
use std::{
    fmt::{self, Debug, Formatter},
    sync::OnceLock,
};

/// Something that can be decoded from a detailed call payload
pub trait Decodable: Sized {
    /// Decode from a payload, which must be fully consumed
    fn decode(reader: &mut ValueReader) -> Result<Self, DecodeError>;

    /// What an empty payload stands for
    fn empty() -> Self;

    /// Truth that decoding stopped at a depth limit sentinel, in which case
    /// the rest of the payload is left unread
    fn stopped_early(&self) -> bool {
        false
    }
}
//
impl Decodable for Vec<Value> {
    fn decode(reader: &mut ValueReader) -> Result<Self, DecodeError> {
        reader.read_parameters()
    }

    fn empty() -> Self {
        Vec::new()
    }

    fn stopped_early(&self) -> bool {
        self.last() == Some(&Value::MaxDepth)
    }
}
//
impl Decodable for Value {
    fn decode(reader: &mut ValueReader) -> Result<Self, DecodeError> {
        reader.read_value()
    }

    fn empty() -> Self {
        Value::Void
    }
}

/// Encoded values along with the status the agent reported for them
///
/// Decoding happens the first time someone asks for the values, and the
/// outcome (success or failure) is memoized from then on.
#[derive(Clone)]
pub struct Encoded<T: Decodable> {
    /// Agent-side capture status, zero on success
    status: i32,

    /// Raw payload
    bytes: Box<[u8]>,

    /// Limits to be applied when decoding
    limits: DecodeLimits,

    /// Memoized decoding result
    decoded: OnceLock<Result<T, DecodeError>>,
}
//
impl<T: Decodable> Encoded<T> {
    /// Wrap an encoded payload
    pub fn new(status: i32, bytes: Box<[u8]>, limits: DecodeLimits) -> Self {
        Self {
            status,
            bytes,
            limits,
            decoded: OnceLock::new(),
        }
    }

    /// Status reported by the agent while capturing the values
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Raw payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Truth that decoding has already been attempted
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decoded values
    pub fn get(&self) -> Result<&T, DecodeError> {
        self.decoded
            .get_or_init(|| {
                if self.bytes.is_empty() {
                    return Ok(T::empty());
                }
                let mut reader = ValueReader::with_limits(&self.bytes, self.limits);
                let result = T::decode(&mut reader)?;
                if !result.stopped_early() {
                    reader.expect_end()?;
                }
                Ok(result)
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}
//
impl<T: Decodable> Debug for Encoded<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoded")
            .field("status", &self.status)
            .field("len", &self.bytes.len())
            .field("decoded", &self.is_decoded())
            .finish()
    }
}
//
impl<T: Decodable> PartialEq for Encoded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.bytes == other.bytes
    }
}
