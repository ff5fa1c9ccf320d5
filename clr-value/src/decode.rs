//! Decoding of values from their wire representation
//!
//! Every value starts with an element type tag byte, which fully determines
//! how many bytes follow. All multi-byte quantities are little-endian.

use crate::{
    array,
    element::{ElementType, ElidedCategory},
    value::{ArrayValue, ClassValue, PointerValue, SzArrayValue, Value},
};
use thiserror::Error;

/// Safeguards applied while decoding untrusted input
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodeLimits {
    /// Maximal nesting depth of composite values
    ///
    /// The encoder has its own (usually much lower) depth limit, which it
    /// signals with `Value::MaxDepth`. This one only protects the decoder's
    /// own stack against corrupted payloads.
    pub max_nesting: usize,
}
//
impl Default for DecodeLimits {
    fn default() -> Self {
        Self { max_nesting: 256 }
    }
}

/// Decode a byte buffer that contains exactly one value
pub fn decode_value(bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = ValueReader::new(bytes);
    let value = reader.read_value()?;
    reader.expect_end()?;
    Ok(value)
}

/// Decode a byte buffer that contains exactly one parameter list
///
/// If the list ends with a `MaxDepth` sentinel, whatever follows it is left
/// unread instead of being reported as trailing bytes.
pub fn decode_parameters(bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
    let mut reader = ValueReader::new(bytes);
    let values = reader.read_parameters()?;
    if values.last() != Some(&Value::MaxDepth) {
        reader.expect_end()?;
    }
    Ok(values)
}

/// Cursor over a buffer of encoded values
#[derive(Clone, Debug)]
pub struct ValueReader<'bytes> {
    /// Encoded data
    bytes: &'bytes [u8],

    /// Current reading position within `bytes`
    position: usize,

    /// Safeguards against hostile input
    limits: DecodeLimits,

    /// Current composite value nesting depth
    depth: usize,
}
//
impl<'bytes> ValueReader<'bytes> {
    /// Start reading at the beginning of some bytes with default limits
    pub fn new(bytes: &'bytes [u8]) -> Self {
        Self::with_limits(bytes, DecodeLimits::default())
    }

    /// Start reading at the beginning of some bytes with custom limits
    pub fn with_limits(bytes: &'bytes [u8], limits: DecodeLimits) -> Self {
        Self {
            bytes,
            position: 0,
            limits,
            depth: 0,
        }
    }

    /// Current position within the underlying buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes that have not been read yet
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Truth that the whole buffer has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Check that the whole buffer has been consumed
    pub fn expect_end(&self) -> Result<(), DecodeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                remaining: self.remaining(),
            })
        }
    }

    /// Decode one value
    ///
    /// Decoding is all-or-nothing: on failure, the reader is rewound to where
    /// it was before the call, so that no partially consumed value can shift
    /// the interpretation of subsequent bytes.
    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        let start = self.position;
        let result = self.value();
        if result.is_err() {
            self.position = start;
            self.depth = 0;
        }
        result
    }

    /// Decode a parameter list: a 32-bit count followed by that many values
    ///
    /// Decoding stops early after a `Value::MaxDepth` sentinel, which is kept
    /// as the last element of the output.
    pub fn read_parameters(&mut self) -> Result<Vec<Value>, DecodeError> {
        let start = self.position;
        let result = self.parameters();
        if result.is_err() {
            self.position = start;
            self.depth = 0;
        }
        result
    }

    /// Implementation of read_parameters without rewinding
    fn parameters(&mut self) -> Result<Vec<Value>, DecodeError> {
        let count = self.read_u32()? as usize;
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let value = self.value()?;
            let stop = value == Value::MaxDepth;
            values.push(value);
            if stop {
                break;
            }
        }
        Ok(values)
    }

    /// Implementation of read_value without rewinding
    fn value(&mut self) -> Result<Value, DecodeError> {
        let tag_position = self.position;
        let tag = self.read_u8()?;
        let element_type =
            ElementType::from_tag(tag).ok_or(DecodeError::UnsupportedElementType {
                tag,
                position: tag_position,
            })?;
        let value = match element_type {
            ElementType::End => self.sentinel()?,
            ElementType::Void => Value::Void,
            ElementType::Unmanaged => Value::Unmanaged,
            ElementType::Boolean => Value::Bool(self.read_u8()? != 0),
            ElementType::Char => Value::Char(self.read_u16()?),
            ElementType::I1 => Value::Int8(self.read_u8()? as i8),
            ElementType::U1 => Value::UInt8(self.read_u8()?),
            ElementType::I2 => Value::Int16(self.read_u16()? as i16),
            ElementType::U2 => Value::UInt16(self.read_u16()?),
            ElementType::I4 => Value::Int32(self.read_i32()?),
            ElementType::U4 => Value::UInt32(self.read_u32()?),
            ElementType::I8 => Value::Int64(self.read_i64()?),
            ElementType::U8 => Value::UInt64(self.read_u64()?),
            ElementType::R4 => Value::Float32(f32::from_bits(self.read_u32()?)),
            ElementType::R8 => Value::Float64(f64::from_bits(self.read_u64()?)),
            ElementType::I => Value::NativeInt(self.read_i64()?),
            ElementType::U => Value::NativeUInt(self.read_u64()?),
            ElementType::String => Value::String(self.read_string()?),
            ElementType::Class | ElementType::Object | ElementType::GenericInst => {
                Value::Class(self.nested(Self::class)?)
            }
            ElementType::ValueType => Value::Struct(self.nested(Self::class)?),
            ElementType::SzArray => Value::SzArray(self.nested(Self::sz_array)?),
            ElementType::Array => Value::Array(self.nested(Self::array)?),
            ElementType::Ptr => Value::Pointer(self.nested(Self::pointer)?),
            ElementType::FnPtr => Value::FnPtr(self.read_u64()?),
            ElementType::ByRef
            | ElementType::Var
            | ElementType::TypedByRef
            | ElementType::MVar => {
                return Err(DecodeError::UnsupportedElementType {
                    tag,
                    position: tag_position,
                })
            }
        };
        Ok(value)
    }

    /// Run a composite value decoder one nesting level deeper
    fn nested<T>(
        &mut self,
        decode: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        if self.depth >= self.limits.max_nesting {
            return Err(DecodeError::NestingTooDeep {
                limit: self.limits.max_nesting,
            });
        }
        self.depth += 1;
        let result = decode(self);
        self.depth -= 1;
        result
    }

    /// Decode what follows an `End` sentinel tag
    fn sentinel(&mut self) -> Result<Value, DecodeError> {
        let position = self.position;
        let reason = self.read_u8()?;
        match ElementType::from_tag(reason) {
            Some(ElementType::End) => Ok(Value::MaxDepth),
            Some(element_type) => ElidedCategory::from_reason(element_type)
                .map(Value::Recursion)
                .ok_or(DecodeError::UnexpectedSentinelReason { reason, position }),
            None => Err(DecodeError::UnexpectedSentinelReason { reason, position }),
        }
    }

    /// Decode the payload of a class or struct
    fn class(&mut self) -> Result<Option<ClassValue>, DecodeError> {
        let Some(type_name) = self.read_string()? else {
            return Ok(None);
        };
        let num_fields = self.read_length()?;
        let mut fields = Vec::with_capacity(num_fields.min(self.remaining()));
        for _ in 0..num_fields {
            fields.push(self.value()?);
        }
        Ok(Some(ClassValue { type_name, fields }))
    }

    /// Decode the payload of a single-dimensional zero-based array
    fn sz_array(&mut self) -> Result<Option<SzArrayValue>, DecodeError> {
        let element_type = self.read_element_type()?;
        if element_type == ElementType::End {
            return Ok(None);
        }
        let len = self.read_length()?;
        let elements = self.elements(len)?;
        Ok(Some(SzArrayValue {
            element_type,
            elements,
        }))
    }

    /// Decode the payload of an array of arbitrary rank
    fn array(&mut self) -> Result<Option<ArrayValue>, DecodeError> {
        let rank = self.read_length()?;
        let element_type = self.read_element_type()?;
        if element_type == ElementType::End {
            return Ok(None);
        }
        let lengths = (0..rank)
            .map(|_| self.read_length().map(|len| len as u32))
            .collect::<Result<Vec<_>, _>>()?;
        let count = array::element_count(&lengths).ok_or_else(|| DecodeError::ArrayTooLarge {
            lengths: lengths.clone().into_boxed_slice(),
        })?;
        let elements = self.elements(count)?;
        Ok(Some(ArrayValue {
            element_type,
            lengths,
            elements,
        }))
    }

    /// Decode a sequence of array elements
    fn elements(&mut self, count: usize) -> Result<Vec<Value>, DecodeError> {
        // Each element takes at least one byte, so don't trust larger counts
        let position = self.position;
        if count > self.remaining() {
            return Err(DecodeError::UnexpectedEnd {
                needed: count,
                position,
            });
        }
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(self.value()?);
        }
        Ok(elements)
    }

    /// Decode the payload of an unmanaged pointer
    fn pointer(&mut self) -> Result<PointerValue, DecodeError> {
        let pointee_type = self.read_element_type()?;
        let pointee = if pointee_type == ElementType::Char {
            // char* is treated as a string, with a repeated Char tag in front
            let position = self.position;
            let tag = self.read_u8()?;
            if tag != ElementType::Char.tag() {
                return Err(DecodeError::BadCharPointer { tag, position });
            }
            Value::String(self.read_string()?)
        } else {
            self.value()?
        };
        Ok(PointerValue {
            pointee_type,
            pointee: Box::new(pointee),
        })
    }

    /// Read an element type tag that is not followed by a value
    fn read_element_type(&mut self) -> Result<ElementType, DecodeError> {
        let position = self.position;
        let tag = self.read_u8()?;
        ElementType::from_tag(tag).ok_or(DecodeError::UnsupportedElementType { tag, position })
    }

    /// Read a length-prefixed UTF-16 string
    ///
    /// The length is a character count which includes a trailing NUL, so that
    /// zero can stand for a null string.
    pub fn read_string(&mut self) -> Result<Option<String>, DecodeError> {
        let len_with_nul = self.read_length()?;
        if len_with_nul == 0 {
            return Ok(None);
        }
        let text_bytes = self.read_bytes((len_with_nul - 1) * 2)?;
        let units = text_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        let text = char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        self.read_bytes(2)?;
        Ok(Some(text))
    }

    /// Read a signed 32-bit length, which must not be negative
    fn read_length(&mut self) -> Result<usize, DecodeError> {
        let position = self.position;
        let length = self.read_i32()?;
        usize::try_from(length).map_err(|_| DecodeError::NegativeLength { length, position })
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'bytes [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEnd {
                needed: len,
                position: self.position,
            });
        }
        let bytes = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a fixed-size array of bytes
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut result = [0; N];
        result.copy_from_slice(self.read_bytes(N)?);
        Ok(result)
    }

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_array::<1>().map(|[b]| b)
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian i32
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian i64
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.read_array().map(u64::from_le_bytes)
    }
}

/// What can go wrong while decoding a value
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    /// Input ended in the middle of a value
    #[error("unexpected end of input at byte {position} (needed {needed} more bytes)")]
    UnexpectedEnd { needed: usize, position: usize },

    /// Encountered a type tag that cannot start a value
    #[error("unsupported element type tag {tag:#04x} at byte {position}")]
    UnsupportedElementType { tag: u8, position: usize },

    /// An End sentinel was followed by an unknown reason byte
    #[error("unexpected End sentinel reason {reason:#04x} at byte {position}")]
    UnexpectedSentinelReason { reason: u8, position: usize },

    /// A char pointer was not followed by the expected second Char tag
    #[error("char pointer followed by tag {tag:#04x} instead of Char at byte {position}")]
    BadCharPointer { tag: u8, position: usize },

    /// Encountered a negative string, field or element count
    #[error("negative length {length} at byte {position}")]
    NegativeLength { length: i32, position: usize },

    /// Array dimensions describe more elements than can be addressed
    #[error("array dimensions {lengths:?} are too large")]
    ArrayTooLarge { lengths: Box<[u32]> },

    /// Composite values are nested deeper than the decoder accepts
    #[error("values are nested deeper than the limit of {limit}")]
    NestingTooDeep { limit: usize },

    /// Buffer contained more data than the expected value(s)
    #[error("{remaining} unexpected trailing bytes after value")]
    TrailingBytes { remaining: usize },
}
