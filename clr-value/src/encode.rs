//! Encoding of values into their wire representation
//!
//! This mirrors what the in-process agent emits, and is used to record
//! synthetic captures and to exercise the decoder.

use crate::{
    element::ElementType,
    value::{ArrayValue, ClassValue, PointerValue, SzArrayValue, Value},
};

/// Growable buffer of encoded values
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValueWriter {
    /// Encoded data so far
    bytes: Vec<u8>,
}
//
impl ValueWriter {
    /// Start with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded data so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Extract the encoded data
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Encode a parameter list
    ///
    /// The declared parameter count is the length of the slice, even if it
    /// contains a `Value::MaxDepth` sentinel that will stop decoding early.
    pub fn write_parameters(&mut self, values: &[Value]) {
        self.write_u32(values.len() as u32);
        for value in values {
            self.write_value(value);
        }
    }

    /// Encode one value
    pub fn write_value(&mut self, value: &Value) {
        self.write_element_type(value.element_type());
        match value {
            Value::Void | Value::Unmanaged => {}
            Value::Bool(b) => self.write_u8(u8::from(*b)),
            Value::Char(c) => self.write_u16(*c),
            Value::Int8(i) => self.write_u8(*i as u8),
            Value::UInt8(u) => self.write_u8(*u),
            Value::Int16(i) => self.write_u16(*i as u16),
            Value::UInt16(u) => self.write_u16(*u),
            Value::Int32(i) => self.write_i32(*i),
            Value::UInt32(u) => self.write_u32(*u),
            Value::Int64(i) | Value::NativeInt(i) => self.write_u64(*i as u64),
            Value::UInt64(u) | Value::NativeUInt(u) | Value::FnPtr(u) => self.write_u64(*u),
            Value::Float32(f) => self.write_u32(f.to_bits()),
            Value::Float64(f) => self.write_u64(f.to_bits()),
            Value::String(s) => self.write_string(s.as_deref()),
            Value::Class(class) | Value::Struct(class) => self.write_class(class.as_ref()),
            Value::SzArray(array) => self.write_sz_array(array.as_ref()),
            Value::Array(array) => self.write_array(array.as_ref()),
            Value::Pointer(ptr) => self.write_pointer(ptr),
            Value::Recursion(category) => self.write_element_type(category.reason()),
            Value::MaxDepth => self.write_element_type(ElementType::End),
        }
    }

    /// Encode a class or struct payload
    fn write_class(&mut self, class: Option<&ClassValue>) {
        let Some(class) = class else {
            self.write_string(None);
            return;
        };
        self.write_string(Some(&class.type_name));
        self.write_i32(class.fields.len() as i32);
        for field in &class.fields {
            self.write_value(field);
        }
    }

    /// Encode a single-dimensional zero-based array payload
    fn write_sz_array(&mut self, array: Option<&SzArrayValue>) {
        let Some(array) = array else {
            self.write_element_type(ElementType::End);
            return;
        };
        self.write_element_type(array.element_type);
        self.write_i32(array.elements.len() as i32);
        for element in &array.elements {
            self.write_value(element);
        }
    }

    /// Encode a multi-dimensional array payload
    fn write_array(&mut self, array: Option<&ArrayValue>) {
        let Some(array) = array else {
            self.write_i32(0);
            self.write_element_type(ElementType::End);
            return;
        };
        self.write_i32(array.rank() as i32);
        self.write_element_type(array.element_type);
        for &len in &array.lengths {
            self.write_i32(len as i32);
        }
        // Elements are stored in row-major order already
        for element in &array.elements {
            self.write_value(element);
        }
    }

    /// Encode an unmanaged pointer payload
    fn write_pointer(&mut self, ptr: &PointerValue) {
        self.write_element_type(ptr.pointee_type);
        match (&*ptr.pointee, ptr.pointee_type) {
            (Value::String(s), ElementType::Char) => {
                self.write_element_type(ElementType::Char);
                self.write_string(s.as_deref());
            }
            (pointee, _) => self.write_value(pointee),
        }
    }

    /// Encode a length-prefixed UTF-16 string, `None` meaning null
    pub fn write_string(&mut self, s: Option<&str>) {
        let Some(s) = s else {
            self.write_i32(0);
            return;
        };
        let units = s.encode_utf16().collect::<Vec<_>>();
        self.write_i32(units.len() as i32 + 1);
        for unit in units {
            self.write_u16(unit);
        }
        self.write_u16(0);
    }

    /// Encode an element type tag
    pub fn write_element_type(&mut self, element_type: ElementType) {
        self.write_u8(element_type.tag());
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Append a byte
    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append a little-endian u16
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a little-endian i32
    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a little-endian u32
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a little-endian i64
    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a little-endian u64
    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }
}

/// Encode a single value into a fresh buffer
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut writer = ValueWriter::new();
    writer.write_value(value);
    writer.into_bytes()
}

/// Encode a parameter list into a fresh buffer
pub fn encode_parameters(values: &[Value]) -> Vec<u8> {
    let mut writer = ValueWriter::new();
    writer.write_parameters(values);
    writer.into_bytes()
}
