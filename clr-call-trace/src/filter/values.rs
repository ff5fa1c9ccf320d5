//! Predicates on the parameter values of detailed frames

use super::wildcard::{WildcardError, WildcardSet};
use clr_value::Value;
use serde::Deserialize;

/// Literal values to look for among the parameters of a frame
///
/// A frame matches if any of its parameters equals any of the literals of the
/// matching type. Literals of a different type than a parameter never match
/// it. Empty lists are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ValueFilterOptions {
    /// Boolean literals
    pub booleans: Vec<bool>,

    /// Character literals, only characters of the basic multilingual plane
    /// can match
    pub chars: Vec<char>,

    /// Signed 8-bit literals
    pub int8: Vec<i8>,

    /// Unsigned 8-bit literals
    pub uint8: Vec<u8>,

    /// Signed 16-bit literals
    pub int16: Vec<i16>,

    /// Unsigned 16-bit literals
    pub uint16: Vec<u16>,

    /// Signed 32-bit literals
    pub int32: Vec<i32>,

    /// Unsigned 32-bit literals
    pub uint32: Vec<u32>,

    /// Signed 64-bit literals
    pub int64: Vec<i64>,

    /// Unsigned 64-bit literals
    pub uint64: Vec<u64>,

    /// Single precision literals
    pub float32: Vec<f32>,

    /// Double precision literals
    pub float64: Vec<f64>,

    /// Native signed integer literals
    pub native_int: Vec<i64>,

    /// Native unsigned integer literals
    pub native_uint: Vec<u64>,

    /// Exact string contents
    pub strings: Vec<String>,

    /// Wildcard patterns for the type name of class instances
    pub class_types: Vec<String>,

    /// Wildcard patterns for the type name of struct instances
    pub struct_types: Vec<String>,

    /// Match frames whose only parameter is void
    pub void: bool,

    /// Match frames with a pointer, function pointer or unmanaged parameter
    pub unmanaged: bool,
}
//
impl ValueFilterOptions {
    /// Truth that no value predicate is configured
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Compiled value predicates
#[derive(Clone, Debug)]
pub(crate) struct ValueFilter {
    /// Literals
    options: ValueFilterOptions,

    /// Compiled class type name patterns
    class_types: WildcardSet,

    /// Compiled struct type name patterns
    struct_types: WildcardSet,
}
//
impl ValueFilter {
    /// Compile value predicates, if any is configured
    pub fn new(options: ValueFilterOptions) -> Result<Option<Self>, WildcardError> {
        if options.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            class_types: WildcardSet::new(&options.class_types)?,
            struct_types: WildcardSet::new(&options.struct_types)?,
            options,
        }))
    }

    /// Indices of the parameters that match
    ///
    /// An empty result means that the frame does not match.
    pub fn matching_parameters(&self, parameters: &[Value]) -> Vec<usize> {
        if self.options.void && matches!(parameters, [Value::Void]) {
            return vec![0];
        }
        parameters
            .iter()
            .enumerate()
            .filter(|(_, value)| self.value_matches(value))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Truth that a single parameter matches
    fn value_matches(&self, value: &Value) -> bool {
        let o = &self.options;
        match value {
            Value::Bool(b) => o.booleans.contains(b),
            Value::Char(c) => o.chars.iter().any(|lit| {
                let mut buf = [0; 2];
                *lit.encode_utf16(&mut buf) == [*c]
            }),
            Value::Int8(x) => o.int8.contains(x),
            Value::UInt8(x) => o.uint8.contains(x),
            Value::Int16(x) => o.int16.contains(x),
            Value::UInt16(x) => o.uint16.contains(x),
            Value::Int32(x) => o.int32.contains(x),
            Value::UInt32(x) => o.uint32.contains(x),
            Value::Int64(x) => o.int64.contains(x),
            Value::UInt64(x) => o.uint64.contains(x),
            Value::Float32(x) => o.float32.contains(x),
            Value::Float64(x) => o.float64.contains(x),
            Value::NativeInt(x) => o.native_int.contains(x),
            Value::NativeUInt(x) => o.native_uint.contains(x),
            Value::String(Some(s)) => o.strings.iter().any(|lit| lit == s),
            Value::Class(Some(class)) => self.class_types.is_match(&class.type_name),
            Value::Struct(Some(class)) => self.struct_types.is_match(&class.type_name),
            Value::Unmanaged | Value::Pointer(_) | Value::FnPtr(_) => o.unmanaged,
            _ => false,
        }
    }
}
