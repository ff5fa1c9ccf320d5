//! Utility to display decoded parameter and return values

use clr_call_trace::value::{ArrayValue, ClassValue, ElidedCategory, Value};
use std::fmt::{self, Display, Formatter};

/// Display a value in a C#-like syntax
#[derive(Clone, Copy, Debug)]
pub struct ValueDisplay<'value>(pub &'value Value);
//
impl Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        display_value(f, self.0)
    }
}

/// Display a comma-separated parameter list, without the parentheses
#[derive(Clone, Copy, Debug)]
pub struct ParametersDisplay<'value>(pub &'value [Value]);
//
impl Display for ParametersDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        display_list(f, self.0)
    }
}

/// Implementation of ValueDisplay
fn display_value(f: &mut Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Void => write!(f, "void"),
        Value::Unmanaged => write!(f, "<unmanaged>"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Char(c) => match char::from_u32((*c).into()) {
            Some(c) => write!(f, "'{}'", c.escape_debug()),
            None => write!(f, "'\\u{{{c:04x}}}'"),
        },
        Value::Int8(x) => write!(f, "{x}"),
        Value::UInt8(x) => write!(f, "{x}"),
        Value::Int16(x) => write!(f, "{x}"),
        Value::UInt16(x) => write!(f, "{x}"),
        Value::Int32(x) => write!(f, "{x}"),
        Value::UInt32(x) => write!(f, "{x}"),
        Value::Int64(x) => write!(f, "{x}"),
        Value::UInt64(x) => write!(f, "{x}"),
        Value::Float32(x) => write!(f, "{x:?}f"),
        Value::Float64(x) => write!(f, "{x:?}"),
        Value::NativeInt(x) => write!(f, "(nint){x}"),
        Value::NativeUInt(x) => write!(f, "(nuint){x}"),
        Value::String(Some(s)) => write!(f, "\"{}\"", s.escape_debug()),
        Value::Class(Some(instance)) | Value::Struct(Some(instance)) => {
            display_instance(f, instance)
        }
        Value::SzArray(Some(array)) => {
            write!(f, "{}[{}] ", array.element_type, array.elements.len())?;
            display_elements(f, &array.elements)
        }
        Value::Array(Some(array)) => display_array(f, array),
        Value::String(None) | Value::Class(None) | Value::Struct(None) => write!(f, "null"),
        Value::SzArray(None) | Value::Array(None) => write!(f, "null"),
        Value::Pointer(pointer) => {
            write!(f, "&")?;
            display_value(f, &pointer.pointee)
        }
        Value::FnPtr(address) => write!(f, "fn@{address:#x}"),
        Value::Recursion(category) => {
            let category = match category {
                ElidedCategory::Class => "object",
                ElidedCategory::GenericInst => "generic object",
                ElidedCategory::Array => "array",
                ElidedCategory::SzArray => "vector",
            };
            write!(f, "<recursive {category}>")
        }
        Value::MaxDepth => write!(f, "…"),
    }
}

/// Comma-separated values
fn display_list(f: &mut Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        display_value(f, value)?;
    }
    Ok(())
}

/// Display a class or struct instance
fn display_instance(f: &mut Formatter<'_>, instance: &ClassValue) -> fmt::Result {
    write!(f, "{} {{", instance.type_name)?;
    if !instance.fields.is_empty() {
        write!(f, " ")?;
        display_list(f, &instance.fields)?;
        write!(f, " ")?;
    }
    write!(f, "}}")
}

/// Display a bracketed list of array elements
fn display_elements(f: &mut Formatter<'_>, elements: &[Value]) -> fmt::Result {
    write!(f, "[")?;
    display_list(f, elements)?;
    write!(f, "]")
}

/// Display a multi-dimensional array as nested lists, one level per dimension
fn display_array(f: &mut Formatter<'_>, array: &ArrayValue) -> fmt::Result {
    write!(f, "{}[", array.element_type)?;
    for (idx, length) in array.lengths.iter().enumerate() {
        if idx > 0 {
            write!(f, ",")?;
        }
        write!(f, "{length}")?;
    }
    write!(f, "] ")?;
    display_dimensions(f, &array.lengths, &array.elements)
}

/// Recursive part of `display_array`
fn display_dimensions(
    f: &mut Formatter<'_>,
    lengths: &[u32],
    elements: &[Value],
) -> fmt::Result {
    match lengths {
        [] | [_] => display_elements(f, elements),
        [_, inner @ ..] => {
            let stride = inner.iter().map(|&len| len as usize).product::<usize>();
            write!(f, "[")?;
            if stride > 0 {
                for (idx, chunk) in elements.chunks(stride).enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    display_dimensions(f, inner, chunk)?;
                }
            }
            write!(f, "]")
        }
    }
}
