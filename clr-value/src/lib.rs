//! Self-describing binary encoding of runtime values, as emitted by the
//! in-process tracing agent for method parameters and return values.
//!
//! Every value starts with an element type tag which tells how many bytes
//! follow, recursively, so that values can be decoded without any schema.
//! Use `decode_value()` or `decode_parameters()` for one-shot decoding, or a
//! `ValueReader` to walk through a buffer that contains several values.

pub mod array;
mod decode;
mod element;
mod encode;
mod value;

pub use self::{
    decode::{decode_parameters, decode_value, DecodeError, DecodeLimits, ValueReader},
    element::{ElementType, ElidedCategory},
    encode::{encode_parameters, encode_value, ValueWriter},
    value::{ArrayValue, ClassValue, PointerValue, SzArrayValue, Value},
};
