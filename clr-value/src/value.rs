//! Decoded runtime values

use crate::{array, element::ElementType, ElidedCategory};

/// Typed runtime value, as decoded from a method parameter or return value
///
/// Composite values which can be null in the target runtime (strings, class
/// instances, arrays) wrap their payload in an `Option`, where `None` stands
/// for null. There is no separate null bit on the wire: nulls are encoded via
/// zero-length names or `End` element tags.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absence of value (e.g. the result of a method returning void)
    Void,

    /// Value which the encoder could not describe because it does not live in
    /// the managed world
    Unmanaged,

    /// Boolean
    Bool(bool),

    /// UTF-16 code unit, which may be half of a surrogate pair
    Char(u16),

    /// Signed 8-bit integer
    Int8(i8),

    /// Unsigned 8-bit integer
    UInt8(u8),

    /// Signed 16-bit integer
    Int16(i16),

    /// Unsigned 16-bit integer
    UInt16(u16),

    /// Signed 32-bit integer
    Int32(i32),

    /// Unsigned 32-bit integer
    UInt32(u32),

    /// Signed 64-bit integer
    Int64(i64),

    /// Unsigned 64-bit integer
    UInt64(u64),

    /// Single precision float
    Float32(f32),

    /// Double precision float
    Float64(f64),

    /// Native-sized signed integer
    ///
    /// Always stored with 64 bits. Narrowing to the pointer width of the
    /// target process is a display concern.
    NativeInt(i64),

    /// Native-sized unsigned integer, see `NativeInt`
    NativeUInt(u64),

    /// Managed string, or null
    String(Option<String>),

    /// Class instance, or null
    Class(Option<ClassValue>),

    /// Struct instance
    ///
    /// Structs have no null representation in the runtime, but the wire
    /// format shares the class encoding, so `None` is kept for symmetry.
    Struct(Option<ClassValue>),

    /// Single-dimensional zero-based array, or null
    SzArray(Option<SzArrayValue>),

    /// Array of arbitrary rank, or null
    Array(Option<ArrayValue>),

    /// Unmanaged pointer and the value it points to
    Pointer(PointerValue),

    /// Function pointer
    FnPtr(u64),

    /// Value that the encoder elided because of a cycle or excessive nesting
    Recursion(ElidedCategory),

    /// The configured value depth limit was reached, no more values follow in
    /// the enclosing parameter list
    MaxDepth,
}
//
impl Value {
    /// Element type tag that introduces this value on the wire
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Void => ElementType::Void,
            Self::Unmanaged => ElementType::Unmanaged,
            Self::Bool(_) => ElementType::Boolean,
            Self::Char(_) => ElementType::Char,
            Self::Int8(_) => ElementType::I1,
            Self::UInt8(_) => ElementType::U1,
            Self::Int16(_) => ElementType::I2,
            Self::UInt16(_) => ElementType::U2,
            Self::Int32(_) => ElementType::I4,
            Self::UInt32(_) => ElementType::U4,
            Self::Int64(_) => ElementType::I8,
            Self::UInt64(_) => ElementType::U8,
            Self::Float32(_) => ElementType::R4,
            Self::Float64(_) => ElementType::R8,
            Self::NativeInt(_) => ElementType::I,
            Self::NativeUInt(_) => ElementType::U,
            Self::String(_) => ElementType::String,
            Self::Class(_) => ElementType::Class,
            Self::Struct(_) => ElementType::ValueType,
            Self::SzArray(_) => ElementType::SzArray,
            Self::Array(_) => ElementType::Array,
            Self::Pointer(_) => ElementType::Ptr,
            Self::FnPtr(_) => ElementType::FnPtr,
            Self::Recursion(_) | Self::MaxDepth => ElementType::End,
        }
    }

    /// Truth that this is a null reference
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::String(None)
                | Self::Class(None)
                | Self::Struct(None)
                | Self::SzArray(None)
                | Self::Array(None)
        )
    }

    /// Truth that this value is a marker emitted in place of a real value
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Recursion(_) | Self::MaxDepth)
    }

    /// Truth that this value refers to unmanaged memory or code
    pub fn is_unmanaged(&self) -> bool {
        matches!(self, Self::Unmanaged | Self::Pointer(_) | Self::FnPtr(_))
    }

    /// Type name of class and struct instances
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Class(Some(class)) | Self::Struct(Some(class)) => Some(&class.type_name),
            _ => None,
        }
    }

    /// Text of non-null strings
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(Some(s)) => Some(s),
            _ => None,
        }
    }
}

/// Class or struct instance
#[derive(Clone, Debug, PartialEq)]
pub struct ClassValue {
    /// Fully qualified type name
    pub type_name: String,

    /// Field values in declaration order
    pub fields: Vec<Value>,
}
//
impl ClassValue {
    /// Build a class or struct instance
    pub fn new(type_name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Value of the field at a given declaration index
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }
}

/// Single-dimensional zero-based array
#[derive(Clone, Debug, PartialEq)]
pub struct SzArrayValue {
    /// Element type declared by the array
    pub element_type: ElementType,

    /// Array elements, in index order
    pub elements: Vec<Value>,
}

/// Array of arbitrary rank
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayValue {
    /// Element type declared by the array
    pub element_type: ElementType,

    /// Length of each dimension, the number of dimensions being the rank
    pub lengths: Vec<u32>,

    /// Array elements in row-major order (last dimension varies fastest)
    pub elements: Vec<Value>,
}
//
impl ArrayValue {
    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Element at some multi-dimensional index
    pub fn get(&self, indices: &[u32]) -> Option<&Value> {
        array::linear_index(&self.lengths, indices).and_then(|idx| self.elements.get(idx))
    }
}

/// Unmanaged pointer
#[derive(Clone, Debug, PartialEq)]
pub struct PointerValue {
    /// Element type of the pointee
    pub pointee_type: ElementType,

    /// Value that is pointed to
    ///
    /// When `pointee_type` is `Char`, the pointer is treated as a C-style
    /// string and this is always a `Value::String`.
    pub pointee: Box<Value>,
}
//
impl PointerValue {
    /// Build a pointer to some value
    pub fn new(pointee_type: ElementType, pointee: Value) -> Self {
        Self {
            pointee_type,
            pointee: Box::new(pointee),
        }
    }

    /// Number of pointer indirections before reaching a non-pointer value
    pub fn indirections(&self) -> usize {
        let mut depth = 1;
        let mut current = &*self.pointee;
        while let Value::Pointer(inner) = current {
            depth += 1;
            current = &inner.pointee;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Value::String(None).is_null());
        assert!(!Value::String(Some(String::new())).is_null());
        assert!(Value::Array(None).is_null());
        assert!(Value::MaxDepth.is_sentinel());
        assert!(Value::Recursion(ElidedCategory::Class).is_sentinel());
        assert!(Value::FnPtr(0x1000).is_unmanaged());
        assert!(!Value::Int32(3).is_unmanaged());
        assert_eq!(Value::MaxDepth.element_type(), ElementType::End);
        assert_eq!(Value::Struct(None).element_type(), ElementType::ValueType);
    }

    #[test]
    fn accessors() {
        let point = Value::Struct(Some(ClassValue::new(
            "Geometry.Point",
            vec![Value::Int32(1), Value::Int32(2)],
        )));
        assert_eq!(point.type_name(), Some("Geometry.Point"));
        assert_eq!(Value::String(Some("hi".into())).as_str(), Some("hi"));
        assert_eq!(Value::Class(None).type_name(), None);

        let ptr = PointerValue::new(
            ElementType::Ptr,
            Value::Pointer(PointerValue::new(ElementType::I4, Value::Int32(7))),
        );
        assert_eq!(ptr.indirections(), 2);
    }

    #[test]
    fn array_indexing() {
        let array = ArrayValue {
            element_type: ElementType::I4,
            lengths: vec![2, 3],
            elements: (0..6).map(Value::Int32).collect(),
        };
        assert_eq!(array.rank(), 2);
        assert_eq!(array.get(&[0, 0]), Some(&Value::Int32(0)));
        assert_eq!(array.get(&[0, 2]), Some(&Value::Int32(2)));
        assert_eq!(array.get(&[1, 0]), Some(&Value::Int32(3)));
        assert_eq!(array.get(&[1, 2]), Some(&Value::Int32(5)));
        assert_eq!(array.get(&[2, 0]), None);
        assert_eq!(array.get(&[0]), None);
    }
}
