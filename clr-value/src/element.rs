//! Element type tags, the leading byte of every encoded value

use std::fmt::{self, Display, Formatter};

/// Runtime element category, as written in front of each encoded value
///
/// Discriminants follow the runtime's own signature encoding so that the
/// in-process encoder can copy them straight out of method signatures. Not
/// every category can actually appear on the wire: see `decode` for the
/// subset that the decoder accepts.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::FromRepr, strum::AsRefStr)]
#[repr(u8)]
pub enum ElementType {
    /// Sentinel introducing recursion / depth truncation markers
    End = 0x00,
    /// No value
    Void = 0x01,
    /// `bool`
    Boolean = 0x02,
    /// UTF-16 code unit
    Char = 0x03,
    /// `i8`
    I1 = 0x04,
    /// `u8`
    U1 = 0x05,
    /// `i16`
    I2 = 0x06,
    /// `u16`
    U2 = 0x07,
    /// `i32`
    I4 = 0x08,
    /// `u32`
    U4 = 0x09,
    /// `i64`
    I8 = 0x0a,
    /// `u64`
    U8 = 0x0b,
    /// `f32`
    R4 = 0x0c,
    /// `f64`
    R8 = 0x0d,
    /// Managed string
    String = 0x0e,
    /// Unmanaged pointer
    Ptr = 0x0f,
    /// Managed reference
    ByRef = 0x10,
    /// Struct instance
    ValueType = 0x11,
    /// Class instance
    Class = 0x12,
    /// Generic type parameter
    Var = 0x13,
    /// Array of arbitrary rank
    Array = 0x14,
    /// Generic type instantiation
    GenericInst = 0x15,
    /// Typed reference
    TypedByRef = 0x16,
    /// Native-sized signed integer
    I = 0x18,
    /// Native-sized unsigned integer
    U = 0x19,
    /// Function pointer
    FnPtr = 0x1b,
    /// `System.Object`
    Object = 0x1c,
    /// Single-dimensional zero-based array
    SzArray = 0x1d,
    /// Generic method parameter
    MVar = 0x1e,
    /// Value living outside of the managed heap, which the encoder could not
    /// describe any further
    Unmanaged = 0x22,
}
//
impl ElementType {
    /// Decode a wire tag, if it names a known element category
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::from_repr(tag)
    }

    /// Wire tag of this element category
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Truth that values of this category have a fixed-width payload
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Self::Boolean
                | Self::Char
                | Self::I1
                | Self::U1
                | Self::I2
                | Self::U2
                | Self::I4
                | Self::U4
                | Self::I8
                | Self::U8
                | Self::R4
                | Self::R8
                | Self::I
                | Self::U
        )
    }

    /// Payload width of primitive categories, in bytes
    ///
    /// Native-sized integers always take 8 bytes on the wire, whatever the
    /// pointer width of the target process or of the host.
    pub fn primitive_width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::I1 | Self::U1 => Some(1),
            Self::Char | Self::I2 | Self::U2 => Some(2),
            Self::I4 | Self::U4 | Self::R4 => Some(4),
            Self::I8 | Self::U8 | Self::R8 | Self::I | Self::U => Some(8),
            _ => None,
        }
    }
}
//
impl Display for ElementType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Category of value which the encoder elided because it detected a cycle or
/// excessive nesting
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElidedCategory {
    /// Class or struct instance
    Class,

    /// Instance of a generic type
    GenericInst,

    /// Multi-dimensional array
    Array,

    /// Single-dimensional zero-based array
    SzArray,
}
//
impl ElidedCategory {
    /// Interpret the reason byte that follows an `End` sentinel
    pub fn from_reason(reason: ElementType) -> Option<Self> {
        match reason {
            ElementType::Class => Some(Self::Class),
            ElementType::GenericInst => Some(Self::GenericInst),
            ElementType::Array => Some(Self::Array),
            ElementType::SzArray => Some(Self::SzArray),
            _ => None,
        }
    }

    /// Reason byte that encodes this category after an `End` sentinel
    pub fn reason(self) -> ElementType {
        match self {
            Self::Class => ElementType::Class,
            Self::GenericInst => ElementType::GenericInst,
            Self::Array => ElementType::Array,
            Self::SzArray => ElementType::SzArray,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        for tag in 0..=u8::MAX {
            if let Some(ty) = ElementType::from_tag(tag) {
                assert_eq!(ty.tag(), tag);
                assert_eq!(ty.primitive_width().is_some(), ty.is_primitive());
            }
        }
        assert_eq!(ElementType::from_tag(0x17), None);
        assert_eq!(ElementType::from_tag(0x1d), Some(ElementType::SzArray));
        assert_eq!(ElementType::I.primitive_width(), Some(8));
        assert_eq!(ElementType::SzArray.to_string(), "SzArray");
    }

    #[test]
    fn elided_categories() {
        for category in [
            ElidedCategory::Class,
            ElidedCategory::GenericInst,
            ElidedCategory::Array,
            ElidedCategory::SzArray,
        ] {
            assert_eq!(ElidedCategory::from_reason(category.reason()), Some(category));
        }
        assert_eq!(ElidedCategory::from_reason(ElementType::End), None);
        assert_eq!(ElidedCategory::from_reason(ElementType::I4), None);
    }
}
