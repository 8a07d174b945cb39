//! Logical element types and storage kinds.

use std::fmt;

/// Logical element type of an allocation.
///
/// The arena itself only deals in bytes; the data type is carried so
/// element counts can be derived and reported to the allocation tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// 1-byte boolean.
    Bool,
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 8-bit integer.
    UByte,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UShort,
    /// IEEE 754 half precision.
    Half,
    /// Brain floating point (bfloat16).
    BFloat16,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// IEEE 754 single precision.
    Float,
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    ULong,
    /// IEEE 754 double precision.
    Double,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::Bool | Self::Byte | Self::UByte => 1,
            Self::Short | Self::UShort | Self::Half | Self::BFloat16 => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double => 8,
        }
    }

    /// Number of whole elements of this type in `bytes`.
    pub fn elements_in(self, bytes: usize) -> usize {
        bytes / self.width()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Byte => "int8",
            Self::UByte => "uint8",
            Self::Short => "int16",
            Self::UShort => "uint16",
            Self::Half => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Int => "int32",
            Self::UInt => "uint32",
            Self::Float => "float32",
            Self::Long => "int64",
            Self::ULong => "uint64",
            Self::Double => "float64",
        };
        f.write_str(name)
    }
}

/// Where an allocation physically lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryKind {
    /// Ordinary host (CPU) memory.
    #[default]
    Host,
    /// Accelerator memory. Served from host memory by [`HostMemory`](crate::HostMemory).
    Device,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Device => f.write_str("device"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_element_sizes() {
        assert_eq!(DataType::Bool.width(), 1);
        assert_eq!(DataType::Half.width(), 2);
        assert_eq!(DataType::Float.width(), 4);
        assert_eq!(DataType::Double.width(), 8);
    }

    #[test]
    fn elements_in_truncates_partial_elements() {
        assert_eq!(DataType::Float.elements_in(400), 100);
        assert_eq!(DataType::Float.elements_in(402), 100);
        assert_eq!(DataType::Double.elements_in(7), 0);
    }

    #[test]
    fn default_memory_kind_is_host() {
        assert_eq!(MemoryKind::default(), MemoryKind::Host);
    }
}
