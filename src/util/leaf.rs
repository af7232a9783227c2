//! Primitive leaf types - the closed set of scalar kinds a leaf can hold.

use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use std::fmt;

use super::Value;

/// Primitive leaf type.
///
/// Every leaf of a scalar branch declares one of these by its storage type
/// name (`Int_t`, `Float_t`, ...). A leaf type name outside this set is not a
/// plain leaf and is handled as a wrapped object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum LeafType {
    /// Boolean (stored as u8: 0 = false, non-zero = true)
    Bool = 0,
    /// Signed 8-bit integer
    Char = 1,
    /// Unsigned 8-bit integer
    UChar = 2,
    /// Signed 16-bit integer
    Short = 3,
    /// Unsigned 16-bit integer
    UShort = 4,
    /// Signed 32-bit integer
    Int = 5,
    /// Unsigned 32-bit integer
    UInt = 6,
    /// Signed 64-bit integer
    Long64 = 7,
    /// Unsigned 64-bit integer
    ULong64 = 8,
    /// 32-bit floating point
    Float = 9,
    /// 64-bit floating point
    Double = 10,
    /// 16-bit floating point (IEEE 754 half precision)
    Float16 = 11,
    /// 64-bit in memory, stored as 32-bit floating point
    Double32 = 12,
}

impl LeafType {
    /// All leaf types, in tag order.
    pub const ALL: [LeafType; 13] = [
        Self::Bool,
        Self::Char,
        Self::UChar,
        Self::Short,
        Self::UShort,
        Self::Int,
        Self::UInt,
        Self::Long64,
        Self::ULong64,
        Self::Float,
        Self::Double,
        Self::Float16,
        Self::Double32,
    ];

    /// Returns the stored size in bytes of a single element of this type.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Bool | Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort | Self::Float16 => 2,
            Self::Int | Self::UInt | Self::Float | Self::Double32 => 4,
            Self::Long64 | Self::ULong64 | Self::Double => 8,
        }
    }

    /// Storage type name of this leaf type.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool_t",
            Self::Char => "Char_t",
            Self::UChar => "UChar_t",
            Self::Short => "Short_t",
            Self::UShort => "UShort_t",
            Self::Int => "Int_t",
            Self::UInt => "UInt_t",
            Self::Long64 => "Long64_t",
            Self::ULong64 => "ULong64_t",
            Self::Float => "Float_t",
            Self::Double => "Double_t",
            Self::Float16 => "Float16_t",
            Self::Double32 => "Double32_t",
        }
    }

    /// Parse a leaf type from its storage type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Single-letter code used after `/` in a leaf title (`pt[4]/F`).
    #[inline]
    pub const fn type_code(self) -> char {
        match self {
            Self::Bool => 'O',
            Self::Char => 'B',
            Self::UChar => 'b',
            Self::Short => 'S',
            Self::UShort => 's',
            Self::Int => 'I',
            Self::UInt => 'i',
            Self::Long64 => 'L',
            Self::ULong64 => 'l',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Float16 => 'f',
            Self::Double32 => 'd',
        }
    }

    /// Parse a leaf type from its title code.
    pub fn from_type_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_code() == code)
    }

    /// Map a C++ builtin spelling (as found inside class strings) to a leaf type.
    pub fn from_cpp_name(name: &str) -> Option<Self> {
        let t = match name {
            "bool" => Self::Bool,
            "char" | "signed char" | "int8_t" => Self::Char,
            "unsigned char" | "uint8_t" => Self::UChar,
            "short" | "short int" | "int16_t" => Self::Short,
            "unsigned short" | "unsigned short int" | "uint16_t" => Self::UShort,
            "int" | "int32_t" => Self::Int,
            "unsigned int" | "unsigned" | "uint32_t" => Self::UInt,
            "long" | "long int" | "long long" | "int64_t" => Self::Long64,
            "unsigned long" | "unsigned long long" | "uint64_t" | "size_t" => Self::ULong64,
            "float" => Self::Float,
            "double" => Self::Double,
            other => return Self::from_name(other),
        };
        Some(t)
    }

    /// Returns true if this is an integer type.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::UChar
                | Self::Short
                | Self::UShort
                | Self::Int
                | Self::UInt
                | Self::Long64
                | Self::ULong64
        )
    }

    /// Returns true if this is a floating point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Float16 | Self::Double32)
    }

    /// Decode one element from the start of `raw`.
    ///
    /// `raw` must hold at least [`num_bytes`](Self::num_bytes) bytes.
    pub fn decode(self, raw: &[u8]) -> Option<Value> {
        if raw.len() < self.num_bytes() {
            return None;
        }
        let v = match self {
            Self::Bool => Value::Bool(raw[0] != 0),
            Self::Char => Value::Int(raw[0] as i8 as i64),
            Self::UChar => Value::UInt(raw[0] as u64),
            Self::Short => Value::Int(LittleEndian::read_i16(raw) as i64),
            Self::UShort => Value::UInt(LittleEndian::read_u16(raw) as u64),
            Self::Int => Value::Int(LittleEndian::read_i32(raw) as i64),
            Self::UInt => Value::UInt(LittleEndian::read_u32(raw) as u64),
            Self::Long64 => Value::Int(LittleEndian::read_i64(raw)),
            Self::ULong64 => Value::UInt(LittleEndian::read_u64(raw)),
            Self::Float | Self::Double32 => Value::Float(LittleEndian::read_f32(raw) as f64),
            Self::Double => Value::Float(LittleEndian::read_f64(raw)),
            Self::Float16 => Value::Float(f16::from_bits(LittleEndian::read_u16(raw)).to_f64()),
        };
        Some(v)
    }

    /// Append the stored representation of `value` to `out`.
    ///
    /// Numeric values convert between integer and float kinds; anything else
    /// returns `None` and leaves `out` untouched.
    pub fn encode(self, value: &Value, out: &mut Vec<u8>) -> Option<()> {
        let mut buf = [0u8; 8];
        let n = self.num_bytes();
        match self {
            Self::Bool => buf[0] = value.as_bool()? as u8,
            Self::Char => buf[0] = value.as_i64()? as i8 as u8,
            Self::UChar => buf[0] = value.as_u64()? as u8,
            Self::Short => LittleEndian::write_i16(&mut buf, value.as_i64()? as i16),
            Self::UShort => LittleEndian::write_u16(&mut buf, value.as_u64()? as u16),
            Self::Int => LittleEndian::write_i32(&mut buf, value.as_i64()? as i32),
            Self::UInt => LittleEndian::write_u32(&mut buf, value.as_u64()? as u32),
            Self::Long64 => LittleEndian::write_i64(&mut buf, value.as_i64()?),
            Self::ULong64 => LittleEndian::write_u64(&mut buf, value.as_u64()?),
            Self::Float | Self::Double32 => LittleEndian::write_f32(&mut buf, value.as_f64()? as f32),
            Self::Double => LittleEndian::write_f64(&mut buf, value.as_f64()?),
            Self::Float16 => LittleEndian::write_u16(&mut buf, f16::from_f64(value.as_f64()?).to_bits()),
        }
        out.extend_from_slice(&buf[..n]);
        Some(())
    }

    /// Zero value of this type.
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            t if t.is_float() => Value::Float(0.0),
            Self::UChar | Self::UShort | Self::UInt | Self::ULong64 => Value::UInt(0),
            _ => Value::Int(0),
        }
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Leaf declaration parsed from a branch title such as `pt[nMu]/F`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafSpec {
    /// Leaf name: the title up to the first `[` or `/`.
    pub name: String,
    /// Declared type (defaults to `Float_t` when the title has no `/code`).
    pub leaf_type: LeafType,
    /// Dimension between brackets: a fixed count or the name of a counter leaf.
    pub dimension: Option<String>,
}

impl LeafSpec {
    /// Parse a leaf title.
    pub fn parse(title: &str) -> Option<Self> {
        let name = leaf_name_from_title(title);
        if name.is_empty() {
            return None;
        }
        let dimension = title
            .find('[')
            .and_then(|open| title[open + 1..].find(']').map(|close| &title[open + 1..open + 1 + close]))
            .map(str::to_string);
        let leaf_type = match title.rsplit_once('/') {
            Some((_, code)) => {
                let mut chars = code.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                LeafType::from_type_code(c)?
            }
            None => LeafType::Float,
        };
        Some(Self { name: name.to_string(), leaf_type, dimension })
    }

    /// Fixed element count, if the dimension is a literal.
    pub fn fixed_len(&self) -> Option<usize> {
        match &self.dimension {
            None => Some(1),
            Some(d) => d.parse().ok(),
        }
    }
}

/// Derive a leaf name from a branch title: everything before the first `[`,
/// then everything before the first `/`.
pub fn leaf_name_from_title(title: &str) -> &str {
    let head = title.split('[').next().unwrap_or(title);
    head.split('/').next().unwrap_or(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_sizes() {
        assert_eq!(LeafType::Bool.num_bytes(), 1);
        assert_eq!(LeafType::Int.num_bytes(), 4);
        assert_eq!(LeafType::Float.num_bytes(), 4);
        assert_eq!(LeafType::Double.num_bytes(), 8);
        assert_eq!(LeafType::Float16.num_bytes(), 2);
        assert_eq!(LeafType::Double32.num_bytes(), 4);
    }

    #[test]
    fn test_leaf_names() {
        assert_eq!(LeafType::Int.name(), "Int_t");
        assert_eq!(LeafType::from_name("Float_t"), Some(LeafType::Float));
        assert_eq!(LeafType::from_name("vector<float>"), None);
        assert_eq!(LeafType::from_cpp_name("unsigned int"), Some(LeafType::UInt));
        assert_eq!(LeafType::from_cpp_name("Double_t"), Some(LeafType::Double));
        for t in LeafType::ALL {
            assert_eq!(LeafType::from_name(t.name()), Some(t));
            assert_eq!(LeafType::from_type_code(t.type_code()), Some(t));
        }
    }

    #[test]
    fn test_leaf_decode() {
        let mut raw = Vec::new();
        LeafType::Int.encode(&Value::Int(-7), &mut raw).unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(LeafType::Int.decode(&raw), Some(Value::Int(-7)));
        assert_eq!(LeafType::Double.decode(&raw), None);

        let mut raw = Vec::new();
        LeafType::Float16.encode(&Value::Float(1.5), &mut raw).unwrap();
        assert_eq!(LeafType::Float16.decode(&raw), Some(Value::Float(1.5)));

        assert!(LeafType::Int.encode(&Value::Str("x".into()), &mut raw).is_none());
    }

    #[test]
    fn test_leaf_title() {
        assert_eq!(leaf_name_from_title("bar[4]/F"), "bar");
        assert_eq!(leaf_name_from_title("run/I"), "run");
        assert_eq!(leaf_name_from_title("plain"), "plain");

        let spec = LeafSpec::parse("bar[4]/F").unwrap();
        assert_eq!(spec.name, "bar");
        assert_eq!(spec.leaf_type, LeafType::Float);
        assert_eq!(spec.fixed_len(), Some(4));

        let spec = LeafSpec::parse("pt[nMu]/D").unwrap();
        assert_eq!(spec.dimension.as_deref(), Some("nMu"));
        assert_eq!(spec.fixed_len(), None);

        let spec = LeafSpec::parse("nMuons/I").unwrap();
        assert_eq!(spec.leaf_type, LeafType::Int);
        assert_eq!(spec.fixed_len(), Some(1));

        assert!(LeafSpec::parse("x/Q").is_none());
        assert!(LeafSpec::parse("/F").is_none());
    }
}
