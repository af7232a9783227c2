//! Binary layout of wrapped objects.
//!
//! All multi-byte values are little-endian:
//!
//! ```text
//! Wrapper<T>   u8 present, T
//! vector<T>    u32 count, T * count
//! record       fields in declaration order
//! primitive    fixed width (see LeafType::num_bytes)
//! string       u32 length, UTF-8 bytes
//! ```

use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::traits::{Product, WrappedObject};
use crate::util::{Error, LeafType, Result, Value};

/// Field list of an aggregate type.
#[derive(Debug, PartialEq)]
pub struct RecordLayout {
    pub name: String,
    pub fields: Vec<(String, Shape)>,
}

/// Resolved layout of a wrapped type.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Leaf(LeafType),
    Text,
    Vector(Box<Shape>),
    Record(Arc<RecordLayout>),
    /// Presence-flagged container around a product.
    Wrapper(Box<Shape>),
}

impl Shape {
    /// Smallest encoded size, used to reject absurd element counts early.
    pub fn min_size(&self) -> usize {
        match self {
            Self::Leaf(t) => t.num_bytes(),
            Self::Text | Self::Vector(_) => 4,
            Self::Record(layout) => layout.fields.iter().map(|(_, s)| s.min_size()).sum(),
            Self::Wrapper(inner) => 1 + inner.min_size(),
        }
    }

    /// Value of a default-constructed instance.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Leaf(t) => t.zero(),
            Self::Text => Value::Str(String::new()),
            Self::Vector(_) => Value::List(Vec::new()),
            Self::Record(layout) => Value::Record(
                layout.fields.iter().map(|(k, s)| (k.clone(), s.default_value())).collect(),
            ),
            Self::Wrapper(inner) => inner.default_value(),
        }
    }

    /// Decode one value from the front of `input`, advancing it.
    ///
    /// A nested wrapper decodes to its product; its presence byte is only
    /// surfaced for the outermost container (see [`ShapedObject`]).
    pub fn decode(&self, input: &mut &[u8]) -> Result<Value> {
        match self {
            Self::Leaf(t) => {
                let n = t.num_bytes();
                if input.len() < n {
                    return Err(Error::invalid(format!("truncated {t}")));
                }
                let v = t.decode(&input[..n]).ok_or_else(|| Error::invalid(format!("bad {t}")))?;
                *input = &input[n..];
                Ok(v)
            }
            Self::Text => {
                let len = input.read_u32::<LittleEndian>()? as usize;
                if input.len() < len {
                    return Err(Error::invalid("truncated string"));
                }
                let s = String::from_utf8(input[..len].to_vec())?;
                *input = &input[len..];
                Ok(Value::Str(s))
            }
            Self::Vector(elem) => {
                let count = input.read_u32::<LittleEndian>()? as usize;
                // zero-sized elements still count one byte each
                if count.saturating_mul(elem.min_size().max(1)) > input.len() {
                    return Err(Error::invalid(format!("vector of {count} elements exceeds buffer")));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(elem.decode(input)?);
                }
                Ok(Value::List(items))
            }
            Self::Record(layout) => {
                let mut fields = Vec::with_capacity(layout.fields.len());
                for (name, shape) in &layout.fields {
                    fields.push((name.clone(), shape.decode(input)?));
                }
                Ok(Value::Record(fields))
            }
            Self::Wrapper(inner) => {
                input.read_u8()?;
                inner.decode(input)
            }
        }
    }

    /// Append the encoding of `value` to `out`. Wrappers are written present.
    pub fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        let mismatch = || Error::invalid(format!("cannot encode {value} as {self:?}"));
        match self {
            Self::Leaf(t) => t.encode(value, out).ok_or_else(mismatch),
            Self::Text => {
                let s = value.as_str().ok_or_else(mismatch)?;
                out.write_u32::<LittleEndian>(s.len() as u32)?;
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            Self::Vector(elem) => {
                let items = value.as_list().ok_or_else(mismatch)?;
                out.write_u32::<LittleEndian>(items.len() as u32)?;
                items.iter().try_for_each(|item| elem.encode(item, out))
            }
            Self::Record(layout) => {
                for (name, shape) in &layout.fields {
                    let field = value.field(name).ok_or_else(|| {
                        Error::invalid(format!("record {} is missing field '{name}'", layout.name))
                    })?;
                    shape.encode(field, out)?;
                }
                Ok(())
            }
            Self::Wrapper(inner) => {
                out.write_u8(1)?;
                inner.encode(value, out)
            }
        }
    }

    /// Encode a wrapper marked absent, holding the default product.
    pub fn encode_absent(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Wrapper(inner) => {
                out.write_u8(0)?;
                inner.encode(&inner.default_value(), out)
            }
            other => Err(Error::invalid(format!("{other:?} has no presence flag"))),
        }
    }
}

/// Decode target built from a [`Shape`].
///
/// A top-level [`Shape::Wrapper`] exposes presence and an unwrapped product;
/// any other shape is its own product.
pub struct ShapedObject {
    type_name: String,
    shape: Shape,
    present: Option<bool>,
    value: Value,
}

impl ShapedObject {
    pub fn new(type_name: impl Into<String>, shape: Shape) -> Self {
        let present = matches!(shape, Shape::Wrapper(_)).then_some(false);
        let value = shape.default_value();
        Self { type_name: type_name.into(), shape, present, value }
    }
}

impl WrappedObject for ShapedObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn decode(&mut self, raw: &[u8]) -> Result<()> {
        let mut input = raw;
        match &self.shape {
            Shape::Wrapper(inner) => {
                let flag = input.read_u8()?;
                self.value = inner.decode(&mut input)?;
                self.present = Some(flag != 0);
            }
            shape => self.value = shape.decode(&mut input)?,
        }
        if !input.is_empty() {
            return Err(Error::invalid(format!("{} trailing bytes", input.len())));
        }
        Ok(())
    }

    fn fresh(&self) -> Box<dyn WrappedObject> {
        Box::new(Self::new(self.type_name.clone(), self.shape.clone()))
    }

    fn is_present(&self) -> Option<bool> {
        self.present
    }

    fn product(&self) -> Option<&dyn Product> {
        match self.shape {
            Shape::Wrapper(_) => Some(&self.value),
            _ => None,
        }
    }

    fn as_product(&self) -> &dyn Product {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn muon_layout() -> Arc<RecordLayout> {
        Arc::new(RecordLayout {
            name: "pat::Muon".into(),
            fields: vec![
                ("pt".into(), Shape::Leaf(LeafType::Float)),
                ("charge".into(), Shape::Leaf(LeafType::Int)),
            ],
        })
    }

    #[test]
    fn test_wrapped_vector_decode() {
        let shape = Shape::Wrapper(Box::new(Shape::Vector(Box::new(Shape::Record(muon_layout())))));
        let muons = Value::List(vec![
            Value::record([("pt", Value::Float(30.5)), ("charge", Value::Int(1))]),
            Value::record([("pt", Value::Float(12.0)), ("charge", Value::Int(-1))]),
        ]);
        let mut raw = Vec::new();
        shape.encode(&muons, &mut raw).unwrap();
        assert_eq!(raw.len(), 1 + 4 + 2 * 8);

        let mut obj = ShapedObject::new("w", shape.clone());
        obj.decode(&raw).unwrap();
        assert_eq!(obj.is_present(), Some(true));
        let product = obj.product().unwrap();
        assert_eq!(product.len(), Some(2));
        assert_eq!(product.element(1).unwrap().field("charge"), Some(&Value::Int(-1)));

        let mut absent = Vec::new();
        shape.encode_absent(&mut absent).unwrap();
        obj.decode(&absent).unwrap();
        assert_eq!(obj.is_present(), Some(false));
        assert_eq!(obj.product().unwrap().len(), Some(0));
    }

    #[test]
    fn test_plain_record_is_own_product() {
        let mut obj = ShapedObject::new("pat::Muon", Shape::Record(muon_layout()));
        assert_eq!(obj.is_present(), None);
        assert!(obj.product().is_none());

        let mut raw = Vec::new();
        Shape::Record(muon_layout())
            .encode(&Value::record([("pt", Value::Float(5.0)), ("charge", Value::Int(1))]), &mut raw)
            .unwrap();
        obj.decode(&raw).unwrap();
        assert_eq!(obj.as_product().len(), None);
        assert_eq!(obj.as_product().value().field("pt"), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let shape = Shape::Vector(Box::new(Shape::Leaf(LeafType::Double)));
        let mut obj = ShapedObject::new("v", shape);
        // claims 1000 doubles, carries none
        assert!(obj.decode(&[0xE8, 0x03, 0, 0]).is_err());
        // trailing garbage
        assert!(obj.decode(&[0, 0, 0, 0, 7]).is_err());

        let mut text = Vec::new();
        assert!(Shape::Text.encode(&Value::Int(1), &mut text).is_err());
    }

    #[test]
    fn test_empty_record_count_is_bounded() {
        let empty = Arc::new(RecordLayout { name: "Empty".into(), fields: Vec::new() });
        let shape = Shape::Vector(Box::new(Shape::Record(empty)));
        assert_eq!(shape.decode(&mut &[0xFF, 0xFF, 0xFF, 0xFF][..]).ok(), None);

        let mut input = &[2, 0, 0, 0, 0, 0][..];
        assert_eq!(shape.decode(&mut input).unwrap().as_list().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_fresh_is_default_constructed() {
        let shape = Shape::Wrapper(Box::new(Shape::Leaf(LeafType::Float)));
        let mut obj = ShapedObject::new("edm::Wrapper<float>", shape);
        obj.decode(&[1, 0, 0, 0x80, 0x3F]).unwrap();

        let fresh = obj.fresh();
        assert_eq!(fresh.type_name(), "edm::Wrapper<float>");
        assert_eq!(fresh.is_present(), Some(false));
        assert_eq!(fresh.as_product().value(), Value::Float(0.0));
        assert_eq!(obj.as_product().value(), Value::Float(1.0));
    }
}
