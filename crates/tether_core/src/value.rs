//! Runtime values and declared property types
//!
//! Every property stores a [`Value`]. Each property also declares a
//! [`TypeTag`], and writes are coerced into that type or rejected.
//! Structured "value types" (points, sizes, rects, margins) are stored as a
//! [`Value::Group`] whose fields can be addressed individually as
//! sub-properties.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// The kind of a structured value-type property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    Point,
    Size,
    Rect,
    Margins,
}

impl GroupKind {
    /// Names of the fields, in storage order
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            GroupKind::Point => &["x", "y"],
            GroupKind::Size => &["width", "height"],
            GroupKind::Rect => &["x", "y", "width", "height"],
            GroupKind::Margins => &["left", "top", "right", "bottom"],
        }
    }

    pub fn field_count(self) -> usize {
        self.field_names().len()
    }

    /// Look up a field offset by name
    pub fn field_index(self, name: &str) -> Option<u8> {
        self.field_names()
            .iter()
            .position(|f| *f == name)
            .map(|i| i as u8)
    }

    pub fn field_name(self, index: u8) -> Option<&'static str> {
        self.field_names().get(index as usize).copied()
    }

    fn name(self) -> &'static str {
        match self {
            GroupKind::Point => "point",
            GroupKind::Size => "size",
            GroupKind::Rect => "rect",
            GroupKind::Margins => "margins",
        }
    }
}

/// Declared type of a property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Int,
    Real,
    String,
    /// Accepts any value, including null
    Variant,
    Group(GroupKind),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::Int => f.write_str("int"),
            TypeTag::Real => f.write_str("real"),
            TypeTag::String => f.write_str("string"),
            TypeTag::Variant => f.write_str("variant"),
            TypeTag::Group(kind) => f.write_str(kind.name()),
        }
    }
}

/// A dynamically typed property value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(String),
    Group(GroupKind, SmallVec<[f64; 4]>),
}

impl Value {
    /// Build a group value, padding or truncating to the kind's field count
    pub fn group(kind: GroupKind, fields: &[f64]) -> Self {
        let mut values: SmallVec<[f64; 4]> = fields.iter().copied().collect();
        values.resize(kind.field_count(), 0.0);
        Value::Group(kind, values)
    }

    /// The zero value for a declared type
    pub fn default_for(ty: TypeTag) -> Self {
        match ty {
            TypeTag::Bool => Value::Bool(false),
            TypeTag::Int => Value::Int(0),
            TypeTag::Real => Value::Real(0.0),
            TypeTag::String => Value::String(String::new()),
            TypeTag::Variant => Value::Null,
            TypeTag::Group(kind) => Value::group(kind, &[]),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Group(kind, _) => kind.name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of ints and reals
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read one field of a group value
    pub fn field(&self, index: u8) -> Option<f64> {
        match self {
            Value::Group(_, fields) => fields.get(index as usize).copied(),
            _ => None,
        }
    }

    /// Copy of this group with one field replaced
    pub fn with_field(&self, index: u8, value: f64) -> Option<Value> {
        match self {
            Value::Group(kind, fields) if (index as usize) < fields.len() => {
                let mut fields = fields.clone();
                fields[index as usize] = value;
                Some(Value::Group(*kind, fields))
            }
            _ => None,
        }
    }

    /// Convert into the declared type, handing the value back on failure
    pub fn coerce(self, ty: TypeTag) -> Result<Value, Value> {
        match (ty, self) {
            (TypeTag::Variant, v) => Ok(v),
            (TypeTag::Bool, v @ Value::Bool(_)) => Ok(v),
            (TypeTag::String, v @ Value::String(_)) => Ok(v),
            (TypeTag::Real, Value::Real(r)) => Ok(Value::Real(r)),
            (TypeTag::Real, Value::Int(i)) => Ok(Value::Real(i as f64)),
            (TypeTag::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (TypeTag::Int, Value::Real(r)) if r.is_finite() => Ok(Value::Int(r.trunc() as i64)),
            (TypeTag::Group(expected), Value::Group(kind, fields)) if kind == expected => {
                Ok(Value::Group(kind, fields))
            }
            (_, v) => Err(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Group(kind, fields) => {
                write!(f, "{}(", kind.name())?;
                for (i, v) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(Value::Int(3).coerce(TypeTag::Real), Ok(Value::Real(3.0)));
        assert_eq!(Value::Real(2.9).coerce(TypeTag::Int), Ok(Value::Int(2)));
        assert_eq!(Value::Real(-2.9).coerce(TypeTag::Int), Ok(Value::Int(-2)));
        assert!(Value::Real(f64::NAN).coerce(TypeTag::Int).is_err());
    }

    #[test]
    fn test_coerce_rejects_mismatch() {
        assert_eq!(
            Value::from("red").coerce(TypeTag::Real),
            Err(Value::from("red"))
        );
        assert!(Value::Bool(true).coerce(TypeTag::Int).is_err());
        assert!(Value::group(GroupKind::Point, &[1.0, 2.0])
            .coerce(TypeTag::Group(GroupKind::Size))
            .is_err());
    }

    #[test]
    fn test_variant_accepts_anything() {
        assert_eq!(Value::Null.coerce(TypeTag::Variant), Ok(Value::Null));
        assert_eq!(
            Value::from("x").coerce(TypeTag::Variant),
            Ok(Value::from("x"))
        );
    }

    #[test]
    fn test_group_fields() {
        let margins = Value::group(GroupKind::Margins, &[1.0, 2.0]);
        assert_eq!(margins.field(1), Some(2.0));
        assert_eq!(margins.field(3), Some(0.0));
        assert_eq!(margins.field(4), None);

        let updated = margins.with_field(3, 8.0).unwrap();
        assert_eq!(updated.field(3), Some(8.0));
        assert_eq!(GroupKind::Margins.field_index("bottom"), Some(3));
        assert_eq!(GroupKind::Rect.field_name(2), Some("width"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::group(GroupKind::Point, &[1.0, 2.5]).to_string(), "point(1, 2.5)");
        assert_eq!(TypeTag::Group(GroupKind::Rect).to_string(), "rect");
    }
}
