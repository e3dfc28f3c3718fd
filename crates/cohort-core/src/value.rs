//! Tagged property values.
//!
//! Property values are a closed set of primitive variants. Every property
//! definition declares the [`ValueKind`] it accepts, so compatibility
//! checking is a variant-tag match rather than reflection.

use serde::{Deserialize, Serialize};

/// A property value. The closed set of types a property can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Discriminant tag for property values, declared by property definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
}

impl PropertyValue {
    /// Get the discriminant kind for this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::Text(_) => ValueKind::Text,
        }
    }

    /// Whether this value is assignable to a definition of the given kind.
    pub fn is_kind(&self, kind: ValueKind) -> bool {
        self.kind() == kind
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(PropertyValue::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(PropertyValue::Int(7).kind(), ValueKind::Int);
        assert_eq!(PropertyValue::Float(1.5).kind(), ValueKind::Float);
        assert_eq!(PropertyValue::from("x").kind(), ValueKind::Text);
    }

    #[test]
    fn is_kind_rejects_mismatch() {
        assert!(PropertyValue::Int(0).is_kind(ValueKind::Int));
        assert!(!PropertyValue::Int(0).is_kind(ValueKind::Float));
    }

    #[test]
    fn display_is_plain() {
        assert_eq!(PropertyValue::Int(42).to_string(), "42");
        assert_eq!(PropertyValue::from("abc").to_string(), "abc");
    }
}
