//! Type tags attached to union-find points.
//!
//! Blocks only ever carry ground types or opaque library type names, so a
//! tag is flat: there are no type constructors to unify structurally.

use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// TypeTag
// ══════════════════════════════════════════════════════════════════════════════

/// The concrete type of a point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    // ── Ground ──
    Number,
    Boolean,
    String,
    Unit,

    /// A list built by `lists_create_with`; elements are not tracked.
    Array,
    /// A library type (`Image`, `Sprite`, ...). Equal names unify.
    Opaque(std::string::String),
}

impl TypeTag {
    /// Interpret a type name as declared on a socket or in the catalog.
    ///
    /// Ground names are matched case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "void" | "unit" => Self::Unit,
            "array" => Self::Array,
            lower if lower.ends_with("[]") => Self::Array,
            _ => Self::Opaque(name.to_string()),
        }
    }

    /// Whether `==`/`!=` are defined on values of this type.
    pub fn is_comparable(&self) -> bool {
        matches!(self, Self::Number | Self::Boolean | Self::String)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::String => write!(f, "string"),
            Self::Unit => write!(f, "void"),
            Self::Array => write!(f, "any[]"),
            Self::Opaque(name) => write!(f, "{name}"),
        }
    }
}
