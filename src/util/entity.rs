//! Entity kinds and scope keys shared by every codec.

use std::fmt;

/// Kind of the next entity in an archive stream.
///
/// Readers report one of these from `type_next()`; object metadata carries
/// one to describe the shape of the bound type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EntityKind {
    /// Unknown or uninterpreted entity (e.g. msgpack extension types)
    #[default]
    Invalid = 0,
    /// Key-value aggregate with named fields
    Object = 1,
    /// Key-value aggregate with runtime keys
    Dictionary = 2,
    /// Fixed-length positional sequence
    Tuple = 3,
    /// Variable-length sequence
    Array = 4,
    /// Null / nil
    Null = 5,
    /// Boolean
    Boolean = 6,
    /// Signed or unsigned integer
    Integer = 7,
    /// Floating point number
    FloatingPoint = 8,
    /// UTF-8 string
    String = 9,
    /// Opaque byte blob
    Binary = 10,
}

impl EntityKind {
    /// Returns the name of this kind.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Object => "object",
            Self::Dictionary => "dictionary",
            Self::Tuple => "tuple",
            Self::Array => "array",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::FloatingPoint => "floating_point",
            Self::String => "string",
            Self::Binary => "binary",
        }
    }

    /// Convert from u8 value.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Object,
            2 => Self::Dictionary,
            3 => Self::Tuple,
            4 => Self::Array,
            5 => Self::Null,
            6 => Self::Boolean,
            7 => Self::Integer,
            8 => Self::FloatingPoint,
            9 => Self::String,
            10 => Self::Binary,
            _ => Self::Invalid,
        }
    }

    /// Object or dictionary.
    #[inline]
    pub const fn is_object_like(self) -> bool {
        matches!(self, Self::Object | Self::Dictionary)
    }

    /// Array or tuple.
    #[inline]
    pub const fn is_array_like(self) -> bool {
        matches!(self, Self::Array | Self::Tuple)
    }

    /// Any non-aggregate kind.
    #[inline]
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Boolean
                | Self::Integer
                | Self::FloatingPoint
                | Self::String
                | Self::Binary
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identifies one open aggregate scope during a streaming traversal.
///
/// `depth` is the number of open scopes including this one; `id` is unique
/// per reader instance and never reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub depth: u32,
    pub id: u32,
}

/// How a later observed key relates to an earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeRelation {
    /// A child scope was opened; still inside.
    Nested,
    /// Same scope.
    Same,
    /// Same depth, different id: the earlier scope ended.
    Sibling,
    /// Control returned to an ancestor.
    Ancestor,
}

impl ScopeRelation {
    /// Whether a container loop keyed on the earlier scope must stop.
    #[inline]
    pub const fn must_break(self) -> bool {
        matches!(self, Self::Sibling | Self::Ancestor)
    }
}

impl ContextKey {
    #[inline]
    pub const fn new(depth: u32, id: u32) -> Self {
        Self { depth, id }
    }

    /// Classify `later`, observed after `self` in the same traversal.
    pub fn relation(&self, later: &ContextKey) -> ScopeRelation {
        if later.depth > self.depth {
            ScopeRelation::Nested
        } else if later.depth < self.depth {
            ScopeRelation::Ancestor
        } else if later.id == self.id {
            ScopeRelation::Same
        } else {
            ScopeRelation::Sibling
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.depth)
    }
}
