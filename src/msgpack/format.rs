//! MessagePack format constants and marker classification.

use crate::util::EntityKind;

/// Largest value encoded as a positive fixint.
pub const MAX_POSFIXINT: u8 = 0x7f;

/// Smallest value encoded as a negative fixint.
pub const MIN_NEGFIXINT: i64 = -32;

/// Fixed map prefix, `1000xxxx`.
pub const FIXMAP: u8 = 0x80;
pub const MAX_FIXMAP_SIZE: usize = 0x0f;

/// Fixed array prefix, `1001xxxx`.
pub const FIXARRAY: u8 = 0x90;
pub const MAX_FIXARRAY_SIZE: usize = 0x0f;

/// Fixed string prefix, `101xxxxx`.
pub const FIXSTR: u8 = 0xa0;
pub const MAX_FIXSTR_SIZE: usize = 0x1f;

pub const NIL: u8 = 0xc0;
/// Reserved by the format; never valid in a stream.
pub const NEVER_USED: u8 = 0xc1;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;
pub const BIN_8: u8 = 0xc4;
pub const BIN_16: u8 = 0xc5;
pub const BIN_32: u8 = 0xc6;
pub const EXT_8: u8 = 0xc7;
pub const EXT_16: u8 = 0xc8;
pub const EXT_32: u8 = 0xc9;
pub const FLOAT_32: u8 = 0xca;
pub const FLOAT_64: u8 = 0xcb;
pub const UINT_8: u8 = 0xcc;
pub const UINT_16: u8 = 0xcd;
pub const UINT_32: u8 = 0xce;
pub const UINT_64: u8 = 0xcf;
pub const INT_8: u8 = 0xd0;
pub const INT_16: u8 = 0xd1;
pub const INT_32: u8 = 0xd2;
pub const INT_64: u8 = 0xd3;
pub const FIXEXT_1: u8 = 0xd4;
pub const FIXEXT_2: u8 = 0xd5;
pub const FIXEXT_4: u8 = 0xd6;
pub const FIXEXT_8: u8 = 0xd7;
pub const FIXEXT_16: u8 = 0xd8;
pub const STR_8: u8 = 0xd9;
pub const STR_16: u8 = 0xda;
pub const STR_32: u8 = 0xdb;
pub const ARRAY_16: u8 = 0xdc;
pub const ARRAY_32: u8 = 0xdd;
pub const MAP_16: u8 = 0xde;
pub const MAP_32: u8 = 0xdf;

/// Width of a length or value field following a marker byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    /// Size of the field in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }
}

/// Decoded first byte of a MessagePack value.
///
/// Fixed-size families carry their inline payload; the rest carry the width
/// of the length or value field that follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    PosFixInt(u8),
    NegFixInt(i8),
    FixMap(u8),
    FixArray(u8),
    FixStr(u8),
    Nil,
    Reserved,
    False,
    True,
    Bin(Width),
    /// Extension with explicit length field
    Ext(Width),
    /// Extension with fixed data length (type byte not included)
    FixExt(u8),
    F32,
    F64,
    UInt(Width),
    Int(Width),
    Str(Width),
    Array(Width),
    Map(Width),
}

impl Marker {
    /// Classify a marker byte.
    ///
    /// The fixed families are recognized by high nibble first; everything in
    /// `0xc0..=0xdf` is an explicit typecode.
    pub const fn from_u8(b: u8) -> Self {
        match b >> 4 {
            0x0..=0x7 => return Self::PosFixInt(b),
            0x8 => return Self::FixMap(b & 0x0f),
            0x9 => return Self::FixArray(b & 0x0f),
            0xa | 0xb => return Self::FixStr(b & 0x1f),
            0xe | 0xf => return Self::NegFixInt(b as i8),
            _ => {}
        }
        match b {
            NIL => Self::Nil,
            FALSE => Self::False,
            TRUE => Self::True,
            BIN_8 => Self::Bin(Width::W8),
            BIN_16 => Self::Bin(Width::W16),
            BIN_32 => Self::Bin(Width::W32),
            EXT_8 => Self::Ext(Width::W8),
            EXT_16 => Self::Ext(Width::W16),
            EXT_32 => Self::Ext(Width::W32),
            FLOAT_32 => Self::F32,
            FLOAT_64 => Self::F64,
            UINT_8 => Self::UInt(Width::W8),
            UINT_16 => Self::UInt(Width::W16),
            UINT_32 => Self::UInt(Width::W32),
            UINT_64 => Self::UInt(Width::W64),
            INT_8 => Self::Int(Width::W8),
            INT_16 => Self::Int(Width::W16),
            INT_32 => Self::Int(Width::W32),
            INT_64 => Self::Int(Width::W64),
            FIXEXT_1 => Self::FixExt(1),
            FIXEXT_2 => Self::FixExt(2),
            FIXEXT_4 => Self::FixExt(4),
            FIXEXT_8 => Self::FixExt(8),
            FIXEXT_16 => Self::FixExt(16),
            STR_8 => Self::Str(Width::W8),
            STR_16 => Self::Str(Width::W16),
            STR_32 => Self::Str(Width::W32),
            ARRAY_16 => Self::Array(Width::W16),
            ARRAY_32 => Self::Array(Width::W32),
            MAP_16 => Self::Map(Width::W16),
            MAP_32 => Self::Map(Width::W32),
            _ => Self::Reserved,
        }
    }

    /// Archive entity kind for this marker.
    ///
    /// Extension types have no archive counterpart and report
    /// [`EntityKind::Invalid`].
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::PosFixInt(_) | Self::NegFixInt(_) | Self::UInt(_) | Self::Int(_) => {
                EntityKind::Integer
            }
            Self::F32 | Self::F64 => EntityKind::FloatingPoint,
            Self::FixMap(_) | Self::Map(_) => EntityKind::Object,
            Self::FixArray(_) | Self::Array(_) => EntityKind::Array,
            Self::FixStr(_) | Self::Str(_) => EntityKind::String,
            Self::Nil => EntityKind::Null,
            Self::False | Self::True => EntityKind::Boolean,
            Self::Bin(_) => EntityKind::Binary,
            Self::Ext(_) | Self::FixExt(_) | Self::Reserved => EntityKind::Invalid,
        }
    }
}
