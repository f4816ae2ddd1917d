//! Abstract hierarchical archive protocol.
//!
//! A [`Writer`] / [`Reader`] pair is the only boundary crossed by codecs and
//! by the reflection layer. Traversal code drives these traits through
//! matching push/pop (writer) or begin/end (reader) calls, so any codec that
//! implements them can serialize any reflected type without materializing an
//! intermediate tree.
//!
//! Both traits are object safe; reflection callbacks take `&mut dyn Writer`
//! and `&mut dyn Reader`.

mod transcode;

pub use transcode::*;

use std::fmt;

use crate::util::{ContextKey, EntityKind, Error, ErrorInfo, Result};

// ============================================================================
// Numbers
// ============================================================================

/// A numeric scalar as it was found in the stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Number {
    /// Parse numeric text. The whole string, minus surrounding whitespace,
    /// must be consumed.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        if let Ok(v) = t.parse::<u64>() {
            return Some(Self::Unsigned(v));
        }
        if let Ok(v) = t.parse::<i64>() {
            return Some(Self::Signed(v));
        }
        t.parse::<f64>().ok().map(Self::Float)
    }

    /// Value as `i64`, `None` when out of range.
    ///
    /// Floats truncate toward zero.
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(v),
            Self::Unsigned(v) => i64::try_from(v).ok(),
            Self::Float(v) => {
                if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Some(v as i64)
                } else {
                    None
                }
            }
        }
    }

    /// Value as `u64`, `None` when negative or out of range.
    pub fn to_u64(self) -> Option<u64> {
        match self {
            Self::Signed(v) => u64::try_from(v).ok(),
            Self::Unsigned(v) => Some(v),
            Self::Float(v) => {
                if v.is_finite() && v > -1.0 && v < u64::MAX as f64 {
                    Some(v as u64)
                } else {
                    None
                }
            }
        }
    }

    /// Value as `f64`. Always succeeds; large integers lose precision.
    #[inline]
    pub fn to_f64(self) -> f64 {
        match self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Non-zero test used when a number is read as a boolean.
    #[inline]
    pub fn is_truthy(self) -> bool {
        match self {
            Self::Signed(v) => v != 0,
            Self::Unsigned(v) => v != 0,
            Self::Float(v) => v != 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

fn out_of_range(info: ErrorInfo, n: Number, target: &str) -> Error {
    Error::ReaderParseFailed(info.message(format!("{} does not fit in {}", n, target)))
}

// ============================================================================
// Writer
// ============================================================================

/// Stream writer half of the archive protocol.
///
/// Aggregates are bracketed by push/pop calls. Inside an object, each key must
/// be announced with [`Writer::write_key_next`] before it is written.
pub trait Writer {
    /// Write a null scalar.
    fn write_null(&mut self) -> Result<()>;

    /// Write a boolean scalar.
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Write a signed integer.
    fn write_i64(&mut self, v: i64) -> Result<()>;

    /// Write an unsigned integer.
    fn write_u64(&mut self, v: u64) -> Result<()>;

    /// Write a double precision float.
    fn write_f64(&mut self, v: f64) -> Result<()>;

    /// Write a single precision float.
    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_f64(v as f64)
    }

    fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_i64(v as i64)
    }

    fn write_i16(&mut self, v: i16) -> Result<()> {
        self.write_i64(v as i64)
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_i64(v as i64)
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_u64(v as u64)
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_u64(v as u64)
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_u64(v as u64)
    }

    /// Write a UTF-8 string.
    fn write_str(&mut self, v: &str) -> Result<()>;

    /// Write an opaque byte span as a single binary blob.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.binary_push(v.len())?;
        self.binary_write_some(v)?;
        self.binary_pop()
    }

    /// Open a binary blob of exactly `total` bytes.
    fn binary_push(&mut self, total: usize) -> Result<()>;

    /// Append bytes to the open blob.
    fn binary_write_some(&mut self, bytes: &[u8]) -> Result<()>;

    /// Close the blob. All `total` bytes must have been written.
    fn binary_pop(&mut self) -> Result<()>;

    /// Open an object of `num_entries` key-value pairs (`None` when unknown).
    fn object_push(&mut self, num_entries: Option<usize>) -> Result<()>;

    /// Close the innermost object.
    fn object_pop(&mut self) -> Result<()>;

    /// Open an array of `num_elems` elements (`None` when unknown).
    fn array_push(&mut self, num_elems: Option<usize>) -> Result<()>;

    /// Close the innermost array.
    fn array_pop(&mut self) -> Result<()>;

    /// Assert that the next scalar write is an object key.
    fn write_key_next(&mut self) -> Result<()>;

    /// Snapshot of the current cursor state.
    fn error_info(&self) -> ErrorInfo;
}

// ============================================================================
// Reader
// ============================================================================

/// Stream reader half of the archive protocol.
///
/// Container loops follow the same shape regardless of codec:
///
/// ```ignore
/// let key = reader.begin_array()?;
/// while !reader.should_break(&key) {
///     // read one element
/// }
/// reader.end_array(key)?;
/// ```
pub trait Reader {
    /// Consume the next value, whatever it is.
    fn read_null(&mut self) -> Result<()>;

    /// Read a boolean. Codecs may coerce numbers.
    fn read_bool(&mut self) -> Result<bool>;

    /// Read the next numeric scalar as found in the stream.
    fn read_number(&mut self) -> Result<Number>;

    /// Read a UTF-8 string into `out`, replacing its contents.
    fn read_string(&mut self, out: &mut String) -> Result<()>;

    /// Kind of the next entity, without consuming it.
    fn type_next(&mut self) -> Result<EntityKind>;

    /// Remaining slots in the innermost scope, `None` if unsupported.
    ///
    /// Object scopes count keys and values separately.
    fn elem_left(&self) -> Option<usize>;

    /// Enter an object scope.
    fn begin_object(&mut self) -> Result<ContextKey>;

    /// Enter an array scope.
    fn begin_array(&mut self) -> Result<ContextKey>;

    /// Whether a container loop keyed on `key` must stop.
    fn should_break(&self, key: &ContextKey) -> bool;

    /// Leave the object scope `key`, skipping anything left unread.
    fn end_object(&mut self, key: ContextKey) -> Result<()>;

    /// Leave the array scope `key`, skipping anything left unread.
    fn end_array(&mut self, key: ContextKey) -> Result<()>;

    /// Enter a binary scope and return its exact byte length.
    fn begin_binary(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes of the open blob; returns the count read.
    fn binary_read_some(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Leave the binary scope, discarding any unread bytes.
    fn end_binary(&mut self) -> Result<()>;

    /// Assert that the next scalar read is an object key.
    fn read_key_next(&mut self) -> Result<()>;

    /// Whether the next entity is null.
    fn is_null_next(&mut self) -> Result<bool>;

    /// Skip exactly one value, including nested aggregates.
    fn skip_value(&mut self) -> Result<()>;

    /// Snapshot of the current cursor state.
    fn error_info(&self) -> ErrorInfo;

    fn is_object_next(&mut self) -> Result<bool> {
        Ok(self.type_next()?.is_object_like())
    }

    fn is_array_next(&mut self) -> Result<bool> {
        Ok(self.type_next()?.is_array_like())
    }

    fn read_i64(&mut self) -> Result<i64> {
        let n = self.read_number()?;
        n.to_i64().ok_or_else(|| out_of_range(self.error_info(), n, "i64"))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let n = self.read_number()?;
        n.to_u64().ok_or_else(|| out_of_range(self.error_info(), n, "u64"))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(self.read_number()?.to_f64())
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(self.read_f64()? as f32)
    }

    fn read_i8(&mut self) -> Result<i8> {
        let n = self.read_number()?;
        n.to_i64()
            .and_then(|v| i8::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "i8"))
    }

    fn read_i16(&mut self) -> Result<i16> {
        let n = self.read_number()?;
        n.to_i64()
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "i16"))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let n = self.read_number()?;
        n.to_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "i32"))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let n = self.read_number()?;
        n.to_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "u8"))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let n = self.read_number()?;
        n.to_u64()
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "u16"))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let n = self.read_number()?;
        n.to_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| out_of_range(self.error_info(), n, "u32"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_coercion() {
        assert_eq!(Number::Unsigned(5).to_i64(), Some(5));
        assert_eq!(Number::Unsigned(u64::MAX).to_i64(), None);
        assert_eq!(Number::Signed(-1).to_u64(), None);
        assert_eq!(Number::Float(3.9).to_i64(), Some(3));
        assert_eq!(Number::Float(-0.5).to_u64(), Some(0));
        assert_eq!(Number::Float(f64::NAN).to_i64(), None);

        // 2^63 and 2^64 are the first floats past each range
        assert_eq!(Number::Float(9_223_372_036_854_775_808.0).to_i64(), None);
        assert_eq!(Number::Float(18_446_744_073_709_551_616.0).to_u64(), None);
        assert_eq!(Number::Float(-9_223_372_036_854_775_808.0).to_i64(), Some(i64::MIN));
        let below = f64::from_bits((i64::MAX as f64).to_bits() - 1);
        assert_eq!(Number::Float(below).to_i64(), Some(below as i64));
        let below = f64::from_bits((u64::MAX as f64).to_bits() - 1);
        assert_eq!(Number::Float(below).to_u64(), Some(below as u64));
        assert_eq!(Number::Signed(-7).to_f64(), -7.0);
    }

    #[test]
    fn test_number_parse() {
        assert_eq!(Number::parse("42"), Some(Number::Unsigned(42)));
        assert_eq!(Number::parse(" -3 "), Some(Number::Signed(-3)));
        assert_eq!(Number::parse("2.5"), Some(Number::Float(2.5)));
        assert_eq!(Number::parse("12abc"), None);
        assert_eq!(Number::parse(""), None);
    }

    #[test]
    fn test_number_truthy() {
        assert!(Number::Signed(-1).is_truthy());
        assert!(!Number::Unsigned(0).is_truthy());
        assert!(!Number::Float(0.0).is_truthy());
    }
}
