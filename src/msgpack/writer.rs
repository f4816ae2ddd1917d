//! Streaming MessagePack writer.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use smallvec::SmallVec;

use super::format::*;
use crate::archive::Writer;
use crate::util::{Error, ErrorInfo, Result};

/// Writer settings.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Scope stack capacity reserved up front.
    pub reserve_depth: usize,
    /// Emit `f64` values as float32 when the conversion is exact.
    pub compact_floats: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            reserve_depth: 8,
            compact_floats: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Object,
    Array,
    Binary,
}

#[derive(Clone, Copy, Debug)]
struct Scope {
    kind: ScopeKind,
    left: usize,
    writing_key: bool,
}

/// MessagePack implementation of [`Writer`].
///
/// Every aggregate must declare its size on push; headers are written
/// immediately and the writer never seeks. Integers use the smallest
/// encoding that holds the value.
pub struct MsgpackWriter<W: Write> {
    inner: W,
    pos: u64,
    scopes: SmallVec<[Scope; 8]>,
    config: WriterConfig,
}

impl<W: Write> MsgpackWriter<W> {
    /// Create a writer with default settings.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    /// Create a writer with explicit settings.
    pub fn with_config(inner: W, config: WriterConfig) -> Self {
        let mut scopes = SmallVec::new();
        scopes.reserve(config.reserve_depth);
        Self {
            inner,
            pos: 0,
            scopes,
            config,
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Number of open scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// True when no aggregate is left open.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Drop all open scopes so the writer can start a new top-level value.
    ///
    /// Bytes already written are not retracted.
    pub fn clear(&mut self) {
        self.scopes.clear();
    }

    /// Reference to the sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Unwrap the sink. Fails if an aggregate is still open.
    pub fn into_inner(self) -> Result<W> {
        if !self.scopes.is_empty() {
            return Err(Error::WriterInvalidState(
                ErrorInfo::at(self.pos).message(format!("{} scopes still open", self.scopes.len())),
            ));
        }
        Ok(self.inner)
    }

    // ========================================================================
    // Byte level
    // ========================================================================

    fn put_u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_u8(v)?;
        self.pos += 1;
        Ok(())
    }

    fn put_u16(&mut self, v: u16) -> Result<()> {
        self.inner.write_u16::<BigEndian>(v)?;
        self.pos += 2;
        Ok(())
    }

    fn put_u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_u32::<BigEndian>(v)?;
        self.pos += 4;
        Ok(())
    }

    fn put_u64(&mut self, v: u64) -> Result<()> {
        self.inner.write_u64::<BigEndian>(v)?;
        self.pos += 8;
        Ok(())
    }

    fn put_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Marker plus big-endian length field, picking the narrowest of the
    /// given codes. `fix` is used for lengths up to `fix_max`.
    fn put_len(
        &mut self,
        len: usize,
        fix: Option<(u8, usize)>,
        code8: Option<u8>,
        code16: u8,
        code32: u8,
    ) -> Result<()> {
        match (fix, code8) {
            (Some((prefix, max)), _) if len <= max => self.put_u8(prefix | len as u8),
            (_, Some(code)) if len <= u8::MAX as usize => {
                self.put_u8(code)?;
                self.put_u8(len as u8)
            }
            _ if len <= u16::MAX as usize => {
                self.put_u8(code16)?;
                self.put_u16(len as u16)
            }
            _ if len <= u32::MAX as usize => {
                self.put_u8(code32)?;
                self.put_u32(len as u32)
            }
            _ => Err(self.state_error(format!("length {} exceeds the format limit", len))),
        }
    }

    fn put_uint(&mut self, v: u64) -> Result<()> {
        if v <= MAX_POSFIXINT as u64 {
            self.put_u8(v as u8)
        } else if v <= u8::MAX as u64 {
            self.put_u8(UINT_8)?;
            self.put_u8(v as u8)
        } else if v <= u16::MAX as u64 {
            self.put_u8(UINT_16)?;
            self.put_u16(v as u16)
        } else if v <= u32::MAX as u64 {
            self.put_u8(UINT_32)?;
            self.put_u32(v as u32)
        } else {
            self.put_u8(UINT_64)?;
            self.put_u64(v)
        }
    }

    fn put_int(&mut self, v: i64) -> Result<()> {
        if v >= 0 {
            self.put_uint(v as u64)
        } else if v >= MIN_NEGFIXINT {
            self.put_u8(v as i8 as u8)
        } else if v >= i8::MIN as i64 {
            self.put_u8(INT_8)?;
            self.put_u8(v as i8 as u8)
        } else if v >= i16::MIN as i64 {
            self.put_u8(INT_16)?;
            self.put_u16(v as i16 as u16)
        } else if v >= i32::MIN as i64 {
            self.put_u8(INT_32)?;
            self.put_u32(v as i32 as u32)
        } else {
            self.put_u8(INT_64)?;
            self.put_u64(v as u64)
        }
    }

    // ========================================================================
    // Scope bookkeeping
    // ========================================================================

    fn info(&self) -> ErrorInfo {
        ErrorInfo::at(self.pos)
    }

    fn state_error(&self, msg: impl Into<String>) -> Error {
        Error::WriterInvalidState(self.info().message(msg))
    }

    fn context_error(&self, msg: impl Into<String>) -> Error {
        Error::WriterInvalidContext(self.info().message(msg))
    }

    /// Account for one value about to be written in the innermost scope.
    fn step_context(&mut self, aggregate: bool) -> Result<()> {
        let at = self.pos;
        let err = |msg: &str| ErrorInfo::at(at).message(msg);
        let Some(top) = self.scopes.last_mut() else {
            return Ok(());
        };

        match top.kind {
            ScopeKind::Binary => {
                return Err(Error::WriterInvalidContext(err("binary blob is open")));
            }
            _ if top.left == 0 => {
                return Err(Error::WriterInvalidState(err("aggregate is already full")));
            }
            ScopeKind::Object if top.left % 2 == 0 => {
                if !top.writing_key {
                    return Err(Error::WriterInvalidContext(err(
                        "object key written without write_key_next",
                    )));
                }
                if aggregate {
                    return Err(Error::WriterInvalidContext(err(
                        "aggregate written at key position",
                    )));
                }
                top.writing_key = false;
            }
            _ => {}
        }
        top.left -= 1;
        Ok(())
    }

    fn pop_scope(&mut self, kind: ScopeKind) -> Result<()> {
        match self.scopes.last() {
            Some(top) if top.kind != kind => Err(self.context_error(format!(
                "innermost scope is {:?}, not {:?}",
                top.kind, kind
            ))),
            Some(top) if top.left > 0 => Err(self.state_error(format!(
                "{} slots left unwritten",
                top.left
            ))),
            Some(_) => {
                self.scopes.pop();
                Ok(())
            }
            None => Err(self.context_error("no scope is open")),
        }
    }
}

impl<W: Write> Writer for MsgpackWriter<W> {
    fn write_null(&mut self) -> Result<()> {
        self.step_context(false)?;
        self.put_u8(NIL)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.step_context(false)?;
        self.put_u8(if v { TRUE } else { FALSE })
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.step_context(false)?;
        self.put_int(v)
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.step_context(false)?;
        self.put_uint(v)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        if self.config.compact_floats && (v as f32) as f64 == v {
            return self.write_f32(v as f32);
        }
        self.step_context(false)?;
        self.put_u8(FLOAT_64)?;
        self.put_u64(v.to_bits())
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        self.step_context(false)?;
        self.put_u8(FLOAT_32)?;
        self.put_u32(v.to_bits())
    }

    fn write_str(&mut self, v: &str) -> Result<()> {
        self.step_context(false)?;
        self.put_len(
            v.len(),
            Some((FIXSTR, MAX_FIXSTR_SIZE)),
            Some(STR_8),
            STR_16,
            STR_32,
        )?;
        self.put_bytes(v.as_bytes())
    }

    fn binary_push(&mut self, total: usize) -> Result<()> {
        self.step_context(true)?;
        self.put_len(total, None, Some(BIN_8), BIN_16, BIN_32)?;
        self.scopes.push(Scope {
            kind: ScopeKind::Binary,
            left: total,
            writing_key: false,
        });
        Ok(())
    }

    fn binary_write_some(&mut self, bytes: &[u8]) -> Result<()> {
        let left = match self.scopes.last() {
            Some(top) if top.kind == ScopeKind::Binary => top.left,
            _ => return Err(self.context_error("no binary blob is open")),
        };
        if bytes.len() > left {
            return Err(self.state_error(format!(
                "{} bytes written into a blob with {} left",
                bytes.len(),
                left
            )));
        }
        self.put_bytes(bytes)?;
        if let Some(top) = self.scopes.last_mut() {
            top.left -= bytes.len();
        }
        Ok(())
    }

    fn binary_pop(&mut self) -> Result<()> {
        self.pop_scope(ScopeKind::Binary)
    }

    fn object_push(&mut self, num_entries: Option<usize>) -> Result<()> {
        let Some(n) = num_entries else {
            return Err(self.state_error("object size must be known up front"));
        };
        let slots = n
            .checked_mul(2)
            .ok_or_else(|| self.state_error("object size overflow"))?;
        self.step_context(true)?;
        self.put_len(n, Some((FIXMAP, MAX_FIXMAP_SIZE)), None, MAP_16, MAP_32)?;
        self.scopes.push(Scope {
            kind: ScopeKind::Object,
            left: slots,
            writing_key: false,
        });
        Ok(())
    }

    fn object_pop(&mut self) -> Result<()> {
        self.pop_scope(ScopeKind::Object)
    }

    fn array_push(&mut self, num_elems: Option<usize>) -> Result<()> {
        let Some(n) = num_elems else {
            return Err(self.state_error("array size must be known up front"));
        };
        self.step_context(true)?;
        self.put_len(n, Some((FIXARRAY, MAX_FIXARRAY_SIZE)), None, ARRAY_16, ARRAY_32)?;
        self.scopes.push(Scope {
            kind: ScopeKind::Array,
            left: n,
            writing_key: false,
        });
        Ok(())
    }

    fn array_pop(&mut self) -> Result<()> {
        self.pop_scope(ScopeKind::Array)
    }

    fn write_key_next(&mut self) -> Result<()> {
        let at = self.pos;
        let err = |msg: &str| ErrorInfo::at(at).message(msg);
        let Some(top) = self.scopes.last_mut() else {
            return Err(Error::WriterInvalidContext(err("write_key_next outside of an object")));
        };
        if top.kind != ScopeKind::Object {
            return Err(Error::WriterInvalidContext(err("write_key_next outside of an object")));
        }
        if top.left == 0 {
            return Err(Error::WriterInvalidState(err("object is already full")));
        }
        if top.left % 2 == 1 {
            return Err(Error::WriterInvalidContext(err("value expected, not a key")));
        }
        if top.writing_key {
            return Err(Error::WriterInvalidContext(err("write_key_next called twice")));
        }
        top.writing_key = true;
        Ok(())
    }

    fn error_info(&self) -> ErrorInfo {
        self.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(f: impl FnOnce(&mut MsgpackWriter<Vec<u8>>) -> Result<()>) -> Vec<u8> {
        let mut w = MsgpackWriter::new(Vec::new());
        f(&mut w).unwrap();
        w.into_inner().unwrap()
    }

    #[test]
    fn test_int_encodings() {
        assert_eq!(bytes_of(|w| w.write_i64(0)), [0x00]);
        assert_eq!(bytes_of(|w| w.write_i64(127)), [0x7f]);
        assert_eq!(bytes_of(|w| w.write_i64(128)), [0xcc, 0x80]);
        assert_eq!(bytes_of(|w| w.write_i64(-1)), [0xff]);
        assert_eq!(bytes_of(|w| w.write_i64(-32)), [0xe0]);
        assert_eq!(bytes_of(|w| w.write_i64(-33)), [0xd0, 0xdf]);
        assert_eq!(bytes_of(|w| w.write_i64(-200)), [0xd1, 0xff, 0x38]);
        assert_eq!(bytes_of(|w| w.write_u64(256)), [0xcd, 0x01, 0x00]);
        assert_eq!(
            bytes_of(|w| w.write_u64(u64::MAX)),
            [0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_float_encodings() {
        assert_eq!(bytes_of(|w| w.write_f32(1.0)), [0xca, 0x3f, 0x80, 0x00, 0x00]);
        let b = bytes_of(|w| w.write_f64(1.0));
        assert_eq!(b[0], 0xcb);
        assert_eq!(b.len(), 9);

        let mut w = MsgpackWriter::with_config(
            Vec::new(),
            WriterConfig {
                compact_floats: true,
                ..Default::default()
            },
        );
        w.write_f64(1.0).unwrap();
        w.write_f64(0.1).unwrap();
        let b = w.into_inner().unwrap();
        assert_eq!(b[0], 0xca);
        assert_eq!(b[5], 0xcb);
    }

    #[test]
    fn test_string_headers() {
        assert_eq!(bytes_of(|w| w.write_str("a")), [0xa1, b'a']);
        let long = "x".repeat(40);
        let b = bytes_of(|w| w.write_str(&long));
        assert_eq!(&b[..2], &[0xd9, 40]);
        let longer = "y".repeat(300);
        let b = bytes_of(|w| w.write_str(&longer));
        assert_eq!(&b[..3], &[0xda, 0x01, 0x2c]);
    }

    #[test]
    fn test_object_encoding() {
        let b = bytes_of(|w| {
            w.object_push(Some(1))?;
            w.write_key_next()?;
            w.write_str("k")?;
            w.write_bool(true)?;
            w.object_pop()
        });
        assert_eq!(b, [0x81, 0xa1, b'k', 0xc3]);
    }

    #[test]
    fn test_missing_key_marker() {
        let mut w = MsgpackWriter::new(Vec::new());
        w.object_push(Some(1)).unwrap();
        let err = w.write_str("k").unwrap_err();
        assert!(matches!(err, Error::WriterInvalidContext(_)));
    }

    #[test]
    fn test_aggregate_key_rejected() {
        let mut w = MsgpackWriter::new(Vec::new());
        w.object_push(Some(1)).unwrap();
        w.write_key_next().unwrap();
        let err = w.array_push(Some(0)).unwrap_err();
        assert!(matches!(err, Error::WriterInvalidContext(_)));
    }

    #[test]
    fn test_pop_incomplete() {
        let mut w = MsgpackWriter::new(Vec::new());
        w.array_push(Some(2)).unwrap();
        w.write_null().unwrap();
        assert!(matches!(w.array_pop().unwrap_err(), Error::WriterInvalidState(_)));
        assert!(matches!(w.object_pop().unwrap_err(), Error::WriterInvalidContext(_)));
    }

    #[test]
    fn test_overflow_and_unknown_size() {
        let mut w = MsgpackWriter::new(Vec::new());
        assert!(matches!(w.array_push(None).unwrap_err(), Error::WriterInvalidState(_)));
        w.array_push(Some(0)).unwrap();
        assert!(matches!(w.write_u8(1).unwrap_err(), Error::WriterInvalidState(_)));
    }

    #[test]
    fn test_binary_chunks() {
        let b = bytes_of(|w| {
            w.binary_push(4)?;
            w.binary_write_some(&[1, 2])?;
            w.binary_write_some(&[3, 4])?;
            w.binary_pop()
        });
        assert_eq!(b, [0xc4, 0x04, 1, 2, 3, 4]);

        let mut w = MsgpackWriter::new(Vec::new());
        w.binary_push(1).unwrap();
        assert!(w.binary_write_some(&[1, 2]).is_err());
        assert!(matches!(w.write_null().unwrap_err(), Error::WriterInvalidContext(_)));
    }
}
