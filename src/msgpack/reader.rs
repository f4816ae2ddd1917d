//! Streaming MessagePack reader.

use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};
use smallvec::SmallVec;
use tracing::trace;

use super::format::{Marker, Width, TRUE};
use crate::archive::{Number, Reader};
use crate::util::{ContextKey, EntityKind, Error, ErrorInfo, Result, ScopeRelation};

/// Reader settings.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Scope stack capacity reserved up front.
    pub reserve_depth: usize,
    /// Maximum nesting depth before the stream is rejected. Reflected
    /// restores recurse once per level, so the default stays within what a
    /// 2 MiB thread stack holds in debug builds.
    pub max_depth: usize,
    /// Accept strings holding numeric text where a number is expected.
    pub accept_string_numbers: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            reserve_depth: 8,
            max_depth: 128,
            accept_string_numbers: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Object,
    Array,
    Binary,
}

/// One open aggregate. `left` counts slots: keys and values separately for
/// objects, bytes for binary blobs.
#[derive(Clone, Copy, Debug)]
struct Scope {
    key: ContextKey,
    kind: ScopeKind,
    left: usize,
    reading_key: bool,
}

/// MessagePack implementation of [`Reader`].
///
/// Values are decoded straight from the byte source; nothing is buffered
/// beyond one peeked marker byte. Any number of top-level values may be read
/// back to back.
pub struct MsgpackReader<R> {
    inner: R,
    /// Bytes consumed from `inner`
    pos: u64,
    peeked: Option<u8>,
    scopes: SmallVec<[Scope; 8]>,
    next_id: u32,
    config: ReaderConfig,
}

macro_rules! read_be {
    ($name:ident, $ty:ty, $read:ident) => {
        fn $name(&mut self) -> Result<$ty> {
            debug_assert!(self.peeked.is_none());
            match self.inner.$read::<BigEndian>() {
                Ok(v) => {
                    self.pos += std::mem::size_of::<$ty>() as u64;
                    Ok(v)
                }
                Err(e) => Err(self.stream_error(e)),
            }
        }
    };
}

impl<R: Read> MsgpackReader<R> {
    /// Create a reader with default settings.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, ReaderConfig::default())
    }

    /// Create a reader with explicit settings.
    pub fn with_config(inner: R, config: ReaderConfig) -> Self {
        let mut scopes = SmallVec::new();
        scopes.reserve(config.reserve_depth);
        Self {
            inner,
            pos: 0,
            peeked: None,
            scopes,
            next_id: 0,
            config,
        }
    }

    /// Number of open scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Byte offset of the cursor.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos - self.peeked.is_some() as u64
    }

    /// Settings in effect.
    #[inline]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Drop all open scopes so the reader can resume at top level.
    ///
    /// The byte cursor is left where it is.
    pub fn clear(&mut self) {
        self.scopes.clear();
    }

    /// Unwrap the byte source. A peeked marker byte is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    // ========================================================================
    // Byte level
    // ========================================================================

    fn info(&self) -> ErrorInfo {
        ErrorInfo::at(self.position())
    }

    fn stream_error(&self, e: io::Error) -> Error {
        Error::ReaderReadStreamError(self.info().message(e.to_string()))
    }

    fn parse_error(&self, msg: impl Into<String>) -> Error {
        Error::ReaderParseFailed(self.info().message(msg))
    }

    fn context_error(&self, msg: impl Into<String>) -> Error {
        Error::ReaderInvalidContext(self.info().message(msg))
    }

    fn peek_byte(&mut self) -> Result<u8> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let b = self.raw_u8()?;
        self.peeked = Some(b);
        Ok(b)
    }

    fn next_byte(&mut self) -> Result<u8> {
        match self.peeked.take() {
            Some(b) => Ok(b),
            None => self.raw_u8(),
        }
    }

    fn raw_u8(&mut self) -> Result<u8> {
        match self.inner.read_u8() {
            Ok(v) => {
                self.pos += 1;
                Ok(v)
            }
            Err(e) => Err(self.stream_error(e)),
        }
    }

    fn raw_i8(&mut self) -> Result<i8> {
        Ok(self.raw_u8()? as i8)
    }

    read_be!(raw_u16, u16, read_u16);
    read_be!(raw_u32, u32, read_u32);
    read_be!(raw_u64, u64, read_u64);
    read_be!(raw_i16, i16, read_i16);
    read_be!(raw_i32, i32, read_i32);
    read_be!(raw_i64, i64, read_i64);
    read_be!(raw_f32, f32, read_f32);
    read_be!(raw_f64, f64, read_f64);

    fn raw_len(&mut self, width: Width) -> Result<usize> {
        let len = match width {
            Width::W8 => self.raw_u8()? as u64,
            Width::W16 => self.raw_u16()? as u64,
            Width::W32 => self.raw_u32()? as u64,
            Width::W64 => self.raw_u64()?,
        };
        usize::try_from(len).map_err(|_| self.parse_error(format!("length {} too large", len)))
    }

    /// Read exactly `len` payload bytes. The buffer grows with the data
    /// actually received, so a corrupt length cannot force a huge allocation.
    fn raw_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        debug_assert!(self.peeked.is_none());
        let mut buf = Vec::new();
        let got = match (&mut self.inner).take(len as u64).read_to_end(&mut buf) {
            Ok(n) => n,
            Err(e) => return Err(self.stream_error(e)),
        };
        self.pos += got as u64;
        if got != len {
            return Err(Error::ReaderReadStreamError(self.info().message(format!(
                "expected {} bytes, stream ended after {}",
                len, got
            ))));
        }
        Ok(buf)
    }

    fn skip_bytes(&mut self, len: usize) -> Result<()> {
        debug_assert!(self.peeked.is_none());
        let got = match io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink()) {
            Ok(n) => n,
            Err(e) => return Err(self.stream_error(e)),
        };
        self.pos += got;
        if got != len as u64 {
            return Err(Error::ReaderReadStreamError(self.info().message(format!(
                "expected {} bytes, stream ended after {}",
                len, got
            ))));
        }
        Ok(())
    }

    /// Skip one complete value without touching the scope stack.
    fn skip_raw(&mut self, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(self.parse_error("nesting exceeds max_depth"));
        }
        let marker = Marker::from_u8(self.next_byte()?);
        match marker {
            Marker::PosFixInt(_) | Marker::NegFixInt(_) | Marker::Nil => {}
            Marker::False | Marker::True => {}
            Marker::Reserved => return Err(self.parse_error("reserved typecode 0xc1")),
            Marker::FixMap(n) => self.skip_values(n as usize * 2, depth)?,
            Marker::FixArray(n) => self.skip_values(n as usize, depth)?,
            Marker::FixStr(n) => self.skip_bytes(n as usize)?,
            Marker::Map(w) => {
                let n = self.raw_len(w)?;
                let slots = n
                    .checked_mul(2)
                    .ok_or_else(|| self.parse_error("map length overflow"))?;
                self.skip_values(slots, depth)?;
            }
            Marker::Array(w) => {
                let n = self.raw_len(w)?;
                self.skip_values(n, depth)?;
            }
            Marker::Str(w) | Marker::Bin(w) => {
                let n = self.raw_len(w)?;
                self.skip_bytes(n)?;
            }
            Marker::Ext(w) => {
                let n = self.raw_len(w)?;
                // type byte + payload
                self.skip_bytes(1)?;
                self.skip_bytes(n)?;
            }
            Marker::FixExt(n) => self.skip_bytes(n as usize + 1)?,
            Marker::UInt(w) | Marker::Int(w) => self.skip_bytes(w.bytes())?,
            Marker::F32 => self.skip_bytes(4)?,
            Marker::F64 => self.skip_bytes(8)?,
        }
        Ok(())
    }

    fn skip_values(&mut self, count: usize, depth: usize) -> Result<()> {
        for _ in 0..count {
            self.skip_raw(depth + 1)?;
        }
        Ok(())
    }

    // ========================================================================
    // Scope bookkeeping
    // ========================================================================

    /// Account for one value about to be consumed in the innermost scope.
    fn step_context(&mut self, aggregate: bool) -> Result<()> {
        let at = self.position();
        let err = |msg: &str| ErrorInfo::at(at).message(msg);
        let Some(top) = self.scopes.last_mut() else {
            return Ok(());
        };

        match top.kind {
            ScopeKind::Binary => {
                return Err(Error::ReaderInvalidContext(err("binary blob is open")));
            }
            _ if top.left == 0 => {
                return Err(Error::ReaderFinishedSequence(err("no elements left in scope")));
            }
            ScopeKind::Object if top.left % 2 == 0 => {
                if !top.reading_key {
                    return Err(Error::ReaderInvalidContext(err(
                        "object key read without read_key_next",
                    )));
                }
                if aggregate {
                    return Err(Error::ReaderInvalidContext(err(
                        "aggregate found at key position",
                    )));
                }
                top.reading_key = false;
            }
            _ => {}
        }
        top.left -= 1;
        Ok(())
    }

    fn open_scope(&mut self, kind: ScopeKind, left: usize) -> Result<ContextKey> {
        if self.scopes.len() >= self.config.max_depth {
            return Err(self.parse_error("nesting exceeds max_depth"));
        }
        self.next_id += 1;
        let key = ContextKey::new(self.scopes.len() as u32 + 1, self.next_id);
        self.scopes.push(Scope {
            key,
            kind,
            left,
            reading_key: false,
        });
        Ok(key)
    }

    /// Skip whatever is left in the innermost scope and pop it.
    fn unwind_top(&mut self) -> Result<()> {
        let Some(scope) = self.scopes.last().copied() else {
            return Ok(());
        };
        if scope.left > 0 {
            trace!(key = %scope.key, left = scope.left, "skipping unread slots");
        }
        match scope.kind {
            ScopeKind::Binary => self.skip_bytes(scope.left)?,
            _ => self.skip_values(scope.left, self.scopes.len())?,
        }
        self.scopes.pop();
        Ok(())
    }

    fn close_scope(&mut self, key: ContextKey, kind: ScopeKind) -> Result<()> {
        let Some(idx) = self.scopes.iter().rposition(|s| s.key == key) else {
            return Err(self.context_error(format!("scope {} is not open", key)));
        };
        if self.scopes[idx].kind != kind {
            return Err(self.context_error(format!(
                "scope {} is {:?}, not {:?}",
                key, self.scopes[idx].kind, kind
            )));
        }
        while self.scopes.len() > idx {
            self.unwind_top()?;
        }
        Ok(())
    }

    fn top_binary(&self) -> Result<()> {
        match self.scopes.last() {
            Some(s) if s.kind == ScopeKind::Binary => Ok(()),
            _ => Err(self.context_error("no binary blob is open")),
        }
    }

    fn number_from_str(&self, s: &str) -> Result<Number> {
        Number::parse(s).ok_or_else(|| self.parse_error(format!("'{}' is not a number", s)))
    }

    fn read_str_payload(&mut self, marker: Marker) -> Result<String> {
        let len = match marker {
            Marker::FixStr(n) => n as usize,
            Marker::Str(w) => self.raw_len(w)?,
            _ => return Err(self.parse_error(format!("expected string, found {}", marker.kind()))),
        };
        let bytes = self.raw_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| self.parse_error("string is not valid utf-8"))
    }
}

impl<R: Read> Reader for MsgpackReader<R> {
    fn read_null(&mut self) -> Result<()> {
        self.skip_value()
    }

    fn read_bool(&mut self) -> Result<bool> {
        match Marker::from_u8(self.peek_byte()?) {
            Marker::False | Marker::True => {
                self.step_context(false)?;
                Ok(self.next_byte()? == TRUE)
            }
            _ => Ok(self.read_number()?.is_truthy()),
        }
    }

    fn read_number(&mut self) -> Result<Number> {
        self.step_context(false)?;
        let marker = Marker::from_u8(self.peek_byte()?);
        match marker.kind() {
            EntityKind::Integer | EntityKind::FloatingPoint | EntityKind::Boolean => {}
            EntityKind::String if self.config.accept_string_numbers => {}
            kind => return Err(self.parse_error(format!("expected number, found {}", kind))),
        }
        self.next_byte()?;

        let n = match marker {
            Marker::PosFixInt(v) => Number::Unsigned(v as u64),
            Marker::NegFixInt(v) => Number::Signed(v as i64),
            Marker::False => Number::Unsigned(0),
            Marker::True => Number::Unsigned(1),
            Marker::UInt(Width::W8) => Number::Unsigned(self.raw_u8()? as u64),
            Marker::UInt(Width::W16) => Number::Unsigned(self.raw_u16()? as u64),
            Marker::UInt(Width::W32) => Number::Unsigned(self.raw_u32()? as u64),
            Marker::UInt(Width::W64) => Number::Unsigned(self.raw_u64()?),
            Marker::Int(Width::W8) => Number::Signed(self.raw_i8()? as i64),
            Marker::Int(Width::W16) => Number::Signed(self.raw_i16()? as i64),
            Marker::Int(Width::W32) => Number::Signed(self.raw_i32()? as i64),
            Marker::Int(Width::W64) => Number::Signed(self.raw_i64()?),
            Marker::F32 => Number::Float(self.raw_f32()? as f64),
            Marker::F64 => Number::Float(self.raw_f64()?),
            Marker::FixStr(_) | Marker::Str(_) => {
                let s = self.read_str_payload(marker)?;
                self.number_from_str(&s)?
            }
            _ => return Err(self.parse_error(format!("expected number, found {}", marker.kind()))),
        };
        Ok(n)
    }

    fn read_string(&mut self, out: &mut String) -> Result<()> {
        self.step_context(false)?;
        let marker = Marker::from_u8(self.peek_byte()?);
        if marker.kind() != EntityKind::String {
            return Err(self.parse_error(format!("expected string, found {}", marker.kind())));
        }
        self.next_byte()?;
        *out = self.read_str_payload(marker)?;
        Ok(())
    }

    fn type_next(&mut self) -> Result<EntityKind> {
        if let Some(top) = self.scopes.last() {
            if top.kind == ScopeKind::Binary {
                return Err(self.context_error("binary blob is open"));
            }
            if top.left == 0 {
                return Err(Error::ReaderFinishedSequence(
                    self.info().message("no elements left in scope"),
                ));
            }
        }
        Ok(Marker::from_u8(self.peek_byte()?).kind())
    }

    fn elem_left(&self) -> Option<usize> {
        self.scopes.last().map(|s| s.left)
    }

    fn begin_object(&mut self) -> Result<ContextKey> {
        self.step_context(true)?;
        let n = match Marker::from_u8(self.peek_byte()?) {
            Marker::FixMap(n) => {
                self.next_byte()?;
                n as usize
            }
            Marker::Map(w) => {
                self.next_byte()?;
                self.raw_len(w)?
            }
            m => return Err(self.parse_error(format!("expected object, found {}", m.kind()))),
        };
        let slots = n
            .checked_mul(2)
            .ok_or_else(|| self.parse_error("map length overflow"))?;
        self.open_scope(ScopeKind::Object, slots)
    }

    fn begin_array(&mut self) -> Result<ContextKey> {
        self.step_context(true)?;
        let n = match Marker::from_u8(self.peek_byte()?) {
            Marker::FixArray(n) => {
                self.next_byte()?;
                n as usize
            }
            Marker::Array(w) => {
                self.next_byte()?;
                self.raw_len(w)?
            }
            m => return Err(self.parse_error(format!("expected array, found {}", m.kind()))),
        };
        self.open_scope(ScopeKind::Array, n)
    }

    fn should_break(&self, key: &ContextKey) -> bool {
        let Some(top) = self.scopes.last() else {
            return true;
        };
        match key.relation(&top.key) {
            ScopeRelation::Same => top.left == 0,
            relation => relation.must_break(),
        }
    }

    fn end_object(&mut self, key: ContextKey) -> Result<()> {
        self.close_scope(key, ScopeKind::Object)
    }

    fn end_array(&mut self, key: ContextKey) -> Result<()> {
        self.close_scope(key, ScopeKind::Array)
    }

    fn begin_binary(&mut self) -> Result<usize> {
        self.step_context(true)?;
        let len = match Marker::from_u8(self.peek_byte()?) {
            Marker::Bin(w) => {
                self.next_byte()?;
                self.raw_len(w)?
            }
            m => return Err(self.parse_error(format!("expected binary, found {}", m.kind()))),
        };
        self.open_scope(ScopeKind::Binary, len)?;
        Ok(len)
    }

    fn binary_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.top_binary()?;
        let left = self.scopes.last().map_or(0, |s| s.left);
        let n = buf.len().min(left);
        if let Err(e) = self.inner.read_exact(&mut buf[..n]) {
            return Err(self.stream_error(e));
        }
        self.pos += n as u64;
        if let Some(top) = self.scopes.last_mut() {
            top.left -= n;
        }
        Ok(n)
    }

    fn end_binary(&mut self) -> Result<()> {
        self.top_binary()?;
        self.unwind_top()
    }

    fn read_key_next(&mut self) -> Result<()> {
        let at = self.position();
        let err = |msg: &str| ErrorInfo::at(at).message(msg);
        let Some(top) = self.scopes.last_mut() else {
            return Err(Error::ReaderInvalidContext(err("read_key_next outside of an object")));
        };
        if top.kind != ScopeKind::Object {
            return Err(Error::ReaderInvalidContext(err("read_key_next outside of an object")));
        }
        if top.left == 0 {
            return Err(Error::ReaderFinishedSequence(err("no entries left in object")));
        }
        if top.left % 2 == 1 {
            return Err(Error::ReaderInvalidContext(err("value expected, not a key")));
        }
        if top.reading_key {
            return Err(Error::ReaderInvalidContext(err("read_key_next called twice")));
        }
        top.reading_key = true;
        Ok(())
    }

    fn is_null_next(&mut self) -> Result<bool> {
        Ok(self.type_next()? == EntityKind::Null)
    }

    fn skip_value(&mut self) -> Result<()> {
        self.step_context(false)?;
        self.skip_raw(self.scopes.len())
    }

    fn error_info(&self) -> ErrorInfo {
        self.info()
    }
}
