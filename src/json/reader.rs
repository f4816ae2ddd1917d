//! Archive reader over a JSON document tree.

use std::collections::VecDeque;

use serde_json::Value;

use crate::archive::{Number, Reader};
use crate::util::{ContextKey, EntityKind, Error, ErrorInfo, Result, ScopeRelation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Object,
    Array,
    Binary,
}

enum Body {
    /// Pending values; objects are flattened to `[k0, v0, k1, v1, ..]`.
    Items(VecDeque<Value>),
    Bytes { data: Vec<u8>, at: usize },
}

struct Frame {
    key: ContextKey,
    kind: ScopeKind,
    body: Body,
    reading_key: bool,
}

impl Frame {
    fn left(&self) -> usize {
        match &self.body {
            Body::Items(items) => items.len(),
            Body::Bytes { data, at } => data.len() - at,
        }
    }
}

/// [`Reader`] over a parsed [`serde_json::Value`].
///
/// Scope rules match the binary codec, so reflected types restore from
/// either source with the same calls. `begin_binary` accepts arrays of byte
/// values.
pub struct JsonReader {
    roots: VecDeque<Value>,
    frames: Vec<Frame>,
    next_id: u32,
    accept_string_numbers: bool,
}

fn kind_of(v: &Value) -> EntityKind {
    match v {
        Value::Null => EntityKind::Null,
        Value::Bool(_) => EntityKind::Boolean,
        Value::Number(n) if n.is_f64() => EntityKind::FloatingPoint,
        Value::Number(_) => EntityKind::Integer,
        Value::String(_) => EntityKind::String,
        Value::Array(_) => EntityKind::Array,
        Value::Object(_) => EntityKind::Object,
    }
}

impl JsonReader {
    /// Read from a single document.
    pub fn new(value: Value) -> Self {
        Self::from_values(vec![value])
    }

    /// Read several top-level values back to back.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            roots: values.into(),
            frames: Vec::new(),
            next_id: 0,
            accept_string_numbers: false,
        }
    }

    /// Parse JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map(Self::new).map_err(|e| {
            Error::ReaderParseFailed(
                ErrorInfo::default()
                    .position(e.line() as u32, e.column() as u32)
                    .message(e.to_string()),
            )
        })
    }

    /// Accept strings holding numeric text where a number is expected.
    pub fn with_string_numbers(mut self, accept: bool) -> Self {
        self.accept_string_numbers = accept;
        self
    }

    /// Number of open scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop all open scopes; the next read starts at the next top-level value.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    fn info(&self) -> ErrorInfo {
        ErrorInfo::default()
    }

    fn parse_error(&self, msg: impl Into<String>) -> Error {
        Error::ReaderParseFailed(self.info().message(msg))
    }

    fn context_error(&self, msg: impl Into<String>) -> Error {
        Error::ReaderInvalidContext(self.info().message(msg))
    }

    fn peek(&self) -> Result<&Value> {
        let Some(top) = self.frames.last() else {
            return self.roots.front().ok_or_else(|| {
                Error::ReaderReadStreamError(self.info().message("no more values"))
            });
        };
        match &top.body {
            Body::Bytes { .. } => Err(self.context_error("binary blob is open")),
            Body::Items(items) => items.front().ok_or_else(|| {
                Error::ReaderFinishedSequence(self.info().message("no elements left in scope"))
            }),
        }
    }

    /// Consume the next value, enforcing object key discipline.
    fn take(&mut self, aggregate: bool) -> Result<Value> {
        let err = |msg: &str| ErrorInfo::default().message(msg);
        let Some(top) = self.frames.last_mut() else {
            return self
                .roots
                .pop_front()
                .ok_or_else(|| Error::ReaderReadStreamError(err("no more values")));
        };
        let left = top.left();
        let Body::Items(items) = &mut top.body else {
            return Err(Error::ReaderInvalidContext(err("binary blob is open")));
        };
        if left == 0 {
            return Err(Error::ReaderFinishedSequence(err("no elements left in scope")));
        }
        if top.kind == ScopeKind::Object && left % 2 == 0 {
            if !top.reading_key {
                return Err(Error::ReaderInvalidContext(err(
                    "object key read without read_key_next",
                )));
            }
            if aggregate {
                return Err(Error::ReaderInvalidContext(err("aggregate found at key position")));
            }
            top.reading_key = false;
        }
        items
            .pop_front()
            .ok_or_else(|| Error::ReaderFinishedSequence(err("no elements left in scope")))
    }

    fn open(&mut self, kind: ScopeKind, body: Body) -> ContextKey {
        self.next_id += 1;
        let key = ContextKey::new(self.frames.len() as u32 + 1, self.next_id);
        self.frames.push(Frame {
            key,
            kind,
            body,
            reading_key: false,
        });
        key
    }

    fn close(&mut self, key: ContextKey, kind: ScopeKind) -> Result<()> {
        let Some(idx) = self.frames.iter().rposition(|f| f.key == key) else {
            return Err(self.context_error(format!("scope {} is not open", key)));
        };
        if self.frames[idx].kind != kind {
            return Err(self.context_error(format!(
                "scope {} is {:?}, not {:?}",
                key, self.frames[idx].kind, kind
            )));
        }
        self.frames.truncate(idx);
        Ok(())
    }
}

impl Reader for JsonReader {
    fn read_null(&mut self) -> Result<()> {
        self.take(false).map(drop)
    }

    fn read_bool(&mut self) -> Result<bool> {
        if !matches!(self.peek()?, Value::Bool(_)) {
            return Ok(self.read_number()?.is_truthy());
        }
        match self.take(false)? {
            Value::Bool(b) => Ok(b),
            _ => Err(self.parse_error("expected boolean")),
        }
    }

    fn read_number(&mut self) -> Result<Number> {
        let kind = kind_of(self.peek()?);
        // Object keys are always strings in JSON
        let at_key = self
            .frames
            .last()
            .is_some_and(|f| f.kind == ScopeKind::Object && f.left() % 2 == 0);
        let accept = self.accept_string_numbers || at_key;
        let n = match self.take(false)? {
            Value::Number(n) => n
                .as_u64()
                .map(Number::Unsigned)
                .or_else(|| n.as_i64().map(Number::Signed))
                .or_else(|| n.as_f64().map(Number::Float)),
            Value::Bool(b) => Some(Number::Unsigned(b as u64)),
            Value::String(s) if accept => Some(
                Number::parse(&s)
                    .ok_or_else(|| self.parse_error(format!("'{}' is not a number", s)))?,
            ),
            _ => None,
        };
        n.ok_or_else(|| self.parse_error(format!("expected number, found {}", kind)))
    }

    fn read_string(&mut self, out: &mut String) -> Result<()> {
        let kind = kind_of(self.peek()?);
        if kind != EntityKind::String {
            return Err(self.parse_error(format!("expected string, found {}", kind)));
        }
        if let Value::String(s) = self.take(false)? {
            *out = s;
        }
        Ok(())
    }

    fn type_next(&mut self) -> Result<EntityKind> {
        Ok(kind_of(self.peek()?))
    }

    fn elem_left(&self) -> Option<usize> {
        self.frames.last().map(Frame::left)
    }

    fn begin_object(&mut self) -> Result<ContextKey> {
        let kind = kind_of(self.peek()?);
        if kind != EntityKind::Object {
            return Err(self.parse_error(format!("expected object, found {}", kind)));
        }
        let Value::Object(map) = self.take(true)? else {
            return Err(self.parse_error("expected object"));
        };
        let mut items = VecDeque::with_capacity(map.len() * 2);
        for (k, v) in map {
            items.push_back(Value::String(k));
            items.push_back(v);
        }
        Ok(self.open(ScopeKind::Object, Body::Items(items)))
    }

    fn begin_array(&mut self) -> Result<ContextKey> {
        let kind = kind_of(self.peek()?);
        if kind != EntityKind::Array {
            return Err(self.parse_error(format!("expected array, found {}", kind)));
        }
        let Value::Array(items) = self.take(true)? else {
            return Err(self.parse_error("expected array"));
        };
        Ok(self.open(ScopeKind::Array, Body::Items(items.into())))
    }

    fn should_break(&self, key: &ContextKey) -> bool {
        let Some(top) = self.frames.last() else {
            return true;
        };
        match key.relation(&top.key) {
            ScopeRelation::Same => top.left() == 0,
            relation => relation.must_break(),
        }
    }

    fn end_object(&mut self, key: ContextKey) -> Result<()> {
        self.close(key, ScopeKind::Object)
    }

    fn end_array(&mut self, key: ContextKey) -> Result<()> {
        self.close(key, ScopeKind::Array)
    }

    fn begin_binary(&mut self) -> Result<usize> {
        let bytes = match self.peek()? {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| self.parse_error("array is not a byte sequence"))?,
            other => {
                return Err(self.parse_error(format!("expected binary, found {}", kind_of(other))))
            }
        };
        self.take(true)?;
        let len = bytes.len();
        self.open(ScopeKind::Binary, Body::Bytes { data: bytes, at: 0 });
        Ok(len)
    }

    fn binary_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.frames.last_mut().map(|f| &mut f.body) {
            Some(Body::Bytes { data, at }) => {
                let n = buf.len().min(data.len() - *at);
                buf[..n].copy_from_slice(&data[*at..*at + n]);
                *at += n;
                Ok(n)
            }
            _ => Err(self.context_error("no binary blob is open")),
        }
    }

    fn end_binary(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(f) if f.kind == ScopeKind::Binary => {
                self.frames.pop();
                Ok(())
            }
            _ => Err(self.context_error("no binary blob is open")),
        }
    }

    fn read_key_next(&mut self) -> Result<()> {
        let err = |msg: &str| Error::ReaderInvalidContext(ErrorInfo::default().message(msg));
        let Some(top) = self.frames.last_mut() else {
            return Err(err("read_key_next outside of an object"));
        };
        if top.kind != ScopeKind::Object {
            return Err(err("read_key_next outside of an object"));
        }
        let left = top.left();
        if left == 0 {
            return Err(Error::ReaderFinishedSequence(
                ErrorInfo::default().message("no entries left in object"),
            ));
        }
        if left % 2 == 1 {
            return Err(err("value expected, not a key"));
        }
        if top.reading_key {
            return Err(err("read_key_next called twice"));
        }
        top.reading_key = true;
        Ok(())
    }

    fn is_null_next(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_null())
    }

    fn skip_value(&mut self) -> Result<()> {
        self.take(false).map(drop)
    }

    fn error_info(&self) -> ErrorInfo {
        self.info()
    }
}
