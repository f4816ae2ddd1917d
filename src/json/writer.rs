//! Archive writer that builds a JSON document tree.

use serde_json::{Map, Number as JsonNumber, Value};

use crate::archive::Writer;
use crate::util::{Error, ErrorInfo, Result};

enum Frame {
    Object {
        map: Map<String, Value>,
        key: Option<String>,
        key_next: bool,
    },
    Array(Vec<Value>),
    Binary {
        bytes: Vec<u8>,
        left: usize,
    },
}

/// [`Writer`] producing a [`serde_json::Value`].
///
/// Aggregate sizes are optional. Binary blobs become arrays of byte values;
/// non-string keys are stored as their JSON text, and a key whose text is
/// already present in the object is rejected. Objects keep keys in write
/// order.
#[derive(Default)]
pub struct JsonWriter {
    frames: Vec<Frame>,
    roots: Vec<Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Discard everything written so far.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.roots.clear();
    }

    /// Finish and return the single top-level value.
    pub fn into_value(self) -> Result<Value> {
        let mut roots = self.into_values()?;
        if roots.len() != 1 {
            return Err(Error::WriterInvalidState(
                ErrorInfo::default().message(format!("{} top-level values written, expected 1", roots.len())),
            ));
        }
        Ok(roots.remove(0))
    }

    /// Finish and return every top-level value in write order.
    pub fn into_values(self) -> Result<Vec<Value>> {
        if !self.frames.is_empty() {
            return Err(Error::WriterInvalidState(
                ErrorInfo::default().message(format!("{} scopes still open", self.frames.len())),
            ));
        }
        Ok(self.roots)
    }

    fn context_error(&self, msg: impl Into<String>) -> Error {
        Error::WriterInvalidContext(self.info().message(msg))
    }

    fn state_error(&self, msg: impl Into<String>) -> Error {
        Error::WriterInvalidState(self.info().message(msg))
    }

    fn info(&self) -> ErrorInfo {
        ErrorInfo::default()
    }

    /// Check that the innermost scope can take a value.
    fn check_slot(&self, aggregate: bool) -> Result<()> {
        match self.frames.last() {
            None | Some(Frame::Array(_)) => Ok(()),
            Some(Frame::Binary { .. }) => Err(self.context_error("binary blob is open")),
            Some(Frame::Object { key, key_next, .. }) => {
                if *key_next {
                    if aggregate {
                        Err(self.context_error("aggregate written at key position"))
                    } else {
                        Ok(())
                    }
                } else if key.is_some() {
                    Ok(())
                } else {
                    Err(self.context_error("object key written without write_key_next"))
                }
            }
        }
    }

    fn emit(&mut self, v: Value) -> Result<()> {
        self.check_slot(v.is_array() || v.is_object())?;
        let duplicate = match self.frames.last_mut() {
            None => {
                self.roots.push(v);
                None
            }
            Some(Frame::Array(items)) => {
                items.push(v);
                None
            }
            Some(Frame::Object { map, key, key_next }) => {
                if *key_next {
                    let name = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    if map.contains_key(&name) {
                        Some(name)
                    } else {
                        *key_next = false;
                        *key = Some(name);
                        None
                    }
                } else {
                    if let Some(k) = key.take() {
                        map.insert(k, v);
                    }
                    None
                }
            }
            Some(Frame::Binary { .. }) => None,
        };
        match duplicate {
            // `1` and `"1"` share one JSON key
            Some(name) => Err(self.state_error(format!("duplicate object key '{}'", name))),
            None => Ok(()),
        }
    }
}

impl Writer for JsonWriter {
    fn write_null(&mut self) -> Result<()> {
        self.emit(Value::Null)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.emit(Value::Bool(v))
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.emit(Value::Number(v.into()))
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.emit(Value::Number(v.into()))
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        // JSON has no NaN or infinity
        self.emit(JsonNumber::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn write_str(&mut self, v: &str) -> Result<()> {
        self.emit(Value::String(v.to_owned()))
    }

    fn binary_push(&mut self, total: usize) -> Result<()> {
        self.check_slot(true)?;
        self.frames.push(Frame::Binary {
            bytes: Vec::with_capacity(total),
            left: total,
        });
        Ok(())
    }

    fn binary_write_some(&mut self, data: &[u8]) -> Result<()> {
        let err = match self.frames.last_mut() {
            Some(Frame::Binary { bytes, left }) => {
                if data.len() <= *left {
                    bytes.extend_from_slice(data);
                    *left -= data.len();
                    return Ok(());
                }
                format!("{} bytes written into a blob with {} left", data.len(), left)
            }
            _ => return Err(self.context_error("no binary blob is open")),
        };
        Err(self.state_error(err))
    }

    fn binary_pop(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(Frame::Binary { left: 0, .. }) => {}
            Some(Frame::Binary { left, .. }) => {
                return Err(self.state_error(format!("{} bytes left unwritten", left)));
            }
            _ => return Err(self.context_error("no binary blob is open")),
        }
        let Some(Frame::Binary { bytes, .. }) = self.frames.pop() else {
            return Err(self.context_error("no binary blob is open"));
        };
        self.emit(Value::Array(bytes.into_iter().map(Value::from).collect()))
    }

    fn object_push(&mut self, num_entries: Option<usize>) -> Result<()> {
        self.check_slot(true)?;
        self.frames.push(Frame::Object {
            map: Map::with_capacity(num_entries.unwrap_or(0)),
            key: None,
            key_next: false,
        });
        Ok(())
    }

    fn object_pop(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(Frame::Object { key: None, key_next: false, .. }) => {}
            Some(Frame::Object { .. }) => {
                return Err(self.state_error("object closed with a dangling key"));
            }
            _ => return Err(self.context_error("innermost scope is not an object")),
        }
        let Some(Frame::Object { map, .. }) = self.frames.pop() else {
            return Err(self.context_error("innermost scope is not an object"));
        };
        self.emit(Value::Object(map))
    }

    fn array_push(&mut self, num_elems: Option<usize>) -> Result<()> {
        self.check_slot(true)?;
        self.frames
            .push(Frame::Array(Vec::with_capacity(num_elems.unwrap_or(0))));
        Ok(())
    }

    fn array_pop(&mut self) -> Result<()> {
        if !matches!(self.frames.last(), Some(Frame::Array(_))) {
            return Err(self.context_error("innermost scope is not an array"));
        }
        let Some(Frame::Array(items)) = self.frames.pop() else {
            return Err(self.context_error("innermost scope is not an array"));
        };
        self.emit(Value::Array(items))
    }

    fn write_key_next(&mut self) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::Object { key: None, key_next, .. }) if !*key_next => {
                *key_next = true;
                Ok(())
            }
            Some(Frame::Object { .. }) => Err(self.context_error("value expected, not a key")),
            _ => Err(self.context_error("write_key_next outside of an object")),
        }
    }

    fn error_info(&self) -> ErrorInfo {
        self.info()
    }
}
