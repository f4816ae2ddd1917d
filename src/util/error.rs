//! Error types for archive operations.

use std::fmt;
use thiserror::Error;

/// Snapshot of an archive's cursor state at the moment an error was raised.
///
/// `line`/`column` are best-effort and only filled by text codecs; the binary
/// codec reports the byte offset alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Whether this snapshot describes an actual failure.
    pub has_error: bool,
    /// 1-based line, or 0 when unknown.
    pub line: u32,
    /// 1-based column, or 0 when unknown.
    pub column: u32,
    /// Byte offset of the cursor in the underlying stream.
    pub byte_offset: u64,
    /// Human readable description.
    pub message: String,
}

impl ErrorInfo {
    /// Snapshot for a cursor at `byte_offset`, with no error recorded yet.
    #[inline]
    pub fn at(byte_offset: u64) -> Self {
        Self {
            byte_offset,
            ..Self::default()
        }
    }

    /// Attach a message and mark the snapshot as an error.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.has_error = true;
        self.message = msg.into();
        self
    }

    /// Set the text position.
    pub fn position(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}, column {} ", self.line, self.column)?;
        }
        write!(f, "(B_{})", self.byte_offset)?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// Main error type for archive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Push/pop or key ordering violated on the writer side.
    #[error("Writer invalid context: {0}")]
    WriterInvalidContext(ErrorInfo),

    /// Writer used in a state that cannot accept the call.
    #[error("Writer invalid state: {0}")]
    WriterInvalidState(ErrorInfo),

    /// Stream-side protocol violation.
    #[error("Reader invalid context: {0}")]
    ReaderInvalidContext(ErrorInfo),

    /// Malformed or unrecognized encoding at the cursor.
    #[error("Parse failed: {0}")]
    ReaderParseFailed(ErrorInfo),

    /// Byte source ended early or could not satisfy a read.
    #[error("Read stream error: {0}")]
    ReaderReadStreamError(ErrorInfo),

    /// Scope exhausted when another element was requested.
    #[error("Sequence finished: {0}")]
    ReaderFinishedSequence(ErrorInfo),

    /// A required field was absent on decode.
    #[error("Missing key '{key}': {info}")]
    ReaderKeyMissing { key: String, info: ErrorInfo },

    /// Invariant violation surfaced by a codec or adapter.
    #[error("Assertion failed: {0}")]
    ReaderAssertionFailed(ErrorInfo),

    /// Binary blob length is not a multiple of its element size.
    #[error("Binary alignment mismatch: {len} bytes for {elem_size}-byte elements {info}")]
    ReaderAlignmentMismatch {
        len: usize,
        elem_size: usize,
        info: ErrorInfo,
    },

    /// I/O error from a writer sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a parse failure at `info`.
    pub fn parse_failed(info: ErrorInfo, msg: impl Into<String>) -> Self {
        Self::ReaderParseFailed(info.message(msg))
    }

    /// Create a reader context violation at `info`.
    pub fn reader_context(info: ErrorInfo, msg: impl Into<String>) -> Self {
        Self::ReaderInvalidContext(info.message(msg))
    }

    /// Create an assertion failure at `info`.
    pub fn assertion(info: ErrorInfo, msg: impl Into<String>) -> Self {
        Self::ReaderAssertionFailed(info.message(msg))
    }

    /// Create a missing-key error for `key`.
    pub fn key_missing(key: impl Into<String>, info: ErrorInfo) -> Self {
        let key = key.into();
        let msg = format!("required key '{}' not found", key);
        Self::ReaderKeyMissing {
            key,
            info: info.message(msg),
        }
    }

    /// Cursor snapshot carried by this error, if any.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::WriterInvalidContext(info)
            | Self::WriterInvalidState(info)
            | Self::ReaderInvalidContext(info)
            | Self::ReaderParseFailed(info)
            | Self::ReaderReadStreamError(info)
            | Self::ReaderFinishedSequence(info)
            | Self::ReaderAssertionFailed(info) => Some(info),
            Self::ReaderKeyMissing { info, .. } | Self::ReaderAlignmentMismatch { info, .. } => {
                Some(info)
            }
            Self::Io(_) => None,
        }
    }

    /// True for errors raised by the reader half.
    pub fn is_reader_error(&self) -> bool {
        !matches!(
            self,
            Self::WriterInvalidContext(_) | Self::WriterInvalidState(_) | Self::Io(_)
        )
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
