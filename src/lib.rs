//! # refl-archive
//!
//! Reflection-driven serialization over a format-agnostic archive protocol.
//!
//! A type describes its fields once; the resulting descriptor walks values
//! through any codec that implements the [`archive::Writer`] /
//! [`archive::Reader`] pair. Two codecs are included: a streaming MessagePack
//! codec and an in-memory JSON tree codec.
//!
//! ## Modules
//!
//! - [`util`] - Entity kinds, scope keys, errors
//! - [`archive`] - Writer/Reader protocol, numbers, transcoding
//! - [`msgpack`] - MessagePack codec
//! - [`json`] - JSON tree codec
//! - [`refl`] - Object metadata registry and type adapters
//!
//! ## Example
//!
//! ```ignore
//! use refl_archive::prelude::*;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Probe {
//!     name: String,
//!     samples: Vec<f32>,
//!     note: Option<String>,
//! }
//!
//! reflect_object!(Probe { name, samples, #[optional] note });
//!
//! let probe = Probe { name: "p0".into(), samples: vec![0.5, 1.5], note: None };
//! let bytes = to_msgpack(&probe)?;
//! let back: Probe = from_msgpack(&bytes)?;
//! assert_eq!(back, probe);
//! ```

pub mod archive;
pub mod json;
pub mod msgpack;
pub mod refl;
pub mod util;

// Re-export commonly used types
pub use refl::{resolve, Reflect};
pub use util::{EntityKind, Error, ErrorInfo, Result};

use json::{JsonReader, JsonWriter};
use msgpack::{MsgpackReader, MsgpackWriter};

/// Encode `value` as one MessagePack value.
pub fn to_msgpack<T: Reflect>(value: &T) -> Result<Vec<u8>> {
    let mut writer = MsgpackWriter::new(Vec::new());
    refl::archive(value, &mut writer)?;
    writer.into_inner()
}

/// Decode one MessagePack value into a fresh `T`.
///
/// Fields absent from the stream keep their `Default` values when optional.
pub fn from_msgpack<T: Reflect + Default>(bytes: &[u8]) -> Result<T> {
    let mut reader = MsgpackReader::new(bytes);
    let mut value = T::default();
    refl::restore(&mut value, &mut reader)?;
    Ok(value)
}

/// Encode `value` as a JSON document.
pub fn to_json<T: Reflect>(value: &T) -> Result<serde_json::Value> {
    let mut writer = JsonWriter::new();
    refl::archive(value, &mut writer)?;
    writer.into_value()
}

/// Decode a JSON document into a fresh `T`.
pub fn from_json<T: Reflect + Default>(value: serde_json::Value) -> Result<T> {
    let mut reader = JsonReader::new(value);
    let mut out = T::default();
    refl::restore(&mut out, &mut reader)?;
    Ok(out)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::archive::{transcode, Number, Reader, Writer};
    pub use crate::json::{JsonReader, JsonWriter};
    pub use crate::msgpack::{MsgpackReader, MsgpackWriter, ReaderConfig, WriterConfig};
    pub use crate::refl::{Binary, ObjectBuilder, ObjectMetadata, Reflect};
    pub use crate::util::{EntityKind, Error, Result};
    pub use crate::{from_json, from_msgpack, reflect_object, reflect_tuple, to_json, to_msgpack};
}
