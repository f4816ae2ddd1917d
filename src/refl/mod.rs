//! Reflection layer: per-type descriptors that drive the archive protocol.
//!
//! Every supported type has one immutable [`ObjectMetadata`], built on first
//! use and cached for the life of the process. A descriptor knows the shape
//! of its type (kind, extent, properties or element type) and carries the
//! `archive`/`restore` callbacks that walk a live value through any
//! [`Writer`](crate::archive::Writer) or [`Reader`](crate::archive::Reader).
//!
//! ## Shapes
//!
//! | Rust type | Kind | Encoding |
//! |-----------|------|----------|
//! | `reflect_object!` structs | object | key-value pairs in declaration order |
//! | `reflect_tuple!` structs, tuples | tuple | positional array |
//! | integers, floats, `f16`, `bool`, `String`, `()` | scalar | one scalar |
//! | `[T; N]` | tuple | array of `N` elements |
//! | `Vec`, `VecDeque`, `LinkedList`, sets | array | array with runtime count |
//! | `BTreeMap`, `HashMap` | dictionary | key-value pairs |
//! | `Binary<C>` | binary | one blob of native-order element bytes |
//!
//! `Option<T>` and `Box<T>` take the kind of `T`.

mod binary;
mod builder;
mod containers;
mod metadata;
mod primitives;
mod registry;

pub use binary::{Binary, BinaryContainer};
pub use builder::ObjectBuilder;
pub use containers::{list_metadata, ListLike};
pub use metadata::{
    Access, ArchiveFn, FieldAccess, InsertionStrategy, ObjectMetadata, Property, PropertyKey,
    Resolver, RestoreFn,
};
pub use registry::{archive, lookup, registered_count, resolve, restore, Reflect};
