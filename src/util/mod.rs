//! Foundational types shared by every codec and by the reflection layer.
//!
//! - [`EntityKind`] - Kind of an archive entity
//! - [`ContextKey`] / [`ScopeRelation`] - Scope identity during traversal
//! - [`Error`] / [`ErrorInfo`] / [`Result`] - Error handling

mod entity;
mod error;

pub use entity::*;
pub use error::*;
