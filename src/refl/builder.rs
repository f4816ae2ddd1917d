//! Descriptor builder for objects and tuples.
//!
//! Types declare their fields once, in order, as `(key, offset, accessor)`
//! entries. The macros below are a thin façade over [`ObjectBuilder`]:
//!
//! ```ignore
//! #[derive(Default)]
//! struct Endpoint {
//!     host: String,
//!     port: u16,
//!     tags: Vec<String>,
//! }
//!
//! reflect_object!(Endpoint { host, port, #[optional] tags });
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::mem::size_of;

use smallvec::{smallvec, SmallVec};
use tracing::trace;

use super::metadata::{FieldAccess, ObjectMetadata, Property, PropertyKey};
use super::Reflect;
use crate::archive::{Reader, Writer};
use crate::util::{EntityKind, Error, Result};

/// Builds the descriptor of an object or tuple type `T`.
pub struct ObjectBuilder<T> {
    kind: EntityKind,
    properties: Vec<Property>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ObjectBuilder<T> {
    /// Builder for a type with named fields, archived as a key-value object.
    pub fn object() -> Self {
        Self {
            kind: EntityKind::Object,
            properties: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Builder for a type with positional fields, archived as an array.
    pub fn tuple() -> Self {
        Self {
            kind: EntityKind::Tuple,
            properties: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a named field.
    ///
    /// # Panics
    ///
    /// If the builder is for a tuple, if `name` is already declared, or if the
    /// field does not lie within `T`.
    pub fn property<F: Reflect>(
        mut self,
        name: &'static str,
        offset: usize,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        assert!(
            self.kind == EntityKind::Object,
            "{}: named property '{}' on a tuple descriptor",
            std::any::type_name::<T>(),
            name
        );
        assert!(
            self.properties.iter().all(|p| p.name() != Some(name)),
            "{}: duplicate property '{}'",
            std::any::type_name::<T>(),
            name
        );
        self.push::<F>(PropertyKey::Name(name), offset, get, get_mut);
        self
    }

    /// Add the next positional field.
    ///
    /// # Panics
    ///
    /// If the builder is for an object, or if the field does not lie within `T`.
    pub fn element<F: Reflect>(
        mut self,
        offset: usize,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        assert!(
            self.kind == EntityKind::Tuple,
            "{}: positional element on an object descriptor",
            std::any::type_name::<T>()
        );
        let index = self.properties.len();
        self.push::<F>(PropertyKey::Index(index), offset, get, get_mut);
        self
    }

    /// Mark the most recently added field optional.
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.properties.last_mut() {
            last.set_optional(true);
        }
        self
    }

    fn push<F: Reflect>(
        &mut self,
        key: PropertyKey,
        offset: usize,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) {
        let extent = size_of::<T>();
        // Offsets lie in [0, extent); only a zero-sized owner has none
        assert!(
            (offset < extent || extent == 0)
                && offset
                    .checked_add(size_of::<F>())
                    .is_some_and(|end| end <= extent),
            "{}: field {} at offset {} (size {}) exceeds extent {}",
            std::any::type_name::<T>(),
            key,
            offset,
            size_of::<F>(),
            extent
        );
        self.properties.push(Property::new(
            key,
            offset,
            F::metadata,
            Box::new(FieldAccess::new(get, get_mut)),
        ));
    }

    /// Finish the descriptor.
    pub fn build(self) -> ObjectMetadata {
        let meta = match self.kind {
            EntityKind::Tuple => {
                ObjectMetadata::new::<T>(EntityKind::Tuple, archive_tuple, restore_tuple)
            }
            _ => ObjectMetadata::new::<T>(EntityKind::Object, archive_object, restore_object),
        };
        meta.with_properties(self.properties)
    }
}

// ============================================================================
// Object callbacks
// ============================================================================

fn field<'a>(meta: &ObjectMetadata, prop: &Property, value: &'a dyn Any, w: &dyn Writer) -> Result<&'a dyn Any> {
    prop.get(value).ok_or_else(|| {
        Error::WriterInvalidState(
            w.error_info()
                .message(format!("{}: field {} not accessible", meta.type_name(), prop.key())),
        )
    })
}

fn field_mut<'a>(
    meta: &ObjectMetadata,
    prop: &Property,
    value: &'a mut dyn Any,
    r: &dyn Reader,
) -> Result<&'a mut dyn Any> {
    let info = r.error_info();
    prop.get_mut(value).ok_or_else(|| {
        Error::assertion(info, format!("{}: field {} not accessible", meta.type_name(), prop.key()))
    })
}

fn archive_object(meta: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let props = meta.properties();
    w.object_push(Some(props.len()))?;
    for prop in props {
        let v = field(meta, prop, value, w)?;
        w.write_key_next()?;
        w.write_str(prop.name().unwrap_or_default())?;
        prop.metadata().archive(v, w)?;
    }
    w.object_pop()
}

fn restore_object(meta: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    if !r.is_object_next()? {
        let found = r.type_next()?;
        return Err(Error::parse_failed(
            r.error_info(),
            format!("expected object for {}, found {}", meta.type_name(), found),
        ));
    }

    let props = meta.properties();
    let mut seen: SmallVec<[bool; 16]> = smallvec![false; props.len()];
    let mut name = String::new();

    let key = r.begin_object()?;
    while !r.should_break(&key) {
        r.read_key_next()?;
        r.read_string(&mut name)?;
        match props.iter().position(|p| p.name() == Some(name.as_str())) {
            Some(idx) => {
                let prop = &props[idx];
                let v = field_mut(meta, prop, &mut *value, r)?;
                prop.metadata().restore(v, r)?;
                seen[idx] = true;
            }
            None => {
                trace!(type_name = meta.type_name(), key = %name, "skipping unknown key");
                r.skip_value()?;
            }
        }
    }
    r.end_object(key)?;

    for (prop, seen) in props.iter().zip(seen) {
        if !seen && !prop.is_optional() {
            return Err(Error::key_missing(prop.key().to_string(), r.error_info()));
        }
    }
    Ok(())
}

// ============================================================================
// Tuple callbacks
// ============================================================================

fn archive_tuple(meta: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let props = meta.properties();
    w.array_push(Some(props.len()))?;
    for prop in props {
        let v = field(meta, prop, value, w)?;
        prop.metadata().archive(v, w)?;
    }
    w.array_pop()
}

fn restore_tuple(meta: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    if !r.is_array_next()? {
        let found = r.type_next()?;
        return Err(Error::parse_failed(
            r.error_info(),
            format!("expected array for {}, found {}", meta.type_name(), found),
        ));
    }

    let key = r.begin_array()?;
    for prop in meta.properties() {
        if r.should_break(&key) {
            if prop.is_optional() {
                continue;
            }
            return Err(Error::key_missing(prop.key().to_string(), r.error_info()));
        }
        let v = field_mut(meta, prop, &mut *value, r)?;
        prop.metadata().restore(v, r)?;
    }
    r.end_array(key)
}

// ============================================================================
// Declaration macros
// ============================================================================

/// Implement [`Reflect`](crate::refl::Reflect) for a struct with named fields.
///
/// Fields are archived in the listed order. Prefix a field with `#[optional]`
/// to tolerate its absence on decode.
#[macro_export]
macro_rules! reflect_object {
    ($ty:ty { $($(#[$attr:ident])? $field:ident),* $(,)? }) => {
        impl $crate::refl::Reflect for $ty {
            fn build_metadata() -> $crate::refl::ObjectMetadata {
                let builder = $crate::refl::ObjectBuilder::<$ty>::object();
                $(
                    let builder = builder.property(
                        stringify!($field),
                        ::core::mem::offset_of!($ty, $field),
                        |v| &v.$field,
                        |v| &mut v.$field,
                    );
                    $(let builder = $crate::__reflect_attr!(builder, $attr);)?
                )*
                builder.build()
            }
        }
    };
}

/// Implement [`Reflect`](crate::refl::Reflect) for a tuple struct.
///
/// ```ignore
/// struct Rgb(u8, u8, u8);
/// reflect_tuple!(Rgb(0, 1, 2));
/// ```
#[macro_export]
macro_rules! reflect_tuple {
    ($ty:ident ( $($(#[$attr:ident])? $idx:tt),* $(,)? )) => {
        impl $crate::refl::Reflect for $ty {
            fn build_metadata() -> $crate::refl::ObjectMetadata {
                let builder = $crate::refl::ObjectBuilder::<$ty>::tuple();
                $(
                    let builder = builder.element(
                        ::core::mem::offset_of!($ty, $idx),
                        |v| &v.$idx,
                        |v| &mut v.$idx,
                    );
                    $(let builder = $crate::__reflect_attr!(builder, $attr);)?
                )*
                builder.build()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __reflect_attr {
    ($builder:ident, optional) => {
        $builder.optional()
    };
}
