//! Object metadata descriptors.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::mem::size_of;

use crate::archive::{Reader, Writer};
use crate::util::{EntityKind, Error, ErrorInfo, Result};

/// Archive callback bound into a descriptor.
pub type ArchiveFn = fn(&ObjectMetadata, &dyn Any, &mut dyn Writer) -> Result<()>;

/// Restore callback bound into a descriptor.
pub type RestoreFn = fn(&ObjectMetadata, &mut dyn Any, &mut dyn Reader) -> Result<()>;

/// Lazily resolves a nested descriptor.
pub type Resolver = fn() -> &'static ObjectMetadata;

// ============================================================================
// Property
// ============================================================================

/// Identifies a property inside its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKey {
    /// Named field of an object
    Name(&'static str),
    /// Positional element of a tuple
    Index(usize),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(i) => write!(f, "#{}", i),
        }
    }
}

/// Borrows one field out of its type-erased owner.
pub trait Access: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any>;
    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

/// [`Access`] through a pair of plain field projections.
pub struct FieldAccess<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> FieldAccess<T, F> {
    pub fn new(get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self {
        Self { get, get_mut }
    }
}

impl<T: 'static, F: 'static> Access for FieldAccess<T, F> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        let owner = owner.downcast_ref::<T>()?;
        let field: &'a dyn Any = (self.get)(owner);
        Some(field)
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let owner = owner.downcast_mut::<T>()?;
        let field: &'a mut dyn Any = (self.get_mut)(owner);
        Some(field)
    }
}

/// One field of an object or tuple descriptor.
pub struct Property {
    key: PropertyKey,
    offset: usize,
    optional: bool,
    resolve: Resolver,
    access: Box<dyn Access>,
}

impl Property {
    pub fn new(key: PropertyKey, offset: usize, resolve: Resolver, access: Box<dyn Access>) -> Self {
        Self {
            key,
            offset,
            optional: false,
            resolve,
            access,
        }
    }

    #[inline]
    pub fn key(&self) -> PropertyKey {
        self.key
    }

    /// Field name, for object properties.
    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        match self.key {
            PropertyKey::Name(name) => Some(name),
            PropertyKey::Index(_) => None,
        }
    }

    /// Byte offset within the owning type.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the field may be absent on decode.
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    /// Descriptor of the field's own type.
    #[inline]
    pub fn metadata(&self) -> &'static ObjectMetadata {
        (self.resolve)()
    }

    /// Borrow the field out of `owner`.
    pub fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        self.access.get(owner)
    }

    /// Mutably borrow the field out of `owner`.
    pub fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        self.access.get_mut(owner)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("offset", &self.offset)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ObjectMetadata
// ============================================================================

/// How a dynamically sized container accepts restored elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertionStrategy {
    /// Append at the back; archived in iteration order.
    PushBack,
    /// Prepend at the front; archived back to front so restore rebuilds the
    /// original order.
    PushFront,
    /// Build a temporary element and insert it by value.
    SetInsert,
}

/// Immutable per-type descriptor.
///
/// Holds the shape of the bound type and the callbacks that drive a
/// [`Writer`] or [`Reader`] over a live value. Obtained through
/// [`resolve`](super::resolve); one instance exists per type for the life of
/// the process.
pub struct ObjectMetadata {
    type_name: &'static str,
    type_id: TypeId,
    extent: usize,
    kind: EntityKind,
    properties: Vec<Property>,
    element_type: Option<Resolver>,
    insertion: Option<InsertionStrategy>,
    archive_fn: ArchiveFn,
    restore_fn: RestoreFn,
}

impl ObjectMetadata {
    /// Descriptor for `T` with no properties.
    pub fn new<T: 'static>(kind: EntityKind, archive_fn: ArchiveFn, restore_fn: RestoreFn) -> Self {
        Self {
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            extent: size_of::<T>(),
            kind,
            properties: Vec::new(),
            element_type: None,
            insertion: None,
            archive_fn,
            restore_fn,
        }
    }

    /// Attach the descriptor of the contained value type.
    pub fn with_element(mut self, resolve: Resolver) -> Self {
        self.element_type = Some(resolve);
        self
    }

    /// Record the container insertion strategy.
    pub fn with_insertion(mut self, insertion: InsertionStrategy) -> Self {
        self.insertion = Some(insertion);
        self
    }

    pub(crate) fn with_properties(mut self, properties: Vec<Property>) -> Self {
        self.properties = properties;
        self
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Size in bytes of the bound type.
    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Properties in declaration order; empty for non-aggregate kinds.
    #[inline]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Find an object property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == Some(name))
    }

    /// Descriptor of the contained value type, for containers.
    pub fn element_type(&self) -> Option<&'static ObjectMetadata> {
        self.element_type.map(|resolve| resolve())
    }

    #[inline]
    pub fn insertion(&self) -> Option<InsertionStrategy> {
        self.insertion
    }

    /// Whether this descriptor is bound to `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Write `value` through `writer`.
    ///
    /// `value` must be an instance of the bound type.
    pub fn archive(&self, value: &dyn Any, writer: &mut dyn Writer) -> Result<()> {
        if (*value).type_id() != self.type_id {
            return Err(Error::WriterInvalidState(
                writer
                    .error_info()
                    .message(format!("value is not a {}", self.type_name)),
            ));
        }
        (self.archive_fn)(self, value, writer)
    }

    /// Fill `value` from `reader`.
    ///
    /// `value` must be an instance of the bound type.
    pub fn restore(&self, value: &mut dyn Any, reader: &mut dyn Reader) -> Result<()> {
        if (*value).type_id() != self.type_id {
            return Err(Error::assertion(
                reader.error_info(),
                format!("value is not a {}", self.type_name),
            ));
        }
        (self.restore_fn)(self, value, reader)
    }
}

impl fmt::Debug for ObjectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectMetadata")
            .field("type_name", &self.type_name)
            .field("extent", &self.extent)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("insertion", &self.insertion)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Callback helpers
// ============================================================================

/// Downcast the value handed to an archive callback.
pub(crate) fn value_ref<T: 'static>(value: &dyn Any) -> Result<&T> {
    value.downcast_ref::<T>().ok_or_else(|| {
        Error::WriterInvalidState(
            ErrorInfo::default().message(format!("value is not a {}", type_name::<T>())),
        )
    })
}

/// Downcast the value handed to a restore callback.
pub(crate) fn value_mut<T: 'static>(value: &mut dyn Any) -> Result<&mut T> {
    value
        .downcast_mut::<T>()
        .ok_or_else(|| Error::assertion(ErrorInfo::default(), format!("value is not a {}", type_name::<T>())))
}
