//! Process-wide descriptor cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

use super::ObjectMetadata;
use crate::archive::{Reader, Writer};
use crate::util::Result;

/// A type with an object metadata descriptor.
///
/// Implementations only build the descriptor; callers go through
/// [`Reflect::metadata`] (or [`resolve`]), which builds it once and caches
/// it for the rest of the process.
pub trait Reflect: Sized + 'static {
    /// Build a fresh descriptor. Called at most once per successful
    /// publication; nested descriptors must be referenced lazily.
    fn build_metadata() -> ObjectMetadata;

    /// Cached descriptor for this type.
    #[inline]
    fn metadata() -> &'static ObjectMetadata {
        resolve::<Self>()
    }
}

static REGISTRY: LazyLock<RwLock<HashMap<TypeId, &'static ObjectMetadata>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Return the cached descriptor for `T`, building it on first use.
///
/// The build runs without any lock held so nested resolution can recurse.
/// If two threads race on the first build, the first published instance
/// wins and the other build is dropped.
pub fn resolve<T: Reflect>() -> &'static ObjectMetadata {
    let id = TypeId::of::<T>();
    if let Some(meta) = lookup(id) {
        return meta;
    }

    let built = T::build_metadata();
    *REGISTRY.write().entry(id).or_insert_with(|| {
        let meta: &'static ObjectMetadata = Box::leak(Box::new(built));
        debug!(
            type_name = meta.type_name(),
            kind = %meta.kind(),
            extent = meta.extent(),
            properties = meta.properties().len(),
            "published object metadata"
        );
        meta
    })
}

/// Descriptor already published for `type_id`, if any.
pub fn lookup(type_id: TypeId) -> Option<&'static ObjectMetadata> {
    REGISTRY.read().get(&type_id).copied()
}

/// Number of published descriptors.
pub fn registered_count() -> usize {
    REGISTRY.read().len()
}

/// Write `value` through `writer` using its descriptor.
pub fn archive<T: Reflect>(value: &T, writer: &mut dyn Writer) -> Result<()> {
    T::metadata().archive(value, writer)
}

/// Fill `value` from `reader` using its descriptor.
pub fn restore<T: Reflect>(value: &mut T, reader: &mut dyn Reader) -> Result<()> {
    T::metadata().restore(value, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_identity() {
        let a = resolve::<u32>();
        let b = u32::metadata();
        assert!(std::ptr::eq(a, b));
        assert!(a.is::<u32>());
        assert!(lookup(TypeId::of::<u32>()).is_some());
        assert!(registered_count() >= 1);
    }

    #[test]
    fn test_resolve_concurrent() {
        let ptrs: Vec<usize> = (0..8)
            .map(|_| thread::spawn(|| resolve::<Vec<i64>>() as *const ObjectMetadata as usize))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }
}
