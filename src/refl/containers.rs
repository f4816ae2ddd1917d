//! Descriptors for arrays, sequences, sets, maps and tuples.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use std::mem::offset_of;

use super::builder::ObjectBuilder;
use super::metadata::{value_mut, value_ref, InsertionStrategy, ObjectMetadata};
use super::Reflect;
use crate::archive::{Reader, Writer};
use crate::util::{EntityKind, Error, Result};

/// Upper bound on capacity reserved from a stream-declared element count.
const MAX_RESERVE: usize = 4096;

fn expected(r: &mut dyn Reader, meta: &ObjectMetadata, what: &str) -> Error {
    let found = r.type_next().unwrap_or(EntityKind::Invalid);
    Error::parse_failed(
        r.error_info(),
        format!("expected {} for {}, found {}", what, meta.type_name(), found),
    )
}

// ============================================================================
// Fixed-size arrays
// ============================================================================

fn archive_array<T: Reflect, const N: usize>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let arr = value_ref::<[T; N]>(value)?;
    let elem = T::metadata();
    w.array_push(Some(N))?;
    for v in arr {
        elem.archive(v, w)?;
    }
    w.array_pop()
}

/// Restores up to `N` leading elements; extras are skipped and missing ones
/// keep their current value.
fn restore_array<T: Reflect, const N: usize>(
    meta: &ObjectMetadata,
    value: &mut dyn Any,
    r: &mut dyn Reader,
) -> Result<()> {
    if !r.is_array_next()? {
        return Err(expected(r, meta, "array"));
    }
    let arr = value_mut::<[T; N]>(value)?;
    let elem = T::metadata();
    let key = r.begin_array()?;
    for slot in arr.iter_mut() {
        if r.should_break(&key) {
            break;
        }
        elem.restore(slot, r)?;
    }
    r.end_array(key)
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn build_metadata() -> ObjectMetadata {
        ObjectMetadata::new::<Self>(EntityKind::Tuple, archive_array::<T, N>, restore_array::<T, N>)
            .with_element(T::metadata)
    }
}

// ============================================================================
// Sequences and sets
// ============================================================================

/// A dynamically sized container restored element by element.
///
/// Implement this and call [`list_metadata`] from `build_metadata` to give a
/// custom collection the same encoding as `Vec`.
pub trait ListLike: Default + 'static {
    type Elem: Reflect + Default;

    const INSERTION: InsertionStrategy;

    fn elem_count(&self) -> usize;

    /// Elements in container order.
    fn elems(&self) -> impl Iterator<Item = &Self::Elem>;

    fn clear_elems(&mut self);

    fn reserve_elems(&mut self, _additional: usize) {}

    /// Append a default element and return it for in-place restore.
    ///
    /// Containers that cannot hand out a slot return `None`; the element is
    /// then restored into a temporary and passed to [`ListLike::insert_elem`].
    fn emplace_elem(&mut self) -> Option<&mut Self::Elem> {
        None
    }

    fn insert_elem(&mut self, elem: Self::Elem);
}

fn archive_list<C: ListLike>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let list = value_ref::<C>(value)?;
    let elem = C::Elem::metadata();
    w.array_push(Some(list.elem_count()))?;
    if C::INSERTION == InsertionStrategy::PushFront {
        let items: Vec<&C::Elem> = list.elems().collect();
        for v in items.into_iter().rev() {
            elem.archive(v, w)?;
        }
    } else {
        for v in list.elems() {
            elem.archive(v, w)?;
        }
    }
    w.array_pop()
}

fn restore_list<C: ListLike>(meta: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    if !r.is_array_next()? {
        return Err(expected(r, meta, "array"));
    }
    let list = value_mut::<C>(value)?;
    let elem = C::Elem::metadata();
    list.clear_elems();

    let key = r.begin_array()?;
    if let Some(n) = r.elem_left() {
        list.reserve_elems(n.min(MAX_RESERVE));
    }
    while !r.should_break(&key) {
        match list.emplace_elem() {
            Some(slot) => elem.restore(slot, r)?,
            None => {
                let mut tmp = C::Elem::default();
                elem.restore(&mut tmp, r)?;
                list.insert_elem(tmp);
            }
        }
    }
    r.end_array(key)
}

/// Descriptor for a [`ListLike`] container.
pub fn list_metadata<C: ListLike>() -> ObjectMetadata {
    ObjectMetadata::new::<C>(EntityKind::Array, archive_list::<C>, restore_list::<C>)
        .with_element(C::Elem::metadata)
        .with_insertion(C::INSERTION)
}

impl<T: Reflect + Default> ListLike for Vec<T> {
    type Elem = T;
    const INSERTION: InsertionStrategy = InsertionStrategy::PushBack;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn reserve_elems(&mut self, additional: usize) {
        self.reserve(additional);
    }

    fn emplace_elem(&mut self) -> Option<&mut T> {
        self.push(T::default());
        self.last_mut()
    }

    fn insert_elem(&mut self, elem: T) {
        self.push(elem);
    }
}

impl<T: Reflect + Default> ListLike for VecDeque<T> {
    type Elem = T;
    const INSERTION: InsertionStrategy = InsertionStrategy::PushBack;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn reserve_elems(&mut self, additional: usize) {
        self.reserve(additional);
    }

    fn emplace_elem(&mut self) -> Option<&mut T> {
        self.push_back(T::default());
        self.back_mut()
    }

    fn insert_elem(&mut self, elem: T) {
        self.push_back(elem);
    }
}

impl<T: Reflect + Default> ListLike for LinkedList<T> {
    type Elem = T;
    const INSERTION: InsertionStrategy = InsertionStrategy::PushBack;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn emplace_elem(&mut self) -> Option<&mut T> {
        self.push_back(T::default());
        self.back_mut()
    }

    fn insert_elem(&mut self, elem: T) {
        self.push_back(elem);
    }
}

impl<T: Reflect + Default + Ord> ListLike for BTreeSet<T> {
    type Elem = T;
    const INSERTION: InsertionStrategy = InsertionStrategy::SetInsert;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn insert_elem(&mut self, elem: T) {
        self.insert(elem);
    }
}

impl<T: Reflect + Default + Hash + Eq> ListLike for HashSet<T> {
    type Elem = T;
    const INSERTION: InsertionStrategy = InsertionStrategy::SetInsert;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn reserve_elems(&mut self, additional: usize) {
        self.reserve(additional);
    }

    fn insert_elem(&mut self, elem: T) {
        self.insert(elem);
    }
}

macro_rules! impl_list_reflect {
    ($($ty:ident<T: $($bound:path),+>),* $(,)?) => {$(
        impl<T: Reflect + Default $(+ $bound)+> Reflect for $ty<T> {
            fn build_metadata() -> ObjectMetadata {
                list_metadata::<Self>()
            }
        }
    )*};
}

impl_list_reflect! {
    Vec<T: Sized>,
    VecDeque<T: Sized>,
    LinkedList<T: Sized>,
    BTreeSet<T: Ord>,
    HashSet<T: Hash, Eq>,
}

// ============================================================================
// Maps
// ============================================================================

trait MapLike: Default + 'static {
    type Key: Reflect + Default;
    type Value: Reflect + Default;

    fn entry_count(&self) -> usize;
    fn entries(&self) -> impl Iterator<Item = (&Self::Key, &Self::Value)>;
    fn clear_entries(&mut self);
    fn insert_entry(&mut self, key: Self::Key, value: Self::Value);
}

impl<K: Reflect + Default + Ord, V: Reflect + Default> MapLike for BTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn entry_count(&self) -> usize {
        self.len()
    }

    fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.iter()
    }

    fn clear_entries(&mut self) {
        self.clear();
    }

    fn insert_entry(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K: Reflect + Default + Hash + Eq, V: Reflect + Default> MapLike for HashMap<K, V> {
    type Key = K;
    type Value = V;

    fn entry_count(&self) -> usize {
        self.len()
    }

    fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.iter()
    }

    fn clear_entries(&mut self) {
        self.clear();
    }

    fn insert_entry(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

fn archive_map<M: MapLike>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let map = value_ref::<M>(value)?;
    let (key_meta, value_meta) = (M::Key::metadata(), M::Value::metadata());
    w.object_push(Some(map.entry_count()))?;
    for (k, v) in map.entries() {
        w.write_key_next()?;
        key_meta.archive(k, w)?;
        value_meta.archive(v, w)?;
    }
    w.object_pop()
}

fn restore_map<M: MapLike>(meta: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    if !r.is_object_next()? {
        return Err(expected(r, meta, "object"));
    }
    let map = value_mut::<M>(value)?;
    let (key_meta, value_meta) = (M::Key::metadata(), M::Value::metadata());
    map.clear_entries();

    let scope = r.begin_object()?;
    while !r.should_break(&scope) {
        r.read_key_next()?;
        let mut k = M::Key::default();
        key_meta.restore(&mut k, r)?;
        let mut v = M::Value::default();
        value_meta.restore(&mut v, r)?;
        map.insert_entry(k, v);
    }
    r.end_object(scope)
}

fn map_metadata<M: MapLike>() -> ObjectMetadata {
    ObjectMetadata::new::<M>(EntityKind::Dictionary, archive_map::<M>, restore_map::<M>)
        .with_element(M::Value::metadata)
        .with_insertion(InsertionStrategy::SetInsert)
}

impl<K: Reflect + Default + Ord, V: Reflect + Default> Reflect for BTreeMap<K, V> {
    fn build_metadata() -> ObjectMetadata {
        map_metadata::<Self>()
    }
}

impl<K: Reflect + Default + Hash + Eq, V: Reflect + Default> Reflect for HashMap<K, V> {
    fn build_metadata() -> ObjectMetadata {
        map_metadata::<Self>()
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_tuple_reflect {
    ($(($($name:ident $idx:tt),+))*) => {$(
        impl<$($name: Reflect),+> Reflect for ($($name,)+) {
            fn build_metadata() -> ObjectMetadata {
                ObjectBuilder::<Self>::tuple()
                    $(.element::<$name>(offset_of!(Self, $idx), |v| &v.$idx, |v| &mut v.$idx))+
                    .build()
            }
        }
    )*};
}

impl_tuple_reflect! {
    (A 0)
    (A 0, B 1)
    (A 0, B 1, C 2)
    (A 0, B 1, C 2, D 3)
    (A 0, B 1, C 2, D 3, E 4)
    (A 0, B 1, C 2, D 3, E 4, F 5)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6)
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{JsonReader, JsonWriter};
    use crate::msgpack::{MsgpackReader, MsgpackWriter};
    use crate::refl::{archive, restore};
    use serde_json::json;

    fn msgpack_roundtrip<T: Reflect + Default>(value: &T) -> T {
        let mut w = MsgpackWriter::new(Vec::new());
        archive(value, &mut w).unwrap();
        let bytes = w.into_inner().unwrap();
        let mut r = MsgpackReader::new(bytes.as_slice());
        let mut out = T::default();
        restore(&mut out, &mut r).unwrap();
        out
    }

    fn to_json<T: Reflect>(value: &T) -> serde_json::Value {
        let mut w = JsonWriter::new();
        archive(value, &mut w).unwrap();
        w.into_value().unwrap()
    }

    /// Stack-like list that prepends on restore.
    #[derive(Debug, Default, PartialEq)]
    struct Stack(VecDeque<u8>);

    impl ListLike for Stack {
        type Elem = u8;
        const INSERTION: InsertionStrategy = InsertionStrategy::PushFront;

        fn elem_count(&self) -> usize {
            self.0.len()
        }

        fn elems(&self) -> impl Iterator<Item = &u8> {
            self.0.iter()
        }

        fn clear_elems(&mut self) {
            self.0.clear();
        }

        fn insert_elem(&mut self, elem: u8) {
            self.0.push_front(elem);
        }
    }

    impl Reflect for Stack {
        fn build_metadata() -> ObjectMetadata {
            list_metadata::<Self>()
        }
    }

    #[test]
    fn test_container_kinds() {
        assert_eq!(Vec::<u8>::metadata().kind(), EntityKind::Array);
        assert_eq!(Vec::<u8>::metadata().insertion(), Some(InsertionStrategy::PushBack));
        assert_eq!(
            BTreeSet::<u8>::metadata().insertion(),
            Some(InsertionStrategy::SetInsert)
        );
        assert_eq!(<[u16; 3]>::metadata().kind(), EntityKind::Tuple);
        assert_eq!(BTreeMap::<String, u8>::metadata().kind(), EntityKind::Dictionary);
        assert!(Vec::<String>::metadata()
            .element_type()
            .is_some_and(|e| e.is::<String>()));

        let pair = <(u8, String)>::metadata();
        assert_eq!(pair.kind(), EntityKind::Tuple);
        assert_eq!(pair.properties().len(), 2);
        assert!(pair.properties()[1].metadata().is::<String>());
    }

    #[test]
    fn test_sequence_roundtrip() {
        let v = vec![vec![1i32, -2], vec![], vec![3]];
        assert_eq!(msgpack_roundtrip(&v), v);

        let d: VecDeque<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(msgpack_roundtrip(&d), d);

        let l: LinkedList<u64> = [7, 8, 9].into_iter().collect();
        assert_eq!(msgpack_roundtrip(&l), l);

        let s: HashSet<i16> = [-1, 0, 1].into_iter().collect();
        assert_eq!(msgpack_roundtrip(&s), s);

        assert_eq!(to_json(&BTreeSet::from([3u8, 1, 2])), json!([1, 2, 3]));
    }

    #[test]
    fn test_restore_clears_target() {
        let mut v = vec![9u8, 9, 9];
        restore(&mut v, &mut JsonReader::new(json!([1]))).unwrap();
        assert_eq!(v, vec![1]);

        let mut m = BTreeMap::from([("old".to_string(), 1u8)]);
        restore(&mut m, &mut JsonReader::new(json!({"new": 2}))).unwrap();
        assert_eq!(m, BTreeMap::from([("new".to_string(), 2u8)]));
    }

    #[test]
    fn test_push_front_order() {
        let stack = Stack(VecDeque::from([1, 2, 3]));
        assert_eq!(to_json(&stack), json!([3, 2, 1]));
        assert_eq!(msgpack_roundtrip(&stack), stack);
    }

    #[test]
    fn test_fixed_array_lenient() {
        let mut a = [0u16; 3];
        restore(&mut a, &mut JsonReader::new(json!([1, 2, 3, 4, 5]))).unwrap();
        assert_eq!(a, [1, 2, 3]);

        let mut a = [7u16; 3];
        restore(&mut a, &mut JsonReader::new(json!([1]))).unwrap();
        assert_eq!(a, [1, 7, 7]);

        assert_eq!(msgpack_roundtrip(&[[1u8, 2], [3, 4]]), [[1, 2], [3, 4]]);
    }

    #[test]
    fn test_map_roundtrip() {
        let m: HashMap<u32, Vec<bool>> = HashMap::from([(1, vec![true]), (40000, vec![])]);
        assert_eq!(msgpack_roundtrip(&m), m);

        // Integer keys are stringified in JSON and parsed back
        let b = BTreeMap::from([(2i64, "two".to_string()), (-1, "neg".to_string())]);
        let value = to_json(&b);
        assert_eq!(value, json!({"-1": "neg", "2": "two"}));
        let mut back = BTreeMap::new();
        restore(&mut back, &mut JsonReader::new(value)).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_tuple_roundtrip() {
        let t = (1u8, "x".to_string(), Some(2.5f64));
        assert_eq!(to_json(&t), json!([1, "x", 2.5]));
        assert_eq!(msgpack_roundtrip(&t), t);

        let mut short = (0u8, 0u8);
        let err = restore(&mut short, &mut JsonReader::new(json!([1]))).unwrap_err();
        assert!(matches!(err, Error::ReaderKeyMissing { ref key, .. } if key == "#1"));
    }

    #[test]
    fn test_wrong_shape() {
        let mut v: Vec<u8> = Vec::new();
        let err = restore(&mut v, &mut JsonReader::new(json!({"a": 1}))).unwrap_err();
        assert!(matches!(err, Error::ReaderParseFailed(_)));
    }
}
