//! Blob encoding for containers of plain-old-data elements.
//!
//! Wrapping a container in [`Binary`] writes all of its elements as a single
//! binary blob instead of an array of scalars. Contiguous containers take one
//! `binary_write_some` call; others write one element at a time inside the
//! same blob. Element bytes are in native byte order.

use std::any::Any;
use std::collections::{LinkedList, VecDeque};
use std::mem::size_of;
use std::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};

use super::metadata::{value_mut, value_ref, ObjectMetadata};
use super::Reflect;
use crate::archive::{Reader, Writer};
use crate::util::{EntityKind, Error, Result};

/// Bytes restored per read pass.
const CHUNK_BYTES: usize = 64 * 1024;

/// Container archived as one binary blob.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Binary<C>(pub C);

impl<C> Binary<C> {
    #[inline]
    pub fn new(inner: C) -> Self {
        Self(inner)
    }

    #[inline]
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C> Deref for Binary<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.0
    }
}

impl<C> DerefMut for Binary<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.0
    }
}

/// Container usable inside [`Binary`].
pub trait BinaryContainer: Default + 'static {
    type Elem: Pod + Reflect;

    /// All elements as one slice, when stored contiguously.
    fn as_contiguous(&self) -> Option<&[Self::Elem]> {
        None
    }

    /// Append `additional` zeroed elements and return them as one slice.
    fn grow_contiguous(&mut self, _additional: usize) -> Option<&mut [Self::Elem]> {
        None
    }

    fn elem_count(&self) -> usize;

    fn elems(&self) -> impl Iterator<Item = &Self::Elem>;

    fn clear_elems(&mut self);

    fn reserve_elems(&mut self, _additional: usize) {}

    fn push_elem(&mut self, elem: Self::Elem);
}

impl<T: Pod + Reflect> BinaryContainer for Vec<T> {
    type Elem = T;

    fn as_contiguous(&self) -> Option<&[T]> {
        Some(self.as_slice())
    }

    fn grow_contiguous(&mut self, additional: usize) -> Option<&mut [T]> {
        let start = self.len();
        self.resize(start + additional, T::zeroed());
        Some(&mut self[start..])
    }

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

    fn push_elem(&mut self, elem: T) {
        self.push(elem);
    }
}

impl<T: Pod + Reflect> BinaryContainer for VecDeque<T> {
    type Elem = T;

    fn as_contiguous(&self) -> Option<&[T]> {
        match self.as_slices() {
            (front, []) => Some(front),
            _ => None,
        }
    }

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

    fn push_elem(&mut self, elem: T) {
        self.push_back(elem);
    }
}

impl<T: Pod + Reflect> BinaryContainer for LinkedList<T> {
    type Elem = T;

    fn elem_count(&self) -> usize {
        self.len()
    }

    fn elems(&self) -> impl Iterator<Item = &T> {
        self.iter()
    }

    fn clear_elems(&mut self) {
        self.clear();
    }

    fn push_elem(&mut self, elem: T) {
        self.push_back(elem);
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Fill `buf` completely from the open blob.
fn read_fully(r: &mut dyn Reader, buf: &mut [u8]) -> Result<()> {
    let mut at = 0;
    while at < buf.len() {
        let n = r.binary_read_some(&mut buf[at..])?;
        if n == 0 {
            return Err(Error::ReaderReadStreamError(r.error_info().message(format!(
                "binary blob ended after {} of {} bytes",
                at,
                buf.len()
            ))));
        }
        at += n;
    }
    Ok(())
}

fn archive_binary<C: BinaryContainer>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let c = &value_ref::<Binary<C>>(value)?.0;
    w.binary_push(c.elem_count() * size_of::<C::Elem>())?;
    match c.as_contiguous() {
        Some(slice) => w.binary_write_some(bytemuck::cast_slice(slice))?,
        None => {
            for elem in c.elems() {
                w.binary_write_some(bytemuck::bytes_of(elem))?;
            }
        }
    }
    w.binary_pop()
}

fn restore_binary<C: BinaryContainer>(meta: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    // Tree codecs carry blobs as arrays of byte values
    let kind = r.type_next()?;
    if !matches!(kind, EntityKind::Binary | EntityKind::Array) {
        return Err(Error::parse_failed(
            r.error_info(),
            format!("expected binary for {}, found {}", meta.type_name(), kind),
        ));
    }

    let c = &mut value_mut::<Binary<C>>(value)?.0;
    let size = size_of::<C::Elem>();
    let len = r.begin_binary()?;
    if size == 0 || len % size != 0 {
        return Err(Error::ReaderAlignmentMismatch {
            len,
            elem_size: size,
            info: r.error_info().message(meta.type_name()),
        });
    }

    c.clear_elems();
    let mut left = len / size;
    c.reserve_elems(left.min(CHUNK_BYTES / size));
    let per_pass = (CHUNK_BYTES / size).max(1);
    while left > 0 {
        let n = left.min(per_pass);
        match c.grow_contiguous(n) {
            Some(slots) => read_fully(r, bytemuck::cast_slice_mut(slots))?,
            None => {
                for _ in 0..n {
                    let mut elem = C::Elem::zeroed();
                    read_fully(r, bytemuck::bytes_of_mut(&mut elem))?;
                    c.push_elem(elem);
                }
            }
        }
        left -= n;
    }
    r.end_binary()
}

impl<C: BinaryContainer> Reflect for Binary<C> {
    fn build_metadata() -> ObjectMetadata {
        ObjectMetadata::new::<Self>(EntityKind::Binary, archive_binary::<C>, restore_binary::<C>)
            .with_element(C::Elem::metadata)
    }
}
