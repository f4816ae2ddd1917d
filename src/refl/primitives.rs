//! Descriptors for scalars, strings and transparent wrappers.

use std::any::Any;

use half::f16;

use super::metadata::{value_mut, value_ref, ObjectMetadata};
use super::Reflect;
use crate::archive::{Reader, Writer};
use crate::util::{EntityKind, Error, Result};

macro_rules! impl_scalar {
    ($($ty:ty => $kind:ident, $write:ident, $read:ident);* $(;)?) => {$(
        impl Reflect for $ty {
            fn build_metadata() -> ObjectMetadata {
                fn archive(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
                    w.$write(*value_ref::<$ty>(value)?)
                }

                fn restore(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
                    let v = r.$read()?;
                    *value_mut::<$ty>(value)? = v;
                    Ok(())
                }

                ObjectMetadata::new::<$ty>(EntityKind::$kind, archive, restore)
            }
        }
    )*};
}

impl_scalar! {
    i8 => Integer, write_i8, read_i8;
    i16 => Integer, write_i16, read_i16;
    i32 => Integer, write_i32, read_i32;
    i64 => Integer, write_i64, read_i64;
    u8 => Integer, write_u8, read_u8;
    u16 => Integer, write_u16, read_u16;
    u32 => Integer, write_u32, read_u32;
    u64 => Integer, write_u64, read_u64;
    f32 => FloatingPoint, write_f32, read_f32;
    f64 => FloatingPoint, write_f64, read_f64;
    bool => Boolean, write_bool, read_bool;
}

// Pointer-sized integers travel as 64-bit values.

impl Reflect for usize {
    fn build_metadata() -> ObjectMetadata {
        fn archive(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
            w.write_u64(*value_ref::<usize>(value)? as u64)
        }

        fn restore(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
            let v = r.read_u64()?;
            let v = usize::try_from(v)
                .map_err(|_| Error::parse_failed(r.error_info(), format!("{} does not fit in usize", v)))?;
            *value_mut::<usize>(value)? = v;
            Ok(())
        }

        ObjectMetadata::new::<usize>(EntityKind::Integer, archive, restore)
    }
}

impl Reflect for isize {
    fn build_metadata() -> ObjectMetadata {
        fn archive(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
            w.write_i64(*value_ref::<isize>(value)? as i64)
        }

        fn restore(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
            let v = r.read_i64()?;
            let v = isize::try_from(v)
                .map_err(|_| Error::parse_failed(r.error_info(), format!("{} does not fit in isize", v)))?;
            *value_mut::<isize>(value)? = v;
            Ok(())
        }

        ObjectMetadata::new::<isize>(EntityKind::Integer, archive, restore)
    }
}

/// Half floats are widened to `f32` on the wire.
impl Reflect for f16 {
    fn build_metadata() -> ObjectMetadata {
        fn archive(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
            w.write_f32(value_ref::<f16>(value)?.to_f32())
        }

        fn restore(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
            let v = f16::from_f32(r.read_f32()?);
            *value_mut::<f16>(value)? = v;
            Ok(())
        }

        ObjectMetadata::new::<f16>(EntityKind::FloatingPoint, archive, restore)
    }
}

impl Reflect for String {
    fn build_metadata() -> ObjectMetadata {
        fn archive(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
            w.write_str(value_ref::<String>(value)?)
        }

        fn restore(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
            r.read_string(value_mut::<String>(value)?)
        }

        ObjectMetadata::new::<String>(EntityKind::String, archive, restore)
    }
}

/// Unit is written as null; restoring consumes one value of any kind.
impl Reflect for () {
    fn build_metadata() -> ObjectMetadata {
        fn archive(_: &ObjectMetadata, _: &dyn Any, w: &mut dyn Writer) -> Result<()> {
            w.write_null()
        }

        fn restore(_: &ObjectMetadata, _: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
            r.read_null()
        }

        ObjectMetadata::new::<()>(EntityKind::Null, archive, restore)
    }
}

// ============================================================================
// Wrappers
// ============================================================================

fn archive_option<T: Reflect + Default>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    match value_ref::<Option<T>>(value)? {
        Some(inner) => T::metadata().archive(inner, w),
        None => w.write_null(),
    }
}

fn restore_option<T: Reflect + Default>(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    let slot = value_mut::<Option<T>>(value)?;
    if r.is_null_next()? {
        r.read_null()?;
        *slot = None;
        return Ok(());
    }
    let inner = slot.get_or_insert_with(T::default);
    T::metadata().restore(inner, r)
}

/// `None` is written as null. The descriptor takes the kind of `T`.
impl<T: Reflect + Default> Reflect for Option<T> {
    fn build_metadata() -> ObjectMetadata {
        ObjectMetadata::new::<Self>(T::metadata().kind(), archive_option::<T>, restore_option::<T>)
            .with_element(T::metadata)
    }
}

fn archive_box<T: Reflect>(_: &ObjectMetadata, value: &dyn Any, w: &mut dyn Writer) -> Result<()> {
    let inner: &T = value_ref::<Box<T>>(value)?;
    T::metadata().archive(inner, w)
}

fn restore_box<T: Reflect>(_: &ObjectMetadata, value: &mut dyn Any, r: &mut dyn Reader) -> Result<()> {
    let inner: &mut T = value_mut::<Box<T>>(value)?;
    T::metadata().restore(inner, r)
}

impl<T: Reflect> Reflect for Box<T> {
    fn build_metadata() -> ObjectMetadata {
        ObjectMetadata::new::<Self>(T::metadata().kind(), archive_box::<T>, restore_box::<T>)
            .with_element(T::metadata)
    }
}
