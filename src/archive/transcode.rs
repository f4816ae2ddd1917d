//! Codec-to-codec value copy.

use super::{Number, Reader, Writer};
use crate::util::{EntityKind, Error, Result};

/// Chunk size used when forwarding binary blobs.
const BINARY_CHUNK: usize = 4096;

/// Copy exactly one value, including nested aggregates, from `reader` to
/// `writer`.
///
/// Aggregate sizes are taken from the reader's slot counts. Codecs that
/// cannot report counts produce `None` sizes, which some writers reject.
pub fn transcode<R, W>(reader: &mut R, writer: &mut W) -> Result<()>
where
    R: Reader + ?Sized,
    W: Writer + ?Sized,
{
    match reader.type_next()? {
        EntityKind::Null => {
            reader.read_null()?;
            writer.write_null()
        }
        EntityKind::Boolean => writer.write_bool(reader.read_bool()?),
        EntityKind::Integer | EntityKind::FloatingPoint => match reader.read_number()? {
            Number::Signed(v) => writer.write_i64(v),
            Number::Unsigned(v) => writer.write_u64(v),
            Number::Float(v) => writer.write_f64(v),
        },
        EntityKind::String => {
            let mut s = String::new();
            reader.read_string(&mut s)?;
            writer.write_str(&s)
        }
        EntityKind::Binary => {
            let total = reader.begin_binary()?;
            writer.binary_push(total)?;

            let mut buf = [0u8; BINARY_CHUNK];
            let mut left = total;
            while left > 0 {
                let n = reader.binary_read_some(&mut buf[..left.min(BINARY_CHUNK)])?;
                if n == 0 {
                    return Err(Error::ReaderReadStreamError(
                        reader.error_info().message("binary blob ended early"),
                    ));
                }
                writer.binary_write_some(&buf[..n])?;
                left -= n;
            }

            reader.end_binary()?;
            writer.binary_pop()
        }
        EntityKind::Object | EntityKind::Dictionary => {
            let key = reader.begin_object()?;
            writer.object_push(reader.elem_left().map(|slots| slots / 2))?;
            while !reader.should_break(&key) {
                reader.read_key_next()?;
                writer.write_key_next()?;
                transcode(reader, writer)?;
                transcode(reader, writer)?;
            }
            reader.end_object(key)?;
            writer.object_pop()
        }
        EntityKind::Array | EntityKind::Tuple => {
            let key = reader.begin_array()?;
            writer.array_push(reader.elem_left())?;
            while !reader.should_break(&key) {
                transcode(reader, writer)?;
            }
            reader.end_array(key)?;
            writer.array_pop()
        }
        EntityKind::Invalid => Err(Error::ReaderParseFailed(
            reader.error_info().message("cannot transcode an uninterpreted entity"),
        )),
    }
}
