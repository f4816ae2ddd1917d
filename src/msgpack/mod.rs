//! MessagePack codec for the archive protocol.
//!
//! Wire layout follows the MessagePack specification:
//!
//! ```text
//! positive fixint   0xxxxxxx                 0x00 - 0x7f
//! fixmap            1000xxxx + N*2 values    0x80 - 0x8f
//! fixarray          1001xxxx + N values      0x90 - 0x9f
//! fixstr            101xxxxx + N bytes       0xa0 - 0xbf
//! nil / false/true  0xc0 / 0xc2 / 0xc3
//! bin 8/16/32       0xc4 - 0xc6, BE length, bytes
//! ext 8/16/32       0xc7 - 0xc9, BE length, type byte, bytes
//! float 32/64       0xca - 0xcb, BE IEEE-754
//! uint 8..64        0xcc - 0xcf, BE
//! int 8..64         0xd0 - 0xd3, BE two's complement
//! fixext 1..16      0xd4 - 0xd8, type byte, 1/2/4/8/16 bytes
//! str 8/16/32       0xd9 - 0xdb, BE length, bytes
//! array 16/32       0xdc - 0xdd, BE count
//! map 16/32         0xde - 0xdf, BE count
//! negative fixint   111xxxxx                 0xe0 - 0xff
//! ```
//!
//! Extension values are skipped on read and never produced on write.
//!
//! # Example
//!
//! ```ignore
//! use refl_archive::msgpack::{MsgpackReader, MsgpackWriter};
//! use refl_archive::archive::{Reader, Writer};
//!
//! let mut w = MsgpackWriter::new(Vec::new());
//! w.array_push(Some(2))?;
//! w.write_u32(1)?;
//! w.write_str("two")?;
//! w.array_pop()?;
//! let bytes = w.into_inner()?;
//!
//! let mut r = MsgpackReader::new(&bytes[..]);
//! let key = r.begin_array()?;
//! assert_eq!(r.read_u32()?, 1);
//! r.end_array(key)?;
//! ```

pub mod format;
mod reader;
mod writer;

pub use reader::*;
pub use writer::*;
