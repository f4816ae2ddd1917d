//! Wire layout and stream behavior of the MessagePack codec.

use refl_archive::prelude::*;
use refl_archive::util::{ContextKey, ScopeRelation};

#[derive(Debug, Default, PartialEq)]
struct Abc {
    a: i32,
    b: i32,
    c: i32,
}

reflect_object!(Abc { a, b, c });

#[test]
fn test_object_wire_layout() {
    let bytes = to_msgpack(&Abc { a: 1, b: 2, c: 3 }).unwrap();
    assert_eq!(
        bytes,
        [0x83, 0xa1, b'a', 0x01, 0xa1, b'b', 0x02, 0xa1, b'c', 0x03]
    );
    assert_eq!(from_msgpack::<Abc>(&bytes).unwrap(), Abc { a: 1, b: 2, c: 3 });
}

#[test]
fn test_any_key_order() {
    let bytes = [0x83, 0xa1, b'c', 0x03, 0xa1, b'a', 0x01, 0xa1, b'b', 0x02];
    assert_eq!(from_msgpack::<Abc>(&bytes).unwrap(), Abc { a: 1, b: 2, c: 3 });

    // Unknown keys and values of any shape are skipped
    let bytes = [
        0x84, 0xa1, b'b', 0x02, 0xa1, b'x', 0x92, 0xc0, 0x81, 0xa1, b'y', 0xc3, 0xa1, b'a',
        0x01, 0xa1, b'c', 0x03,
    ];
    assert_eq!(from_msgpack::<Abc>(&bytes).unwrap(), Abc { a: 1, b: 2, c: 3 });

    let err = from_msgpack::<Abc>(&[0x82, 0xa1, b'a', 0x01, 0xa1, b'b', 0x02]).unwrap_err();
    assert!(matches!(err, Error::ReaderKeyMissing { ref key, .. } if key == "c"));
}

/// Encodes one value of every shape.
fn write_sample(w: &mut dyn Writer, seed: u64) {
    w.object_push(Some(6)).unwrap();
    w.write_key_next().unwrap();
    w.write_str("n").unwrap();
    w.write_i64(-(seed as i64) * 1000).unwrap();
    w.write_key_next().unwrap();
    w.write_str("f").unwrap();
    w.write_f64(seed as f64 / 3.0).unwrap();
    w.write_key_next().unwrap();
    w.write_u64(seed).unwrap();
    w.write_str(&"s".repeat(seed as usize * 20)).unwrap();
    w.write_key_next().unwrap();
    w.write_str("arr").unwrap();
    w.array_push(Some(3)).unwrap();
    w.write_null().unwrap();
    w.write_bool(seed % 2 == 0).unwrap();
    w.write_bytes(&vec![7u8; seed as usize * 100]).unwrap();
    w.array_pop().unwrap();
    w.write_key_next().unwrap();
    w.write_str("big").unwrap();
    w.write_u64(u64::MAX - seed).unwrap();
    w.write_key_next().unwrap();
    w.write_str("empty").unwrap();
    w.object_push(Some(0)).unwrap();
    w.object_pop().unwrap();
    w.object_pop().unwrap();
}

#[test]
fn test_skip_completeness() {
    for seed in [0u64, 1, 4, 20] {
        let mut w = MsgpackWriter::new(Vec::new());
        write_sample(&mut w, seed);
        w.write_str("after").unwrap();
        let bytes = w.into_inner().unwrap();

        let mut r = MsgpackReader::new(bytes.as_slice());
        r.skip_value().unwrap();
        let mut s = String::new();
        r.read_string(&mut s).unwrap();
        assert_eq!(s, "after");
        assert_eq!(r.position(), bytes.len() as u64);
    }
}

#[test]
fn test_transcode_through_json() {
    let mut w = MsgpackWriter::new(Vec::new());
    write_sample(&mut w, 4);
    let original = w.into_inner().unwrap();

    let mut r = MsgpackReader::new(original.as_slice());
    let mut json = JsonWriter::new();
    transcode(&mut r, &mut json).unwrap();
    let value = json.into_value().unwrap();
    assert_eq!(value["n"], -4000);
    assert_eq!(value["big"], u64::MAX - 4);
    assert_eq!(value["4"], "s".repeat(80));
    assert_eq!(value["arr"][2].as_array().map(Vec::len), Some(400));

    // Integer keys and the byte blob lose their type in JSON; everything else
    // survives another pass unchanged
    let mut r = JsonReader::new(value.clone());
    let mut w = MsgpackWriter::new(Vec::new());
    transcode(&mut r, &mut w).unwrap();
    let mut r = MsgpackReader::new(w.get_ref().as_slice());
    let mut json = JsonWriter::new();
    transcode(&mut r, &mut json).unwrap();
    assert_eq!(json.into_value().unwrap(), value);
}

#[test]
fn test_extension_values_skipped() {
    // fixext4, then ext8 with 3 payload bytes, then a positive fixint
    let bytes = [
        0xd6, 0x01, 1, 2, 3, 4, 0xc7, 0x03, 0x7f, 9, 9, 9, 0x2a,
    ];
    let mut r = MsgpackReader::new(&bytes[..]);
    assert_eq!(r.type_next().unwrap(), EntityKind::Invalid);
    r.skip_value().unwrap();
    assert_eq!(r.type_next().unwrap(), EntityKind::Invalid);
    r.skip_value().unwrap();
    assert_eq!(r.read_u8().unwrap(), 42);

    // Inside an array
    let bytes = [0x92, 0xd4, 0x00, 0xff, 0x05];
    let mut r = MsgpackReader::new(&bytes[..]);
    let key = r.begin_array().unwrap();
    r.skip_value().unwrap();
    assert_eq!(r.read_i32().unwrap(), 5);
    assert!(r.should_break(&key));
    r.end_array(key).unwrap();
}

#[test]
fn test_header_widths() {
    let mut w = MsgpackWriter::new(Vec::new());
    w.array_push(Some(16)).unwrap();
    for i in 0..16 {
        w.write_u8(i).unwrap();
    }
    w.array_pop().unwrap();
    let bytes = w.into_inner().unwrap();
    assert_eq!(&bytes[..3], &[0xdc, 0x00, 0x10]);

    let long = "x".repeat(300);
    let bytes = to_msgpack(&long).unwrap();
    assert_eq!(&bytes[..3], &[0xda, 0x01, 0x2c]);
    assert_eq!(from_msgpack::<String>(&bytes).unwrap(), long);

    let bytes = to_msgpack(&-33i64).unwrap();
    assert_eq!(bytes, [0xd0, 0xdf]);
    let bytes = to_msgpack(&-32i64).unwrap();
    assert_eq!(bytes, [0xe0]);
}

#[test]
fn test_compact_floats() {
    let config = WriterConfig {
        compact_floats: true,
        ..Default::default()
    };
    let mut w = MsgpackWriter::with_config(Vec::new(), config);
    w.write_f64(0.5).unwrap();
    w.write_f64(0.1).unwrap();
    let bytes = w.into_inner().unwrap();
    assert_eq!(bytes[0], 0xca);
    assert_eq!(bytes[5], 0xcb);

    let mut r = MsgpackReader::new(bytes.as_slice());
    assert_eq!(r.read_f64().unwrap(), 0.5);
    assert_eq!(r.read_f64().unwrap(), 0.1);
}

#[test]
fn test_string_number_shim() {
    let bytes = to_msgpack(&"12".to_string()).unwrap();
    assert!(from_msgpack::<u16>(&bytes).is_err());

    let config = ReaderConfig {
        accept_string_numbers: true,
        ..Default::default()
    };
    let mut r = MsgpackReader::with_config(bytes.as_slice(), config);
    let mut v = 0u16;
    refl_archive::refl::restore(&mut v, &mut r).unwrap();
    assert_eq!(v, 12);
}

#[test]
fn test_context_keys() {
    let bytes = to_msgpack(&vec![vec![1u8], vec![2]]).unwrap();
    let mut r = MsgpackReader::new(bytes.as_slice());

    let outer = r.begin_array().unwrap();
    let first = r.begin_array().unwrap();
    assert_eq!(outer.relation(&first), ScopeRelation::Nested);
    assert!(!r.should_break(&outer));
    r.read_u8().unwrap();
    assert!(r.should_break(&first));
    r.end_array(first).unwrap();

    let second = r.begin_array().unwrap();
    assert_eq!(first.relation(&second), ScopeRelation::Sibling);
    assert!(r.should_break(&first));
    assert_ne!(first, second);
    r.end_array(second).unwrap();
    assert!(r.should_break(&outer));
    r.end_array(outer).unwrap();

    assert_eq!(ContextKey::new(2, 7).relation(&outer), ScopeRelation::Ancestor);
}
