//! Round trips of reflected types through both codecs.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::{Read, Seek, SeekFrom, Write};

use half::f16;
use refl_archive::prelude::*;
use refl_archive::refl::{archive, restore};

#[derive(Clone, Debug, Default, PartialEq)]
struct Vec3(f32, f32, f32);

reflect_tuple!(Vec3(0, 1, 2));

#[derive(Clone, Debug, Default, PartialEq)]
struct Channel {
    name: String,
    gain: f64,
    muted: bool,
}

reflect_object!(Channel { name, gain, muted });

#[derive(Clone, Debug, Default, PartialEq)]
struct Session {
    id: u64,
    title: String,
    origin: Vec3,
    channels: Vec<Channel>,
    levels: [i16; 4],
    history: VecDeque<(u32, String)>,
    labels: BTreeMap<String, u8>,
    seen: HashSet<i32>,
    samples: Binary<Vec<f16>>,
    parent: Option<Box<Session>>,
    note: Option<String>,
}

reflect_object!(Session {
    id,
    title,
    origin,
    channels,
    levels,
    history,
    labels,
    seen,
    samples,
    #[optional] parent,
    #[optional] note,
});

fn sample_session() -> Session {
    let child = Session {
        id: 2,
        title: "child".into(),
        ..Default::default()
    };
    Session {
        id: u64::MAX - 1,
        title: "mixdown ✓".into(),
        origin: Vec3(1.0, -2.5, 0.125),
        channels: vec![
            Channel {
                name: "left".into(),
                gain: 0.75,
                muted: false,
            },
            Channel {
                name: "right".into(),
                gain: -1e300,
                muted: true,
            },
        ],
        levels: [i16::MIN, -1, 0, i16::MAX],
        history: VecDeque::from([(1, "open".to_string()), (70000, "save".to_string())]),
        labels: BTreeMap::from([("a".to_string(), 1), ("zz".to_string(), 255)]),
        seen: HashSet::from([-40, 0, 1_000_000]),
        samples: Binary(vec![f16::from_f32(0.5), f16::from_f32(-3.0), f16::ZERO]),
        parent: Some(Box::new(child)),
        note: None,
    }
}

#[test]
fn test_msgpack_roundtrip() {
    let session = sample_session();
    let bytes = to_msgpack(&session).unwrap();
    let back: Session = from_msgpack(&bytes).unwrap();
    assert_eq!(back, session);
}

#[test]
fn test_json_roundtrip() {
    let session = sample_session();
    let value = to_json(&session).unwrap();
    assert_eq!(value["origin"], serde_json::json!([1.0, -2.5, 0.125]));
    assert_eq!(value["note"], serde_json::Value::Null);
    let back: Session = from_json(value).unwrap();
    assert_eq!(back, session);
}

#[test]
fn test_cross_codec() {
    // msgpack -> json matches direct json encoding, and json -> msgpack -> json
    // is the identity
    let session = sample_session();
    let expected = to_json(&session).unwrap();

    let bytes = to_msgpack(&session).unwrap();
    let mut reader = MsgpackReader::new(bytes.as_slice());
    let mut writer = JsonWriter::new();
    transcode(&mut reader, &mut writer).unwrap();
    let value = writer.into_value().unwrap();
    assert_eq!(value, expected);

    let mut reader = JsonReader::new(value);
    let mut writer = MsgpackWriter::new(Vec::new());
    transcode(&mut reader, &mut writer).unwrap();
    let again = writer.into_inner().unwrap();

    let mut reader = MsgpackReader::new(again.as_slice());
    let mut writer = JsonWriter::new();
    transcode(&mut reader, &mut writer).unwrap();
    assert_eq!(writer.into_value().unwrap(), expected);
}

#[test]
fn test_empty_containers() {
    let session = Session::default();
    let back: Session = from_msgpack(&to_msgpack(&session).unwrap()).unwrap();
    assert_eq!(back, session);

    let empty: Vec<String> = Vec::new();
    assert_eq!(to_msgpack(&empty).unwrap(), [0x90]);
    let mut target = vec!["stale".to_string()];
    restore(&mut target, &mut MsgpackReader::new(&[0x90u8][..])).unwrap();
    assert!(target.is_empty());

    let map: BTreeMap<String, u8> = BTreeMap::new();
    assert_eq!(to_msgpack(&map).unwrap(), [0x80]);
}

#[test]
fn test_optional_fields_absent() {
    let mut writer = MsgpackWriter::new(Vec::new());
    let channel = Channel {
        name: "solo".into(),
        gain: 1.0,
        muted: false,
    };
    writer.object_push(Some(9)).unwrap();
    for (key, value) in [
        ("id", 5u64),
        ("title", 0),
        ("origin", 0),
        ("channels", 0),
        ("levels", 0),
        ("history", 0),
        ("labels", 0),
        ("seen", 0),
        ("samples", 0),
    ] {
        writer.write_key_next().unwrap();
        writer.write_str(key).unwrap();
        match key {
            "id" => writer.write_u64(value).unwrap(),
            "title" => writer.write_str("bare").unwrap(),
            "origin" => archive(&Vec3::default(), &mut writer).unwrap(),
            "channels" => archive(&vec![channel.clone()], &mut writer).unwrap(),
            "levels" => archive(&[1i16, 2, 3, 4], &mut writer).unwrap(),
            "samples" => writer.write_bytes(&[]).unwrap(),
            _ => {
                writer.array_push(Some(0)).unwrap();
                writer.array_pop().unwrap();
            }
        }
    }
    writer.object_pop().unwrap();
    let bytes = writer.into_inner().unwrap();

    // "labels" is a dictionary; an empty array is the wrong shape
    let err = from_msgpack::<Session>(&bytes).unwrap_err();
    assert!(matches!(err, Error::ReaderParseFailed(_)));

    let value = serde_json::json!({
        "id": 5, "title": "bare", "origin": [0, 0, 0], "channels": [],
        "levels": [1, 2, 3, 4], "history": [], "labels": {}, "seen": [],
        "samples": []
    });
    let session: Session = from_json(value).unwrap();
    assert_eq!(session.id, 5);
    assert_eq!(session.levels, [1, 2, 3, 4]);
    assert_eq!(session.parent, None);
    assert_eq!(session.note, None);
}

#[test]
fn test_file_roundtrip() {
    let session = sample_session();
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&to_msgpack(&session).unwrap()).unwrap();
    file.write_all(&to_msgpack(&Vec3(9.0, 8.0, 7.0)).unwrap()).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut reader = MsgpackReader::new(std::io::BufReader::new(&mut file));
    let mut back = Session::default();
    restore(&mut back, &mut reader).unwrap();
    let mut v = Vec3::default();
    restore(&mut v, &mut reader).unwrap();
    assert_eq!(back, session);
    assert_eq!(v, Vec3(9.0, 8.0, 7.0));

    let mut rest = Vec::new();
    reader.into_inner().read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}
