//! Descriptor identity, layout and concurrent publication.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::mem::{offset_of, size_of};
use std::thread;

use refl_archive::prelude::*;
use refl_archive::refl::{lookup, registered_count, resolve, InsertionStrategy, PropertyKey};

#[derive(Debug, Default, PartialEq)]
struct Node {
    label: String,
    weight: f32,
    children: Vec<Node>,
    parent: Option<Box<Node>>,
}

reflect_object!(Node {
    label,
    weight,
    children,
    #[optional] parent,
});

#[derive(Debug, Default, PartialEq)]
struct Device {
    rate: u32,
    channels: u8,
}

// Keys differ from the field names
impl Reflect for Device {
    fn build_metadata() -> ObjectMetadata {
        ObjectBuilder::<Device>::object()
            .property(
                "sample_rate",
                offset_of!(Device, rate),
                |d| &d.rate,
                |d| &mut d.rate,
            )
            .property(
                "channel_count",
                offset_of!(Device, channels),
                |d| &d.channels,
                |d| &mut d.channels,
            )
            .optional()
            .build()
    }
}

#[derive(Debug, Default)]
struct Untouched(u8);

reflect_tuple!(Untouched(0));

#[derive(Debug, Default)]
struct Contended {
    a: u64,
    b: Vec<String>,
}

reflect_object!(Contended { a, b });

#[test]
fn test_identity() {
    let first = resolve::<Node>();
    let second = Node::metadata();
    assert!(std::ptr::eq(first, second));
    assert!(first.is::<Node>());
    assert_eq!(first.type_id(), TypeId::of::<Node>());
    assert!(std::ptr::eq(lookup(TypeId::of::<Node>()).unwrap(), first));
    assert!(registered_count() >= 1);
}

#[test]
fn test_lazy_publication() {
    assert!(lookup(TypeId::of::<Untouched>()).is_none());
    let meta = resolve::<Untouched>();
    assert!(std::ptr::eq(lookup(TypeId::of::<Untouched>()).unwrap(), meta));
    assert_eq!(meta.kind(), EntityKind::Tuple);
    assert_eq!(meta.properties()[0].key(), PropertyKey::Index(0));
}

#[test]
fn test_concurrent_resolve() {
    let addrs: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| resolve::<Contended>() as *const ObjectMetadata as usize))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(addrs[0], Contended::metadata() as *const ObjectMetadata as usize);
}

#[test]
fn test_object_layout() {
    let meta = Node::metadata();
    assert_eq!(meta.kind(), EntityKind::Object);
    assert_eq!(meta.extent(), size_of::<Node>());

    let names: Vec<_> = meta.properties().iter().filter_map(|p| p.name()).collect();
    assert_eq!(names, ["label", "weight", "children", "parent"]);

    let weight = meta.property("weight").unwrap();
    assert_eq!(weight.offset(), offset_of!(Node, weight));
    assert!(!weight.is_optional());
    assert!(weight.metadata().is::<f32>());
    assert!(meta.property("parent").unwrap().is_optional());
    assert!(meta.property("missing").is_none());
}

#[test]
fn test_recursive_descriptor() {
    let meta = Node::metadata();
    let children = meta.property("children").unwrap().metadata();
    assert_eq!(children.kind(), EntityKind::Array);
    assert_eq!(children.insertion(), Some(InsertionStrategy::PushBack));
    assert!(std::ptr::eq(children.element_type().unwrap(), meta));

    let parent = meta.property("parent").unwrap().metadata();
    assert_eq!(parent.kind(), EntityKind::Object);

    let tree = Node {
        label: "root".into(),
        weight: 1.0,
        children: vec![Node {
            label: "leaf".into(),
            weight: 0.5,
            children: vec![],
            parent: None,
        }],
        parent: Some(Box::new(Node {
            label: "up".into(),
            ..Default::default()
        })),
    };
    let back: Node = from_msgpack(&to_msgpack(&tree).unwrap()).unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_field_access() {
    let meta = Device::metadata();
    let mut device = Device {
        rate: 44100,
        channels: 2,
    };

    let rate = meta.property("sample_rate").unwrap();
    let v = rate.get(&device).unwrap();
    assert_eq!(v.downcast_ref::<u32>(), Some(&44100));

    let ch = meta.property("channel_count").unwrap();
    *ch.get_mut(&mut device).unwrap().downcast_mut::<u8>().unwrap() = 6;
    assert_eq!(device.channels, 6);

    // Wrong owner type
    assert!(rate.get(&7u32).is_none());
}

#[test]
fn test_renamed_keys() {
    let device = Device {
        rate: 48000,
        channels: 2,
    };
    let value = to_json(&device).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"sample_rate": 48000, "channel_count": 2})
    );

    let back: Device = from_json(serde_json::json!({"sample_rate": 96000})).unwrap();
    assert_eq!(back.rate, 96000);
    assert_eq!(back.channels, 0);

    let err = from_json::<Device>(serde_json::json!({"channel_count": 1})).unwrap_err();
    assert!(matches!(err, Error::ReaderKeyMissing { ref key, .. } if key == "sample_rate"));
}

#[test]
fn test_builtin_descriptors() {
    let map = resolve::<BTreeMap<String, Vec<u8>>>();
    assert_eq!(map.kind(), EntityKind::Dictionary);
    assert_eq!(map.insertion(), Some(InsertionStrategy::SetInsert));
    let values = map.element_type().unwrap();
    assert_eq!(values.kind(), EntityKind::Array);
    assert!(std::ptr::eq(values, resolve::<Vec<u8>>()));

    assert_eq!(resolve::<Option<u16>>().kind(), EntityKind::Integer);
    assert_eq!(resolve::<Binary<Vec<f32>>>().kind(), EntityKind::Binary);
    assert_eq!(resolve::<[u8; 3]>().kind(), EntityKind::Tuple);
    assert_eq!(resolve::<(u8, String)>().properties().len(), 2);
}
