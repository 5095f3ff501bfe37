use std::collections::BTreeMap;

use anyhow::{Result, bail};

use super::*;
use crate::host::HostObject;

#[test]
fn nested_structs_round_trip() {
    let point = Schema::structure(vec![Field::new("x", Schema::int(8)), Field::new("y", Schema::int(8))]);
    let schema = Schema::structure(vec![Field::new("from", point.clone()), Field::new("to", point)]);
    let value = record([
        ("from", record([("x", Val::Int(-1)), ("y", Val::Int(2))])),
        ("to", record([("x", Val::Int(3)), ("y", Val::Int(-4))])),
    ]);
    let (bytes, back) = round_trip(&codec(&schema), &value);
    assert_eq!(bytes, vec![0xFF, 0x02, 0x03, 0xFC]);
    assert_eq!(back, value);
}

#[test]
fn constant_length_array() {
    let c = codec(&Schema::array(3, Schema::uint(8)));
    assert_eq!(c.decode(&[1, 2, 3, 4]).expect("decode"), Val::from(vec![1i64, 2, 3]));
    // Missing elements encode as zero, extra ones are ignored.
    assert_eq!(c.encode(&Val::from(vec![7i64])).expect("encode"), vec![7, 0, 0]);
    assert_eq!(c.encode(&Val::from(vec![1i64, 2, 3, 4])).expect("encode"), vec![1, 2, 3]);
}

#[test]
fn zero_length_array_reads_nothing() {
    let c = codec(&Schema::array(0, Schema::uint(8)));
    assert_eq!(c.decode(&[]).expect("decode"), Val::empty_list());
    assert!(c.encode(&Val::Nil).expect("encode").is_empty());
}

#[test]
fn length_prefixed_array() {
    let c = codec(&Schema::array_prefixed(Schema::uint(8), Schema::uint(8)));
    let value = Val::from(vec![1i64, 2, 3]);
    let (bytes, back) = round_trip(&c, &value);
    assert_eq!(bytes, vec![3, 1, 2, 3]);
    assert_eq!(back, value);
}

#[test]
fn vector_sized_by_sibling() {
    let schema = Schema::structure(vec![
        Field::new("Count", Schema::uint(8)),
        Field::new("Items", Schema::vector("Count", Schema::byte())),
    ]);
    let c = codec(&schema);
    let value = record([("Count", Val::Int(3)), ("Items", Val::from(vec![10i64, 20, 30]))]);
    let (bytes, back) = round_trip(&c, &value);
    assert_eq!(bytes, vec![3, 10, 20, 30]);
    assert_eq!(back, value);

    let empty = c.decode(&[0, 99, 99]).expect("decode");
    assert_eq!(empty, record([("Count", Val::Int(0)), ("Items", Val::empty_list())]));
}

#[test]
fn vector_shorter_than_count_pads_with_zero() {
    let schema = Schema::structure(vec![
        Field::new("Count", Schema::uint(8)),
        Field::new("Items", Schema::vector("Count", Schema::byte())),
    ]);
    let value = record([("Count", Val::Int(2)), ("Items", Val::from(vec![5i64]))]);
    assert_eq!(codec(&schema).encode(&value).expect("encode"), vec![2, 5, 0]);
}

#[test]
fn vector_with_missing_length_field_is_empty() {
    let schema = Schema::structure(vec![
        Field::new("Label", Schema::string(8)),
        Field::new("Items", Schema::vector("Count", Schema::byte())),
    ]);
    let decoded = codec(&schema).decode(&[1, b'a', 7]).expect("decode");
    assert_eq!(decoded, record([("Label", Val::from("a")), ("Items", Val::empty_list())]));
}

#[test]
fn vector_sized_by_distant_ancestor() {
    // Levels from the cells list: 0 cells, 1 row, 2 rows list, 3 outer struct.
    let row = Schema::structure(vec![Field::new("Cells", Schema::vector_at("Width", 3, Schema::uint(4)))]);
    let schema = Schema::structure(vec![
        Field::new("Width", Schema::uint(8)),
        Field::new("Rows", Schema::array(2, row)),
    ]);
    let value = record([
        ("Width", Val::Int(2)),
        (
            "Rows",
            Val::from(vec![
                record([("Cells", Val::from(vec![1i64, 2]))]),
                record([("Cells", Val::from(vec![3i64, 4]))]),
            ]),
        ),
    ]);
    let (bytes, back) = round_trip(&codec(&schema), &value);
    assert_eq!(bytes, vec![2, 0x12, 0x34]);
    assert_eq!(back, value);
}

#[test]
fn arrays_of_structs() {
    let entry = Schema::structure(vec![Field::new("id", Schema::uint(4)), Field::new("on", Schema::boolean())]);
    let schema = Schema::array_prefixed(Schema::uint(4), entry);
    let value = Val::from(vec![
        record([("id", Val::Int(1)), ("on", Val::Bool(true))]),
        record([("id", Val::Int(2)), ("on", Val::Bool(false))]),
    ]);
    let (bytes, back) = round_trip(&codec(&schema), &value);
    // 0010 0001 1 0010 0, fourteen bits
    assert_eq!(bytes, vec![0x21, 0x90]);
    assert_eq!(back, value);
}

#[derive(Debug, Clone, Default)]
struct Point {
    props: BTreeMap<String, Val>,
}

impl HostObject for Point {
    fn class_name(&self) -> &str {
        "Point"
    }

    fn get(&self, key: &str) -> Option<Val> {
        self.props.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Val) -> Result<()> {
        self.props.insert(key.to_string(), value);
        Ok(())
    }

    fn properties(&self) -> Vec<(Arc<str>, Val)> {
        self.props.iter().map(|(k, v)| (Arc::from(k.as_str()), v.clone())).collect()
    }

    fn duplicate(&self) -> Box<dyn HostObject> {
        Box::new(self.clone())
    }
}

fn points(class: &str) -> Result<Arc<dyn HostObject>> {
    match class {
        "Point" => Ok(Arc::new(Point::default())),
        other => bail!("unknown class {other}"),
    }
}

fn point(x: i64, y: i64) -> Val {
    let mut p = Point::default();
    p.props.insert("x".into(), Val::Int(x));
    p.props.insert("y".into(), Val::Int(y));
    Val::Host(Arc::new(p))
}

fn host_codec() -> Codec {
    let schema = Schema::host("Point", vec![Field::new("x", Schema::int(8)), Field::new("y", Schema::int(8))]);
    Compiler::new().with_host_factory(points).compile(&schema).expect("compile")
}

#[test]
fn host_objects_decode_through_factory() {
    let c = host_codec();
    let value = c.decode(&[3, 0xFC]).expect("decode");
    match &value {
        Val::Host(obj) => assert_eq!(obj.class_name(), "Point"),
        other => panic!("expected host object, got {other}"),
    }
    assert_eq!(value, point(3, -4));
    assert_eq!(c.encode(&value).expect("encode"), vec![3, 0xFC]);
}

#[test]
fn absent_host_object_uses_fresh_instance() {
    assert_eq!(host_codec().encode(&Val::Nil).expect("encode"), vec![0, 0]);
}

#[test]
fn host_slot_rejects_plain_maps() {
    let err = host_codec()
        .encode(&record([("x", Val::Int(1))]))
        .expect_err("mismatch");
    assert_eq!(err.to_string(), "expected Point, got Map");
}

#[test]
fn unknown_host_class_fails_at_run_time() {
    let schema = Schema::host("Circle", vec![Field::new("r", Schema::uint(8))]);
    let c = Compiler::new().with_host_factory(points).compile(&schema).expect("compile");
    let err = c.decode(&[1]).expect_err("unknown class");
    assert!(err.to_string().contains("unknown class Circle"));
}
