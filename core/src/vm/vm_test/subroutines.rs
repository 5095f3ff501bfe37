use super::*;

fn header(shared: &Schema) -> Schema {
    Schema::structure(vec![
        Field::new("Src", shared.clone()),
        Field::new("Dst", shared.clone()),
        Field::new("Via", shared.clone()),
    ])
}

fn address() -> Schema {
    Schema::structure(vec![
        Field::new("Port", Schema::uint(16)),
        Field::new("Tags", Schema::array_prefixed(Schema::uint(4), Schema::uint(4))),
    ])
}

fn sample() -> Val {
    let addr = |port: i64, tags: Vec<i64>| record([("Port", Val::Int(port)), ("Tags", Val::from(tags))]);
    record([
        ("Src", addr(80, vec![1, 2])),
        ("Dst", addr(443, vec![])),
        ("Via", addr(8080, vec![15])),
    ])
}

#[test]
fn sharing_is_observably_transparent() {
    let shared = codec(&header(&address()));
    let inline = codec(&Schema::structure(vec![
        Field::new("Src", address()),
        Field::new("Dst", address()),
        Field::new("Via", address()),
    ]));
    assert_eq!(shared.programs().subroutines, 1);
    assert_eq!(inline.programs().subroutines, 0);

    let value = sample();
    let shared_bytes = shared.encode(&value).expect("encode shared");
    let inline_bytes = inline.encode(&value).expect("encode inline");
    assert_eq!(shared_bytes, inline_bytes);
    assert_eq!(shared.decode(&shared_bytes).expect("decode"), value);
    assert_eq!(inline.decode(&inline_bytes).expect("decode"), value);
}

#[test]
fn nested_subroutines_call_each_other() {
    let nibble = Schema::uint(4);
    let pair = Schema::structure(vec![Field::new("a", nibble.clone()), Field::new("b", nibble)]);
    let schema = Schema::structure(vec![Field::new("x", pair.clone()), Field::new("y", pair)]);
    let c = codec(&schema);
    assert_eq!(c.programs().subroutines, 2);

    let value = record([
        ("x", record([("a", Val::Int(1)), ("b", Val::Int(2))])),
        ("y", record([("a", Val::Int(3)), ("b", Val::Int(4))])),
    ]);
    let (bytes, back) = round_trip(&c, &value);
    assert_eq!(bytes, vec![0x12, 0x34]);
    assert_eq!(back, value);
}

#[test]
fn errors_inside_subroutines_keep_the_caller_path() {
    let c = codec(&header(&address()));
    let err = c.decode(&[0, 80, 0x00, 1]).expect_err("truncated");
    assert_eq!(err.to_string(), "at [\"Dst\"][\"Port\"]");
}

#[test]
fn shared_element_inside_loop() {
    let item = Schema::uint(8).with_decode(Filter::func(|v, _| Ok(Val::Int(v.as_number().unwrap_or(0.0) as i64 + 1))));
    let schema = Schema::structure(vec![
        Field::new("First", item.clone()),
        Field::new("Rest", Schema::array(2, item)),
    ]);
    assert_eq!(
        codec(&schema).decode(&[1, 2, 3]).expect("decode"),
        record([("First", Val::Int(2)), ("Rest", Val::from(vec![3i64, 4]))])
    );
}
