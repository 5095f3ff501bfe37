use super::*;

#[test]
fn truncated_input_reports_field_path() {
    let schema = Schema::structure(vec![Field::new(
        "A",
        Schema::structure(vec![Field::new("B", Schema::uint(32))]),
    )]);
    let err = codec(&schema).decode(&[0, 0]).expect_err("truncated");
    assert_eq!(err.to_string(), "at [\"A\"][\"B\"]");
    assert_eq!(err.root_cause().to_string(), "end of buffer");
    assert_eq!(format!("{err:#}"), "at [\"A\"][\"B\"]: end of buffer");
}

#[test]
fn path_includes_array_indices() {
    let schema = Schema::structure(vec![Field::new(
        "Items",
        Schema::array(3, Schema::structure(vec![Field::new("v", Schema::uint(8))])),
    )]);
    let err = codec(&schema).decode(&[1, 2]).expect_err("truncated");
    assert_eq!(err.to_string(), "at [\"Items\"][2][\"v\"]");
}

#[test]
fn path_skips_union_scopes() {
    let schema = Schema::structure(vec![Field::new(
        "Body",
        Schema::union(vec![Clause::always(Schema::structure(vec![Field::new("x", Schema::uint(16))]))]),
    )]);
    let err = codec(&schema).decode(&[1]).expect_err("truncated");
    assert_eq!(err.to_string(), "at [\"Body\"][\"x\"]");
}

#[test]
fn encode_errors_carry_the_path() {
    let schema = Schema::structure(vec![Field::new("Flags", Schema::array(2, Schema::boolean()))]);
    let value = record([("Flags", Val::from(vec![Val::Bool(true), Val::from("no")]))]);
    let err = codec(&schema).encode(&value).expect_err("mismatch");
    assert_eq!(format!("{err:#}"), "at [\"Flags\"][1]: expected Bool, got String");
}

#[test]
fn container_shape_is_checked_on_encode() {
    let schema = Schema::structure(vec![Field::new("Items", Schema::array(1, Schema::byte()))]);
    let err = codec(&schema)
        .encode(&record([("Items", Val::Int(3))]))
        .expect_err("mismatch");
    assert_eq!(format!("{err:#}"), "at [\"Items\"]: expected List, got Int");
}

#[test]
fn encode_keeps_bits_written_before_the_failure() {
    let schema = Schema::structure(vec![Field::new("A", Schema::uint(8)), Field::new("B", Schema::boolean())]);
    let c = codec(&schema);
    let mut buf = BitBuf::new();
    let value = record([("A", Val::Int(1)), ("B", Val::Int(5))]);
    assert!(c.encode_into(&value, &mut buf).is_err());
    assert_eq!(buf.as_bytes(), &[1]);
}

#[test]
fn filter_errors_halt_the_run() {
    let schema = Schema::structure(vec![Field::new(
        "N",
        Schema::uint(8).with_decode(Filter::func(|v, _| anyhow::bail!("rejected {v}"))),
    )]);
    let err = codec(&schema).decode(&[9]).expect_err("filter");
    assert_eq!(format!("{err:#}"), "at [\"N\"]: rejected 9");
}

#[test]
fn loop_bounds_can_be_capped() {
    let schema = Schema::structure(vec![
        Field::new("Count", Schema::uint(8)),
        Field::new("Items", Schema::vector("Count", Schema::byte())),
    ]);
    let c = Compiler::new()
        .with_options(CodecOptions::default().with_max_iterations(4))
        .compile(&schema)
        .expect("compile");
    assert!(c.decode(&[4, 1, 2, 3, 4]).is_ok());
    let err = c.decode(&[200]).expect_err("capped");
    assert_eq!(format!("{err:#}"), "at [\"Items\"]: loop bound 200 exceeds the limit of 4 iterations");
}

#[test]
fn frame_depth_is_capped() {
    let nested = |depth: usize| {
        (0..depth).fold(Schema::uint(8), |inner, _| Schema::structure(vec![Field::new("n", inner)]))
    };
    let options = CodecOptions::default().with_max_depth(3);
    let compiler = Compiler::new().with_options(options);

    let ok = compiler.compile(&nested(2)).expect("compile");
    assert!(ok.decode(&[1]).is_ok());

    let deep = compiler.compile(&nested(3)).expect("compile");
    let err = deep.decode(&[1]).expect_err("too deep");
    assert!(err.root_cause().to_string().contains("maximum depth of 3"), "{err:#}");
}

#[test]
fn decode_from_leaves_cursor_after_value() {
    let c = codec(&Schema::structure(vec![Field::new("x", Schema::uint(4))]));
    let mut buf = BitBuf::from_bytes(&[0x5A]);
    assert_eq!(c.decode_from(&mut buf).expect("first"), record([("x", Val::Int(5))]));
    assert_eq!(buf.index(), 4);
    assert_eq!(c.decode_from(&mut buf).expect("second"), record([("x", Val::Int(10))]));
    assert!(c.decode_from(&mut buf).is_err());
}

#[test]
fn oversized_string_prefix_fails_cleanly() {
    let c = codec(&Schema::string(64));
    let err = c.decode(&[0x40, 0, 0, 0, 0, 0, 0, 0]).expect_err("truncated");
    assert_eq!(err.to_string(), "end of buffer");
    let err = c.decode(&[0xFF; 8]).expect_err("truncated");
    assert_eq!(err.root_cause().to_string(), "end of buffer");

    let schema = Schema::structure(vec![Field::new("Name", Schema::string(16))]);
    let err = codec(&schema).decode(&[0xFF, 0xFF, b'a']).expect_err("truncated");
    assert_eq!(format!("{err:#}"), "at [\"Name\"]: end of buffer");
}

#[test]
fn oversized_array_bound_without_limit_fails_on_first_element() {
    let c = codec(&Schema::array_prefixed(Schema::uint(64), Schema::uint(8)));
    for bytes in [[0x10, 0, 0, 0, 0, 0, 0, 0], [0xFF; 8]] {
        let err = c.decode(&bytes).expect_err("truncated");
        assert_eq!(format!("{err:#}"), "at [0]: end of buffer");
    }
}
