use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

fn field_equals(name: &'static str, expected: Val) -> Hook {
    Hook::new(move |stack, _, _| Ok(stack.field(0, name).is_some_and(|v| v == expected)))
}

fn never() -> Hook {
    Hook::new(|_, _, _| Ok(false))
}

fn counting(counter: &Arc<AtomicUsize>) -> Filter {
    let counter = Arc::clone(counter);
    Filter::func(move |v, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(v)
    })
}

#[test]
fn optional_field_follows_flag() {
    let schema = Schema::structure(vec![
        Field::new("Has", Schema::boolean()),
        Field::new("Value", Schema::uint(8)).when(field_equals("Has", Val::Bool(true))),
    ]);
    let c = codec(&schema);

    let present = record([("Has", Val::Bool(true)), ("Value", Val::Int(0xFF))]);
    let (bytes, back) = round_trip(&c, &present);
    assert_eq!(bytes, vec![0xFF, 0x80]);
    assert_eq!(back, present);

    let absent = record([("Has", Val::Bool(false))]);
    let (bytes, back) = round_trip(&c, &absent);
    assert_eq!(bytes, vec![0x00]);
    assert_eq!(back, absent);
}

#[test]
fn node_hook_guards_the_node() {
    let schema = Schema::structure(vec![
        Field::new("Mode", Schema::uint(8)),
        Field::new("Extra", Schema::uint(8).with_hook(field_equals("Mode", Val::Int(1)))),
    ]);
    let c = codec(&schema);
    assert_eq!(c.decode(&[0, 9]).expect("decode"), record([("Mode", Val::Int(0))]));
    assert_eq!(
        c.decode(&[1, 9]).expect("decode"),
        record([("Mode", Val::Int(1)), ("Extra", Val::Int(9))])
    );
}

#[test]
fn union_first_match_wins() {
    let b_runs = Arc::new(AtomicUsize::new(0));
    let type_a = Schema::uint(8);
    let type_b = Schema::uint(16).with_decode(counting(&b_runs)).with_encode(counting(&b_runs));
    let pred_a = Hook::new(|_, _, _| Ok(true));

    let c = codec(&Schema::union(vec![
        Clause::when(pred_a.clone(), type_a.clone()),
        Clause::always(type_b.clone()),
    ]));
    assert_eq!(c.decode(&[0x12, 0x34]).expect("decode"), Val::Int(0x12));
    assert_eq!(c.encode(&Val::Int(0x12)).expect("encode"), vec![0x12]);
    assert_eq!(b_runs.load(Ordering::SeqCst), 0);

    let swapped = codec(&Schema::union(vec![Clause::always(type_b), Clause::when(pred_a, type_a)]));
    assert_eq!(swapped.decode(&[0x12, 0x34]).expect("decode"), Val::Int(0x1234));
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn union_discriminated_by_sibling_tag() {
    let schema = Schema::structure(vec![
        Field::new("Kind", Schema::uint(8)),
        Field::new(
            "Body",
            Schema::union(vec![
                Clause::when(
                    field_equals("Kind", Val::Int(1)),
                    Schema::structure(vec![Field::new("a", Schema::uint(8))]),
                ),
                Clause::when(field_equals("Kind", Val::Int(2)), Schema::string(8)),
            ]),
        ),
    ]);
    let c = codec(&schema);

    let first = record([("Kind", Val::Int(1)), ("Body", record([("a", Val::Int(7))]))]);
    let (bytes, back) = round_trip(&c, &first);
    assert_eq!(bytes, vec![1, 7]);
    assert_eq!(back, first);

    let second = record([("Kind", Val::Int(2)), ("Body", Val::from("ok"))]);
    let (bytes, back) = round_trip(&c, &second);
    assert_eq!(bytes, vec![2, 2, b'o', b'k']);
    assert_eq!(back, second);

    // No clause matches: the body is skipped entirely.
    assert_eq!(c.decode(&[3, 0xAA]).expect("decode"), record([("Kind", Val::Int(3))]));
}

#[test]
fn union_without_match_reads_nothing() {
    let c = codec(&Schema::union(vec![Clause::when(never(), Schema::uint(8))]));
    assert_eq!(c.decode(&[]).expect("decode"), Val::Nil);
    assert!(c.encode(&Val::Int(1)).expect("encode").is_empty());
}

#[test]
fn published_values_drive_later_clauses() {
    let tag_is_one = Hook::new(|_, scratch, _| Ok(scratch.get("tag").is_some_and(|v| *v == Val::Int(1))));
    let schema = Schema::structure(vec![
        Field::new("Header", Schema::structure(vec![Field::new("Tag", Schema::uint(8)).publish("tag")])),
        Field::new(
            "Payload",
            Schema::union(vec![Clause::when(tag_is_one, Schema::uint(8)), Clause::always(Schema::uint(16))]),
        ),
    ]);
    let c = codec(&schema);
    assert_eq!(
        c.decode(&[1, 0xAB, 0xCD]).expect("decode"),
        record([("Header", record([("Tag", Val::Int(1))])), ("Payload", Val::Int(0xAB))])
    );
    assert_eq!(
        c.decode(&[2, 0xAB, 0xCD]).expect("decode"),
        record([("Header", record([("Tag", Val::Int(2))])), ("Payload", Val::Int(0xABCD))])
    );
}

#[test]
fn node_publish_copies_containers() {
    let seen = Arc::new(Mutex::new(Val::Nil));
    let sink = Arc::clone(&seen);
    let schema = Schema::structure(vec![
        Field::new("Inner", Schema::structure(vec![Field::new("x", Schema::uint(8))]).with_publish("inner")),
        Field::new("After", Schema::uint(8)).when(Hook::new(move |_, scratch, _| {
            *sink.lock().expect("lock") = scratch.get("inner").cloned().unwrap_or_default();
            Ok(true)
        })),
    ]);
    codec(&schema).decode(&[5, 6]).expect("decode");
    assert_eq!(*seen.lock().expect("lock"), record([("x", Val::Int(5))]));
}

#[test]
fn matched_flag_is_shared_within_a_scope() {
    let flags = Arc::new(Mutex::new(Vec::new()));
    let recorder = |flags: &Arc<Mutex<Vec<bool>>>| {
        let flags = Arc::clone(flags);
        Hook::new(move |_, _, unmatched| {
            flags.lock().expect("lock").push(unmatched);
            Ok(true)
        })
    };
    let schema = Schema::structure(vec![
        Field::new("A", Schema::uint(8)).when(recorder(&flags)),
        Field::new("B", Schema::uint(8)).when(recorder(&flags)),
        // A nested union opens a fresh scope.
        Field::new("C", Schema::union(vec![Clause::when(recorder(&flags), Schema::uint(8))])),
    ]);
    codec(&schema).decode(&[1, 2, 3]).expect("decode");
    assert_eq!(*flags.lock().expect("lock"), vec![true, false, true]);
}

#[test]
fn stack_view_levels() {
    let levels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&levels);
    let probe = Hook::new(move |stack, _, _| {
        sink.lock().expect("lock").push((
            stack.level(0).map(Val::type_name),
            stack.level(1).map(Val::type_name),
            stack.level(2).map(Val::type_name),
            stack.depth(),
        ));
        Ok(true)
    });
    let schema = Schema::structure(vec![Field::new(
        "Items",
        Schema::array(1, Schema::uint(8).with_hook(probe)),
    )]);
    codec(&schema).decode(&[4]).expect("decode");
    assert_eq!(*levels.lock().expect("lock"), vec![(Some("List"), Some("Map"), None, 2)]);
}

#[test]
fn hook_errors_halt_the_run() {
    let schema = Schema::structure(vec![Field::new("A", Schema::uint(8)).when(Hook::new(|_, _, _| {
        anyhow::bail!("predicate exploded")
    }))]);
    let err = codec(&schema).decode(&[1]).expect_err("hook error");
    assert_eq!(format!("{err:#}"), "at [\"A\"]: predicate exploded");
}
