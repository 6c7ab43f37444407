use super::{method, sink_state, state, TestActor};
use crate::host::FieldValue;
use crate::state::ScriptState;
use crate::value::ScriptValue;

use std::sync::Arc;

fn bind(st: &ScriptState, actor: &Arc<TestActor>) {
    st.set_global("obj", &ScriptValue::object(&actor.as_host()));
}

#[test]
fn override_entry_beats_typed_field() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    // `tagged` exists as a typed field too; the override table wins.
    let out = st.run_code("return obj.tagged", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("override")]);
}

#[test]
fn typed_field_reads() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    let out = st
        .run_code(
            "return obj.name, obj.health, obj.shielded, obj.speed, obj.stance",
            "t",
        )
        .unwrap();
    assert_eq!(
        out,
        vec![
            ScriptValue::from("actor"),
            ScriptValue::Integer(100),
            ScriptValue::Bool(false),
            ScriptValue::Number(1.5),
            ScriptValue::from("Idle"),
        ]
    );
}

#[test]
fn typed_field_beats_bound_method() {
    let st = state();
    let actor = TestActor::new();
    actor.add_method(method("name", Vec::new(), true, |_, _| {
        Ok(Some(FieldValue::String("shadowed".to_string())))
    }));
    bind(&st, &actor);
    let out = st.run_code("return obj.name", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("actor")]);
}

#[test]
fn unknown_key_reads_nil() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    let out = st.run_code("return obj.missing == nil", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Bool(true)]);
}

#[test]
fn method_call_with_implicit_self() {
    let st = state();
    let actor = TestActor::new();
    let target = actor.clone();
    actor.add_method(method(
        "heal",
        vec![crate::host::FieldKind::Integer],
        true,
        move |_, args| {
            let amount = match args.first() {
                Some(FieldValue::Integer(i)) => *i,
                _ => return Err("missing amount".to_string()),
            };
            let mut health = target.health.lock();
            *health += amount;
            Ok(Some(FieldValue::Integer(*health)))
        },
    ));
    bind(&st, &actor);

    let out = st.run_code("return obj:heal(5)", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(105)]);

    // Dot-call works the same; no receiver to strip.
    let out = st.run_code("return obj.heal(5)", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(110)]);

    // Surplus arguments past the declared parameters are dropped.
    let out = st.run_code("return obj:heal(1, 'junk')", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(111)]);
}

#[test]
fn method_argument_mismatch_aborts_the_call() {
    let st = state();
    let actor = TestActor::new();
    actor.add_method(method(
        "heal",
        vec![crate::host::FieldKind::Integer],
        true,
        |_, _| Ok(None),
    ));
    bind(&st, &actor);
    let err = st.run_code("return obj:heal('x')", "t").unwrap_err();
    assert!(err.to_string().contains("bad argument #1 to 'heal'"));
}

#[test]
fn method_error_result_becomes_a_script_error() {
    let st = state();
    let actor = TestActor::new();
    actor.add_method(method("explode", Vec::new(), true, |_, _| {
        Err("boom".to_string())
    }));
    bind(&st, &actor);
    let err = st.run_code("return obj:explode()", "t").unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[test]
fn typed_field_writes_reach_the_host() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    st.run_code("obj.health = 42 obj.name = 'renamed' obj.stance = 'Alert'", "t")
        .unwrap();
    assert_eq!(*actor.health.lock(), 42);
    assert_eq!(actor.name.lock().as_str(), "renamed");
    assert_eq!(actor.stance.lock().as_str(), "Alert");
}

#[test]
fn integer_field_accepts_integral_float() {
    let (st, log) = sink_state();
    let actor = TestActor::new();
    bind(&st, &actor);
    st.run_code("obj.health = 2.0", "t").unwrap();
    assert_eq!(*actor.health.lock(), 2);
    assert!(log.lock().is_empty());
}

#[test]
fn read_only_write_is_reported_and_dropped() {
    let (st, log) = sink_state();
    let actor = TestActor::new();
    bind(&st, &actor);
    st.run_code("obj.rank = 3", "t").unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("read-only field 'rank'"));
    drop(log);

    // The typed value still shows through; nothing shadowed it.
    let out = st.run_code("return obj.rank", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(7)]);
}

#[test]
fn mismatched_write_leaves_field_and_shadows_with_override() {
    let (st, log) = sink_state();
    let actor = TestActor::new();
    bind(&st, &actor);
    st.run_code("obj.shielded = 'yes'", "t").unwrap();

    assert!(!*actor.shielded.lock());
    {
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("cannot convert string to bool"));
    }

    // The rejected value landed in the override table instead.
    let out = st.run_code("return obj.shielded", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("yes")]);
}

#[test]
fn expired_object_reads_nil_and_refuses_calls() {
    let st = state();
    let actor = TestActor::new();
    actor.add_method(method("heal", Vec::new(), true, |_, _| Ok(None)));
    bind(&st, &actor);
    st.run_code("keep = obj.heal", "t").unwrap();

    drop(actor);
    let out = st.run_code("return obj.health", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Nil]);

    let err = st.run_code("return keep()", "t").unwrap_err();
    assert!(err.to_string().contains("expired"));
}

#[test]
fn host_side_call_on_expired_object_fails_fast() {
    let st = state();
    let actor = TestActor::new();
    let value = ScriptValue::object(&actor.as_host());
    drop(actor);
    let err = st.pcall(&value, Vec::new()).unwrap_err();
    assert!(matches!(err, crate::error::BridgeError::Expired));
}

#[test]
fn bridged_equality_is_host_identity() {
    let st = state();
    let actor = TestActor::new();
    let other = TestActor::new();
    st.set_global("a", &ScriptValue::object(&actor.as_host()));
    st.set_global("b", &ScriptValue::object(&actor.as_host()));
    st.set_global("c", &ScriptValue::object(&other.as_host()));

    let out = st.run_code("return a == b, a == c", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Bool(true), ScriptValue::Bool(false)]);

    drop(actor);
    let out = st.run_code("return a == b", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Bool(false)]);
}

#[test]
fn tostring_names_the_host_type() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    let out = st.run_code("return tostring(obj)", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("TestActor: bridged")]);

    drop(actor);
    let out = st.run_code("return tostring(obj)", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("<expired host object>")]);
}

#[test]
fn pulled_object_survives_the_round_trip() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);
    let pulled = st.get_global("obj");
    let host = pulled.as_object().unwrap().resolve().unwrap();
    assert_eq!(host.type_name(), "TestActor");
    assert_eq!(pulled, ScriptValue::object(&actor.as_host()));
}

#[test]
fn extend_user_metatable_skips_dispatch_hooks() {
    let st = state();
    let actor = TestActor::new();
    bind(&st, &actor);

    let ext = st.create_table();
    st.set_index(&ext, &ScriptValue::from("version"), &ScriptValue::Integer(3))
        .unwrap();
    st.set_index(&ext, &ScriptValue::from("__index"), &ScriptValue::Bool(false))
        .unwrap();
    st.extend_user_metatable(&ext).unwrap();

    let out = st.run_code("return getmetatable(obj).version", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(3)]);
    // Dispatch stayed intact.
    let out = st.run_code("return obj.tagged", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::from("override")]);
}
