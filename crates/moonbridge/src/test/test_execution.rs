use super::{method, sink_state, state, TestActor};
use crate::error::BridgeError;
use crate::value::ScriptValue;

#[test]
fn run_code_returns_values() {
    let st = state();
    let out = st.run_code("return 1 + 1", "chunk").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(2)]);

    let out = st.run_code("return 1, 'two', true", "chunk").unwrap();
    assert_eq!(
        out,
        vec![
            ScriptValue::Integer(1),
            ScriptValue::from("two"),
            ScriptValue::Bool(true),
        ]
    );

    assert!(st.run_code("x = 1", "chunk").unwrap().is_empty());
}

#[test]
fn globals_roundtrip() {
    let st = state();
    st.set_global("answer", &ScriptValue::Integer(21));
    let out = st.run_code("return answer * 2", "chunk").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(42)]);

    st.run_code("flag = true", "chunk").unwrap();
    assert_eq!(st.get_global("flag"), ScriptValue::Bool(true));
    assert!(st.get_global("no_such_global").is_nil());
}

#[test]
fn compile_failure_is_reported_and_not_executed() {
    let (st, log) = sink_state();
    let err = st.run_code("return +", "broken").unwrap_err();
    assert!(matches!(err, BridgeError::Compile { .. }));
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn runtime_failure_is_reported_with_position() {
    let (st, log) = sink_state();
    let err = st.run_code("local x = 1\nerror('kaput')", "job").unwrap_err();
    match err {
        BridgeError::Runtime(message) => assert!(message.contains("job:2: kaput")),
        other => panic!("unexpected error: {:?}", other),
    }
    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("script error:"));
}

#[test]
fn pcall_reports_and_call_propagates_silently() {
    let (st, log) = sink_state();
    let add = st
        .run_code("return function(a, b) return a + b end", "lib")
        .unwrap()
        .remove(0);
    let out = st
        .pcall(&add, vec![ScriptValue::Integer(1), ScriptValue::Integer(2)])
        .unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(3)]);

    let fail = st
        .run_code("return function() error('no') end", "lib")
        .unwrap()
        .remove(0);
    assert!(st.pcall(&fail, Vec::new()).is_err());
    assert_eq!(log.lock().len(), 1);

    // The unprotected form leaves reporting to the caller's outer frame.
    assert!(st.call(&fail, Vec::new()).is_err());
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn bytecode_roundtrip() {
    let st = state();
    let bytes = st.to_bytecode("return 6 * 7", "bc").unwrap();
    let out = st.run_bytes(&bytes, "bc").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(42)]);
}

#[test]
fn run_bytes_takes_plain_source_too() {
    let st = state();
    let out = st.run_bytes(b"return 5", "plain").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(5)]);
}

#[test]
fn truncated_bytecode_is_rejected() {
    let (st, log) = sink_state();
    let mut bytes = st.to_bytecode("return 1", "bc").unwrap();
    bytes.truncate(6);
    let err = st.run_bytes(&bytes, "bc").unwrap_err();
    assert!(matches!(err, BridgeError::Compile { .. }));
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn nested_errors_drain_in_raise_order_at_depth_zero() {
    let (st, log) = sink_state();
    let actor = TestActor::new();
    let inner_state = st.clone();
    let inner_log = log.clone();
    actor.add_method(method("reenter", Vec::new(), false, move |_, _| {
        // Inside the outer chunk's frame.
        assert_eq!(inner_state.inception_level(), 1);
        let _ = inner_state.run_code("error('inner fault')", "nested");
        inner_state.report_error("deferred note");
        // Nothing reaches the sink until the outermost frame unwinds.
        assert!(inner_log.lock().is_empty());
        Ok(None)
    }));
    st.set_global("obj", &ScriptValue::object(&actor.as_host()));

    let out = st.run_code("return obj.reenter()", "outer").unwrap();
    assert_eq!(out, vec![ScriptValue::Nil]);
    assert_eq!(st.inception_level(), 0);

    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert!(log[0].contains("nested:1: inner fault"));
    assert_eq!(log[1], "deferred note");
}

#[test]
fn report_error_at_depth_zero_delivers_immediately() {
    let (st, log) = sink_state();
    st.report_error("direct");
    assert_eq!(log.lock().as_slice(), ["direct".to_string()]);
}
