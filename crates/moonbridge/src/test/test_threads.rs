use super::{sink_state, state};
use crate::error::BridgeError;
use crate::value::{ScriptValue, ThreadStatus};

#[test]
fn thread_lifecycle() {
    let st = state();
    let body = st
        .run_code(
            "return function(a) local b = coroutine.yield(a + 1) return b * 2 end",
            "co",
        )
        .unwrap()
        .remove(0);
    let thread = st.create_thread(&body).unwrap();
    assert_eq!(st.thread_status(&thread), ThreadStatus::Ok);

    let out = st.resume(&thread, vec![ScriptValue::Integer(3)]).unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(4)]);
    assert_eq!(st.thread_status(&thread), ThreadStatus::Suspended);

    let out = st.resume(&thread, vec![ScriptValue::Integer(10)]).unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(20)]);
    assert_eq!(st.thread_status(&thread), ThreadStatus::Ok);

    // Finished threads do not restart.
    assert!(st.resume(&thread, Vec::new()).is_err());
}

#[test]
fn thread_error_status_is_terminal() {
    let (st, log) = sink_state();
    let body = st
        .run_code("return function() error('boom') end", "co")
        .unwrap()
        .remove(0);
    let thread = st.create_thread(&body).unwrap();

    let err = st.resume(&thread, Vec::new()).unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert_eq!(st.thread_status(&thread), ThreadStatus::Error);
    assert!(!log.lock().is_empty());

    assert!(st.resume(&thread, Vec::new()).is_err());
    assert_eq!(st.thread_status(&thread), ThreadStatus::Error);
}

#[test]
fn yields_carry_multiple_values() {
    let st = state();
    let body = st
        .run_code("return function() coroutine.yield(1, 'a') return true end", "co")
        .unwrap()
        .remove(0);
    let thread = st.create_thread(&body).unwrap();
    let out = st.resume(&thread, Vec::new()).unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(1), ScriptValue::from("a")]);
    let out = st.resume(&thread, Vec::new()).unwrap();
    assert_eq!(out, vec![ScriptValue::Bool(true)]);
}

#[test]
fn non_threads_report_invalid_status() {
    let st = state();
    assert_eq!(st.thread_status(&ScriptValue::Integer(1)), ThreadStatus::Invalid);
    assert_eq!(st.thread_status(&ScriptValue::Nil), ThreadStatus::Invalid);
    let table = st.create_table();
    assert_eq!(st.thread_status(&table), ThreadStatus::Invalid);
}

#[test]
fn create_thread_requires_a_function() {
    let st = state();
    let err = st.create_thread(&ScriptValue::Integer(3)).unwrap_err();
    assert!(matches!(err, BridgeError::Mismatch { to: "function", .. }));
}

#[test]
fn resume_requires_a_thread() {
    let st = state();
    let table = st.create_table();
    let err = st.resume(&table, Vec::new()).unwrap_err();
    assert!(matches!(err, BridgeError::Mismatch { to: "thread", .. }));
}
