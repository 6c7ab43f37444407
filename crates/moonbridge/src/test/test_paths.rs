use super::state;
use crate::convert::PathRoot;
use crate::error::BridgeError;
use crate::value::ScriptValue;

#[test]
fn get_dotted_path_from_globals() {
    let st = state();
    st.run_code("config = { net = { port = 8080, host = 'local' } }", "t")
        .unwrap();
    let out = st.get_field("config.net.port", PathRoot::Global).unwrap();
    assert_eq!(out, ScriptValue::Integer(8080));
    let out = st.get_field("config.net.host", PathRoot::Global).unwrap();
    assert_eq!(out, ScriptValue::from("local"));
    // A one-segment path reads the root table directly.
    assert!(matches!(
        st.get_field("config", PathRoot::Global).unwrap(),
        ScriptValue::Table(_)
    ));
}

#[test]
fn missing_segment_is_path_not_found() {
    let st = state();
    st.run_code("config = { net = { port = 8080 } }", "t").unwrap();
    let err = st.get_field("config.dns.host", PathRoot::Global).unwrap_err();
    match err {
        BridgeError::PathNotFound { path, segment } => {
            assert_eq!(path, "config.dns.host");
            assert_eq!(segment, "host");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn non_indexable_leaf_is_path_not_found_not_mismatch() {
    let st = state();
    st.run_code("config = { port = 1 }", "t").unwrap();
    let err = st.get_field("config.port.deep", PathRoot::Global).unwrap_err();
    assert!(matches!(err, BridgeError::PathNotFound { .. }));
}

#[test]
fn set_dotted_path() {
    let st = state();
    st.run_code("config = { net = { port = 8080 } }", "t").unwrap();
    st.set_field("config.net.port", PathRoot::Global, &ScriptValue::Integer(9090))
        .unwrap();
    let out = st.run_code("return config.net.port", "t").unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(9090)]);
}

#[test]
fn broken_set_path_writes_nothing() {
    let st = state();
    st.run_code("config = { net = { port = 8080 } }", "t").unwrap();
    let err = st
        .set_field("config.dns.host", PathRoot::Global, &ScriptValue::from("x"))
        .unwrap_err();
    assert!(matches!(err, BridgeError::PathNotFound { .. }));

    // The tree is untouched, including the valid prefix.
    let out = st
        .run_code("return config.net.port, config.dns", "t")
        .unwrap();
    assert_eq!(out, vec![ScriptValue::Integer(8080), ScriptValue::Nil]);
}

#[test]
fn table_root_paths() {
    let st = state();
    let table = st.create_table();
    let key = table.ref_key().unwrap();
    st.set_index(&table, &ScriptValue::from("x"), &ScriptValue::Integer(1))
        .unwrap();

    let out = st.get_field("x", PathRoot::Table(key)).unwrap();
    assert_eq!(out, ScriptValue::Integer(1));

    st.set_field("y", PathRoot::Table(key), &ScriptValue::from("set"))
        .unwrap();
    let out = st.index(&table, &ScriptValue::from("y")).unwrap();
    assert_eq!(out, ScriptValue::from("set"));
}

#[test]
fn malformed_paths_are_rejected() {
    let st = state();
    st.run_code("a = { b = {} }", "t").unwrap();
    assert!(matches!(
        st.get_field("", PathRoot::Global),
        Err(BridgeError::PathNotFound { .. })
    ));
    assert!(matches!(
        st.set_field("a..b", PathRoot::Global, &ScriptValue::Integer(1)),
        Err(BridgeError::PathNotFound { .. })
    ));
}

#[test]
fn index_goes_through_metatable_dispatch() {
    let st = state();
    st.run_code(
        "proxy = setmetatable({}, { __index = function(_, k) return k .. '!' end })",
        "t",
    )
    .unwrap();
    let proxy = st.get_global("proxy");
    let out = st.index(&proxy, &ScriptValue::from("hey")).unwrap();
    assert_eq!(out, ScriptValue::from("hey!"));
}
