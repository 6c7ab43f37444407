use super::{sink_state, state};
use crate::error::BridgeError;
use crate::value::{ScriptValue, REF_NIL};

use moonvm::Value;

#[test]
fn register_aliases_share_one_key() {
    let st = state();
    let table = st.create_table();
    let key = table.ref_key().unwrap();
    assert_eq!(st.inner.refs.alias_count(key), 1);

    let again = st.register(&table);
    assert_eq!(again, key);
    assert_eq!(st.inner.refs.alias_count(key), 2);

    // One release keeps the other alias resolvable.
    st.release(key);
    assert!(matches!(st.inner.refs.resolve(key), Value::Table(_)));

    st.release(key);
    assert_eq!(st.inner.refs.alias_count(key), 0);
    assert!(st.resolve(key).is_nil());
}

#[test]
fn resolve_hands_out_a_fresh_alias() {
    let st = state();
    let table = st.create_table();
    let key = table.ref_key().unwrap();

    let resolved = st.resolve(key);
    assert_eq!(resolved.ref_key(), Some(key));
    assert_eq!(st.inner.refs.alias_count(key), 2);
}

#[test]
fn register_nil_is_the_nil_key() {
    let st = state();
    assert_eq!(st.register(&ScriptValue::Nil), REF_NIL);
    assert!(st.resolve(REF_NIL).is_nil());
    // Releasing the nil key is always a no-op, never a fault.
    assert!(st.release_checked(REF_NIL).is_ok());
}

#[test]
fn release_checked_reports_double_release() {
    let (st, log) = sink_state();
    let table = st.create_table();
    let key = table.ref_key().unwrap();
    st.release(key);

    let err = st.release_checked(key).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidRef(k) if k == key));
    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("reference release failed"));
}

#[test]
fn distinct_values_get_distinct_keys() {
    let st = state();
    let a = st.create_table();
    let b = st.create_table();
    assert_ne!(a.ref_key(), b.ref_key());
    assert_eq!(st.inner.refs.live_keys(), 2);
}

#[test]
fn smart_reference_outlives_its_source_alias() {
    let st = state();
    let table = st.create_table();
    let key = table.ref_key().unwrap();

    let smart = st.add_smart_reference(table);
    assert_eq!(st.smart_reference_count(), 1);

    // Drop the original alias; the anchor still pins the value.
    st.release(key);
    assert!(matches!(st.inner.refs.resolve(key), Value::Table(_)));

    st.remove_smart_reference(&smart);
    assert_eq!(st.smart_reference_count(), 0);
    assert!(st.resolve(key).is_nil());
}

#[test]
fn remove_smart_reference_twice_is_harmless() {
    let st = state();
    let table = st.create_table();
    let smart = st.add_smart_reference(table.clone());
    st.remove_smart_reference(&smart);
    st.remove_smart_reference(&smart);
    // The create_table alias is still live.
    assert!(matches!(
        st.inner.refs.resolve(table.ref_key().unwrap()),
        Value::Table(_)
    ));
}
