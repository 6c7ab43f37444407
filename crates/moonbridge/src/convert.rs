// Conversion engine: ScriptValue <-> VM value <-> typed field.
//
// Push/pull are total: anything unexpected degrades to nil. Typed field
// conversion is strict and reports mismatches through the result, never by
// aborting; dotted-path resolution distinguishes "path not found" from a
// type mismatch and performs no partial writes.

use std::sync::Arc;

use moonvm::{Interp, Value};

use crate::dispatch::{make_bound_userdata, make_object_userdata, BridgedPayload, PayloadKind};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{FieldKind, FieldValue};
use crate::state::StateInner;
use crate::value::{RefKey, ScriptValue};

/// Materialize a `ScriptValue` as a VM value. Expired host references and
/// stale keys degrade to nil; construction never fails.
pub(crate) fn push_value(state: &Arc<StateInner>, value: &ScriptValue) -> Value {
    match value {
        ScriptValue::Nil => Value::Nil,
        ScriptValue::Bool(b) => Value::Boolean(*b),
        ScriptValue::Integer(i) => Value::Integer(*i),
        ScriptValue::Number(n) => Value::Number(*n),
        ScriptValue::String(s) => Value::str(s),
        ScriptValue::Table(k)
        | ScriptValue::Function(k)
        | ScriptValue::Thread(k)
        | ScriptValue::UserData(k) => state.refs.resolve(*k),
        ScriptValue::Object(r) => match r.resolve() {
            Some(host) => make_object_userdata(state, &host),
            None => Value::Nil,
        },
        ScriptValue::BoundFunction(r, m) => match m.upgrade() {
            Some(method) if !r.is_expired() => make_bound_userdata(state, r.clone(), &method),
            _ => Value::Nil,
        },
    }
}

/// Inverse of `push_value`. Compound VM kinds get pinned through the
/// reference bridge; bridged userdata unwraps back to its host-side form.
pub(crate) fn pull_value(state: &Arc<StateInner>, value: &Value) -> ScriptValue {
    match value {
        Value::Nil => ScriptValue::Nil,
        Value::Boolean(b) => ScriptValue::Bool(*b),
        Value::Integer(i) => ScriptValue::Integer(*i),
        Value::Number(n) => ScriptValue::Number(*n),
        Value::Str(s) => ScriptValue::String(s.to_string()),
        Value::Table(_) => ScriptValue::Table(state.refs.register(value)),
        Value::Function(_) | Value::Native(_) => ScriptValue::Function(state.refs.register(value)),
        Value::Thread(_) => ScriptValue::Thread(state.refs.register(value)),
        Value::UserData(u) => {
            let bridged = u.with_downcast::<BridgedPayload, _>(|p| match &p.kind {
                PayloadKind::Object(r) => ScriptValue::Object(r.clone()),
                PayloadKind::Bound(r, m) => ScriptValue::BoundFunction(r.clone(), m.clone()),
            });
            match bridged {
                Some(v) => v,
                None => ScriptValue::UserData(state.refs.register(value)),
            }
        }
    }
}

/// Typed field -> VM value.
pub(crate) fn field_to_vm(state: &Arc<StateInner>, field: &FieldValue) -> Value {
    match field {
        FieldValue::Bool(b) => Value::Boolean(*b),
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Float(n) => Value::Number(*n),
        FieldValue::String(s) => Value::str(s),
        FieldValue::Enum(name) => Value::str(name),
        FieldValue::Object(r) => match r.resolve() {
            Some(host) => make_object_userdata(state, &host),
            None => Value::Nil,
        },
        FieldValue::Array(items) => {
            let table = Value::new_table();
            if let Some(t) = table.as_table() {
                for (i, item) in items.iter().enumerate() {
                    let _ = t.set(Value::Integer(i as i64 + 1), field_to_vm(state, item));
                }
            }
            table
        }
        FieldValue::Map(entries) | FieldValue::Struct(entries) => {
            let table = Value::new_table();
            if let Some(t) = table.as_table() {
                for (name, item) in entries {
                    let _ = t.set_str(name, field_to_vm(state, item));
                }
            }
            table
        }
    }
}

/// VM value -> typed field of a declared category. Strict: a `bool` field
/// takes only booleans, a string field only strings; integers accept
/// integral floats. Failure is a `Mismatch`, never an abort.
pub(crate) fn vm_to_field(
    state: &Arc<StateInner>,
    kind: FieldKind,
    value: &Value,
) -> BridgeResult<FieldValue> {
    let mismatch = || BridgeError::Mismatch {
        from: value.type_name(),
        to: kind.name(),
    };
    match kind {
        FieldKind::Bool => value
            .as_boolean()
            .map(FieldValue::Bool)
            .ok_or_else(mismatch),
        FieldKind::Integer => match value {
            Value::Integer(_) | Value::Number(_) => {
                value.as_integer().map(FieldValue::Integer).ok_or_else(mismatch)
            }
            _ => Err(mismatch()),
        },
        FieldKind::Float => value.as_number().map(FieldValue::Float).ok_or_else(mismatch),
        FieldKind::String => value
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Enum => value
            .as_str()
            .map(|s| FieldValue::Enum(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Object => {
            let bridged = value.as_userdata().and_then(|u| {
                u.with_downcast::<BridgedPayload, _>(|p| match &p.kind {
                    PayloadKind::Object(r) => Some(FieldValue::Object(r.clone())),
                    PayloadKind::Bound(_, _) => None,
                })
            });
            bridged.flatten().ok_or_else(mismatch)
        }
        FieldKind::Array => {
            let table = value.as_table().ok_or_else(mismatch)?;
            let mut items = Vec::new();
            for i in 1..=table.len() {
                let element = table.get(&Value::Integer(i));
                items.push(infer_field(state, &element).ok_or_else(mismatch)?);
            }
            Ok(FieldValue::Array(items))
        }
        FieldKind::Map | FieldKind::Struct => {
            let table = value.as_table().ok_or_else(mismatch)?;
            let mut entries = Vec::new();
            for (k, v) in table.entries() {
                let name = k.as_str().ok_or_else(mismatch)?.to_string();
                entries.push((name, infer_field(state, &v).ok_or_else(mismatch)?));
            }
            if kind == FieldKind::Map {
                Ok(FieldValue::Map(entries))
            } else {
                Ok(FieldValue::Struct(entries))
            }
        }
    }
}

/// Best-effort field category for an element of an array/map/struct, where
/// no declared category exists.
fn infer_field(state: &Arc<StateInner>, value: &Value) -> Option<FieldValue> {
    match value {
        Value::Boolean(b) => Some(FieldValue::Bool(*b)),
        Value::Integer(i) => Some(FieldValue::Integer(*i)),
        Value::Number(n) => Some(FieldValue::Float(*n)),
        Value::Str(s) => Some(FieldValue::String(s.to_string())),
        Value::UserData(_) => vm_to_field(state, FieldKind::Object, value).ok(),
        Value::Table(_) => vm_to_field(state, FieldKind::Struct, value).ok(),
        _ => None,
    }
}

/// Root of a dotted field path.
#[derive(Debug, Clone, Copy)]
pub enum PathRoot {
    /// Start at the global table.
    Global,
    /// Start at a registered table value.
    Table(RefKey),
}

fn path_root_value(state: &Arc<StateInner>, root: PathRoot) -> Value {
    match root {
        PathRoot::Global => Value::Table(state.vm.globals.clone()),
        PathRoot::Table(key) => state.refs.resolve(key),
    }
}

fn indexable(value: &Value) -> bool {
    matches!(value, Value::Table(_) | Value::UserData(_))
}

/// Walk `path` ("a.b.c") from `root` down to the final segment and read it.
/// Any intermediate segment that is not indexable fails the whole lookup.
pub(crate) fn get_field_from_tree(
    state: &Arc<StateInner>,
    path: &str,
    root: PathRoot,
) -> BridgeResult<ScriptValue> {
    let interp = Interp::new(state.vm.clone());
    let mut current = path_root_value(state, root);
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segment.is_empty() || !indexable(&current) {
            return Err(BridgeError::PathNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        }
        let next = interp
            .index_value(&current, &Value::str(segment))
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        if segments.peek().is_none() {
            return Ok(pull_value(state, &next));
        }
        current = next;
    }
    Err(BridgeError::PathNotFound {
        path: path.to_string(),
        segment: String::new(),
    })
}

/// Walk `path` to the penultimate segment and write the final one. The walk
/// is validated before the single terminal write, so a failed path never
/// leaves a partial update behind.
pub(crate) fn set_field_from_tree(
    state: &Arc<StateInner>,
    path: &str,
    root: PathRoot,
    value: &ScriptValue,
) -> BridgeResult<()> {
    let interp = Interp::new(state.vm.clone());
    let mut current = path_root_value(state, root);
    let segments: Vec<&str> = path.split('.').collect();
    let (last, walk) = match segments.split_last() {
        Some(split) if !segments.iter().any(|s| s.is_empty()) => split,
        _ => {
            return Err(BridgeError::PathNotFound {
                path: path.to_string(),
                segment: String::new(),
            })
        }
    };
    for segment in walk {
        if !indexable(&current) {
            return Err(BridgeError::PathNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            });
        }
        current = interp
            .index_value(&current, &Value::str(segment))
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
    }
    if !indexable(&current) {
        return Err(BridgeError::PathNotFound {
            path: path.to_string(),
            segment: last.to_string(),
        });
    }
    let vm_value = push_value(state, value);
    interp
        .setindex_value(&current, &Value::str(last), vm_value)
        .map_err(|e| BridgeError::Runtime(e.to_string()))
}
