// Metatable dispatch for bridged host values.
//
// One metatable per embedding state, shared by every bridged userdata that
// state creates. The four hooks close over a weak state handle; once the
// state is gone they degrade to nil results instead of keeping it alive.
//
// Index-read resolution order: per-instance override table, then typed
// field, then bound method, then nil. Reads on an expired object are soft
// (nil); calls on an expired object abort.

use std::sync::{Arc, Weak};

use moonvm::{native, Interp, Table, TableRef, UserDataRef, Value, VmError, VmResult};

use crate::convert;
use crate::host::{FieldStore, MethodDesc};
use crate::state::StateInner;
use crate::value::{HostObjectArc, HostObjectRef};

#[derive(Clone)]
pub(crate) enum PayloadKind {
    Object(HostObjectRef),
    Bound(HostObjectRef, Weak<MethodDesc>),
}

/// Payload attached to every bridged userdata slot.
pub(crate) struct BridgedPayload {
    pub kind: PayloadKind,
    /// Per-instance override map, consulted before typed fields.
    pub overrides: TableRef,
}

impl BridgedPayload {
    fn of(value: &Value) -> Option<BridgedPayload> {
        value.as_userdata().and_then(|u| {
            u.with_downcast::<BridgedPayload, _>(|p| BridgedPayload {
                kind: p.kind.clone(),
                overrides: p.overrides.clone(),
            })
        })
    }
}

/// Wrap a host object as a bridged userdata. Every push creates a fresh
/// slot: equality between slots goes through `__eq` and the weak host
/// identity, so expired handles compare unequal even to themselves.
pub(crate) fn make_object_userdata(state: &Arc<StateInner>, host: &HostObjectArc) -> Value {
    let payload = BridgedPayload {
        kind: PayloadKind::Object(HostObjectRef::new(host)),
        overrides: TableRef::new(Table::new()),
    };
    let overrides = payload.overrides.clone();
    let udata = UserDataRef::new(host.type_name(), Box::new(payload));
    udata.set_metatable(Some(state.user_meta.clone()));
    for (name, value) in host.script_table() {
        let _ = overrides.set(Value::str(name), convert::push_value(state, &value));
    }
    Value::UserData(udata)
}

pub(crate) fn make_bound_userdata(
    state: &Arc<StateInner>,
    object: HostObjectRef,
    method: &Arc<MethodDesc>,
) -> Value {
    let payload = BridgedPayload {
        kind: PayloadKind::Bound(object, Arc::downgrade(method)),
        overrides: TableRef::new(Table::new()),
    };
    let udata = UserDataRef::new("bound function", Box::new(payload));
    udata.set_metatable(Some(state.user_meta.clone()));
    Value::UserData(udata)
}

/// Build the shared metatable. Called once, from state construction.
pub(crate) fn build_user_metatable(weak: Weak<StateInner>) -> TableRef {
    let meta = TableRef::new(Table::new());

    {
        let weak = weak.clone();
        let _ = meta.set_str(
            "__index",
            native("bridge.__index", move |interp, args| {
                hook_index(&weak, interp, args)
            }),
        );
    }
    {
        let weak = weak.clone();
        let _ = meta.set_str(
            "__newindex",
            native("bridge.__newindex", move |interp, args| {
                hook_newindex(&weak, interp, args)
            }),
        );
    }
    {
        let weak = weak.clone();
        let _ = meta.set_str(
            "__call",
            native("bridge.__call", move |interp, args| {
                hook_call(&weak, interp, args)
            }),
        );
    }
    let _ = meta.set_str("__eq", native("bridge.__eq", hook_eq));
    let _ = meta.set_str("__tostring", native("bridge.__tostring", hook_tostring));

    meta
}

fn hook_index(
    weak: &Weak<StateInner>,
    _interp: &Interp,
    args: Vec<Value>,
) -> VmResult<Vec<Value>> {
    let state = match weak.upgrade() {
        Some(s) => s,
        None => return Ok(vec![Value::Nil]),
    };
    let target = args.first().cloned().unwrap_or(Value::Nil);
    let key = args.get(1).cloned().unwrap_or(Value::Nil);
    let payload = match BridgedPayload::of(&target) {
        Some(p) => p,
        None => return Ok(vec![Value::Nil]),
    };

    let from_override = payload.overrides.get(&key);
    if !from_override.is_nil() {
        return Ok(vec![from_override]);
    }

    let object = match &payload.kind {
        PayloadKind::Object(r) => r,
        PayloadKind::Bound(_, _) => return Ok(vec![Value::Nil]),
    };
    // An expired object reads as empty, never as an error.
    let host = match object.resolve() {
        Some(h) => h,
        None => return Ok(vec![Value::Nil]),
    };
    let name = match key.as_str() {
        Some(n) => n,
        None => return Ok(vec![Value::Nil]),
    };

    if let Some(field) = host.get_field(name) {
        return Ok(vec![convert::field_to_vm(&state, &field)]);
    }
    if let Some(method) = host.find_method(name) {
        return Ok(vec![make_bound_userdata(&state, object.clone(), &method)]);
    }
    Ok(vec![Value::Nil])
}

fn hook_newindex(
    weak: &Weak<StateInner>,
    _interp: &Interp,
    args: Vec<Value>,
) -> VmResult<Vec<Value>> {
    let state = match weak.upgrade() {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };
    let target = args.first().cloned().unwrap_or(Value::Nil);
    let key = args.get(1).cloned().unwrap_or(Value::Nil);
    let value = args.get(2).cloned().unwrap_or(Value::Nil);
    let payload = match BridgedPayload::of(&target) {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };

    if let PayloadKind::Object(object) = &payload.kind {
        if let Some(host) = object.resolve() {
            if let Some(name) = key.as_str() {
                if let Some(kind) = host.field_kind(name) {
                    match convert::vm_to_field(&state, kind, &value) {
                        Ok(field) => match host.set_field(name, field) {
                            FieldStore::Stored => return Ok(Vec::new()),
                            FieldStore::ReadOnly => {
                                state.report_error(&format!(
                                    "cannot assign to read-only field '{}' of {}",
                                    name,
                                    host.type_name()
                                ));
                                return Ok(Vec::new());
                            }
                            // Mismatch at the store layer falls back to the
                            // override table, like an absent field.
                            FieldStore::TypeMismatch | FieldStore::NoSuchField => {}
                        },
                        Err(e) => {
                            state.report_error(&format!(
                                "cannot assign field '{}' of {}: {}",
                                name,
                                host.type_name(),
                                e
                            ));
                        }
                    }
                }
            }
        }
    }

    payload.overrides.set(key, value)?;
    Ok(Vec::new())
}

fn hook_call(weak: &Weak<StateInner>, _interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let state = match weak.upgrade() {
        Some(s) => s,
        None => return Err(VmError::runtime("embedding state is gone")),
    };
    let target = args.first().cloned().unwrap_or(Value::Nil);
    let payload = match BridgedPayload::of(&target) {
        Some(p) => p,
        None => return Err(VmError::runtime("attempt to call a non-bridged value")),
    };
    let (object, method) = match &payload.kind {
        PayloadKind::Bound(o, m) => (o, m),
        PayloadKind::Object(_) => {
            return Err(VmError::runtime("attempt to call a host object"));
        }
    };
    let host = object
        .resolve()
        .ok_or_else(|| VmError::runtime("attempt to call a method on an expired host object"))?;
    let method = method
        .upgrade()
        .ok_or_else(|| VmError::runtime("attempt to call an expired host method"))?;

    // args[0] is the bound-function value itself.
    let mut rest = &args[1..];
    if method.implicit_self {
        // Method-call syntax passes the receiver again; strip it when it is
        // the bound object.
        if let Some(first) = rest.first() {
            if let Some(BridgedPayload {
                kind: PayloadKind::Object(r),
                ..
            }) = BridgedPayload::of(first)
            {
                if r.same_object(object) {
                    rest = &rest[1..];
                }
            }
        }
    }

    let mut params = Vec::with_capacity(method.params.len());
    for (i, kind) in method.params.iter().enumerate() {
        let arg = rest.get(i).cloned().unwrap_or(Value::Nil);
        let field = convert::vm_to_field(&state, *kind, &arg).map_err(|e| {
            VmError::runtime(format!(
                "bad argument #{} to '{}' ({})",
                i + 1,
                method.name,
                e
            ))
        })?;
        params.push(field);
    }

    match (method.invoke)(&host, &params) {
        Ok(Some(ret)) => Ok(vec![convert::field_to_vm(&state, &ret)]),
        Ok(None) => Ok(vec![Value::Nil]),
        Err(message) => Err(VmError::runtime(message)),
    }
}

/// Identity equality over the weak host references. Expired payloads are
/// unequal to everything, including themselves.
fn hook_eq(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let a = args.first().cloned().unwrap_or(Value::Nil);
    let b = args.get(1).cloned().unwrap_or(Value::Nil);
    let result = match (BridgedPayload::of(&a), BridgedPayload::of(&b)) {
        (Some(pa), Some(pb)) => match (&pa.kind, &pb.kind) {
            (PayloadKind::Object(ra), PayloadKind::Object(rb)) => ra.same_object(rb),
            (PayloadKind::Bound(ra, ma), PayloadKind::Bound(rb, mb)) => {
                ra.same_object(rb)
                    && match (ma.upgrade(), mb.upgrade()) {
                        (Some(x), Some(y)) => Arc::ptr_eq(&x, &y),
                        _ => false,
                    }
            }
            _ => false,
        },
        _ => false,
    };
    Ok(vec![Value::Boolean(result)])
}

fn hook_tostring(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let target = args.first().cloned().unwrap_or(Value::Nil);
    let text = match BridgedPayload::of(&target) {
        Some(p) => match &p.kind {
            PayloadKind::Object(r) => match r.resolve() {
                Some(h) => format!("{}: bridged", h.type_name()),
                None => "<expired host object>".to_string(),
            },
            PayloadKind::Bound(_, m) => match m.upgrade() {
                Some(d) => format!("bound function: {}", d.name),
                None => "<expired host method>".to_string(),
            },
        },
        None => "userdata".to_string(),
    };
    Ok(vec![Value::str(text)])
}
