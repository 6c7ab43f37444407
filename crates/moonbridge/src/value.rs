// The host-side value model.
//
// `ScriptValue` is the closed tagged union crossing the boundary in both
// directions. Compound VM-side kinds carry a `RefKey` into the reference
// bridge rather than a pointer, so the type stays copy-friendly and the
// bridge remains the sole authority over lifetimes. Host-side kinds carry
// weak references and never extend a host object's lifetime.

use std::sync::{Arc, Weak};

use crate::host::{HostObject, MethodDesc};

/// Integer handle into the reference bridge. Shared by all `ScriptValue`s
/// referring to the same underlying VM value.
pub type RefKey = moonvm::RefId;

pub const REF_NIL: RefKey = moonvm::REF_NIL;
pub const NO_REF: RefKey = moonvm::NO_REF;

pub type HostObjectArc = Arc<dyn HostObject + Send + Sync>;

/// Non-owning handle to a host object. Every dereference checks liveness.
#[derive(Clone)]
pub struct HostObjectRef(Weak<dyn HostObject + Send + Sync>);

impl HostObjectRef {
    pub fn new(object: &HostObjectArc) -> HostObjectRef {
        HostObjectRef(Arc::downgrade(object))
    }

    pub fn resolve(&self) -> Option<HostObjectArc> {
        self.0.upgrade()
    }

    pub fn is_expired(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Identity comparison. Expired references compare unequal to everything,
    /// including themselves.
    pub fn same_object(&self, other: &HostObjectRef) -> bool {
        match (self.resolve(), other.resolve()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for HostObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.resolve() {
            Some(obj) => write!(f, "HostObjectRef({})", obj.type_name()),
            None => write!(f, "HostObjectRef(<expired>)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Nil,
    Bool,
    Number,
    String,
    Table,
    Function,
    Thread,
    UserData,
    Object,
    BoundFunction,
}

/// A value crossing the host/VM boundary.
#[derive(Debug, Clone, Default)]
pub enum ScriptValue {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// VM table, by reference key.
    Table(RefKey),
    /// VM function, by reference key.
    Function(RefKey),
    /// VM coroutine, by reference key.
    Thread(RefKey),
    /// Foreign userdata that is not a bridged host object.
    UserData(RefKey),
    /// A bridged host object.
    Object(HostObjectRef),
    /// A host method bound to an object.
    BoundFunction(HostObjectRef, Weak<MethodDesc>),
}

impl ScriptValue {
    pub fn object(host: &HostObjectArc) -> ScriptValue {
        ScriptValue::Object(HostObjectRef::new(host))
    }

    pub fn bound(host: &HostObjectArc, method: &Arc<MethodDesc>) -> ScriptValue {
        ScriptValue::BoundFunction(HostObjectRef::new(host), Arc::downgrade(method))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ScriptValue::Nil => ValueKind::Nil,
            ScriptValue::Bool(_) => ValueKind::Bool,
            ScriptValue::Integer(_) | ScriptValue::Number(_) => ValueKind::Number,
            ScriptValue::String(_) => ValueKind::String,
            ScriptValue::Table(_) => ValueKind::Table,
            ScriptValue::Function(_) => ValueKind::Function,
            ScriptValue::Thread(_) => ValueKind::Thread,
            ScriptValue::UserData(_) => ValueKind::UserData,
            ScriptValue::Object(_) => ValueKind::Object,
            ScriptValue::BoundFunction(_, _) => ValueKind::BoundFunction,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(i) => Some(*i),
            ScriptValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(i) => Some(*i as f64),
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The reference key of a compound VM-side value, if it carries one.
    pub fn ref_key(&self) -> Option<RefKey> {
        match self {
            ScriptValue::Table(k)
            | ScriptValue::Function(k)
            | ScriptValue::Thread(k)
            | ScriptValue::UserData(k) => Some(*k),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            ScriptValue::Object(r) => Some(r),
            _ => None,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        use ScriptValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Integer(a), Number(b)) | (Number(b), Integer(a)) => *a as f64 == *b,
            (String(a), String(b)) => a == b,
            (Table(a), Table(b))
            | (Function(a), Function(b))
            | (Thread(a), Thread(b))
            | (UserData(a), UserData(b)) => a == b,
            (Object(a), Object(b)) => a.same_object(b),
            (BoundFunction(oa, ma), BoundFunction(ob, mb)) => {
                oa.same_object(ob)
                    && match (ma.upgrade(), mb.upgrade()) {
                        (Some(x), Some(y)) => Arc::ptr_eq(&x, &y),
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        ScriptValue::Integer(i)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

/// Coroutine status as seen by host code, derived on demand from the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// The value is not a coroutine at all. Terminal.
    Invalid,
    /// Runnable: never resumed yet, or finished without error.
    Ok,
    /// Parked at a yield point.
    Suspended,
    /// A resumption aborted. Terminal.
    Error,
}
