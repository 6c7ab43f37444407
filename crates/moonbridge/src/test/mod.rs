pub mod test_dispatch;
pub mod test_execution;
pub mod test_hooks;
pub mod test_paths;
pub mod test_refs;
pub mod test_threads;

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::host::{
    FieldKind, FieldStore, FieldValue, HostObject, MethodDesc, MethodResult,
};
use crate::state::{ScriptState, Settings};
use crate::value::{HostObjectArc, ScriptValue};

pub(crate) fn state() -> ScriptState {
    ScriptState::new(Settings::default())
}

pub(crate) fn sink_state() -> (ScriptState, Arc<Mutex<Vec<String>>>) {
    let st = state();
    let log = Arc::new(Mutex::new(Vec::new()));
    let captured = log.clone();
    st.set_error_sink(move |message| captured.lock().push(message.to_string()));
    (st, log)
}

pub(crate) fn method(
    name: &str,
    params: Vec<FieldKind>,
    implicit_self: bool,
    f: impl Fn(&HostObjectArc, &[FieldValue]) -> MethodResult + Send + Sync + 'static,
) -> Arc<MethodDesc> {
    MethodDesc::new(name, params, implicit_self, Box::new(f))
}

/// Host object fixture: one typed field per category the dispatch hooks
/// care about, a read-only field, a shadowed entry in the override table,
/// and pluggable methods.
pub(crate) struct TestActor {
    pub name: Mutex<String>,
    pub health: Mutex<i64>,
    pub shielded: Mutex<bool>,
    pub speed: Mutex<f64>,
    pub stance: Mutex<String>,
    methods: Mutex<AHashMap<String, Arc<MethodDesc>>>,
}

impl TestActor {
    pub fn new() -> Arc<TestActor> {
        Arc::new(TestActor {
            name: Mutex::new("actor".to_string()),
            health: Mutex::new(100),
            shielded: Mutex::new(false),
            speed: Mutex::new(1.5),
            stance: Mutex::new("Idle".to_string()),
            methods: Mutex::new(AHashMap::new()),
        })
    }

    pub fn add_method(&self, desc: Arc<MethodDesc>) {
        self.methods.lock().insert(desc.name.clone(), desc);
    }

    pub fn as_host(self: &Arc<Self>) -> HostObjectArc {
        self.clone()
    }
}

impl HostObject for TestActor {
    fn type_name(&self) -> &str {
        "TestActor"
    }

    fn field_kind(&self, name: &str) -> Option<FieldKind> {
        match name {
            "name" => Some(FieldKind::String),
            "health" => Some(FieldKind::Integer),
            "shielded" => Some(FieldKind::Bool),
            "speed" => Some(FieldKind::Float),
            "stance" => Some(FieldKind::Enum),
            "rank" => Some(FieldKind::Integer),
            "tagged" => Some(FieldKind::String),
            _ => None,
        }
    }

    fn get_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::String(self.name.lock().clone())),
            "health" => Some(FieldValue::Integer(*self.health.lock())),
            "shielded" => Some(FieldValue::Bool(*self.shielded.lock())),
            "speed" => Some(FieldValue::Float(*self.speed.lock())),
            "stance" => Some(FieldValue::Enum(self.stance.lock().clone())),
            "rank" => Some(FieldValue::Integer(7)),
            "tagged" => Some(FieldValue::String("field".to_string())),
            _ => None,
        }
    }

    fn set_field(&self, name: &str, value: FieldValue) -> FieldStore {
        match (name, value) {
            ("name", FieldValue::String(s)) => {
                *self.name.lock() = s;
                FieldStore::Stored
            }
            ("health", FieldValue::Integer(i)) => {
                *self.health.lock() = i;
                FieldStore::Stored
            }
            ("shielded", FieldValue::Bool(b)) => {
                *self.shielded.lock() = b;
                FieldStore::Stored
            }
            ("speed", FieldValue::Float(n)) => {
                *self.speed.lock() = n;
                FieldStore::Stored
            }
            ("stance", FieldValue::Enum(v)) => {
                *self.stance.lock() = v;
                FieldStore::Stored
            }
            ("rank", _) => FieldStore::ReadOnly,
            ("tagged", _) => FieldStore::Stored,
            ("name" | "health" | "shielded" | "speed" | "stance", _) => FieldStore::TypeMismatch,
            _ => FieldStore::NoSuchField,
        }
    }

    fn find_method(&self, name: &str) -> Option<Arc<MethodDesc>> {
        self.methods.lock().get(name).cloned()
    }

    fn script_table(&self) -> Vec<(String, ScriptValue)> {
        vec![("tagged".to_string(), ScriptValue::from("override"))]
    }
}
