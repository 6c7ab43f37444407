// Host object surface: the typed field accessor and bound method contracts.
//
// The bridge never learns how a host implements reflection; it only relies
// on these capabilities. Field access communicates failure through explicit
// result flags, not panics or aborts.

use std::sync::Arc;

use crate::value::{HostObjectArc, HostObjectRef, ScriptValue};

/// Category tags for typed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Integer,
    Float,
    String,
    Enum,
    Object,
    Array,
    Map,
    Struct,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Enum => "enum",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Map => "map",
            FieldKind::Struct => "struct",
        }
    }
}

/// A typed field payload moving through the accessor capability.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Enumerations travel as their variant name.
    Enum(String),
    Object(HostObjectRef),
    Array(Vec<FieldValue>),
    Map(Vec<(String, FieldValue)>),
    Struct(Vec<(String, FieldValue)>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Enum(_) => FieldKind::Enum,
            FieldValue::Object(_) => FieldKind::Object,
            FieldValue::Array(_) => FieldKind::Array,
            FieldValue::Map(_) => FieldKind::Map,
            FieldValue::Struct(_) => FieldKind::Struct,
        }
    }
}

/// Outcome of a typed field store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStore {
    Stored,
    NoSuchField,
    ReadOnly,
    TypeMismatch,
}

pub type MethodResult = Result<Option<FieldValue>, String>;
pub type MethodFn = Box<dyn Fn(&HostObjectArc, &[FieldValue]) -> MethodResult + Send + Sync>;

/// A host method exported to script code.
pub struct MethodDesc {
    pub name: String,
    /// Declared parameter categories, converted left to right by position.
    pub params: Vec<FieldKind>,
    /// When set, a leading receiver argument from method-call syntax is
    /// stripped before parameter conversion.
    pub implicit_self: bool,
    pub invoke: MethodFn,
}

impl MethodDesc {
    pub fn new(
        name: impl Into<String>,
        params: Vec<FieldKind>,
        implicit_self: bool,
        invoke: MethodFn,
    ) -> Arc<MethodDesc> {
        Arc::new(MethodDesc {
            name: name.into(),
            params,
            implicit_self,
            invoke,
        })
    }
}

impl std::fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("implicit_self", &self.implicit_self)
            .finish()
    }
}

/// A host object visible to script code.
///
/// Implementations expose typed fields and named methods; everything else is
/// opaque. The bridge holds only weak references to implementors.
pub trait HostObject {
    fn type_name(&self) -> &str;

    /// Category of a typed field, `None` when no such field exists.
    fn field_kind(&self, name: &str) -> Option<FieldKind>;

    fn get_field(&self, name: &str) -> Option<FieldValue>;

    fn set_field(&self, name: &str, value: FieldValue) -> FieldStore;

    /// Bound method export lookup.
    fn find_method(&self, _name: &str) -> Option<Arc<MethodDesc>> {
        None
    }

    /// Initial entries for the per-instance override table consulted before
    /// typed fields during index reads.
    fn script_table(&self) -> Vec<(String, ScriptValue)> {
        Vec::new()
    }
}
