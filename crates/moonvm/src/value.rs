// Runtime values.
//
// Every script-visible value is one `Value` variant. Compound kinds hold a
// shared-ownership reference (`Arc`), so cloning a `Value` is cheap and two
// clones of the same table/function/thread compare equal by identity.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::ast::FuncBody;
use crate::coroutine::ThreadRef;
use crate::error::{VmError, VmResult};
use crate::interp::Interp;
use crate::table::{Table, TableRef};

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(SmolStr),
    Table(TableRef),
    Function(FunctionRef),
    Native(NativeRef),
    Thread(ThreadRef),
    UserData(UserDataRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(SmolStr::new(s.as_ref()))
    }

    pub fn new_table() -> Value {
        Value::Table(TableRef::new(Table::new()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is truthy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Thread(_) => "thread",
            Value::UserData(_) => "userdata",
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ThreadRef> {
        match self {
            Value::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&UserDataRef> {
        match self {
            Value::UserData(u) => Some(u),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Stable address of the underlying shared object, `None` for
    /// primitives. Used for identity comparison and registry aliasing.
    pub fn object_addr(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(t.addr()),
            Value::Function(f) => Some(Arc::as_ptr(&f.0) as usize),
            Value::Native(f) => Some(Arc::as_ptr(&f.0) as usize),
            Value::Thread(t) => Some(t.addr()),
            Value::UserData(u) => Some(Arc::as_ptr(&u.0) as usize),
            _ => None,
        }
    }

    /// Raw equality: primitives by value (integers and floats compare across
    /// representations), compound kinds by identity. Metamethods are not
    /// consulted here.
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.object_addr(), other.object_addr()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Plain string rendering without `__tostring` dispatch; the interpreter
    /// layers the metamethod on top of this.
    pub fn display_basic(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*i).to_string()
            }
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::Table(t) => format!("table: {:#x}", t.addr()),
            Value::Function(f) => format!("function: {:#x}", Arc::as_ptr(&f.0) as usize),
            Value::Native(f) => format!("function: builtin: {}", f.0.name),
            Value::Thread(t) => format!("thread: {:#x}", t.addr()),
            Value::UserData(u) => {
                format!("{}: {:#x}", u.0.type_name, Arc::as_ptr(&u.0) as usize)
            }
        }
    }
}

/// Render a float the way scripts expect: integral values keep a trailing
/// `.0` so they stay visually distinct from integers.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_basic())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmolStr::new(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::Str(s)
    }
}

// ---- closures ---------------------------------------------------------------

/// Lexical scope: locals of one block, chained to the enclosing block.
pub struct Scope {
    pub vars: AHashMap<SmolStr, Value>,
    /// Extra arguments when the owning function is vararg.
    pub varargs: Option<Vec<Value>>,
    pub parent: Option<EnvRef>,
}

pub type EnvRef = Arc<Mutex<Scope>>;

impl Scope {
    pub fn root() -> EnvRef {
        Arc::new(Mutex::new(Scope {
            vars: AHashMap::new(),
            varargs: None,
            parent: None,
        }))
    }

    pub fn child(parent: &EnvRef) -> EnvRef {
        Arc::new(Mutex::new(Scope {
            vars: AHashMap::new(),
            varargs: None,
            parent: Some(parent.clone()),
        }))
    }
}

/// A script function: shared prototype plus the environment it closed over.
pub struct Closure {
    pub proto: Arc<FuncBody>,
    pub env: EnvRef,
}

#[derive(Clone)]
pub struct FunctionRef(pub Arc<Closure>);

impl FunctionRef {
    pub fn new(proto: Arc<FuncBody>, env: EnvRef) -> Self {
        FunctionRef(Arc::new(Closure { proto, env }))
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---- native functions -------------------------------------------------------

pub type NativeFn = Box<dyn Fn(&Interp, Vec<Value>) -> VmResult<Vec<Value>> + Send + Sync>;

pub struct NativeFunction {
    pub name: SmolStr,
    pub func: NativeFn,
}

#[derive(Clone)]
pub struct NativeRef(pub Arc<NativeFunction>);

impl NativeRef {
    pub fn new(name: impl AsRef<str>, func: NativeFn) -> Self {
        NativeRef(Arc::new(NativeFunction {
            name: SmolStr::new(name.as_ref()),
            func,
        }))
    }

    pub fn call(&self, interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
        (self.0.func)(interp, args)
    }
}

/// Build a native function `Value` from a closure.
pub fn native<F>(name: &str, f: F) -> Value
where
    F: Fn(&Interp, Vec<Value>) -> VmResult<Vec<Value>> + Send + Sync + 'static,
{
    Value::Native(NativeRef::new(name, Box::new(f)))
}

// ---- userdata ---------------------------------------------------------------

/// Embedder-defined payload with an optional per-value metatable.
pub struct UserData {
    pub type_name: SmolStr,
    pub data: Mutex<Box<dyn Any + Send>>,
    pub meta: Mutex<Option<TableRef>>,
}

#[derive(Clone)]
pub struct UserDataRef(pub Arc<UserData>);

impl UserDataRef {
    pub fn new(type_name: impl AsRef<str>, data: Box<dyn Any + Send>) -> Self {
        UserDataRef(Arc::new(UserData {
            type_name: SmolStr::new(type_name.as_ref()),
            data: Mutex::new(data),
            meta: Mutex::new(None),
        }))
    }

    pub fn ptr_eq(&self, other: &UserDataRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.meta.lock().clone()
    }

    pub fn set_metatable(&self, meta: Option<TableRef>) {
        *self.0.meta.lock() = meta;
    }

    /// Run `f` against the payload downcast to `T`; `None` if the payload is
    /// a different type.
    pub fn with_downcast<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.0.data.lock();
        guard.downcast_ref::<T>().map(f)
    }
}

/// Argument helpers shared by native functions.
pub fn arg_or_nil(args: &[Value], n: usize) -> Value {
    args.get(n).cloned().unwrap_or(Value::Nil)
}

pub fn require_arg(args: &[Value], n: usize, what: &str) -> VmResult<Value> {
    match args.get(n) {
        Some(v) => Ok(v.clone()),
        None => Err(VmError::runtime(format!(
            "bad argument #{} to '{}' (value expected)",
            n + 1,
            what
        ))),
    }
}
