// Embedding state: one VM plus its bridge bookkeeping.
//
// `ScriptState` is a cheap clone handle over the shared inner state. All
// script execution enters through here, under an inception guard: nested
// host-script-host call depth is tracked, and errors reported at depth > 0
// are queued and drained FIFO once control returns to depth zero.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::Mutex;

use moonvm::{
    compile, deserialize_chunk, is_bytecode, open_libs, serialize_chunk, ast::Chunk, CoStatus,
    HookHandler, Interp, LibsLoader, ResumeOutcome, TableRef, ThreadRef, Value, VmState,
};

use crate::convert::{self, PathRoot};
use crate::dispatch;
use crate::error::{BridgeError, BridgeResult};
use crate::refs::ReferenceBridge;
use crate::value::{RefKey, ScriptValue, ThreadStatus};

type ErrorSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Construction-time options.
#[derive(Clone)]
pub struct Settings {
    /// Library groups opened in the VM at construction.
    pub libs: LibsLoader,
    /// Report runtime aborts from protected calls to the error sink.
    pub log_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            libs: LibsLoader::all(),
            log_errors: true,
        }
    }
}

pub(crate) struct StateInner {
    pub(crate) vm: Arc<VmState>,
    pub(crate) refs: ReferenceBridge,
    /// Shared metatable attached to every bridged userdata of this state.
    pub(crate) user_meta: TableRef,
    error_sink: Mutex<Option<ErrorSink>>,
    inception: AtomicU32,
    pending_errors: Mutex<VecDeque<String>>,
    smart_refs: Mutex<AHashMap<u64, ScriptValue>>,
    next_smart_id: AtomicU64,
    settings: Settings,
}

impl StateInner {
    /// Deliver immediately at depth zero; queue otherwise. Queued messages
    /// drain in raise order when the outermost frame exits.
    pub(crate) fn report_error(&self, message: &str) {
        if self.inception.load(Ordering::Acquire) > 0 {
            self.pending_errors.lock().push_back(message.to_string());
        } else {
            self.deliver(message);
        }
    }

    fn deliver(&self, message: &str) {
        // Clone the sink out of the lock; the handler may call back in.
        let sink = self.error_sink.lock().clone();
        if let Some(f) = sink {
            f(message);
        }
    }

    fn enter(self: &Arc<Self>) -> InceptionGuard {
        self.inception.fetch_add(1, Ordering::AcqRel);
        InceptionGuard {
            inner: self.clone(),
        }
    }
}

struct InceptionGuard {
    inner: Arc<StateInner>,
}

impl Drop for InceptionGuard {
    fn drop(&mut self) {
        if self.inner.inception.fetch_sub(1, Ordering::AcqRel) == 1 {
            loop {
                let next = self.inner.pending_errors.lock().pop_front();
                match next {
                    Some(message) => self.inner.deliver(&message),
                    None => break,
                }
            }
        }
    }
}

/// An owning anchor pinning a script value independent of any stack frame.
/// Live for exactly as long as it stays registered with its state.
#[derive(Debug)]
pub struct SmartReference {
    pub(crate) id: u64,
    pub value: ScriptValue,
}

/// Handle to one embedding state. Clones share the same VM and bridge.
#[derive(Clone)]
pub struct ScriptState {
    pub(crate) inner: Arc<StateInner>,
}

impl ScriptState {
    pub fn new(settings: Settings) -> ScriptState {
        let vm = VmState::new();
        open_libs(&vm, &settings.libs);
        let inner = Arc::new_cyclic(|weak: &Weak<StateInner>| StateInner {
            refs: ReferenceBridge::new(vm.clone()),
            user_meta: dispatch::build_user_metatable(weak.clone()),
            error_sink: Mutex::new(None),
            inception: AtomicU32::new(0),
            pending_errors: Mutex::new(VecDeque::new()),
            smart_refs: Mutex::new(AHashMap::new()),
            next_smart_id: AtomicU64::new(1),
            settings,
            vm,
        });
        ScriptState { inner }
    }

    // ---- error channel ------------------------------------------------------

    pub fn set_error_sink(&self, sink: impl Fn(&str) + Send + Sync + 'static) {
        *self.inner.error_sink.lock() = Some(Arc::new(sink));
    }

    pub fn clear_error_sink(&self) {
        *self.inner.error_sink.lock() = None;
    }

    /// Report through the state's error channel, honoring the inception
    /// queue. Host callbacks use this for their own diagnostics too.
    pub fn report_error(&self, message: &str) {
        self.inner.report_error(message);
    }

    pub fn inception_level(&self) -> u32 {
        self.inner.inception.load(Ordering::Acquire)
    }

    // ---- execution ----------------------------------------------------------

    /// Compile and execute `source` under protected invocation. Compile
    /// failures are reported and returned without executing anything.
    pub fn run_code(&self, source: &str, label: &str) -> BridgeResult<Vec<ScriptValue>> {
        let chunk = self.compile_reported(source, label)?;
        self.exec_chunk(&chunk)
    }

    /// Execute either source text or a precompiled binary chunk.
    pub fn run_bytes(&self, bytes: &[u8], label: &str) -> BridgeResult<Vec<ScriptValue>> {
        if is_bytecode(bytes) {
            let chunk = deserialize_chunk(bytes).map_err(|e| {
                let message = e.to_string();
                self.inner.report_error(&message);
                BridgeError::Compile {
                    label: label.to_string(),
                    message,
                }
            })?;
            return self.exec_chunk(&chunk);
        }
        let source = std::str::from_utf8(bytes).map_err(|_| BridgeError::Compile {
            label: label.to_string(),
            message: "source is not valid utf-8".to_string(),
        })?;
        self.run_code(source, label)
    }

    /// Load and run a file; binary chunks are detected by magic.
    pub fn run_file(&self, path: &str) -> BridgeResult<Vec<ScriptValue>> {
        let bytes = std::fs::read(path)?;
        self.run_bytes(&bytes, path)
    }

    /// Precompile source to the portable binary chunk form.
    pub fn to_bytecode(&self, source: &str, label: &str) -> BridgeResult<Vec<u8>> {
        let chunk = self.compile_reported(source, label)?;
        Ok(serialize_chunk(&chunk))
    }

    fn compile_reported(&self, source: &str, label: &str) -> BridgeResult<Chunk> {
        compile(source, label).map_err(|e| {
            let message = e.to_string();
            self.inner.report_error(&message);
            BridgeError::Compile {
                label: label.to_string(),
                message,
            }
        })
    }

    fn exec_chunk(&self, chunk: &Chunk) -> BridgeResult<Vec<ScriptValue>> {
        let _guard = self.inner.enter();
        let interp = Interp::new(self.inner.vm.clone());
        match interp.exec_chunk(chunk, Vec::new()) {
            Ok(values) => Ok(values
                .iter()
                .map(|v| convert::pull_value(&self.inner, v))
                .collect()),
            Err(e) => {
                let message = e.to_string();
                if self.inner.settings.log_errors {
                    self.inner
                        .report_error(&format!("script error: {}", message));
                }
                Err(BridgeError::Runtime(message))
            }
        }
    }

    /// Protected call: a VM abort becomes an error value and, when enabled,
    /// a report through the error sink.
    pub fn pcall(
        &self,
        func: &ScriptValue,
        args: Vec<ScriptValue>,
    ) -> BridgeResult<Vec<ScriptValue>> {
        self.call_inner(func, args, true)
    }

    /// Unprotected call: the abort propagates to the caller untouched and is
    /// never auto-reported. For call sites that already hold an outer
    /// protective frame.
    pub fn call(
        &self,
        func: &ScriptValue,
        args: Vec<ScriptValue>,
    ) -> BridgeResult<Vec<ScriptValue>> {
        self.call_inner(func, args, false)
    }

    fn call_inner(
        &self,
        func: &ScriptValue,
        args: Vec<ScriptValue>,
        protected: bool,
    ) -> BridgeResult<Vec<ScriptValue>> {
        if let ScriptValue::Object(r) | ScriptValue::BoundFunction(r, _) = func {
            if r.is_expired() {
                return Err(BridgeError::Expired);
            }
        }
        let _guard = self.inner.enter();
        let callee = convert::push_value(&self.inner, func);
        let vm_args: Vec<Value> = args
            .iter()
            .map(|a| convert::push_value(&self.inner, a))
            .collect();
        let interp = Interp::new(self.inner.vm.clone());
        match interp.call_value(&callee, vm_args) {
            Ok(values) => Ok(values
                .iter()
                .map(|v| convert::pull_value(&self.inner, v))
                .collect()),
            Err(e) => {
                let message = e.to_string();
                if protected && self.inner.settings.log_errors {
                    self.inner
                        .report_error(&format!("script error: {}", message));
                }
                Err(BridgeError::Runtime(message))
            }
        }
    }

    // ---- globals and indexing -----------------------------------------------

    pub fn get_global(&self, name: &str) -> ScriptValue {
        let value = self.inner.vm.get_global(name);
        convert::pull_value(&self.inner, &value)
    }

    pub fn set_global(&self, name: &str, value: &ScriptValue) {
        let vm_value = convert::push_value(&self.inner, value);
        self.inner.vm.set_global(name, vm_value);
    }

    pub fn create_table(&self) -> ScriptValue {
        let table = Value::new_table();
        ScriptValue::Table(self.inner.refs.register(&table))
    }

    /// Index with full metatable dispatch.
    pub fn index(&self, target: &ScriptValue, key: &ScriptValue) -> BridgeResult<ScriptValue> {
        let _guard = self.inner.enter();
        let t = convert::push_value(&self.inner, target);
        let k = convert::push_value(&self.inner, key);
        let interp = Interp::new(self.inner.vm.clone());
        let value = interp
            .index_value(&t, &k)
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        Ok(convert::pull_value(&self.inner, &value))
    }

    pub fn set_index(
        &self,
        target: &ScriptValue,
        key: &ScriptValue,
        value: &ScriptValue,
    ) -> BridgeResult<()> {
        let _guard = self.inner.enter();
        let t = convert::push_value(&self.inner, target);
        let k = convert::push_value(&self.inner, key);
        let v = convert::push_value(&self.inner, value);
        let interp = Interp::new(self.inner.vm.clone());
        interp
            .setindex_value(&t, &k, v)
            .map_err(|e| BridgeError::Runtime(e.to_string()))
    }

    /// Read a dotted path like `"config.net.port"`.
    pub fn get_field(&self, path: &str, root: PathRoot) -> BridgeResult<ScriptValue> {
        let _guard = self.inner.enter();
        convert::get_field_from_tree(&self.inner, path, root)
    }

    /// Write a dotted path. The walk is validated first; a broken path
    /// writes nothing.
    pub fn set_field(&self, path: &str, root: PathRoot, value: &ScriptValue) -> BridgeResult<()> {
        let _guard = self.inner.enter();
        convert::set_field_from_tree(&self.inner, path, root, value)
    }

    // ---- reference bridge ---------------------------------------------------

    /// Pin a value, returning its (possibly aliased) key.
    pub fn register(&self, value: &ScriptValue) -> RefKey {
        if let Some(key) = value.ref_key() {
            self.inner.refs.retain(key);
            return key;
        }
        let vm_value = convert::push_value(&self.inner, value);
        self.inner.refs.register(&vm_value)
    }

    pub fn release(&self, key: RefKey) {
        self.inner.refs.release(key);
    }

    /// Release that reports a double-release instead of ignoring it.
    pub fn release_checked(&self, key: RefKey) -> BridgeResult<()> {
        match self.inner.refs.release_checked(key) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner
                    .report_error(&format!("reference release failed: {}", e));
                Err(e)
            }
        }
    }

    /// Never fails; a stale key resolves to nil.
    pub fn resolve(&self, key: RefKey) -> ScriptValue {
        let value = self.inner.refs.resolve(key);
        convert::pull_value(&self.inner, &value)
    }

    // ---- smart references ---------------------------------------------------

    /// Promote a value to a strong anchor that survives stack frames.
    pub fn add_smart_reference(&self, value: ScriptValue) -> SmartReference {
        if let Some(key) = value.ref_key() {
            self.inner.refs.retain(key);
        }
        let id = self.inner.next_smart_id.fetch_add(1, Ordering::Relaxed);
        self.inner.smart_refs.lock().insert(id, value.clone());
        SmartReference { id, value }
    }

    /// Unregister the anchor; the underlying key may now be collected once
    /// its other aliases are gone.
    pub fn remove_smart_reference(&self, reference: &SmartReference) {
        if self.inner.smart_refs.lock().remove(&reference.id).is_some() {
            if let Some(key) = reference.value.ref_key() {
                self.inner.refs.release(key);
            }
        }
    }

    pub fn smart_reference_count(&self) -> usize {
        self.inner.smart_refs.lock().len()
    }

    // ---- coroutines ---------------------------------------------------------

    pub fn create_thread(&self, func: &ScriptValue) -> BridgeResult<ScriptValue> {
        let body = convert::push_value(&self.inner, func);
        if !body.is_callable() {
            return Err(BridgeError::Mismatch {
                from: body.type_name(),
                to: "function",
            });
        }
        let thread = Value::Thread(ThreadRef::new(body));
        Ok(ScriptValue::Thread(self.inner.refs.register(&thread)))
    }

    /// Advance a coroutine. Yield and final return both surface as the
    /// resumed values; an abort surfaces as a runtime error and leaves the
    /// thread in the Error status for good.
    pub fn resume(
        &self,
        thread: &ScriptValue,
        args: Vec<ScriptValue>,
    ) -> BridgeResult<Vec<ScriptValue>> {
        let resolved = convert::push_value(&self.inner, thread);
        let handle = match resolved.as_thread() {
            Some(t) => t.clone(),
            None => {
                return Err(BridgeError::Mismatch {
                    from: resolved.type_name(),
                    to: "thread",
                })
            }
        };
        let _guard = self.inner.enter();
        let vm_args: Vec<Value> = args
            .iter()
            .map(|a| convert::push_value(&self.inner, a))
            .collect();
        match handle.resume(&self.inner.vm, vm_args) {
            Ok(ResumeOutcome::Yielded(values)) | Ok(ResumeOutcome::Returned(values)) => Ok(values
                .iter()
                .map(|v| convert::pull_value(&self.inner, v))
                .collect()),
            Err(e) => {
                let message = e.to_string();
                if self.inner.settings.log_errors {
                    self.inner
                        .report_error(&format!("script error: {}", message));
                }
                Err(BridgeError::Runtime(message))
            }
        }
    }

    /// Status of a Thread value, derived on demand. Anything that is not a
    /// live coroutine is Invalid.
    pub fn thread_status(&self, value: &ScriptValue) -> ThreadStatus {
        let key = match value {
            ScriptValue::Thread(k) => *k,
            _ => return ThreadStatus::Invalid,
        };
        match self.inner.refs.resolve(key) {
            Value::Thread(t) => match t.status() {
                CoStatus::Ready | CoStatus::Running | CoStatus::Dead => ThreadStatus::Ok,
                CoStatus::Suspended => ThreadStatus::Suspended,
                CoStatus::Failed => ThreadStatus::Error,
            },
            _ => ThreadStatus::Invalid,
        }
    }

    // ---- hooks and metatable ------------------------------------------------

    /// Install or remove the debug hook handler and select its events.
    pub fn set_hook_handler(
        &self,
        lines: bool,
        calls: bool,
        returns: bool,
        handler: Option<HookHandler>,
    ) {
        let hooks = &self.inner.vm.hooks;
        hooks.line_enabled.store(lines, Ordering::Relaxed);
        hooks.call_enabled.store(calls, Ordering::Relaxed);
        hooks.return_enabled.store(returns, Ordering::Relaxed);
        hooks.set_handler(handler);
    }

    /// Merge entries of a script table into the shared bridged-object
    /// metatable. The dispatch hooks themselves cannot be replaced.
    pub fn extend_user_metatable(&self, table: &ScriptValue) -> BridgeResult<()> {
        const RESERVED: [&str; 5] = ["__index", "__newindex", "__call", "__eq", "__tostring"];
        let resolved = convert::push_value(&self.inner, table);
        let source = match resolved.as_table() {
            Some(t) => t.clone(),
            None => {
                return Err(BridgeError::Mismatch {
                    from: resolved.type_name(),
                    to: "table",
                })
            }
        };
        for (k, v) in source.entries() {
            if let Some(name) = k.as_str() {
                if RESERVED.contains(&name) {
                    continue;
                }
            }
            self.inner
                .user_meta
                .set(k, v)
                .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        }
        Ok(())
    }

    /// Route the VM's `print` output, mirroring the error sink shape.
    pub fn set_print_sink(&self, sink: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.vm.set_print_sink(Some(Box::new(sink)));
    }
}
