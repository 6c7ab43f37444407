// moonbridge: a two-way value bridge between a host object model and the
// moonvm scripting VM.
//
// Host objects become indexable/callable script values through a shared
// metatable and weak references; script values travel back as `ScriptValue`s
// pinned by an alias-counted reference bridge. `ScriptState` is the entry
// point: one per host context, holding the VM, the bridge bookkeeping, the
// error sink, and the reentrancy (inception) tracking.

pub mod context;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod refs;
pub mod state;
pub mod value;

pub use context::{register_context, state_for_context, unregister_context, ContextId};
pub use convert::PathRoot;
pub use error::{BridgeError, BridgeResult};
pub use host::{FieldKind, FieldStore, FieldValue, HostObject, MethodDesc, MethodFn};
pub use refs::ReferenceBridge;
pub use state::{ScriptState, Settings, SmartReference};
pub use value::{
    HostObjectArc, HostObjectRef, RefKey, ScriptValue, ThreadStatus, ValueKind, NO_REF, REF_NIL,
};

// Debug hook surface, re-exported from the VM.
pub use moonvm::{DebugInfo, HookEvent, HookHandler, LibsLoader};

#[cfg(test)]
mod test;
