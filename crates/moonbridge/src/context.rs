// Context-to-state registry.
//
// One embedding state per logical host context. The map is process-wide
// with explicit insertion and removal; nothing is created implicitly.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::state::ScriptState;

/// Opaque handle identifying a host context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

static REGISTRY: Lazy<RwLock<AHashMap<ContextId, ScriptState>>> =
    Lazy::new(|| RwLock::new(AHashMap::new()));

/// Bind `state` to `context`, replacing and returning any previous binding.
pub fn register_context(context: ContextId, state: ScriptState) -> Option<ScriptState> {
    REGISTRY.write().insert(context, state)
}

pub fn unregister_context(context: ContextId) -> Option<ScriptState> {
    REGISTRY.write().remove(&context)
}

/// Locate the state owning `context`, if one is registered.
pub fn state_for_context(context: ContextId) -> Option<ScriptState> {
    REGISTRY.read().get(&context).cloned()
}
