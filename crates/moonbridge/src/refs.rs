// Reference bridge: alias-counted pinning of VM values.
//
// The VM registry pins one slot per distinct value; the bridge layers an
// alias count on top so several `ScriptValue`s can share one key. The bridge
// is the only author of key lifetime decisions: host code asks for
// register/release, nothing else.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use moonvm::{Value, VmState, REF_NIL};

use crate::error::{BridgeError, BridgeResult};
use crate::value::RefKey;

struct AliasEntry {
    count: u32,
    /// Identity of the pinned value, for reverse lookup.
    addr: usize,
}

pub struct ReferenceBridge {
    vm: Arc<VmState>,
    aliases: Mutex<AHashMap<RefKey, AliasEntry>>,
    by_addr: Mutex<AHashMap<usize, RefKey>>,
}

impl ReferenceBridge {
    pub fn new(vm: Arc<VmState>) -> ReferenceBridge {
        ReferenceBridge {
            vm,
            aliases: Mutex::new(AHashMap::new()),
            by_addr: Mutex::new(AHashMap::new()),
        }
    }

    /// Pin `value` and return its key. Registering the same underlying value
    /// again hands back the existing key with one more alias.
    pub fn register(&self, value: &Value) -> RefKey {
        let addr = match value.object_addr() {
            Some(addr) => addr,
            None => return REF_NIL,
        };
        if let Some(&key) = self.by_addr.lock().get(&addr) {
            if let Some(entry) = self.aliases.lock().get_mut(&key) {
                entry.count += 1;
                return key;
            }
        }
        let key = self.vm.registry.lock().ref_value(value.clone());
        self.aliases
            .lock()
            .insert(key, AliasEntry { count: 1, addr });
        self.by_addr.lock().insert(addr, key);
        key
    }

    /// Bump the alias count of an existing key. Used when a `ScriptValue`
    /// carrying the key is duplicated on the host side.
    pub fn retain(&self, key: RefKey) {
        if let Some(entry) = self.aliases.lock().get_mut(&key) {
            entry.count += 1;
        }
    }

    /// Drop one alias. The slot is released to the VM once no aliases remain;
    /// collection of the underlying value is then the VM's business.
    pub fn release(&self, key: RefKey) {
        let _ = self.release_inner(key);
    }

    /// Like `release`, but reports a double-release instead of ignoring it.
    pub fn release_checked(&self, key: RefKey) -> BridgeResult<()> {
        if self.release_inner(key) {
            Ok(())
        } else {
            Err(BridgeError::InvalidRef(key))
        }
    }

    fn release_inner(&self, key: RefKey) -> bool {
        if key == REF_NIL {
            return true;
        }
        let mut aliases = self.aliases.lock();
        match aliases.get_mut(&key) {
            Some(entry) => {
                entry.count -= 1;
                if entry.count == 0 {
                    let addr = entry.addr;
                    aliases.remove(&key);
                    self.by_addr.lock().remove(&addr);
                    self.vm.registry.lock().unref(key);
                }
                true
            }
            None => false,
        }
    }

    /// Never fails: an unresolvable key degrades to nil.
    pub fn resolve(&self, key: RefKey) -> Value {
        self.vm.registry.lock().get(key).unwrap_or(Value::Nil)
    }

    pub fn alias_count(&self, key: RefKey) -> u32 {
        self.aliases.lock().get(&key).map(|e| e.count).unwrap_or(0)
    }

    pub fn live_keys(&self) -> usize {
        self.aliases.lock().len()
    }
}
