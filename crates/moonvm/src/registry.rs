// Registry of pinned values, the `luaL_ref`/`luaL_unref` analog.
//
// Slots hold strong value handles; as long as a slot is live, the referenced
// object cannot be collected. IDs are reused through a free list.

use ahash::AHashMap;

use crate::value::Value;

pub type RefId = i32;

/// Reference to nil; no slot is allocated for it.
pub const REF_NIL: RefId = -1;
/// Invalid reference, never resolvable.
pub const NO_REF: RefId = -2;

pub struct RefRegistry {
    slots: AHashMap<RefId, Value>,
    next_id: RefId,
    free_list: Vec<RefId>,
}

impl RefRegistry {
    pub fn new() -> Self {
        RefRegistry {
            slots: AHashMap::new(),
            next_id: 1,
            free_list: Vec::new(),
        }
    }

    /// Pin `value` and hand back a stable id.
    pub fn ref_value(&mut self, value: Value) -> RefId {
        if value.is_nil() {
            return REF_NIL;
        }
        let id = if let Some(id) = self.free_list.pop() {
            id
        } else {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id < 1 {
                self.next_id = 1;
            }
            id
        };
        self.slots.insert(id, value);
        id
    }

    pub fn get(&self, id: RefId) -> Option<Value> {
        if id == REF_NIL {
            return Some(Value::Nil);
        }
        self.slots.get(&id).cloned()
    }

    /// Drop a slot. Returns false when the id was not live.
    pub fn unref(&mut self, id: RefId) -> bool {
        if id == REF_NIL {
            return true;
        }
        if self.slots.remove(&id).is_some() {
            self.free_list.push(id);
            true
        } else {
            false
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.len()
    }
}

impl Default for RefRegistry {
    fn default() -> Self {
        RefRegistry::new()
    }
}
