// Tables: array part + hash part, with an optional metatable.
//
// Locking rule: the interpreter never holds a table lock while evaluating
// script code. All accessors here take short locks and hand back clones.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Hashable projection of a table key.
#[derive(Clone, PartialEq, Eq, Hash)]
enum TableKey {
    Int(i64),
    /// Float keys that are not exact integers, by bit pattern.
    Num(u64),
    Str(SmolStr),
    Bool(bool),
    /// Identity of a compound value.
    Obj(usize),
}

impl TableKey {
    fn from_value(v: &Value) -> VmResult<TableKey> {
        match v {
            Value::Nil => Err(VmError::runtime("table index is nil")),
            Value::Boolean(b) => Ok(TableKey::Bool(*b)),
            Value::Integer(i) => Ok(TableKey::Int(*i)),
            Value::Number(n) => {
                if n.is_nan() {
                    Err(VmError::runtime("table index is NaN"))
                } else if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    Ok(TableKey::Int(*n as i64))
                } else {
                    Ok(TableKey::Num(n.to_bits()))
                }
            }
            Value::Str(s) => Ok(TableKey::Str(s.clone())),
            other => Ok(TableKey::Obj(other.object_addr().unwrap_or(0))),
        }
    }
}

/// Hash-part slot keeps the original key value so iteration can hand it back.
struct Slot {
    key: Value,
    value: Value,
}

pub struct Table {
    array: Vec<Value>,
    hash: AHashMap<TableKey, Slot>,
    meta: Option<TableRef>,
}

impl Table {
    pub fn new() -> Table {
        Table {
            array: Vec::new(),
            hash: AHashMap::new(),
            meta: None,
        }
    }

    fn array_index(&self, key: &Value) -> Option<usize> {
        let i = match key {
            Value::Integer(i) => *i,
            Value::Number(n) if n.fract() == 0.0 => *n as i64,
            _ => return None,
        };
        if i >= 1 && (i as usize) <= self.array.len() {
            Some(i as usize - 1)
        } else {
            None
        }
    }

    pub fn raw_get(&self, key: &Value) -> Value {
        if let Some(idx) = self.array_index(key) {
            return self.array[idx].clone();
        }
        match TableKey::from_value(key) {
            Ok(k) => self
                .hash
                .get(&k)
                .map(|s| s.value.clone())
                .unwrap_or(Value::Nil),
            Err(_) => Value::Nil,
        }
    }

    pub fn raw_set(&mut self, key: Value, value: Value) -> VmResult<()> {
        if let Some(idx) = self.array_index(&key) {
            self.array[idx] = value;
            // Trailing nils shrink the border.
            while matches!(self.array.last(), Some(Value::Nil)) {
                self.array.pop();
            }
            return Ok(());
        }
        // Append at the border grows the array part and pulls any queued
        // integer keys out of the hash part.
        if let TableKey::Int(i) = TableKey::from_value(&key)? {
            if i == self.array.len() as i64 + 1 {
                if value.is_nil() {
                    return Ok(());
                }
                self.array.push(value);
                let mut next = self.array.len() as i64 + 1;
                while let Some(slot) = self.hash.remove(&TableKey::Int(next)) {
                    self.array.push(slot.value);
                    next += 1;
                }
                return Ok(());
            }
        }
        let k = TableKey::from_value(&key)?;
        if value.is_nil() {
            self.hash.remove(&k);
        } else {
            self.hash.insert(k, Slot { key, value });
        }
        Ok(())
    }

    /// The `#` border: length of the contiguous array part.
    pub fn len(&self) -> i64 {
        self.array.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Snapshot of all entries, array part first. Iteration over a snapshot
    /// is safe against mutation from inside the loop body.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut out = Vec::with_capacity(self.array.len() + self.hash.len());
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                out.push((Value::Integer(i as i64 + 1), v.clone()));
            }
        }
        for slot in self.hash.values() {
            out.push((slot.key.clone(), slot.value.clone()));
        }
        out
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.meta.clone()
    }

    pub fn set_metatable(&mut self, meta: Option<TableRef>) {
        self.meta = meta;
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

/// Shared handle to a table. Identity (`addr`) is the Lua notion of table
/// equality.
#[derive(Clone)]
pub struct TableRef(Arc<Mutex<Table>>);

impl TableRef {
    pub fn new(table: Table) -> TableRef {
        TableRef(Arc::new(Mutex::new(table)))
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, key: &Value) -> Value {
        self.0.lock().raw_get(key)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.0.lock().raw_get(&Value::str(key))
    }

    pub fn set(&self, key: Value, value: Value) -> VmResult<()> {
        self.0.lock().raw_set(key, value)
    }

    pub fn set_str(&self, key: &str, value: Value) -> VmResult<()> {
        self.0.lock().raw_set(Value::str(key), value)
    }

    pub fn len(&self) -> i64 {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0.lock().entries()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.lock().metatable()
    }

    pub fn set_metatable(&self, meta: Option<TableRef>) {
        self.0.lock().set_metatable(meta);
    }
}
