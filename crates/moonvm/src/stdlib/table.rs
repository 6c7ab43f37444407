// Table library.

use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::interp::{Interp, VmState};
use crate::table::TableRef;
use crate::value::{arg_or_nil, native, require_arg, Value};

pub fn open(vm: &Arc<VmState>) {
    let lib = Value::new_table();
    if let Some(t) = lib.as_table() {
        let _ = t.set_str("insert", native("table.insert", tbl_insert));
        let _ = t.set_str("remove", native("table.remove", tbl_remove));
        let _ = t.set_str("concat", native("table.concat", tbl_concat));
        let _ = t.set_str("unpack", native("table.unpack", tbl_unpack));
    }
    let _ = vm.globals.set_str("table", lib);
}

fn want_table(args: &[Value], what: &str) -> VmResult<TableRef> {
    args.first()
        .and_then(|v| v.as_table())
        .cloned()
        .ok_or_else(|| {
            VmError::runtime(format!("bad argument #1 to '{}' (table expected)", what))
        })
}

fn tbl_insert(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = want_table(&args, "insert")?;
    let len = t.len();
    match args.len() {
        0 | 1 => Err(VmError::runtime("wrong number of arguments to 'insert'")),
        2 => {
            t.set(Value::Integer(len + 1), args[1].clone())?;
            Ok(Vec::new())
        }
        _ => {
            let pos = args[1]
                .as_integer()
                .ok_or_else(|| VmError::runtime("bad argument #2 to 'insert' (number expected)"))?;
            if pos < 1 || pos > len + 1 {
                return Err(VmError::runtime(
                    "bad argument #2 to 'insert' (position out of bounds)",
                ));
            }
            // Shift up from the end.
            let mut i = len;
            while i >= pos {
                let v = t.get(&Value::Integer(i));
                t.set(Value::Integer(i + 1), v)?;
                i -= 1;
            }
            t.set(Value::Integer(pos), args[2].clone())?;
            Ok(Vec::new())
        }
    }
}

fn tbl_remove(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = want_table(&args, "remove")?;
    let len = t.len();
    let pos = match args.get(1) {
        Some(v) => v
            .as_integer()
            .ok_or_else(|| VmError::runtime("bad argument #2 to 'remove' (number expected)"))?,
        None => len,
    };
    if len == 0 {
        return Ok(vec![Value::Nil]);
    }
    if pos < 1 || pos > len {
        return Err(VmError::runtime(
            "bad argument #2 to 'remove' (position out of bounds)",
        ));
    }
    let removed = t.get(&Value::Integer(pos));
    for i in pos..len {
        let v = t.get(&Value::Integer(i + 1));
        t.set(Value::Integer(i), v)?;
    }
    t.set(Value::Integer(len), Value::Nil)?;
    Ok(vec![removed])
}

fn tbl_concat(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = want_table(&args, "concat")?;
    let sep = match arg_or_nil(&args, 1) {
        Value::Nil => String::new(),
        Value::Str(s) => s.to_string(),
        other => other.display_basic(),
    };
    let from = arg_or_nil(&args, 2).as_integer().unwrap_or(1);
    let to = arg_or_nil(&args, 3).as_integer().unwrap_or_else(|| t.len());
    let mut out = String::new();
    for i in from..=to {
        let v = t.get(&Value::Integer(i));
        match v {
            Value::Str(_) | Value::Integer(_) | Value::Number(_) => {
                if i > from {
                    out.push_str(&sep);
                }
                out.push_str(&v.display_basic());
            }
            _ => {
                return Err(VmError::runtime(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    i
                )))
            }
        }
    }
    Ok(vec![Value::str(out)])
}

fn tbl_unpack(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let _ = require_arg(&args, 0, "unpack")?;
    let t = want_table(&args, "unpack")?;
    let from = arg_or_nil(&args, 1).as_integer().unwrap_or(1);
    let to = arg_or_nil(&args, 2).as_integer().unwrap_or_else(|| t.len());
    let mut out = Vec::new();
    for i in from..=to {
        out.push(t.get(&Value::Integer(i)));
    }
    Ok(out)
}
