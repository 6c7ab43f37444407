// Base library: the unqualified globals.

use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::error::{VmError, VmErrorKind, VmResult};
use crate::interp::{Interp, VmState};
use crate::value::{arg_or_nil, native, require_arg, Value};

pub fn open(vm: &Arc<VmState>) {
    let g = &vm.globals;
    let set = |name: &str, v: Value| {
        let _ = g.set_str(name, v);
    };

    set("print", native("print", lua_print));
    set("type", native("type", lua_type));
    set("tostring", native("tostring", lua_tostring));
    set("tonumber", native("tonumber", lua_tonumber));
    set("pairs", native("pairs", lua_pairs));
    set("ipairs", native("ipairs", lua_ipairs));
    set("error", native("error", lua_error));
    set("assert", native("assert", lua_assert));
    set("select", native("select", lua_select));
    set("rawget", native("rawget", lua_rawget));
    set("rawset", native("rawset", lua_rawset));
    set("rawequal", native("rawequal", lua_rawequal));
    set("rawlen", native("rawlen", lua_rawlen));
    set("setmetatable", native("setmetatable", lua_setmetatable));
    set("getmetatable", native("getmetatable", lua_getmetatable));
    set("pcall", native("pcall", lua_pcall));
    set("_G", Value::Table(g.clone()));
}

fn lua_print(interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let mut line = String::new();
    for (i, v) in args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&interp.tostring_value(v)?);
    }
    interp.vm.print_line(&line);
    Ok(Vec::new())
}

fn lua_type(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = require_arg(&args, 0, "type")?;
    Ok(vec![Value::str(v.type_name())])
}

fn lua_tostring(interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = require_arg(&args, 0, "tostring")?;
    Ok(vec![Value::Str(SmolStr::new(interp.tostring_value(&v)?))])
}

fn lua_tonumber(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = arg_or_nil(&args, 0);
    let result = match &v {
        Value::Integer(_) | Value::Number(_) => v.clone(),
        Value::Str(s) => parse_number(s.as_str().trim()),
        _ => Value::Nil,
    };
    Ok(vec![result])
}

pub(crate) fn parse_number(s: &str) -> Value {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::Integer(i);
        }
        return Value::Nil;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    match s.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Nil,
    }
}

fn lua_pairs(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = require_arg(&args, 0, "pairs")?;
    let table = v
        .as_table()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'pairs' (table expected)"))?
        .clone();
    // Iterate over a snapshot so the loop body may mutate the table.
    let entries = table.entries();
    let cursor = Mutex::new(0usize);
    let iter = native("pairs.iterator", move |_interp, _args| {
        let mut pos = cursor.lock();
        if *pos < entries.len() {
            let (k, v) = entries[*pos].clone();
            *pos += 1;
            Ok(vec![k, v])
        } else {
            Ok(vec![Value::Nil])
        }
    });
    Ok(vec![iter, Value::Table(table), Value::Nil])
}

fn lua_ipairs(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = require_arg(&args, 0, "ipairs")?;
    if v.as_table().is_none() {
        return Err(VmError::runtime(
            "bad argument #1 to 'ipairs' (table expected)",
        ));
    }
    let iter = native("ipairs.iterator", |_interp, args| {
        let table = match arg_or_nil(&args, 0) {
            Value::Table(t) => t,
            _ => return Ok(vec![Value::Nil]),
        };
        let i = arg_or_nil(&args, 1).as_integer().unwrap_or(0) + 1;
        let v = table.get(&Value::Integer(i));
        if v.is_nil() {
            Ok(vec![Value::Nil])
        } else {
            Ok(vec![Value::Integer(i), v])
        }
    });
    Ok(vec![iter, v, Value::Integer(0)])
}

fn lua_error(interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = arg_or_nil(&args, 0);
    let message = match &v {
        Value::Str(s) => s.to_string(),
        other => interp.tostring_value(other)?,
    };
    Err(VmError::runtime(message))
}

fn lua_assert(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let v = arg_or_nil(&args, 0);
    if v.truthy() {
        return Ok(args);
    }
    let message = match arg_or_nil(&args, 1) {
        Value::Nil => "assertion failed!".to_string(),
        Value::Str(s) => s.to_string(),
        other => other.display_basic(),
    };
    Err(VmError::runtime(message))
}

fn lua_select(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let selector = require_arg(&args, 0, "select")?;
    if selector.as_str() == Some("#") {
        return Ok(vec![Value::Integer(args.len() as i64 - 1)]);
    }
    let n = selector
        .as_integer()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'select' (number expected)"))?;
    if n < 1 {
        return Err(VmError::runtime(
            "bad argument #1 to 'select' (index out of range)",
        ));
    }
    Ok(args.into_iter().skip(n as usize).collect())
}

fn lua_rawget(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = require_arg(&args, 0, "rawget")?;
    let k = require_arg(&args, 1, "rawget")?;
    let table = t
        .as_table()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'rawget' (table expected)"))?;
    Ok(vec![table.get(&k)])
}

fn lua_rawset(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = require_arg(&args, 0, "rawset")?;
    let k = require_arg(&args, 1, "rawset")?;
    let v = arg_or_nil(&args, 2);
    let table = t
        .as_table()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'rawset' (table expected)"))?;
    table.set(k, v)?;
    Ok(vec![t])
}

fn lua_rawequal(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let a = arg_or_nil(&args, 0);
    let b = arg_or_nil(&args, 1);
    Ok(vec![Value::Boolean(a.raw_eq(&b))])
}

fn lua_rawlen(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    match arg_or_nil(&args, 0) {
        Value::Table(t) => Ok(vec![Value::Integer(t.len())]),
        Value::Str(s) => Ok(vec![Value::Integer(s.len() as i64)]),
        _ => Err(VmError::runtime(
            "bad argument #1 to 'rawlen' (table or string expected)",
        )),
    }
}

fn lua_setmetatable(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let t = require_arg(&args, 0, "setmetatable")?;
    let table = t
        .as_table()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'setmetatable' (table expected)"))?;
    match arg_or_nil(&args, 1) {
        Value::Nil => table.set_metatable(None),
        Value::Table(mt) => table.set_metatable(Some(mt)),
        _ => {
            return Err(VmError::runtime(
                "bad argument #2 to 'setmetatable' (nil or table expected)",
            ))
        }
    }
    Ok(vec![t])
}

fn lua_getmetatable(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let meta = match arg_or_nil(&args, 0) {
        Value::Table(t) => t.metatable(),
        Value::UserData(u) => u.metatable(),
        _ => None,
    };
    Ok(vec![meta.map(Value::Table).unwrap_or(Value::Nil)])
}

fn lua_pcall(interp: &Interp, mut args: Vec<Value>) -> VmResult<Vec<Value>> {
    if args.is_empty() {
        return Err(VmError::runtime("bad argument #1 to 'pcall' (value expected)"));
    }
    let func = args.remove(0);
    match interp.call_value(&func, args) {
        Ok(mut results) => {
            let mut out = Vec::with_capacity(results.len() + 1);
            out.push(Value::Boolean(true));
            out.append(&mut results);
            Ok(out)
        }
        // A torn-down coroutine must keep unwinding; pcall does not catch it.
        Err(e) if e.kind == VmErrorKind::Terminated => Err(e),
        Err(e) => Ok(vec![Value::Boolean(false), Value::str(e.to_string())]),
    }
}
