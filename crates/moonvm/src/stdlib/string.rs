// String library. The library table doubles as the index target for string
// values, so `s:upper()` works.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{VmError, VmResult};
use crate::interp::{Interp, VmState};
use crate::table::{Table, TableRef};
use crate::value::{arg_or_nil, native, require_arg, Value};

pub fn open(vm: &Arc<VmState>) {
    let table = TableRef::new(Table::new());
    let set = |name: &str, v: Value| {
        let _ = table.set_str(name, v);
    };

    set("len", native("string.len", str_len));
    set("sub", native("string.sub", str_sub));
    set("upper", native("string.upper", str_upper));
    set("lower", native("string.lower", str_lower));
    set("rep", native("string.rep", str_rep));
    set("reverse", native("string.reverse", str_reverse));
    set("byte", native("string.byte", str_byte));
    set("char", native("string.char", str_char));
    set("format", native("string.format", str_format));

    let _ = vm.globals.set_str("string", Value::Table(table.clone()));
    vm.set_string_library(table);
}

fn want_str(args: &[Value], n: usize, what: &str) -> VmResult<SmolStr> {
    match args.get(n) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(Value::Integer(_)) | Some(Value::Number(_)) => {
            Ok(SmolStr::new(args[n].display_basic()))
        }
        _ => Err(VmError::runtime(format!(
            "bad argument #{} to '{}' (string expected)",
            n + 1,
            what
        ))),
    }
}

fn str_len(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "len")?;
    Ok(vec![Value::Integer(s.len() as i64)])
}

/// Lua index resolution: 1-based, negatives count from the end.
fn resolve_range(len: usize, i: i64, j: i64) -> (usize, usize) {
    let len = len as i64;
    let from = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
    let to = if j < 0 { len + j + 1 } else { j.min(len) };
    if from > to {
        (0, 0)
    } else {
        (from as usize - 1, to as usize)
    }
}

fn str_sub(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "sub")?;
    let i = arg_or_nil(&args, 1).as_integer().unwrap_or(1);
    let j = arg_or_nil(&args, 2).as_integer().unwrap_or(-1);
    let bytes = s.as_bytes();
    let (from, to) = resolve_range(bytes.len(), i, j);
    Ok(vec![Value::str(String::from_utf8_lossy(&bytes[from..to]))])
}

fn str_upper(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "upper")?;
    Ok(vec![Value::str(s.to_uppercase())])
}

fn str_lower(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "lower")?;
    Ok(vec![Value::str(s.to_lowercase())])
}

fn str_rep(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "rep")?;
    let n = arg_or_nil(&args, 1).as_integer().unwrap_or(0).max(0);
    Ok(vec![Value::str(s.repeat(n as usize))])
}

fn str_reverse(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "reverse")?;
    Ok(vec![Value::str(s.chars().rev().collect::<String>())])
}

fn str_byte(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let s = want_str(&args, 0, "byte")?;
    let i = arg_or_nil(&args, 1).as_integer().unwrap_or(1);
    let j = arg_or_nil(&args, 2).as_integer().unwrap_or(i);
    let (from, to) = resolve_range(s.len(), i, j);
    Ok(s.as_bytes()[from..to]
        .iter()
        .map(|b| Value::Integer(*b as i64))
        .collect())
}

fn str_char(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let mut bytes = Vec::with_capacity(args.len());
    for (i, a) in args.iter().enumerate() {
        let code = a.as_integer().ok_or_else(|| {
            VmError::runtime(format!("bad argument #{} to 'char' (number expected)", i + 1))
        })?;
        if !(0..=255).contains(&code) {
            return Err(VmError::runtime(format!(
                "bad argument #{} to 'char' (value out of range)",
                i + 1
            )));
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes)
        .map(|s| vec![Value::str(s)])
        .map_err(|_| VmError::runtime("'char' produced invalid utf-8"))
}

/// Subset of `string.format`: %s %q %d %i %f %g %x %X and %%.
fn str_format(interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let fmt = require_arg(&args, 0, "format")?;
    let fmt = fmt
        .as_str()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'format' (string expected)"))?;
    let mut out = String::with_capacity(fmt.len());
    let mut next = 1usize;
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let spec = chars
            .next()
            .ok_or_else(|| VmError::runtime("invalid format string to 'format'"))?;
        if spec == '%' {
            out.push('%');
            continue;
        }
        let arg = arg_or_nil(&args, next);
        next += 1;
        match spec {
            's' => out.push_str(&interp.tostring_value(&arg)?),
            'q' => {
                out.push('"');
                for ch in interp.tostring_value(&arg)?.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            'd' | 'i' => {
                let n = arg.as_integer().ok_or_else(|| {
                    VmError::runtime(format!(
                        "bad argument #{} to 'format' (number expected)",
                        next
                    ))
                })?;
                let mut buf = itoa::Buffer::new();
                out.push_str(buf.format(n));
            }
            'f' => {
                let n = arg.as_number().ok_or_else(|| {
                    VmError::runtime(format!(
                        "bad argument #{} to 'format' (number expected)",
                        next
                    ))
                })?;
                out.push_str(&format!("{:.6}", n));
            }
            'g' => {
                let n = arg.as_number().ok_or_else(|| {
                    VmError::runtime(format!(
                        "bad argument #{} to 'format' (number expected)",
                        next
                    ))
                })?;
                out.push_str(&format!("{}", n));
            }
            'x' => {
                let n = arg.as_integer().ok_or_else(|| {
                    VmError::runtime(format!(
                        "bad argument #{} to 'format' (number expected)",
                        next
                    ))
                })?;
                out.push_str(&format!("{:x}", n));
            }
            'X' => {
                let n = arg.as_integer().ok_or_else(|| {
                    VmError::runtime(format!(
                        "bad argument #{} to 'format' (number expected)",
                        next
                    ))
                })?;
                out.push_str(&format!("{:X}", n));
            }
            other => {
                return Err(VmError::runtime(format!(
                    "invalid conversion '%{}' to 'format'",
                    other
                )))
            }
        }
    }
    Ok(vec![Value::str(out)])
}
