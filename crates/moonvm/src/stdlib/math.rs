// Math library.

use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::interp::{Interp, VmState};
use crate::value::{arg_or_nil, native, Value};

pub fn open(vm: &Arc<VmState>) {
    let lib = Value::new_table();
    if let Some(t) = lib.as_table() {
        let _ = t.set_str("pi", Value::Number(std::f64::consts::PI));
        let _ = t.set_str("huge", Value::Number(f64::INFINITY));
        let _ = t.set_str("maxinteger", Value::Integer(i64::MAX));
        let _ = t.set_str("mininteger", Value::Integer(i64::MIN));

        let _ = t.set_str("abs", native("math.abs", math_abs));
        let _ = t.set_str("ceil", native("math.ceil", math_ceil));
        let _ = t.set_str("floor", native("math.floor", math_floor));
        let _ = t.set_str("sqrt", unary("math.sqrt", f64::sqrt));
        let _ = t.set_str("sin", unary("math.sin", f64::sin));
        let _ = t.set_str("cos", unary("math.cos", f64::cos));
        let _ = t.set_str("tan", unary("math.tan", f64::tan));
        let _ = t.set_str("exp", unary("math.exp", f64::exp));
        let _ = t.set_str("log", unary("math.log", f64::ln));
        let _ = t.set_str("fmod", native("math.fmod", math_fmod));
        let _ = t.set_str("max", native("math.max", math_max));
        let _ = t.set_str("min", native("math.min", math_min));
        let _ = t.set_str("tointeger", native("math.tointeger", math_tointeger));
        let _ = t.set_str("type", native("math.type", math_type));
    }
    let _ = vm.globals.set_str("math", lib);
}

fn want_num(args: &[Value], n: usize, what: &str) -> VmResult<f64> {
    arg_or_nil(args, n).as_number().ok_or_else(|| {
        VmError::runtime(format!(
            "bad argument #{} to '{}' (number expected)",
            n + 1,
            what
        ))
    })
}

fn unary(name: &str, f: fn(f64) -> f64) -> Value {
    let what = name.rsplit('.').next().unwrap_or(name).to_string();
    native(name, move |_interp: &Interp, args: Vec<Value>| {
        Ok(vec![Value::Number(f(want_num(&args, 0, &what)?))])
    })
}

fn math_abs(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    match arg_or_nil(&args, 0) {
        Value::Integer(i) => Ok(vec![Value::Integer(i.wrapping_abs())]),
        Value::Number(n) => Ok(vec![Value::Number(n.abs())]),
        _ => Err(VmError::runtime(
            "bad argument #1 to 'abs' (number expected)",
        )),
    }
}

fn math_ceil(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    match arg_or_nil(&args, 0) {
        Value::Integer(i) => Ok(vec![Value::Integer(i)]),
        Value::Number(n) => Ok(vec![Value::Integer(n.ceil() as i64)]),
        _ => Err(VmError::runtime(
            "bad argument #1 to 'ceil' (number expected)",
        )),
    }
}

fn math_floor(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    match arg_or_nil(&args, 0) {
        Value::Integer(i) => Ok(vec![Value::Integer(i)]),
        Value::Number(n) => Ok(vec![Value::Integer(n.floor() as i64)]),
        _ => Err(VmError::runtime(
            "bad argument #1 to 'floor' (number expected)",
        )),
    }
}

fn math_fmod(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let a = want_num(&args, 0, "fmod")?;
    let b = want_num(&args, 1, "fmod")?;
    Ok(vec![Value::Number(a % b)])
}

fn math_max(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    fold_extreme(args, "max", |a, b| if b > a { b } else { a })
}

fn math_min(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    fold_extreme(args, "min", |a, b| if b < a { b } else { a })
}

fn fold_extreme(
    args: Vec<Value>,
    what: &str,
    pick: fn(f64, f64) -> f64,
) -> VmResult<Vec<Value>> {
    if args.is_empty() {
        return Err(VmError::runtime(format!(
            "bad argument #1 to '{}' (number expected)",
            what
        )));
    }
    let mut best = want_num(&args, 0, what)?;
    let mut best_value = args[0].clone();
    for i in 1..args.len() {
        let n = want_num(&args, i, what)?;
        if pick(best, n) == n && n != best {
            best = n;
            best_value = args[i].clone();
        }
    }
    Ok(vec![best_value])
}

fn math_tointeger(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let result = arg_or_nil(&args, 0)
        .as_integer()
        .map(Value::Integer)
        .unwrap_or(Value::Nil);
    Ok(vec![result])
}

fn math_type(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let result = match arg_or_nil(&args, 0) {
        Value::Integer(_) => Value::str("integer"),
        Value::Number(_) => Value::str("float"),
        _ => Value::Nil,
    };
    Ok(vec![result])
}
