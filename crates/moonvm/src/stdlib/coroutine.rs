// Coroutine library.

use std::sync::Arc;

use crate::coroutine::{ResumeOutcome, ThreadRef};
use crate::error::{VmError, VmErrorKind, VmResult};
use crate::interp::{Interp, VmState};
use crate::value::{native, require_arg, Value};

pub fn open(vm: &Arc<VmState>) {
    let lib = Value::new_table();
    if let Some(t) = lib.as_table() {
        let _ = t.set_str("create", native("coroutine.create", co_create));
        let _ = t.set_str("resume", native("coroutine.resume", co_resume));
        let _ = t.set_str("yield", native("coroutine.yield", co_yield));
        let _ = t.set_str("status", native("coroutine.status", co_status));
        let _ = t.set_str("wrap", native("coroutine.wrap", co_wrap));
        let _ = t.set_str("isyieldable", native("coroutine.isyieldable", co_isyieldable));
    }
    let _ = vm.globals.set_str("coroutine", lib);
}

fn co_create(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let func = require_arg(&args, 0, "create")?;
    if !func.is_callable() {
        return Err(VmError::runtime(
            "bad argument #1 to 'create' (function expected)",
        ));
    }
    Ok(vec![Value::Thread(ThreadRef::new(func))])
}

fn co_resume(interp: &Interp, mut args: Vec<Value>) -> VmResult<Vec<Value>> {
    let co = require_arg(&args, 0, "resume")?;
    let thread = co
        .as_thread()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'resume' (coroutine expected)"))?
        .clone();
    args.remove(0);
    match thread.resume(&interp.vm, args) {
        Ok(ResumeOutcome::Yielded(mut values)) | Ok(ResumeOutcome::Returned(mut values)) => {
            let mut out = Vec::with_capacity(values.len() + 1);
            out.push(Value::Boolean(true));
            out.append(&mut values);
            Ok(out)
        }
        Err(e) if e.kind == VmErrorKind::Terminated => Err(e),
        Err(e) => Ok(vec![Value::Boolean(false), Value::str(e.to_string())]),
    }
}

fn co_yield(interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    interp.yield_values(args)
}

fn co_status(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let co = require_arg(&args, 0, "status")?;
    let thread = co
        .as_thread()
        .ok_or_else(|| VmError::runtime("bad argument #1 to 'status' (coroutine expected)"))?;
    Ok(vec![Value::str(thread.status().as_str())])
}

fn co_wrap(_interp: &Interp, args: Vec<Value>) -> VmResult<Vec<Value>> {
    let func = require_arg(&args, 0, "wrap")?;
    if !func.is_callable() {
        return Err(VmError::runtime(
            "bad argument #1 to 'wrap' (function expected)",
        ));
    }
    let thread = ThreadRef::new(func);
    let wrapped = native("coroutine.wrap.closure", move |interp: &Interp, args| {
        match thread.resume(&interp.vm, args)? {
            ResumeOutcome::Yielded(values) | ResumeOutcome::Returned(values) => Ok(values),
        }
    });
    Ok(vec![wrapped])
}

fn co_isyieldable(interp: &Interp, _args: Vec<Value>) -> VmResult<Vec<Value>> {
    Ok(vec![Value::Boolean(interp.can_yield())])
}
