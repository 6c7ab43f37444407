// Coroutines: create/resume/yield, status transitions, error handling.

use super::run;
use crate::{
    compile, open_libs, CoStatus, Interp, LibsLoader, ResumeOutcome, ThreadRef, Value, VmState,
};

#[test]
fn test_yield_and_resume() {
    let result = run(r#"
        local co = coroutine.create(function(a, b)
            local c = coroutine.yield(a + b)
            return a + b + c
        end)
        local ok, sum = coroutine.resume(co, 1, 2)
        assert(ok and sum == 3)
        local ok2, total = coroutine.resume(co, 10)
        assert(ok2 and total == 13)
        assert(coroutine.status(co) == "dead")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_status_strings() {
    let result = run(r#"
        local co
        co = coroutine.create(function()
            assert(coroutine.status(co) == "running")
            coroutine.yield()
        end)
        assert(coroutine.status(co) == "suspended")
        coroutine.resume(co)
        assert(coroutine.status(co) == "suspended")
        coroutine.resume(co)
        assert(coroutine.status(co) == "dead")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_resume_dead_fails() {
    let result = run(r#"
        local co = coroutine.create(function() end)
        coroutine.resume(co)
        local ok, err = coroutine.resume(co)
        assert(ok == false)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_error_inside_coroutine() {
    let result = run(r#"
        local co = coroutine.create(function()
            error("inside")
        end)
        local ok, err = coroutine.resume(co)
        assert(ok == false)
        assert(string.sub(err, -6) == "inside")
        assert(coroutine.status(co) == "dead")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_yield_outside_coroutine_errors() {
    let err = run("coroutine.yield()").unwrap_err();
    assert!(err.to_string().contains("outside a coroutine"));
}

#[test]
fn test_wrap() {
    let result = run(r#"
        local gen = coroutine.wrap(function()
            for i = 1, 3 do coroutine.yield(i) end
        end)
        assert(gen() == 1)
        assert(gen() == 2)
        assert(gen() == 3)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_producer_consumer() {
    let result = run(r#"
        local co = coroutine.create(function()
            local total = 0
            while true do
                local n = coroutine.yield()
                if n == nil then break end
                total = total + n
            end
            return total
        end)
        coroutine.resume(co)
        for i = 1, 4 do coroutine.resume(co, i) end
        local ok, total = coroutine.resume(co)
        assert(ok and total == 10)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_host_side_resume() {
    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let chunk = compile(
        "return function(x) local y = coroutine.yield(x * 2) return y end",
        "co",
    )
    .expect("compile failed");
    let interp = Interp::new(vm.clone());
    let func = interp
        .exec_chunk(&chunk, Vec::new())
        .expect("chunk failed")
        .remove(0);

    let thread = ThreadRef::new(func);
    assert_eq!(thread.status(), CoStatus::Ready);

    match thread.resume(&vm, vec![Value::Integer(21)]).expect("resume") {
        ResumeOutcome::Yielded(values) => assert_eq!(values[0].as_integer(), Some(42)),
        ResumeOutcome::Returned(_) => panic!("expected a yield"),
    }
    assert_eq!(thread.status(), CoStatus::Suspended);

    match thread.resume(&vm, vec![Value::str("done")]).expect("resume") {
        ResumeOutcome::Returned(values) => assert_eq!(values[0].as_str(), Some("done")),
        ResumeOutcome::Yielded(_) => panic!("expected a return"),
    }
    assert_eq!(thread.status(), CoStatus::Dead);
}

#[test]
fn test_dropping_suspended_coroutine_does_not_hang() {
    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let chunk = compile("return function() coroutine.yield() end", "co").expect("compile failed");
    let interp = Interp::new(vm.clone());
    let func = interp
        .exec_chunk(&chunk, Vec::new())
        .expect("chunk failed")
        .remove(0);

    let thread = ThreadRef::new(func);
    thread.resume(&vm, Vec::new()).expect("resume");
    assert_eq!(thread.status(), CoStatus::Suspended);
    // Dropping the handle disconnects the worker; it unwinds silently.
    drop(thread);
}

#[test]
fn test_failed_coroutine_status() {
    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let chunk = compile("return function() error('boom') end", "co").expect("compile failed");
    let interp = Interp::new(vm.clone());
    let func = interp
        .exec_chunk(&chunk, Vec::new())
        .expect("chunk failed")
        .remove(0);

    let thread = ThreadRef::new(func);
    assert!(thread.resume(&vm, Vec::new()).is_err());
    assert_eq!(thread.status(), CoStatus::Failed);
    assert!(thread.resume(&vm, Vec::new()).is_err());
}
