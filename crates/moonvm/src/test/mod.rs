pub mod test_basic;
pub mod test_chunk;
pub mod test_coroutine;
pub mod test_operators;
pub mod test_string;
pub mod test_table;

use crate::*;

/// Compile and run a snippet in a fresh VM with the full stdlib.
pub(crate) fn run(src: &str) -> VmResult<Vec<Value>> {
    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let chunk = compile(src, "test")?;
    Interp::new(vm).exec_chunk(&chunk, Vec::new())
}

/// Run a snippet and hand back its first return value.
pub(crate) fn eval(src: &str) -> Value {
    run(src)
        .expect("script failed")
        .into_iter()
        .next()
        .unwrap_or(Value::Nil)
}
