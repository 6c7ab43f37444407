// moonvm: a small embeddable scripting VM with Lua semantics.
//
// The embedding surface is deliberately compact: compile source into a
// `Chunk`, execute it through an `Interp` bound to a shared `VmState`, and
// exchange `Value`s. Everything is `Send`, so coroutine bodies can run on
// worker threads.

pub mod ast;
pub mod chunk;
pub mod coroutine;
pub mod debug;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod stdlib;
pub mod table;
pub mod value;

pub use chunk::{deserialize_chunk, is_bytecode, serialize_chunk};
pub use coroutine::{CoStatus, ResumeOutcome, ThreadRef};
pub use debug::{DebugInfo, HookEvent, HookHandler};
pub use error::{VmError, VmErrorKind, VmResult};
pub use interp::{Interp, VmState};
pub use parser::compile;
pub use registry::{RefId, NO_REF, REF_NIL};
pub use stdlib::{open_libs, LibsLoader};
pub use table::{Table, TableRef};
pub use value::{native, UserDataRef, Value};

#[cfg(test)]
mod test;
