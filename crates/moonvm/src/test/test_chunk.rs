// Binary chunk serialization.

use crate::{
    compile, deserialize_chunk, is_bytecode, open_libs, serialize_chunk, Interp, LibsLoader,
    VmState,
};

const SAMPLE: &str = r#"
local function fib(n)
    if n < 2 then return n end
    return fib(n - 1) + fib(n - 2)
end

local t = {tag = "demo", 1, 2, 3}
for i = 1, 3 do
    t[#t + 1] = fib(i)
end
return #t, t.tag
"#;

#[test]
fn test_magic_detection() {
    let chunk = compile("return 1", "m").expect("compile failed");
    let bytes = serialize_chunk(&chunk);
    assert!(is_bytecode(&bytes));
    assert!(!is_bytecode(b"return 1"));
    assert!(!is_bytecode(b""));
}

#[test]
fn test_serialized_chunk_runs_identically() {
    let chunk = compile(SAMPLE, "sample").expect("compile failed");
    let bytes = serialize_chunk(&chunk);
    let restored = deserialize_chunk(&bytes).expect("deserialize failed");
    assert_eq!(restored.source, chunk.source);

    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let values = Interp::new(vm)
        .exec_chunk(&restored, Vec::new())
        .expect("chunk failed");
    assert_eq!(values[0].as_integer(), Some(6));
    assert_eq!(values[1].as_str(), Some("demo"));
}

#[test]
fn test_error_lines_survive_roundtrip() {
    let chunk = compile("local x = 1\nerror('late')", "errsrc").expect("compile failed");
    let restored = deserialize_chunk(&serialize_chunk(&chunk)).expect("deserialize failed");
    let vm = VmState::new();
    open_libs(&vm, &LibsLoader::all());
    let err = Interp::new(vm)
        .exec_chunk(&restored, Vec::new())
        .unwrap_err();
    assert!(err.to_string().contains("errsrc:2"));
}

#[test]
fn test_truncated_chunk_rejected() {
    let chunk = compile("return 1 + 1", "t").expect("compile failed");
    let bytes = serialize_chunk(&chunk);
    assert!(deserialize_chunk(&bytes[..bytes.len() - 3]).is_err());
}

#[test]
fn test_wrong_version_rejected() {
    let chunk = compile("return 1", "v").expect("compile failed");
    let mut bytes = serialize_chunk(&chunk);
    bytes[4] = 0xff;
    assert!(deserialize_chunk(&bytes).is_err());
}

#[test]
fn test_garbage_rejected() {
    assert!(deserialize_chunk(b"\x1bMBC").is_err());
    assert!(deserialize_chunk(b"not bytecode at all").is_err());
}
