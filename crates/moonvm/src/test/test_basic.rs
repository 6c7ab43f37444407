// Base library and value fundamentals.

use super::{eval, run};
use crate::Value;

#[test]
fn test_return_expression() {
    assert_eq!(eval("return 1 + 1").as_integer(), Some(2));
    assert_eq!(eval("return 'hello'").as_str(), Some("hello"));
    assert_eq!(eval("return true").as_boolean(), Some(true));
    assert!(eval("return nil").is_nil());
}

#[test]
fn test_type() {
    let result = run(r#"
        assert(type(nil) == "nil")
        assert(type(true) == "boolean")
        assert(type(42) == "number")
        assert(type(3.14) == "number")
        assert(type("hello") == "string")
        assert(type({}) == "table")
        assert(type(print) == "function")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_tostring() {
    let result = run(r#"
        assert(tostring(123) == "123")
        assert(tostring(1.5) == "1.5")
        assert(tostring(2.0) == "2.0")
        assert(tostring(true) == "true")
        assert(tostring(nil) == "nil")
        local s = tostring({})
        assert(type(s) == "string")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_tonumber() {
    let result = run(r#"
        assert(tonumber("123") == 123)
        assert(tonumber("3.14") == 3.14)
        assert(tonumber("0x10") == 16)
        assert(tonumber("invalid") == nil)
        assert(tonumber(42) == 42)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_assert_failure() {
    let err = run("assert(false, 'boom')").unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[test]
fn test_error_carries_position() {
    let err = run("local x = 1\nerror('bad')").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("bad"));
    assert!(text.contains("test:2"), "unexpected message: {}", text);
}

#[test]
fn test_select() {
    let result = run(r##"
        assert(select("#", 1, 2, 3) == 3)
        local a, b = select(2, "x", "y", "z")
        assert(a == "y" and b == "z")
    "##);
    assert!(result.is_ok());
}

#[test]
fn test_pcall() {
    let result = run(r#"
        local ok, err = pcall(function() error("inner") end)
        assert(ok == false)
        assert(string.sub(err, -5) == "inner")
        local ok2, v = pcall(function() return 7 end)
        assert(ok2 == true and v == 7)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_globals_table() {
    let result = run(r#"
        x = 10
        assert(_G.x == 10)
        _G.y = 20
        assert(y == 20)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_multiple_returns() {
    let values = run("return 1, 'two', true").expect("script failed");
    assert_eq!(values.len(), 3);
    assert_eq!(values[0].as_integer(), Some(1));
    assert_eq!(values[1].as_str(), Some("two"));
    assert_eq!(values[2].as_boolean(), Some(true));
}

#[test]
fn test_nil_default() {
    assert!(matches!(Value::default(), Value::Nil));
}
