// Arithmetic, comparison, logic, and concatenation.

use super::{eval, run};

#[test]
fn test_integer_arithmetic() {
    let result = run(r#"
        assert(1 + 2 == 3)
        assert(5 - 7 == -2)
        assert(6 * 7 == 42)
        assert(7 // 2 == 3)
        assert(-7 // 2 == -4)
        assert(7 % 3 == 1)
        assert(-1 % 3 == 2)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_float_arithmetic() {
    let result = run(r#"
        assert(1 / 2 == 0.5)
        assert(2 ^ 10 == 1024.0)
        assert(1.5 + 1.5 == 3.0)
        assert(7.0 // 2.0 == 3.0)
        assert(math.type(1 + 1) == "integer")
        assert(math.type(1 / 1) == "float")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_mixed_number_equality() {
    let result = run(r#"
        assert(1 == 1.0)
        assert(2.0 == 2)
        assert(1 ~= 1.5)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_division_by_zero() {
    // Integer floor division by zero raises; float division produces inf.
    assert!(run("return 1 // 0").is_err());
    assert!(run("return 1 % 0").is_err());
    let result = run("assert(1 / 0 == math.huge)");
    assert!(result.is_ok());
}

#[test]
fn test_comparison() {
    let result = run(r#"
        assert(1 < 2)
        assert(2 <= 2)
        assert(3 > 2)
        assert("a" < "b")
        assert("abc" < "abd")
        assert(1 < 1.5)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_compare_mixed_types_errors() {
    assert!(run("return 1 < 'x'").is_err());
    assert!(run("return {} < {}").is_err());
}

#[test]
fn test_logic_returns_operand() {
    let result = run(r#"
        assert((false or "fallback") == "fallback")
        assert((nil and 1) == nil)
        assert((1 and 2) == 2)
        assert((false or nil) == nil)
        assert(not nil == true)
        assert(not 0 == false)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_short_circuit() {
    let result = run(r#"
        local called = false
        local function boom() called = true end
        local _ = true or boom()
        assert(called == false)
        local _ = false and boom()
        assert(called == false)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_concat() {
    let result = run(r#"
        assert("a" .. "b" == "ab")
        assert("n=" .. 5 == "n=5")
        assert(1 .. 2 == "12")
    "#);
    assert!(result.is_ok());
    assert!(run("return 'x' .. {}").is_err());
}

#[test]
fn test_length() {
    let result = run(r#"
        assert(#"hello" == 5)
        assert(#{} == 0)
        assert(#{1, 2, 3} == 3)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_unary_minus() {
    assert_eq!(eval("return -(3)").as_integer(), Some(-3));
    assert_eq!(eval("return -(2.5)").as_number(), Some(-2.5));
    assert!(run("return -'x'").is_err());
}

#[test]
fn test_precedence() {
    let result = run(r#"
        assert(1 + 2 * 3 == 7)
        assert((1 + 2) * 3 == 9)
        assert(2 ^ 3 ^ 2 == 512.0)
        assert(-2 ^ 2 == -4.0)
        assert("x" .. 1 + 1 == "x2")
        assert(not (1 == 2))
    "#);
    assert!(result.is_ok());
}
