// String library and string indexing.

use super::{eval, run};

#[test]
fn test_len_sub() {
    let result = run(r#"
        assert(string.len("hello") == 5)
        assert(string.sub("hello", 2, 4) == "ell")
        assert(string.sub("hello", 2) == "ello")
        assert(string.sub("hello", -3) == "llo")
        assert(string.sub("hello", 3, -2) == "ll")
        assert(string.sub("hello", 4, 2) == "")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_case_and_rep() {
    let result = run(r#"
        assert(string.upper("MiXeD") == "MIXED")
        assert(string.lower("MiXeD") == "mixed")
        assert(string.rep("ab", 3) == "ababab")
        assert(string.rep("x", 0) == "")
        assert(string.reverse("abc") == "cba")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_byte_char() {
    let result = run(r#"
        assert(string.byte("A") == 65)
        local a, b = string.byte("AB", 1, 2)
        assert(a == 65 and b == 66)
        assert(string.char(104, 105) == "hi")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_method_syntax_on_strings() {
    let result = run(r#"
        local s = "hello"
        assert(s:upper() == "HELLO")
        assert(s:len() == 5)
        assert(("abc"):sub(2, 2) == "b")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_format() {
    let result = run(r#"
        assert(string.format("%s=%d", "n", 42) == "n=42")
        assert(string.format("%x", 255) == "ff")
        assert(string.format("100%%") == "100%")
    "#);
    assert!(result.is_ok());
    assert_eq!(
        eval(r#"return string.format("%f", 0.5)"#).as_str(),
        Some("0.500000")
    );
}

#[test]
fn test_numbers_coerce_in_string_functions() {
    let result = run(r#"
        assert(string.len(123) == 3)
        assert(string.upper(42) == "42")
    "#);
    assert!(result.is_ok());
}
