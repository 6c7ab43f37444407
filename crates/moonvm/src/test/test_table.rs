// Tables and the table library.

use super::{eval, run};

#[test]
fn test_constructor_forms() {
    let result = run(r#"
        local t = {1, 2, x = "a", ["k e y"] = "b", [10] = "c"}
        assert(t[1] == 1 and t[2] == 2)
        assert(t.x == "a")
        assert(t["k e y"] == "b")
        assert(t[10] == "c")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_array_border_growth() {
    let result = run(r#"
        local t = {}
        t[2] = "b"
        assert(#t == 0)
        t[1] = "a"
        -- The queued key at 2 joins the array part.
        assert(#t == 2)
        t[2] = nil
        assert(#t == 1)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_nil_removes_key() {
    let result = run(r#"
        local t = {x = 1}
        t.x = nil
        local count = 0
        for _ in pairs(t) do count = count + 1 end
        assert(count == 0)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_nil_key_errors() {
    assert!(run("local t = {} t[nil] = 1").is_err());
    assert!(run("local t = {} t[0/0] = 1").is_err());
}

#[test]
fn test_float_key_normalizes_to_int() {
    let result = run(r#"
        local t = {}
        t[2.0] = "x"
        assert(t[2] == "x")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_table_identity() {
    let result = run(r#"
        local a = {}
        local b = {}
        local c = a
        assert(a ~= b)
        assert(a == c)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_insert_remove() {
    let result = run(r#"
        local t = {"a", "c"}
        table.insert(t, 2, "b")
        assert(t[1] == "a" and t[2] == "b" and t[3] == "c")
        table.insert(t, "d")
        assert(t[4] == "d")
        local removed = table.remove(t, 1)
        assert(removed == "a")
        assert(t[1] == "b" and #t == 3)
        assert(table.remove(t) == "d")
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_concat_and_unpack() {
    let result = run(r#"
        assert(table.concat({1, 2, 3}, "-") == "1-2-3")
        assert(table.concat({}) == "")
        local a, b, c = table.unpack({10, 20, 30})
        assert(a == 10 and b == 20 and c == 30)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_pairs_snapshot_tolerates_mutation() {
    // Inserting while iterating must not skip or loop forever.
    let result = run(r#"
        local t = {a = 1, b = 2}
        local visited = 0
        for k in pairs(t) do
            visited = visited + 1
            t[k .. "x"] = true
        end
        assert(visited == 2)
    "#);
    assert!(result.is_ok());
}

#[test]
fn test_nested_tables() {
    assert_eq!(
        eval(r#"
            local cfg = {net = {port = 8080, host = "localhost"}}
            return cfg.net.port
        "#)
        .as_integer(),
        Some(8080)
    );
}
