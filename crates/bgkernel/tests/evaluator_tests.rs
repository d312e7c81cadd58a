//
// evaluator_tests.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Tests for the namespace evaluator

use bgkernel::engine::Namespace;
use bgkernel::namespace_engine::evaluator::{display, evaluate, repr, Outcome};
use serde_json::json;

fn run(code: &str, namespace: &mut Namespace) -> (Result<Outcome, String>, String) {
    let mut out = Vec::new();
    let result = evaluate(code, namespace, &mut out).map_err(|err| err.to_string());
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_assign_and_read_back() {
    let mut namespace = Namespace::new();
    let (result, out) = run("x = 41\ny = \"text\"\nx", &mut namespace);

    assert_eq!(result.unwrap(), Outcome::Value(json!(41)));
    assert_eq!(out, "");
    assert_eq!(namespace.get("y"), Some(&json!("text")));
}

#[test]
fn test_initial_namespace_is_visible() {
    let mut namespace = Namespace::new();
    namespace.insert(String::from("demo_var"), json!(42));

    let (result, _) = run("demo_var", &mut namespace);
    assert_eq!(result.unwrap(), Outcome::Value(json!(42)));
}

#[test]
fn test_print_forms() {
    let mut namespace = Namespace::new();
    namespace.insert(String::from("greeting"), json!("hello"));

    let (result, out) = run("print greeting\nprint([1, 2])\nprint(None)", &mut namespace);
    assert_eq!(result.unwrap(), Outcome::Silent);
    assert_eq!(out, "hello\n[1,2]\nnull\n");
}

#[test]
fn test_comments_and_blank_lines_are_skipped() {
    let mut namespace = Namespace::new();
    let (result, out) = run("\n# nothing here\n   \n", &mut namespace);
    assert_eq!(result.unwrap(), Outcome::Silent);
    assert_eq!(out, "");
}

#[test]
fn test_undefined_name() {
    let mut namespace = Namespace::new();
    let (result, _) = run("missing", &mut namespace);
    assert_eq!(
        result.unwrap_err(),
        "NameError: name 'missing' is not defined"
    );
}

#[test]
fn test_error_stops_later_statements() {
    let mut namespace = Namespace::new();
    let (result, _) = run("a = 1\nb = nope\nc = 3", &mut namespace);
    assert!(result.unwrap_err().starts_with("NameError"));
    assert!(namespace.contains_key("a"));
    assert!(!namespace.contains_key("c"));
}

#[test]
fn test_invalid_syntax() {
    let mut namespace = Namespace::new();
    let (result, _) = run("1 +", &mut namespace);
    assert!(result.unwrap_err().starts_with("SyntaxError"));
}

#[test]
fn test_del_and_who() {
    let mut namespace = Namespace::new();
    let (_, out) = run("who", &mut namespace);
    assert_eq!(out, "Interactive namespace is empty.\n");

    let (_, out) = run("b = 2\na = 1\nwho", &mut namespace);
    assert_eq!(out, "a\tb\n");

    let (result, _) = run("del a\nwho", &mut namespace);
    assert!(result.is_ok());
    assert!(!namespace.contains_key("a"));

    let (result, _) = run("del a", &mut namespace);
    assert!(result.unwrap_err().starts_with("NameError"));
}

#[test]
fn test_exit_forms() {
    let mut namespace = Namespace::new();
    for code in ["exit", "quit", "exit()", "exit(True)", "exit(keep_kernel=True)"] {
        let (result, _) = run(code, &mut namespace);
        assert_eq!(
            result.unwrap(),
            Outcome::Exit { keep_kernel: true },
            "{}",
            code
        );
    }
    for code in ["exit(0)", "exit(False)", "exit(keep_kernel=False)"] {
        let (result, _) = run(code, &mut namespace);
        assert_eq!(
            result.unwrap(),
            Outcome::Exit { keep_kernel: false },
            "{}",
            code
        );
    }

    let (result, _) = run("exit(\"later\")", &mut namespace);
    assert!(result.unwrap_err().starts_with("TypeError"));
}

#[test]
fn test_exit_skips_the_rest() {
    let mut namespace = Namespace::new();
    let (result, _) = run("exit\nx = 1", &mut namespace);
    assert_eq!(result.unwrap(), Outcome::Exit { keep_kernel: true });
    assert!(namespace.is_empty());
}

#[test]
fn test_display_and_repr() {
    assert_eq!(display(&json!("plain")), "plain");
    assert_eq!(repr(&json!("plain")), "\"plain\"");
    assert_eq!(display(&json!({"a": 1})), "{\"a\":1}");
    assert_eq!(repr(&json!(true)), "true");
}
