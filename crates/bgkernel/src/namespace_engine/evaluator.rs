//
// evaluator.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! A small line-oriented language over a JSON namespace.
//!
//! Each non-empty line is one statement:
//!
//! - `name = <expr>` binds a value
//! - `print <expr>` writes the value to the output stream
//! - `del name` removes a binding
//! - `who` lists the bound names
//! - `exit`, `exit()` leave the client but keep the kernel; `exit(0)` and
//!   `exit(keep_kernel=False)` stop the kernel
//! - `<expr>` evaluates to a result
//!
//! An expression is a JSON literal, `True`, `False`, `None`, or a bound name.
//! Lines starting with `#` are comments.

use std::fmt;
use std::io::Write;

use serde_json::Value;

use crate::engine::Namespace;

/// What a block of code amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Ran to completion without a result
    Silent,

    /// The last statement was an expression with this value
    Value(Value),

    /// An exit was requested; later statements did not run
    Exit { keep_kernel: bool },
}

/// A failed statement, in the shape of a Jupyter error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub ename: String,
    pub evalue: String,
}

impl EvalError {
    fn new(ename: &str, evalue: String) -> Self {
        Self {
            ename: ename.to_string(),
            evalue,
        }
    }

    fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{}' is not defined", name))
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ename, self.evalue)
    }
}

impl std::error::Error for EvalError {}

/// Run `code` against `namespace`, writing printed output to `out`.
pub fn evaluate(
    code: &str,
    namespace: &mut Namespace,
    out: &mut dyn Write,
) -> Result<Outcome, EvalError> {
    let mut outcome = Outcome::Silent;
    for line in code.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        outcome = statement(line, namespace, out)?;
        if let Outcome::Exit { .. } = outcome {
            break;
        }
    }
    Ok(outcome)
}

fn statement(
    line: &str,
    namespace: &mut Namespace,
    out: &mut dyn Write,
) -> Result<Outcome, EvalError> {
    if let Some(keep_kernel) = exit_request(line)? {
        return Ok(Outcome::Exit { keep_kernel });
    }

    if line == "who" {
        if namespace.is_empty() {
            write_line(out, "Interactive namespace is empty.")?;
            return Ok(Outcome::Silent);
        }
        let mut names: Vec<&String> = namespace.keys().collect();
        names.sort();
        let listing = names
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join("\t");
        write_line(out, &listing)?;
        return Ok(Outcome::Silent);
    }

    if let Some(rest) = keyword(line, "del") {
        let name = rest.trim();
        if !is_identifier(name) {
            return Err(EvalError::new("SyntaxError", format!("cannot delete '{}'", name)));
        }
        return match namespace.remove(name) {
            Some(_) => Ok(Outcome::Silent),
            None => Err(EvalError::name_error(name)),
        };
    }

    if let Some(rest) = print_argument(line) {
        let value = expression(rest, namespace)?;
        write_line(out, &display(&value))?;
        return Ok(Outcome::Silent);
    }

    if let Some((target, expr)) = assignment(line) {
        let value = expression(expr, namespace)?;
        namespace.insert(target.to_string(), value);
        return Ok(Outcome::Silent);
    }

    Ok(Outcome::Value(expression(line, namespace)?))
}

/// `Some(keep_kernel)` if the line asks to exit.
fn exit_request(line: &str) -> Result<Option<bool>, EvalError> {
    let args = match line {
        "exit" | "quit" => return Ok(Some(true)),
        _ => match line
            .strip_prefix("exit(")
            .or_else(|| line.strip_prefix("quit("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(args) => args.trim(),
            None => return Ok(None),
        },
    };
    let arg = args
        .strip_prefix("keep_kernel")
        .and_then(|rest| rest.trim_start().strip_prefix('='))
        .unwrap_or(args)
        .trim();
    match arg {
        "" | "True" | "true" | "1" => Ok(Some(true)),
        "False" | "false" | "0" => Ok(Some(false)),
        other => Err(EvalError::new(
            "TypeError",
            format!("exit() got an unexpected argument '{}'", other),
        )),
    }
}

fn keyword<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

fn print_argument(line: &str) -> Option<&str> {
    if let Some(args) = line
        .strip_prefix("print(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return Some(args.trim());
    }
    keyword(line, "print").map(str::trim)
}

fn assignment(line: &str) -> Option<(&str, &str)> {
    let (target, expr) = line.split_once('=')?;
    let target = target.trim();
    // `==` and friends are not assignments
    if expr.starts_with('=') || !is_identifier(target) {
        return None;
    }
    Some((target, expr.trim()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn expression(expr: &str, namespace: &Namespace) -> Result<Value, EvalError> {
    let expr = expr.trim();
    match expr {
        "True" => return Ok(Value::Bool(true)),
        "False" => return Ok(Value::Bool(false)),
        "None" => return Ok(Value::Null),
        _ => {}
    }
    if is_identifier(expr) && !matches!(expr, "true" | "false" | "null") {
        return namespace
            .get(expr)
            .cloned()
            .ok_or_else(|| EvalError::name_error(expr));
    }
    serde_json::from_str(expr)
        .map_err(|err| EvalError::new("SyntaxError", format!("invalid syntax: {}", err)))
}

fn write_line(out: &mut dyn Write, text: &str) -> Result<(), EvalError> {
    writeln!(out, "{}", text)
        .and_then(|_| out.flush())
        .map_err(|err| EvalError::new("OSError", err.to_string()))
}

/// The form `print` shows: strings without quotes, everything else as JSON.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The `text/plain` form of a result.
pub fn repr(value: &Value) -> String {
    value.to_string()
}
