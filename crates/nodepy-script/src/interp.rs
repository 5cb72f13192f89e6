// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree-walking interpreter.
//!
//! Calls are host-dispatched: the dialect has no user-defined functions, so
//! the only callables are the `require` family and the `assert`/`print`
//! builtins. The [`Host`] trait is the seam the embedding runtime implements
//! to serve `require` against its resolver and module cache.

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind, Target};
use crate::error::{Result, ScriptError};
use crate::value::{ScopeRef, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Host interface for `require` calls made by a running script.
pub trait Host {
    /// `require("request")` — resolve, load, execute, return exports.
    fn require(&self, request: &str) -> Result<Value>;

    /// `require.resolve("request")` — resolve without loading; returns the
    /// resolved filename as a string value.
    fn require_resolve(&self, request: &str) -> Result<Value>;

    /// `require.star("request")` — import the target's public symbols into
    /// `into` (the calling module's namespace).
    fn require_star(&self, request: &str, into: &ScopeRef) -> Result<()>;
}

/// A host that rejects every require. Useful for tests and for evaluating
/// expression snippets outside a module context.
pub struct NullHost;

impl Host for NullHost {
    fn require(&self, request: &str) -> Result<Value> {
        Err(ScriptError::Runtime {
            line: 0,
            message: format!("require({:?}) is not available in this context", request),
        })
    }

    fn require_resolve(&self, request: &str) -> Result<Value> {
        self.require(request)
    }

    fn require_star(&self, request: &str, _into: &ScopeRef) -> Result<()> {
        self.require(request).map(|_| ())
    }
}

/// Execute a program against a namespace scope.
pub fn execute(program: &Program, scope: &ScopeRef, host: &dyn Host) -> Result<()> {
    for stmt in &program.stmts {
        exec_stmt(stmt, scope, host)?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, scope: &ScopeRef, host: &dyn Host) -> Result<()> {
    match &stmt.kind {
        StmtKind::Assign { target, value } => {
            let value = eval(value, scope, host)?;
            match target {
                Target::Ident(name) => {
                    scope.borrow_mut().insert(name.clone(), value);
                }
                Target::Member { object, name } => {
                    let object = eval(object, scope, host)?;
                    match object {
                        Value::Object(inner) => {
                            inner.borrow_mut().insert(name.clone(), value);
                        }
                        other => {
                            return Err(ScriptError::Runtime {
                                line: stmt.line,
                                message: format!(
                                    "cannot set member {:?} on {}",
                                    name,
                                    other.type_name()
                                ),
                            })
                        }
                    }
                }
            }
            Ok(())
        }
        StmtKind::Expr(expr) => eval(expr, scope, host).map(|_| ()),
    }
}

fn eval(expr: &Expr, scope: &ScopeRef, host: &dyn Host) -> Result<Value> {
    match &expr.kind {
        ExprKind::Null => Ok(Value::Null),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Ident(name) => {
            scope.borrow().get(name).cloned().ok_or_else(|| ScriptError::Runtime {
                line: expr.line,
                message: format!("undefined name {:?}", name),
            })
        }
        ExprKind::Member { object, name } => {
            // Missing members read as null so scripts can probe partially
            // populated namespaces during cyclic requires.
            let object = eval(object, scope, host)?;
            match object {
                Value::Object(inner) => {
                    Ok(inner.borrow().get(name).cloned().unwrap_or(Value::Null))
                }
                other => Err(ScriptError::Runtime {
                    line: expr.line,
                    message: format!(
                        "cannot read member {:?} of {}",
                        name,
                        other.type_name()
                    ),
                }),
            }
        }
        ExprKind::Call { callee, args } => eval_call(expr.line, callee, args, scope, host),
        ExprKind::Object(entries) => {
            let object = Value::new_object();
            if let Value::Object(inner) = &object {
                for (key, value_expr) in entries {
                    let value = eval(value_expr, scope, host)?;
                    inner.borrow_mut().insert(key.clone(), value);
                }
            }
            Ok(object)
        }
        ExprKind::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, scope, host)?);
            }
            Ok(Value::Array(Rc::new(RefCell::new(values))))
        }
        ExprKind::Eq { lhs, rhs } => {
            let lhs = eval(lhs, scope, host)?;
            let rhs = eval(rhs, scope, host)?;
            Ok(Value::Bool(lhs == rhs))
        }
        ExprKind::Ne { lhs, rhs } => {
            let lhs = eval(lhs, scope, host)?;
            let rhs = eval(rhs, scope, host)?;
            Ok(Value::Bool(lhs != rhs))
        }
    }
}

/// Identify the builtin a call expression targets.
fn callee_name(callee: &Expr) -> Option<(&str, Option<&str>)> {
    match &callee.kind {
        ExprKind::Ident(name) => Some((name.as_str(), None)),
        ExprKind::Member { object, name } => match &object.kind {
            ExprKind::Ident(base) => Some((base.as_str(), Some(name.as_str()))),
            _ => None,
        },
        _ => None,
    }
}

fn eval_call(
    line: usize,
    callee: &Expr,
    args: &[Expr],
    scope: &ScopeRef,
    host: &dyn Host,
) -> Result<Value> {
    match callee_name(callee) {
        Some(("require", None)) => {
            let request = string_arg(line, "require", args, scope, host)?;
            host.require(&request).map_err(|err| at_line(err, line))
        }
        Some(("require", Some("resolve"))) => {
            let request = string_arg(line, "require.resolve", args, scope, host)?;
            host.require_resolve(&request).map_err(|err| at_line(err, line))
        }
        Some(("require", Some("star"))) | Some(("require", Some("symbols"))) => {
            let request = string_arg(line, "require.star", args, scope, host)?;
            host.require_star(&request, scope).map_err(|err| at_line(err, line))?;
            Ok(Value::Null)
        }
        Some(("assert", None)) => {
            if args.is_empty() {
                return Err(ScriptError::Runtime {
                    line,
                    message: "assert() takes at least one argument".into(),
                });
            }
            let value = eval(&args[0], scope, host)?;
            if value.is_truthy() {
                return Ok(Value::Null);
            }
            let message = match args.get(1) {
                Some(arg) => eval(arg, scope, host)?.to_string(),
                None => format!("value was {}", value),
            };
            Err(ScriptError::Assertion { line, message })
        }
        Some(("print", None)) => {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(eval(arg, scope, host)?.to_string());
            }
            println!("{}", parts.join(" "));
            Ok(Value::Null)
        }
        _ => Err(ScriptError::Runtime {
            line,
            message: "only require/assert/print calls are supported".into(),
        }),
    }
}

fn string_arg(
    line: usize,
    what: &str,
    args: &[Expr],
    scope: &ScopeRef,
    host: &dyn Host,
) -> Result<String> {
    let arg = args.first().ok_or_else(|| ScriptError::Runtime {
        line,
        message: format!("{}() takes a request string", what),
    })?;
    match eval(arg, scope, host)? {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Runtime {
            line,
            message: format!("{}() takes a string, found {}", what, other.type_name()),
        }),
    }
}

/// Re-anchor a host error that was reported without a line.
fn at_line(err: ScriptError, line: usize) -> ScriptError {
    match err {
        ScriptError::Host { line: 0, source } => ScriptError::Host { line, source },
        ScriptError::Runtime { line: 0, message } => ScriptError::Runtime { line, message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::value::new_scope;

    fn run(source: &str) -> Result<ScopeRef> {
        let scope = new_scope();
        execute(&parse(source)?, &scope, &NullHost)?;
        Ok(scope)
    }

    #[test]
    fn assigns_values() {
        let scope = run("x = 1\ny = 'two'\nz = {a: x}").unwrap();
        assert_eq!(scope.borrow().get("x"), Some(&Value::Number(1.0)));
        assert_eq!(scope.borrow().get("y"), Some(&Value::Str("two".into())));
        let z = scope.borrow().get("z").cloned().unwrap();
        assert_eq!(z.get("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn member_assignment_creates_entries() {
        let scope = run("exports = {}\nexports.x = 1").unwrap();
        let exports = scope.borrow().get("exports").cloned().unwrap();
        assert_eq!(exports.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn assertion_failure_carries_line() {
        let err = run("x = 1\nassert(x == 2)").unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(matches!(err, ScriptError::Assertion { .. }));
    }

    #[test]
    fn undefined_name_is_an_error() {
        assert!(run("x = missing").is_err());
    }

    #[test]
    fn missing_member_reads_as_null() {
        let scope = run("obj = {}\nx = obj.anything").unwrap();
        assert_eq!(scope.borrow().get("x"), Some(&Value::Null));
    }

    #[test]
    fn equality_operators() {
        let scope = run("a = 1 == 1\nb = 'x' != 'y'").unwrap();
        assert_eq!(scope.borrow().get("a"), Some(&Value::Bool(true)));
        assert_eq!(scope.borrow().get("b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn require_calls_hit_the_host() {
        struct FakeHost;
        impl Host for FakeHost {
            fn require(&self, request: &str) -> Result<Value> {
                assert_eq!(request, "./b");
                Ok(Value::Number(42.0))
            }
            fn require_resolve(&self, _request: &str) -> Result<Value> {
                Ok(Value::Str("/resolved".into()))
            }
            fn require_star(&self, _request: &str, into: &ScopeRef) -> Result<()> {
                into.borrow_mut().insert("starred".into(), Value::Bool(true));
                Ok(())
            }
        }

        let scope = new_scope();
        let program = parse("x = require('./b')\np = require.resolve('./b')\nrequire.star('./b')").unwrap();
        execute(&program, &scope, &FakeHost).unwrap();
        assert_eq!(scope.borrow().get("x"), Some(&Value::Number(42.0)));
        assert_eq!(scope.borrow().get("p"), Some(&Value::Str("/resolved".into())));
        assert_eq!(scope.borrow().get("starred"), Some(&Value::Bool(true)));
    }

    #[test]
    fn unknown_call_is_rejected() {
        assert!(run("frobnicate(1)").is_err());
    }
}
