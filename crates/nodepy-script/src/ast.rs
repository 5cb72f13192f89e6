// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Abstract syntax tree.
//!
//! The tree derives serde so a parsed program can be persisted as a
//! bytecache artifact and loaded back without re-running the preprocessors
//! or the parser.

use serde::{Deserialize, Serialize};

/// A parsed program: the unit the loader caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `target = expr` where target is an identifier or member chain.
    Assign { target: Target, value: Expr },
    /// A bare expression evaluated for its effect.
    Expr(Expr),
}

/// Assignment target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// `name = ..`
    Ident(String),
    /// `obj.member = ..` — the object expression is evaluated, then the
    /// named member is set on it.
    Member { object: Box<Expr>, name: String },
}

/// An expression with its source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub line: usize,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Ident(String),
    Member { object: Box<Expr>, name: String },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Eq { lhs: Box<Expr>, rhs: Box<Expr> },
    Ne { lhs: Box<Expr>, rhs: Box<Expr> },
}
