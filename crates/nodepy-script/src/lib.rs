// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal script dialect executed by the nodepy module runtime.
//!
//! The dialect is deliberately small: assignments, member access, literals
//! and host-dispatched calls (`require`, `assert`, `print`). The runtime
//! owns resolution and module semantics; this crate only knows how to turn
//! source text into a [`Program`] and run it against a namespace.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Expr, Program, Stmt};
pub use error::{Result, ScriptError};
pub use interp::{execute, Host, NullHost};
pub use parser::parse;
pub use value::{new_scope, ScopeRef, Value};
