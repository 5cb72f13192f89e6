// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the script dialect.

use thiserror::Error;

/// Result type for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors raised while lexing, parsing or executing a script.
///
/// All variants carry the 1-based source line so that diagnostics stay
/// usable after the textual preprocessing passes (which preserve line
/// counts by contract).
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Lexical or grammatical error in the source.
    #[error("line {line}: syntax error: {message}")]
    Syntax { line: usize, message: String },

    /// Error raised while evaluating a statement.
    #[error("line {line}: {message}")]
    Runtime { line: usize, message: String },

    /// An `assert(..)` call evaluated to a falsy value.
    #[error("line {line}: assertion failed: {message}")]
    Assertion { line: usize, message: String },

    /// An error produced by the host while serving a `require` call.
    ///
    /// The original error is preserved as the source so the embedding
    /// runtime can propagate module errors unchanged.
    #[error("line {line}: {source}")]
    Host {
        line: usize,
        #[source]
        source: Box<dyn std::error::Error + 'static>,
    },
}

impl ScriptError {
    /// The source line the error is anchored to.
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Syntax { line, .. }
            | ScriptError::Runtime { line, .. }
            | ScriptError::Assertion { line, .. }
            | ScriptError::Host { line, .. } => *line,
        }
    }
}
