// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the module runtime.

use nodepy_script::ScriptError;
use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while resolving, loading or executing modules.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No resolver returned a module for the request.
    #[error("cannot resolve '{request}'")]
    Resolve {
        /// The raw request string.
        request: String,
        /// The locations that were searched, for diagnostics.
        searched: Vec<String>,
    },

    /// A loader found the artifact but could not instantiate it.
    #[error("cannot load '{filename}': {reason}")]
    Load { filename: String, reason: String },

    /// A `!binding` request named an unregistered binding.
    #[error("no such binding: '{0}'")]
    NoSuchBinding(String),

    /// A binding name was registered twice.
    #[error("binding '{0}' already exists")]
    BindingExists(String),

    /// Manifest parse or schema failure.
    #[error("invalid manifest '{filename}': {reason}")]
    InvalidManifest { filename: String, reason: String },

    /// Version or selector syntax error.
    #[error(transparent)]
    Semver(#[from] crate::semver::SemverError),

    /// Error raised by a running script. Module-execution errors propagate
    /// through `require` unchanged inside this variant.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A second main module was requested for the same context.
    #[error("context already has a main module")]
    MainAlreadyLoaded,

    /// A require capability outlived its context.
    #[error("the owning context no longer exists")]
    ContextDropped,

    /// An extension failed while handling a module event.
    #[error("extension '{extension}' failed: {reason}")]
    ExtensionFailed { extension: String, reason: String },

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error (manifest bodies, bytecache artifacts, JSON modules).
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error fetching a URL-backed path.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl RuntimeError {
    /// Build a resolve error from a request and the searched locations.
    pub fn resolve(request: impl Into<String>, searched: Vec<String>) -> Self {
        RuntimeError::Resolve { request: request.into(), searched }
    }

    /// Build a load error.
    pub fn load(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::Load { filename: filename.into(), reason: reason.into() }
    }

    /// True if this is a resolve failure (used by callers that fall back to
    /// alternative requests).
    pub fn is_resolve_error(&self) -> bool {
        matches!(self, RuntimeError::Resolve { .. })
    }
}
