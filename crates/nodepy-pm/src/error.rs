//! Error types for the package manager.

use nodepy_runtime::semver::SemverError;
use nodepy_runtime::RuntimeError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for package manager operations.
pub type Result<T> = std::result::Result<T, PmError>;

/// Main error type for nppm.
#[derive(Debug, Error)]
pub enum PmError {
    /// Package not found in the registry.
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// The registry has no version matching a selector.
    #[error("no version of '{package}' matches '{selector}'")]
    VersionMismatch { package: String, selector: String },

    /// Two dependents require incompatible exact selectors.
    #[error("conflicting requirements for '{package}': {details}")]
    InstallConflict { package: String, details: String },

    /// A lifecycle hook returned non-zero.
    #[error("hook '{hook}' of package '{package}' failed with exit code {code}")]
    HookFailed {
        hook: String,
        package: String,
        code: i32,
    },

    /// HTTP or auth failure against the registry.
    #[error("registry error: {0}")]
    Registry(String),

    /// Malformed install target.
    #[error("invalid install target: {0}")]
    InvalidTarget(String),

    /// A script named on the command line does not exist in the manifest.
    #[error("no such script: {0}")]
    ScriptNotFound(String),

    /// The modules directory is locked by another install.
    #[error("modules directory is locked (remove {0} if no install is running)")]
    Locked(PathBuf),

    /// Configuration file problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Uninstall target is not installed.
    #[error("package not installed: {0}")]
    NotInstalled(String),

    /// Errors bubbled up from the shared runtime models (manifest,
    /// semver, paths).
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Semver(#[from] SemverError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for PmError {
    fn from(s: String) -> PmError {
        PmError::Other(s)
    }
}

impl From<&str> for PmError {
    fn from(s: &str) -> PmError {
        PmError::Other(s.to_string())
    }
}
