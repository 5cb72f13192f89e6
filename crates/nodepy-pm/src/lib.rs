//! Package manager for the nodepy runtime.
//!
//! Shares the manifest and semver models with `nodepy-runtime`; this crate
//! adds the registry client, the installer with its placement policy, the
//! dist packer, shim generation and the lifecycle hook runner.

pub mod cli;
pub mod commands;
pub mod config;
pub mod dist;
pub mod error;
pub mod hooks;
pub mod installer;
pub mod native;
pub mod registry;
pub mod shims;
pub mod target;

pub use config::Config;
pub use error::{PmError, Result};
pub use installer::{Installer, InstallerOptions, InstallLocation};
pub use registry::RegistryClient;
pub use target::InstallTarget;
