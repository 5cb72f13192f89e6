//! Command implementations.

pub mod dist;
pub mod init;
pub mod install;
pub mod misc;
pub mod publish;
pub mod run;
pub mod uninstall;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::installer::{in_virtualenv, InstallLocation};
use crate::registry::RegistryClient;
use nodepy_runtime::manifest::{PackageManifest, MANIFEST_FILENAME};
use nodepy_runtime::VPath;
use std::path::PathBuf;

/// Shared state handed to every command.
pub struct CommandContext {
    pub config: Config,
    pub registry_name: Option<String>,
    pub cwd: PathBuf,
}

impl CommandContext {
    pub fn new(cli: &Cli) -> Result<CommandContext> {
        Ok(CommandContext {
            config: Config::load()?,
            registry_name: cli.registry.clone(),
            cwd: std::env::current_dir()?,
        })
    }

    /// A registry client for the selected (or default) registry.
    pub fn registry(&self) -> Result<RegistryClient> {
        let config = self.config.registry(self.registry_name.as_deref())?;
        RegistryClient::new(&config)
    }

    /// The manifest of the package in the current directory.
    pub fn manifest(&self) -> Result<PackageManifest> {
        Ok(PackageManifest::read(&VPath::fs(
            self.cwd.join(MANIFEST_FILENAME),
        ))?)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.cwd.join(MANIFEST_FILENAME)
    }
}

/// Map `--global`/`--root` flags to an install location. Inside a virtual
/// environment, global installs are promoted to root unless the
/// configuration disables it.
pub fn resolve_location(config: &Config, global: bool, root: bool) -> InstallLocation {
    if root {
        return InstallLocation::Root;
    }
    if global {
        let promote = config
            .values
            .get("global_promotes_to_root")
            .map(|v| v != "false")
            .unwrap_or(true);
        if promote && in_virtualenv() {
            return InstallLocation::Root;
        }
        return InstallLocation::Global;
    }
    InstallLocation::Local
}
