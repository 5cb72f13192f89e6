//! Lifecycle hook runner.
//!
//! A hook value is either a module request, executed as a fresh main
//! module by spawning the runtime, or a shell command when prefixed with
//! `!`, run through the platform shell unprocessed. Hook failures abort
//! the surrounding action.

use crate::error::{PmError, Result};
use nodepy_runtime::PackageManifest;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Runs the lifecycle scripts of one package.
pub struct PackageLifecycle {
    manifest: PackageManifest,
    directory: PathBuf,
    /// Prepended to `PATH` (and the runtime search path) for hooks.
    bin_dir: Option<PathBuf>,
}

impl PackageLifecycle {
    pub fn new(manifest: PackageManifest, directory: PathBuf) -> PackageLifecycle {
        PackageLifecycle { manifest, directory, bin_dir: None }
    }

    /// Use the given `.bin` directory for hook subprocesses.
    pub fn with_bin_dir(mut self, bin_dir: PathBuf) -> PackageLifecycle {
        self.bin_dir = Some(bin_dir);
        self
    }

    /// Whether the manifest defines a script for `event`.
    pub fn has(&self, event: &str) -> bool {
        self.manifest.scripts.contains_key(event)
    }

    /// Run the script for a lifecycle event. Missing scripts are a no-op;
    /// a non-zero exit aborts with [`PmError::HookFailed`].
    pub fn run(&self, event: &str, args: &[String]) -> Result<()> {
        let Some(script) = self.manifest.scripts.get(event) else {
            return Ok(());
        };
        info!(package = %self.manifest.name, hook = event, "running lifecycle hook");

        let mut command = match script.strip_prefix('!') {
            Some(shell_command) => {
                let mut command = if cfg!(windows) {
                    let mut c = Command::new("cmd");
                    c.arg("/C").arg(shell_command);
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c").arg(shell_command);
                    c
                };
                command.args(args);
                command
            }
            None => {
                let mut command = Command::new(runtime_executable());
                command.arg(script).args(args);
                command
            }
        };
        command.current_dir(&self.directory);
        if let Some(bin_dir) = &self.bin_dir {
            command.env("PATH", prepend_path(bin_dir));
        }

        debug!(script = %script, dir = %self.directory.display(), "spawning hook");
        let status = command.status()?;
        if !status.success() {
            return Err(PmError::HookFailed {
                hook: event.to_string(),
                package: self.manifest.name.clone(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    /// Run a script by name on behalf of `nppm run`; unlike lifecycle
    /// events, a missing script is an error.
    pub fn run_named(&self, name: &str, args: &[String]) -> Result<()> {
        if !self.has(name) {
            return Err(PmError::ScriptNotFound(name.to_string()));
        }
        self.run(name, args)
    }
}

/// The runtime executable hooks are spawned with. `NODEPY_EXECUTABLE`
/// overrides the default lookup on `PATH`.
pub fn runtime_executable() -> PathBuf {
    match std::env::var("NODEPY_EXECUTABLE") {
        Ok(exe) if !exe.is_empty() => PathBuf::from(exe),
        _ => PathBuf::from("nodepy"),
    }
}

fn prepend_path(dir: &Path) -> std::ffi::OsString {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut paths = vec![dir.to_path_buf()];
    paths.extend(std::env::split_paths(&current));
    std::env::join_paths(paths).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepy_runtime::semver::Version;

    fn lifecycle(scripts: &[(&str, &str)], dir: &Path) -> PackageLifecycle {
        let mut manifest = PackageManifest::new("hooked", Version::new(1, 0, 0));
        for (event, script) in scripts {
            manifest
                .scripts
                .insert(event.to_string(), script.to_string());
        }
        PackageLifecycle::new(manifest, dir.to_path_buf())
    }

    #[test]
    fn missing_hooks_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let plc = lifecycle(&[], dir.path());
        plc.run("post-install", &[]).unwrap();
    }

    #[test]
    fn named_scripts_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let plc = lifecycle(&[], dir.path());
        assert!(matches!(
            plc.run_named("test", &[]),
            Err(PmError::ScriptNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn shell_hooks_run_in_the_package_directory() {
        let dir = tempfile::tempdir().unwrap();
        let plc = lifecycle(&[("post-install", "!touch ran.txt")], dir.path());
        plc.run("post-install", &[]).unwrap();
        assert!(dir.path().join("ran.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_hooks_abort() {
        let dir = tempfile::tempdir().unwrap();
        let plc = lifecycle(&[("post-install", "!exit 3")], dir.path());
        match plc.run("post-install", &[]) {
            Err(PmError::HookFailed { hook, package, code }) => {
                assert_eq!(hook, "post-install");
                assert_eq!(package, "hooked");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }
    }
}
