//! Host-language (Python) dependencies: delegate to pip, targeting the
//! workspace-local prefix under `nodepy_modules/.pip`.

use crate::error::{PmError, Result};
use crate::shims::ShimWriter;
use indexmap::IndexMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Install Python dependencies with pip. `PIP_*` environment variables
/// pass through to the subprocess untouched.
pub fn install_python_dependencies(
    deps: &IndexMap<String, String>,
    pip_prefix: &Path,
    separate_process: bool,
) -> Result<()> {
    if deps.is_empty() {
        return Ok(());
    }

    let mut specs: Vec<String> = Vec::with_capacity(deps.len());
    for (name, version) in deps {
        specs.push(format!("{}{}", name, version));
    }
    info!(prefix = %pip_prefix.display(), deps = ?specs, "installing Python dependencies");

    std::fs::create_dir_all(pip_prefix)?;

    // Prefix-based installs are broken on some platforms when a global
    // distutils prefix is configured; shadow it for the duration.
    let _cfg_guard = if cfg!(target_os = "macos") {
        Some(DistutilsCfgGuard::acquire()?)
    } else {
        None
    };

    let mut command = if separate_process {
        let mut c = Command::new("python3");
        c.arg("-m").arg("pip");
        c
    } else {
        Command::new("pip")
    };
    command
        .arg("install")
        .arg("--prefix")
        .arg(pip_prefix)
        .args(&specs);

    debug!(?command, "spawning pip");
    let status = command.status()?;
    if !status.success() {
        return Err(PmError::Other(format!(
            "pip install failed with exit code {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

/// Re-link scripts pip placed in its own bin directory into the workspace
/// `.bin/`, wrapped so they see the workspace search path.
pub fn relink_pip_scripts(pip_bin: &Path, shims: &ShimWriter) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    if !pip_bin.is_dir() {
        return Ok(created);
    }
    let mut entries: Vec<_> = std::fs::read_dir(pip_bin)?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        debug!(script = %name, "relinking pip script");
        created.extend(shims.make_proxy_shim(&name, &entry.path())?);
    }
    Ok(created)
}

/// Temporarily replaces `~/.pydistutils.cfg` with an empty-prefix config,
/// restoring the previous content on drop. Access is serialized with a
/// file-based advisory lock since the file is process-global.
pub struct DistutilsCfgGuard {
    cfg_path: PathBuf,
    lock_path: PathBuf,
    previous: Option<Vec<u8>>,
}

impl DistutilsCfgGuard {
    pub fn acquire() -> Result<DistutilsCfgGuard> {
        let home = dirs::home_dir()
            .ok_or_else(|| PmError::Other("cannot determine home directory".into()))?;
        let cfg_path = home.join(".pydistutils.cfg");
        let lock_path = home.join(".pydistutils.cfg.lock");

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut lock) => {
                let _ = write!(lock, "{}", std::process::id());
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PmError::Locked(lock_path));
            }
            Err(err) => return Err(err.into()),
        }

        let previous = std::fs::read(&cfg_path).ok();
        std::fs::write(&cfg_path, "[install]\nprefix=\n")?;
        Ok(DistutilsCfgGuard { cfg_path, lock_path, previous })
    }
}

impl Drop for DistutilsCfgGuard {
    fn drop(&mut self) {
        let restore = match &self.previous {
            Some(content) => std::fs::write(&self.cfg_path, content),
            None => std::fs::remove_file(&self.cfg_path),
        };
        if let Err(err) = restore {
            warn!(error = %err, "could not restore ~/.pydistutils.cfg");
        }
        if let Err(err) = std::fs::remove_file(&self.lock_path) {
            warn!(error = %err, "could not remove distutils lock file");
        }
    }
}
