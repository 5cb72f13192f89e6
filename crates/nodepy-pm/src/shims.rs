//! Executable shims in `nodepy_modules/.bin/`.
//!
//! A runtime shim re-invokes `nodepy` with a fixed request; a proxy shim
//! wraps a program installed by the host-language installer, prepending
//! the workspace search path so the wrapped tool sees its modules.

use crate::error::Result;
use crate::hooks::runtime_executable;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes launcher scripts into a `.bin` directory.
pub struct ShimWriter {
    bin_dir: PathBuf,
    /// Value prepended to `NODEPY_PATH` in generated shims.
    search_path: Option<PathBuf>,
}

impl ShimWriter {
    pub fn new(bin_dir: PathBuf) -> ShimWriter {
        ShimWriter { bin_dir, search_path: None }
    }

    /// Prepend `search_path` to `NODEPY_PATH` inside generated shims.
    pub fn with_search_path(mut self, search_path: PathBuf) -> ShimWriter {
        self.search_path = Some(search_path);
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Write a shim that runs `target` through the runtime. Returns the
    /// created files.
    pub fn make_runtime_shim(&self, name: &str, target: &Path) -> Result<Vec<PathBuf>> {
        let runtime = runtime_executable();
        let env_prefix = self.env_prefix();

        if cfg!(windows) {
            let shim = self.bin_dir.join(format!("{}.cmd", name));
            let content = format!(
                "@echo off\r\n{}\"{}\" \"{}\" %*\r\n",
                env_prefix_cmd(&self.search_path),
                runtime.display(),
                target.display()
            );
            self.write_shim(&shim, &content)?;
            return Ok(vec![shim]);
        }

        let shim = self.bin_dir.join(name);
        let content = format!(
            "#!/bin/sh\n{}exec \"{}\" \"{}\" \"$@\"\n",
            env_prefix,
            runtime.display(),
            target.display()
        );
        self.write_shim(&shim, &content)?;
        Ok(vec![shim])
    }

    /// Write a shim that proxies to an existing executable (used for
    /// scripts placed by the host-language installer).
    pub fn make_proxy_shim(&self, name: &str, target: &Path) -> Result<Vec<PathBuf>> {
        if cfg!(windows) {
            let shim = self.bin_dir.join(format!("{}.cmd", name));
            let content = format!(
                "@echo off\r\n{}\"{}\" %*\r\n",
                env_prefix_cmd(&self.search_path),
                target.display()
            );
            self.write_shim(&shim, &content)?;
            return Ok(vec![shim]);
        }

        let shim = self.bin_dir.join(name);
        let content = format!(
            "#!/bin/sh\n{}exec \"{}\" \"$@\"\n",
            self.env_prefix(),
            target.display()
        );
        self.write_shim(&shim, &content)?;
        Ok(vec![shim])
    }

    fn env_prefix(&self) -> String {
        match &self.search_path {
            Some(path) => format!(
                "NODEPY_PATH=\"{}${{NODEPY_PATH:+:$NODEPY_PATH}}\"\nexport NODEPY_PATH\n",
                path.display()
            ),
            None => String::new(),
        }
    }

    fn write_shim(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.bin_dir)?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(path)?.permissions();
            permissions.set_mode(0o755);
            std::fs::set_permissions(path, permissions)?;
        }
        debug!(shim = %path.display(), "wrote shim");
        Ok(())
    }
}

fn env_prefix_cmd(search_path: &Option<PathBuf>) -> String {
    match search_path {
        Some(path) => format!("set NODEPY_PATH={};%NODEPY_PATH%\r\n", path.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn runtime_shim_content() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ShimWriter::new(dir.path().join(".bin"))
            .with_search_path(dir.path().join("nodepy_modules"));
        let created = writer
            .make_runtime_shim("demo", &dir.path().join("nodepy_modules/demo/cli.ny"))
            .unwrap();
        assert_eq!(created.len(), 1);
        let content = std::fs::read_to_string(&created[0]).unwrap();
        assert!(content.starts_with("#!/bin/sh\n"));
        assert!(content.contains("NODEPY_PATH="));
        assert!(content.contains("cli.ny"));

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&created[0]).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[cfg(unix)]
    #[test]
    fn proxy_shim_wraps_target() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ShimWriter::new(dir.path().join(".bin"));
        let created = writer
            .make_proxy_shim("tool", &dir.path().join(".pip/bin/tool"))
            .unwrap();
        let content = std::fs::read_to_string(&created[0]).unwrap();
        assert!(content.contains("exec"));
        assert!(content.contains(".pip/bin/tool"));
    }
}
