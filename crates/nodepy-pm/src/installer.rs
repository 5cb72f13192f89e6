//! Package installer: fetch, validate and materialize packages into the
//! modules directory, with deterministic placement and idempotent re-runs.

use crate::dist;
use crate::error::{PmError, Result};
use crate::hooks::PackageLifecycle;
use crate::native;
use crate::registry::RegistryClient;
use crate::shims::ShimWriter;
use crate::target::InstallTarget;
use indexmap::IndexMap;
use nodepy_runtime::manifest::{split_scoped_name, PackageManifest, MANIFEST_FILENAME};
use nodepy_runtime::semver::{Selector, Version};
use nodepy_runtime::{VPath, MODULES_DIRECTORY};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// File listing everything an install placed, for uninstallation.
pub const INSTALLED_FILES: &str = "installed-files.txt";
/// Sentinel present while a placement is in flight; a directory carrying
/// it must not be treated as a valid install.
pub const PARTIAL_SENTINEL: &str = ".partial";
/// Install lock inside the modules directory.
pub const LOCK_FILE: &str = ".lock";
/// Suffix of develop-install link files.
pub const LINK_SUFFIX: &str = ".nodepy-link";

/// Where packages are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallLocation {
    /// `<cwd>/nodepy_modules/`
    Local,
    /// `~/.nodepy/modules/`
    Global,
    /// `<sys-prefix>/share/nodepy_modules/`
    Root,
}

/// Resolved install directories for a location.
#[derive(Debug, Clone)]
pub struct Directories {
    pub packages: PathBuf,
    pub bin: PathBuf,
    pub pip_prefix: PathBuf,
    pub pip_bin: PathBuf,
}

/// Compute the directory set for an install location.
pub fn directories(location: InstallLocation, cwd: &Path) -> Result<Directories> {
    let pip_bin_base = if cfg!(windows) { "Scripts" } else { "bin" };
    match location {
        InstallLocation::Local => {
            let packages = cwd.join(MODULES_DIRECTORY);
            Ok(Directories {
                bin: packages.join(".bin"),
                pip_prefix: packages.join(".pip"),
                pip_bin: packages.join(".pip").join(pip_bin_base),
                packages,
            })
        }
        InstallLocation::Global => {
            let prefix = dirs::home_dir()
                .ok_or_else(|| PmError::Other("cannot determine home directory".into()))?
                .join(".nodepy");
            Ok(Directories {
                packages: prefix.join("modules"),
                bin: prefix.join("bin"),
                pip_prefix: prefix.join("pip"),
                pip_bin: prefix.join("pip").join(pip_bin_base),
            })
        }
        InstallLocation::Root => {
            let prefix = match std::env::var("VIRTUAL_ENV") {
                Ok(venv) if !venv.is_empty() => PathBuf::from(venv),
                _ => PathBuf::from("/usr/local"),
            };
            Ok(Directories {
                packages: prefix.join("share").join(MODULES_DIRECTORY),
                bin: prefix.join(pip_bin_base),
                pip_prefix: prefix.clone(),
                pip_bin: prefix.join(pip_bin_base),
            })
        }
    }
}

/// Whether a virtual environment is active; `--global` installs are
/// promoted to `--root` inside one (configurable by the caller).
pub fn in_virtualenv() -> bool {
    std::env::var("VIRTUAL_ENV").map_or(false, |v| !v.is_empty())
}

/// Installer behavior switches.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    pub location: InstallLocation,
    /// Replace already-installed packages.
    pub upgrade: bool,
    /// Expand dev dependencies of root targets.
    pub dev: bool,
    /// Re-place even satisfied packages.
    pub ignore_installed: bool,
    /// Re-evaluate the dependency subtrees of satisfied packages.
    pub recursive: bool,
    /// Run pip as `python3 -m pip` instead of `pip`.
    pub pip_separate_process: bool,
    /// Show download progress.
    pub progress: bool,
}

impl Default for InstallerOptions {
    fn default() -> InstallerOptions {
        InstallerOptions {
            location: InstallLocation::Local,
            upgrade: false,
            dev: false,
            ignore_installed: false,
            recursive: false,
            pip_separate_process: false,
            progress: true,
        }
    }
}

/// An installed package found on disk.
pub struct InstalledPackage {
    pub manifest: PackageManifest,
    /// Directory holding the package's files (the link target for develop
    /// installs).
    pub directory: PathBuf,
    /// The link file, when this is a develop install.
    pub link: Option<PathBuf>,
}

/// A dependency the resolver decided to place.
#[derive(Debug, Clone)]
enum PlannedDependency {
    Registry { name: String, version: Version },
    Git { url: String, refspec: Option<String> },
    Local { base: PathBuf, path: String, develop: bool },
}

/// Guard for `<modules-dir>/.lock`; released on drop.
pub struct InstallLock {
    path: PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %err, "could not release install lock");
        }
    }
}

/// The package installer.
pub struct Installer {
    registry: RegistryClient,
    dirs: Directories,
    options: InstallerOptions,
    /// Conflict decisions taken while expanding the dependency set.
    decisions: Vec<String>,
}

impl Installer {
    pub fn new(registry: RegistryClient, cwd: &Path, options: InstallerOptions) -> Result<Installer> {
        let dirs = directories(options.location, cwd)?;
        Ok(Installer { registry, dirs, options, decisions: Vec::new() })
    }

    pub fn dirs(&self) -> &Directories {
        &self.dirs
    }

    /// The conflict decisions recorded during dependency resolution.
    pub fn decisions(&self) -> &[String] {
        &self.decisions
    }

    /// Acquire the exclusive install lock for the modules directory.
    pub fn lock(&self) -> Result<InstallLock> {
        std::fs::create_dir_all(&self.dirs.packages)?;
        let path = self.dirs.packages.join(LOCK_FILE);
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(InstallLock { path }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PmError::Locked(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Install a list of targets under the install lock.
    pub fn install_targets(&mut self, targets: &[InstallTarget]) -> Result<()> {
        let _lock = self.lock()?;
        for target in targets {
            self.install_target(target)?;
        }
        Ok(())
    }

    fn install_target(&mut self, target: &InstallTarget) -> Result<()> {
        match target {
            InstallTarget::Registry { name, selector } => {
                self.install_from_registry(name, selector, self.options.dev)?;
            }
            InstallTarget::Directory { path, develop } => {
                self.install_from_directory(path, *develop, self.options.dev, None)?;
            }
            InstallTarget::Archive { path } => {
                self.install_from_archive(path, self.options.dev, None)?;
            }
            InstallTarget::Git { url, refspec } => {
                self.install_from_git(url, refspec.as_deref())?;
            }
            InstallTarget::Python { name, version } => {
                let mut deps = IndexMap::new();
                deps.insert(
                    name.clone(),
                    version.as_ref().map(|v| format!("=={}", v)).unwrap_or_default(),
                );
                native::install_python_dependencies(
                    &deps,
                    &self.dirs.pip_prefix,
                    self.options.pip_separate_process,
                )?;
                let shims = self.shim_writer();
                native::relink_pip_scripts(&self.dirs.pip_bin, &shims)?;
            }
        }
        Ok(())
    }

    /// Find an installed package by name, following develop links.
    pub fn find_installed(&self, name: &str) -> Result<Option<InstalledPackage>> {
        let link_path = self.link_path(name);
        if link_path.is_file() {
            let target = PathBuf::from(std::fs::read_to_string(&link_path)?.trim());
            let manifest_path = target.join(MANIFEST_FILENAME);
            if !manifest_path.is_file() {
                warn!(link = %link_path.display(), "dangling package link");
                return Ok(None);
            }
            let manifest = PackageManifest::read(&VPath::fs(manifest_path))?;
            return Ok(Some(InstalledPackage {
                manifest,
                directory: target,
                link: Some(link_path),
            }));
        }

        let package_dir = self.package_dir(name);
        if !package_dir.is_dir() {
            return Ok(None);
        }
        if package_dir.join(PARTIAL_SENTINEL).exists() {
            warn!(dir = %package_dir.display(), "ignoring partial install");
            return Ok(None);
        }
        let manifest_path = package_dir.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            warn!(dir = %package_dir.display(), "package directory without manifest");
            return Ok(None);
        }
        let manifest = PackageManifest::read(&VPath::fs(manifest_path))?;
        Ok(Some(InstalledPackage { manifest, directory: package_dir, link: None }))
    }

    /// Install the best registry version matching a selector.
    pub fn install_from_registry(
        &mut self,
        name: &str,
        selector: &Selector,
        dev: bool,
    ) -> Result<(String, Version)> {
        if let Some(installed) = self.find_installed(name)? {
            let satisfied = selector.is_provenance()
                || selector.matches(&installed.manifest.version);
            if !satisfied {
                warn!(
                    "dependency '{}@{}' unsatisfied, have '{}' installed",
                    name,
                    selector,
                    installed.manifest.identifier()
                );
            }
            if satisfied && !self.options.upgrade && !self.options.ignore_installed {
                info!("'{}' already satisfied", installed.manifest.identifier());
                if self.options.recursive {
                    let manifest = installed.manifest.clone();
                    let directory = installed.directory.clone();
                    self.install_dependencies_for(&manifest, &directory, false)?;
                }
                return Ok((name.to_string(), installed.manifest.version));
            }
        }

        let version = self.registry.find_best(name, selector)?;
        info!("downloading '{}@{}'", name, version);
        let staging = tempfile::Builder::new().prefix("nppm-dist-").tempdir()?;
        let archive = staging.path().join(format!("{}.tar.gz", version));
        self.registry
            .download_dist(name, &version, &archive, self.options.progress)?;
        self.install_from_archive(&archive, dev, Some((name.to_string(), version.clone())))?;
        Ok((name.to_string(), version))
    }

    /// Unpack an archive and install from the unpacked tree.
    pub fn install_from_archive(
        &mut self,
        archive: &Path,
        dev: bool,
        expect: Option<(String, Version)>,
    ) -> Result<(String, Version)> {
        info!("unpacking '{}'", archive.display());
        let unpacked = tempfile::Builder::new().prefix("nppm-unpack-").tempdir()?;
        dist::unpack(archive, unpacked.path())?;
        self.install_from_directory(unpacked.path(), false, dev, expect)
    }

    /// Clone a Git repository and install from the working tree.
    pub fn install_from_git(
        &mut self,
        url: &str,
        refspec: Option<&str>,
    ) -> Result<(String, Version)> {
        let clone_dir = tempfile::Builder::new().prefix("nppm-git-").tempdir()?;
        let mut command = Command::new("git");
        command.arg("clone").arg("--depth").arg("1");
        if let Some(refspec) = refspec {
            command.arg("--branch").arg(refspec);
        }
        command.arg(url).arg(clone_dir.path());
        info!("cloning '{}'", url);
        let status = command.status()?;
        if !status.success() {
            return Err(PmError::Other(format!("git clone of '{}' failed", url)));
        }
        self.install_from_directory(clone_dir.path(), false, false, None)
    }

    /// Install a package from a directory containing a manifest. The core
    /// placement routine everything else funnels into.
    pub fn install_from_directory(
        &mut self,
        directory: &Path,
        develop: bool,
        dev: bool,
        expect: Option<(String, Version)>,
    ) -> Result<(String, Version)> {
        let directory = directory.canonicalize()?;
        let manifest = PackageManifest::read(&VPath::fs(directory.join(MANIFEST_FILENAME)))?;

        if let Some((name, version)) = &expect {
            if manifest.name != *name || manifest.version != *version {
                return Err(PmError::Other(format!(
                    "expected to install '{}@{}' but '{}' contains '{}'",
                    name,
                    version,
                    directory.display(),
                    manifest.identifier()
                )));
            }
        }

        info!("installing '{}'", manifest.identifier());
        let target_dir = self.package_dir(&manifest.name);
        let link_path = self.link_path(&manifest.name);

        if target_dir.exists() || link_path.exists() {
            if !self.options.upgrade && !self.options.ignore_installed {
                info!(
                    "install directory for '{}' already exists, specify --upgrade",
                    manifest.name
                );
                return Ok((manifest.name.clone(), manifest.version.clone()));
            }
            self.remove_installed(&manifest.name)?;
        }

        let lifecycle = PackageLifecycle::new(manifest.clone(), directory.clone())
            .with_bin_dir(self.dirs.bin.clone());
        lifecycle.run("pre-install", &[])?;

        self.install_dependencies_for(&manifest, &directory, dev)?;

        let mut python_deps = manifest.python_dependencies.clone();
        if dev {
            python_deps.extend(
                manifest
                    .dev_python_dependencies
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        if !python_deps.is_empty() {
            native::install_python_dependencies(
                &python_deps,
                &self.dirs.pip_prefix,
                self.options.pip_separate_process,
            )?;
            let shims = self.shim_writer();
            native::relink_pip_scripts(&self.dirs.pip_bin, &shims)?;
        }

        if develop {
            // Develop install: a link file instead of a copy.
            if let Some(parent) = link_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&link_path, format!("{}\n", directory.display()))?;
            info!("created '{}'", link_path.display());

            let shims = self.shim_writer();
            for (bin_name, request) in &manifest.bin {
                shims.make_runtime_shim(bin_name, &directory.join(request))?;
            }

            lifecycle.run("post-install", &[])?;
            return Ok((manifest.name.clone(), manifest.version.clone()));
        }

        std::fs::create_dir_all(&target_dir)?;
        let sentinel = target_dir.join(PARTIAL_SENTINEL);
        std::fs::write(&sentinel, b"")?;

        let mut installed_files: Vec<PathBuf> = Vec::new();
        for (source, relative) in dist::walk_package_files(&manifest, &directory)? {
            let destination = target_dir.join(&relative);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            copy_if_changed(&source, &destination)?;
            debug!(file = %relative, "placed");
            installed_files.push(destination);
        }

        let shims = self.shim_writer();
        for (bin_name, request) in &manifest.bin {
            installed_files.extend(shims.make_runtime_shim(bin_name, &target_dir.join(request))?);
        }

        let mut file_list = String::new();
        for file in &installed_files {
            file_list.push_str(&file.display().to_string());
            file_list.push('\n');
        }
        std::fs::write(target_dir.join(INSTALLED_FILES), file_list)?;

        // The sentinel is cleared only after post-install succeeded; an
        // aborted install leaves the directory marked partial.
        let placed_lifecycle = PackageLifecycle::new(manifest.clone(), target_dir.clone())
            .with_bin_dir(self.dirs.bin.clone());
        placed_lifecycle.run("post-install", &[])?;
        std::fs::remove_file(&sentinel)?;

        info!("installed '{}' to '{}'", manifest.identifier(), target_dir.display());
        Ok((manifest.name.clone(), manifest.version.clone()))
    }

    /// Install the (transitive) dependencies of a manifest.
    pub fn install_dependencies_for(
        &mut self,
        manifest: &PackageManifest,
        source_dir: &Path,
        dev: bool,
    ) -> Result<()> {
        let plan = self.resolve_dependency_set(manifest, source_dir, dev)?;
        for planned in plan {
            match planned {
                PlannedDependency::Registry { name, version } => {
                    let exact = Selector::parse(&format!("={}", version))?;
                    self.install_from_registry(&name, &exact, false)?;
                }
                PlannedDependency::Git { url, refspec } => {
                    self.install_from_git(&url, refspec.as_deref())?;
                }
                PlannedDependency::Local { base, path, develop } => {
                    let target = base.join(&path);
                    self.install_from_directory(&target, develop, false, None)?;
                }
            }
        }
        Ok(())
    }

    /// Expand the transitive dependency set against the registry,
    /// resolving selector conflicts: incompatible exact selectors are an
    /// error, other conflicts pick the version satisfying the most
    /// dependents (warning and recording the decision).
    fn resolve_dependency_set(
        &mut self,
        root: &PackageManifest,
        source_dir: &Path,
        dev: bool,
    ) -> Result<Vec<PlannedDependency>> {
        let mut constraints: IndexMap<String, Vec<(String, Selector)>> = IndexMap::new();
        let mut provenance: Vec<PlannedDependency> = Vec::new();
        let mut queue: VecDeque<(String, String, Selector)> = VecDeque::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        let root_id = root.identifier();
        let seed = |queue: &mut VecDeque<_>, deps: &IndexMap<String, Selector>| {
            for (name, selector) in deps {
                queue.push_back((root_id.clone(), name.clone(), selector.clone()));
            }
        };
        seed(&mut queue, &root.dependencies);
        if dev {
            seed(&mut queue, &root.dev_dependencies);
        }

        let mut picks: IndexMap<String, Version> = IndexMap::new();
        let mut decided: HashSet<String> = HashSet::new();

        while let Some((dependent, name, selector)) = queue.pop_front() {
            if !seen.insert((name.clone(), selector.to_string())) {
                continue;
            }

            match &selector {
                Selector::Git { url, refspec, .. } => {
                    provenance.push(PlannedDependency::Git {
                        url: url.clone(),
                        refspec: refspec.clone(),
                    });
                    continue;
                }
                Selector::Local { path, develop, .. } => {
                    provenance.push(PlannedDependency::Local {
                        base: source_dir.to_path_buf(),
                        path: path.clone(),
                        develop: *develop,
                    });
                    continue;
                }
                Selector::Semver { .. } => {}
            }

            // A satisfied installed package short-circuits registry
            // expansion unless the walk is recursive.
            if !self.options.ignore_installed && !self.options.upgrade {
                if let Some(installed) = self.find_installed(&name)? {
                    if selector.matches(&installed.manifest.version) {
                        debug!("'{}' satisfied by installed '{}'", name, installed.manifest.identifier());
                        if self.options.recursive {
                            let id = installed.manifest.identifier();
                            for (dep, dep_selector) in &installed.manifest.dependencies {
                                queue.push_back((id.clone(), dep.clone(), dep_selector.clone()));
                            }
                        }
                        continue;
                    }
                }
            }

            constraints.entry(name.clone()).or_default().push((dependent, selector));

            // (Re)pick the version for this name under all constraints.
            let all = &constraints[&name];
            let versions = self.registry.versions(&name)?;
            let satisfying_all = versions
                .iter()
                .filter(|v| all.iter().all(|(_, s)| s.matches(v)))
                .max()
                .cloned();

            let pick = match satisfying_all {
                Some(version) => version,
                None => {
                    let mut exact: Vec<&Version> =
                        all.iter().filter_map(|(_, s)| s.fixed_version()).collect();
                    exact.sort();
                    exact.dedup();
                    if exact.len() > 1 {
                        return Err(PmError::InstallConflict {
                            package: name.clone(),
                            details: all
                                .iter()
                                .map(|(who, s)| format!("{} requires {}", who, s))
                                .collect::<Vec<_>>()
                                .join("; "),
                        });
                    }
                    // Satisfy the most dependents; ties go to the highest
                    // version.
                    let best = versions
                        .iter()
                        .max_by_key(|v| {
                            (all.iter().filter(|(_, s)| s.matches(v)).count(), (*v).clone())
                        })
                        .cloned()
                        .ok_or_else(|| PmError::VersionMismatch {
                            package: name.clone(),
                            selector: all
                                .iter()
                                .map(|(_, s)| s.to_string())
                                .collect::<Vec<_>>()
                                .join(" & "),
                        })?;
                    let satisfied = all.iter().filter(|(_, s)| s.matches(&best)).count();
                    let decision = format!(
                        "'{}': no version satisfies all of [{}]; picked {} (satisfies {}/{})",
                        name,
                        all.iter()
                            .map(|(who, s)| format!("{} → {}", who, s))
                            .collect::<Vec<_>>()
                            .join(", "),
                        best,
                        satisfied,
                        all.len()
                    );
                    if decided.insert(name.clone()) {
                        warn!("{}", decision);
                        self.decisions.push(decision);
                    }
                    best
                }
            };

            let changed = picks.get(&name) != Some(&pick);
            if changed {
                picks.insert(name.clone(), pick.clone());
                let info = self.registry.get_version(&name, &pick)?;
                let pick_id = format!("{}@{}", name, pick);
                for (dep, dep_selector) in &info.dependencies {
                    queue.push_back((pick_id.clone(), dep.clone(), dep_selector.clone()));
                }
            }
        }

        // Deterministic placement order.
        picks.sort_keys();
        let mut plan = provenance;
        plan.extend(
            picks
                .into_iter()
                .map(|(name, version)| PlannedDependency::Registry { name, version }),
        );
        Ok(plan)
    }

    /// Uninstall a package by name, consulting `installed-files.txt` and
    /// running the uninstall hooks.
    pub fn uninstall(&mut self, name: &str) -> Result<()> {
        let _lock = self.lock()?;
        let installed = self
            .find_installed(name)?
            .ok_or_else(|| PmError::NotInstalled(name.to_string()))?;

        let lifecycle = PackageLifecycle::new(
            installed.manifest.clone(),
            installed.directory.clone(),
        )
        .with_bin_dir(self.dirs.bin.clone());
        lifecycle.run("pre-uninstall", &[])?;

        info!("uninstalling '{}'", installed.manifest.identifier());
        self.remove_installed(name)?;

        // The package files are gone; the post hook runs in the modules
        // directory.
        let post = PackageLifecycle::new(installed.manifest.clone(), self.dirs.packages.clone())
            .with_bin_dir(self.dirs.bin.clone());
        post.run("post-uninstall", &[])?;
        Ok(())
    }

    /// Remove an installed package's files (no hooks).
    fn remove_installed(&self, name: &str) -> Result<()> {
        let link_path = self.link_path(name);
        if link_path.is_file() {
            let installed = self.find_installed(name)?;
            std::fs::remove_file(&link_path)?;
            if let Some(installed) = installed {
                self.remove_bin_shims(&installed.manifest);
            }
            return Ok(());
        }

        let package_dir = self.package_dir(name);
        if !package_dir.exists() {
            return Ok(());
        }
        let file_list = package_dir.join(INSTALLED_FILES);
        if file_list.is_file() {
            for line in std::fs::read_to_string(&file_list)?.lines() {
                let path = PathBuf::from(line.trim());
                if path.exists() && !path.starts_with(&package_dir) {
                    if let Err(err) = std::fs::remove_file(&path) {
                        warn!(file = %path.display(), error = %err, "could not remove");
                    }
                }
            }
        } else {
            warn!(
                "no {} found in '{}'",
                INSTALLED_FILES,
                package_dir.display()
            );
        }
        std::fs::remove_dir_all(&package_dir)?;
        Ok(())
    }

    fn remove_bin_shims(&self, manifest: &PackageManifest) {
        for bin_name in manifest.bin.keys() {
            for candidate in [
                self.dirs.bin.join(bin_name),
                self.dirs.bin.join(format!("{}.cmd", bin_name)),
            ] {
                if candidate.exists() {
                    if let Err(err) = std::fs::remove_file(&candidate) {
                        warn!(shim = %candidate.display(), error = %err, "could not remove shim");
                    }
                }
            }
        }
    }

    fn shim_writer(&self) -> ShimWriter {
        ShimWriter::new(self.dirs.bin.clone()).with_search_path(self.dirs.packages.clone())
    }

    /// `<packages>/<name>` with scoped names nested under their scope
    /// directory.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        let (scope, short) = split_scoped_name(name);
        match scope {
            Some(scope) => self.dirs.packages.join(format!("@{}", scope)).join(short),
            None => self.dirs.packages.join(short),
        }
    }

    /// `<packages>/<name>.nodepy-link`.
    pub fn link_path(&self, name: &str) -> PathBuf {
        let (scope, short) = split_scoped_name(name);
        let file = format!("{}{}", short, LINK_SUFFIX);
        match scope {
            Some(scope) => self.dirs.packages.join(format!("@{}", scope)).join(file),
            None => self.dirs.packages.join(file),
        }
    }
}

/// How a new dependency is saved into the root manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Dependencies,
    DevDependencies,
    Extensions,
}

/// Rewrite the root manifest, inserting a dependency or extension entry.
pub fn save_dependency(
    manifest_path: &Path,
    name: &str,
    selector: &Selector,
    kind: SaveKind,
) -> Result<()> {
    let mut manifest = PackageManifest::read(&VPath::fs(manifest_path.to_path_buf()))?;
    match kind {
        SaveKind::Dependencies => {
            manifest.dependencies.insert(name.to_string(), selector.clone());
        }
        SaveKind::DevDependencies => {
            manifest
                .dev_dependencies
                .insert(name.to_string(), selector.clone());
        }
        SaveKind::Extensions => {
            if !manifest.extensions.iter().any(|e| e == name) {
                manifest.extensions.push(name.to_string());
            }
        }
    }
    manifest.write(manifest_path)?;
    Ok(())
}

/// Copy `source` to `destination` unless the destination already has
/// identical contents; keeps re-runs from touching unchanged files.
fn copy_if_changed(source: &Path, destination: &Path) -> Result<()> {
    if destination.is_file() {
        let old = std::fs::read(destination)?;
        let new = std::fs::read(source)?;
        if old == new {
            return Ok(());
        }
        std::fs::write(destination, new)?;
        return Ok(());
    }
    std::fs::copy(source, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_and_link_paths() {
        let dirs = directories(InstallLocation::Local, Path::new("/work")).unwrap();
        let installer = Installer {
            registry: RegistryClient::new(&crate::config::RegistryConfig {
                name: "default".into(),
                url: "https://registry.invalid".into(),
                username: None,
                password: None,
            })
            .unwrap(),
            dirs,
            options: InstallerOptions::default(),
            decisions: Vec::new(),
        };
        assert_eq!(
            installer.package_dir("demo"),
            Path::new("/work/nodepy_modules/demo")
        );
        assert_eq!(
            installer.package_dir("@scope/demo"),
            Path::new("/work/nodepy_modules/@scope/demo")
        );
        assert_eq!(
            installer.link_path("demo"),
            Path::new("/work/nodepy_modules/demo.nodepy-link")
        );
        assert_eq!(
            installer.link_path("@scope/demo"),
            Path::new("/work/nodepy_modules/@scope/demo.nodepy-link")
        );
    }

    #[test]
    fn local_directories_layout() {
        let dirs = directories(InstallLocation::Local, Path::new("/ws")).unwrap();
        assert_eq!(dirs.packages, Path::new("/ws/nodepy_modules"));
        assert_eq!(dirs.bin, Path::new("/ws/nodepy_modules/.bin"));
        assert_eq!(dirs.pip_prefix, Path::new("/ws/nodepy_modules/.pip"));
    }

    #[test]
    fn copy_if_changed_preserves_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, "same").unwrap();
        std::fs::write(&dst, "same").unwrap();
        let mtime = std::fs::metadata(&dst).unwrap().modified().unwrap();
        copy_if_changed(&src, &dst).unwrap();
        assert_eq!(std::fs::metadata(&dst).unwrap().modified().unwrap(), mtime);

        std::fs::write(&src, "changed").unwrap();
        copy_if_changed(&src, &dst).unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "changed");
    }
}
