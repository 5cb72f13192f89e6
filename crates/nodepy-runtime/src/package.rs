// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discovered packages: a manifest plus its root directory.

use crate::extensions::Extension;
use crate::manifest::PackageManifest;
use crate::path::VPath;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a discovered package. One exists per canonicalized
/// root directory per context.
pub type PackageRef = Rc<Package>;

/// A package: a directory with a manifest.
pub struct Package {
    pub manifest: PackageManifest,
    /// Canonicalized root directory.
    pub directory: VPath,
    /// Extension instances, loaded lazily on first use of the package.
    pub(crate) extensions: RefCell<Option<Vec<Rc<dyn Extension>>>>,
}

impl Package {
    pub fn new(manifest: PackageManifest, directory: VPath) -> PackageRef {
        Rc::new(Package {
            manifest,
            directory,
            extensions: RefCell::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn identifier(&self) -> String {
        self.manifest.identifier()
    }

    /// The effective root for in-package requests: the `resolve_root`
    /// subdirectory when the manifest declares one.
    pub fn root_dir(&self) -> VPath {
        match self.manifest.resolve_root.as_deref() {
            Some(root) if !root.is_empty() => self.directory.join(root),
            _ => self.directory.clone(),
        }
    }

    /// The main entry request, relative to the package directory.
    pub fn main_request(&self) -> &str {
        self.manifest.main_request()
    }

    /// Vendor directories, resolved against the package root.
    pub fn vendor_directories(&self) -> Vec<VPath> {
        self.manifest
            .vendor_directories
            .iter()
            .map(|dir| self.directory.join(dir))
            .collect()
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("directory", &self.directory)
            .finish()
    }
}
