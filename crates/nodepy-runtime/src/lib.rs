// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node.js-style module resolution runtime.
//!
//! A [`context::Context`] owns an ordered resolver chain, a loader chain,
//! the module and package caches and the search path. Each loaded module
//! receives its own [`require::Require`] capability closed over the
//! module's location. The package installer crate builds on the manifest
//! and semver models exported here.

pub mod context;
pub mod error;
pub mod extensions;
pub mod loader;
pub mod manifest;
pub mod module;
pub mod package;
pub mod path;
pub mod require;
pub mod resolver;
pub mod semver;

pub use context::{Context, ContextGuard, Event, MODULES_DIRECTORY};
pub use error::{Result, RuntimeError};
pub use manifest::{PackageManifest, MANIFEST_FILENAME};
pub use module::{Module, ModuleRef, Request};
pub use package::{Package, PackageRef};
pub use path::VPath;
pub use require::{Require, RequireOptions, RequireOutcome};
pub use semver::{Selector, Version};

/// Runtime version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
