// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Package manifest (`nodepy.json`) parsing, validation and serialization.
//!
//! All maps are insertion-ordered and survive a parse → serialize → parse
//! round trip on the typed view.

use crate::error::{Result, RuntimeError};
use crate::path::VPath;
use crate::semver::{Selector, Version};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The manifest file name.
pub const MANIFEST_FILENAME: &str = "nodepy.json";

/// A typed view of a package manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Main entry request, resolved against the package root. Defaults to
    /// `index` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Subdirectory acting as the effective root for in-package requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_root: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub engines: IndexMap<String, Selector>,

    /// Executable name → module request.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub bin: IndexMap<String, String>,

    /// Lifecycle event → module request or `!shell` command.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, Selector>,

    #[serde(
        default,
        rename = "dev-dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dev_dependencies: IndexMap<String, Selector>,

    /// Host-language dependencies, handed to the native installer.
    #[serde(
        default,
        rename = "python-dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub python_dependencies: IndexMap<String, String>,

    #[serde(
        default,
        rename = "dev-python-dependencies",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dev_python_dependencies: IndexMap<String, String>,

    /// Extension module requests, invoked in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    #[serde(
        default,
        rename = "vendor-directories",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub vendor_directories: Vec<String>,

    #[serde(default, skip_serializing_if = "DistConfig::is_empty")]
    pub dist: DistConfig,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
}

/// `dist` section: include/exclude glob patterns for the packer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_files: Vec<String>,
}

impl DistConfig {
    fn is_empty(&self) -> bool {
        self.include_files.is_empty() && self.exclude_files.is_empty()
    }
}

impl PackageManifest {
    /// Create a minimal manifest.
    pub fn new(name: impl Into<String>, version: Version) -> PackageManifest {
        PackageManifest {
            name: name.into(),
            version,
            description: None,
            author: None,
            license: None,
            repository: None,
            main: None,
            resolve_root: None,
            engines: IndexMap::new(),
            bin: IndexMap::new(),
            scripts: IndexMap::new(),
            dependencies: IndexMap::new(),
            dev_dependencies: IndexMap::new(),
            python_dependencies: IndexMap::new(),
            dev_python_dependencies: IndexMap::new(),
            extensions: Vec::new(),
            vendor_directories: Vec::new(),
            dist: DistConfig::default(),
            private: false,
        }
    }

    /// Parse and validate a manifest from a string.
    pub fn parse(content: &str, filename: &str) -> Result<PackageManifest> {
        let manifest: PackageManifest =
            serde_json::from_str(content).map_err(|err| RuntimeError::InvalidManifest {
                filename: filename.to_string(),
                reason: err.to_string(),
            })?;
        manifest.validate(filename)?;
        Ok(manifest)
    }

    /// Read and validate a manifest file.
    pub fn read(path: &VPath) -> Result<PackageManifest> {
        let content = path.read_to_string()?;
        Self::parse(&content, &path.to_string())
    }

    /// Serialize with 2-space indentation and a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        buffer.push(b'\n');
        Ok(String::from_utf8(buffer).expect("manifest serialization is UTF-8"))
    }

    /// Write the manifest to a file.
    pub fn write(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// `name@version`.
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// The main entry request (`index` by default).
    pub fn main_request(&self) -> &str {
        self.main.as_deref().unwrap_or(crate::context::INDEX_FILE)
    }

    fn validate(&self, filename: &str) -> Result<()> {
        validate_package_name(&self.name).map_err(|reason| RuntimeError::InvalidManifest {
            filename: filename.to_string(),
            reason,
        })
    }
}

/// Validate a package name: ASCII letters, digits, `.-_`, with an optional
/// `@scope/` prefix subject to the same character set.
pub fn validate_package_name(name: &str) -> std::result::Result<(), String> {
    let (scope, short) = split_scoped_name(name);
    if let Some(scope) = scope {
        if scope.is_empty() || !is_valid_name_part(scope) {
            return Err(format!("invalid package scope in {:?}", name));
        }
    }
    if short.is_empty() || !is_valid_name_part(short) {
        return Err(format!("invalid package name {:?}", name));
    }
    Ok(())
}

/// Split `@scope/name` into its parts; unscoped names yield `(None, name)`.
pub fn split_scoped_name(name: &str) -> (Option<&str>, &str) {
    if let Some(rest) = name.strip_prefix('@') {
        if let Some((scope, short)) = rest.split_once('/') {
            return (Some(scope), short);
        }
        return (Some(rest), "");
    }
    (None, name)
}

fn is_valid_name_part(part: &str) -> bool {
    part.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semver::Version;

    const SAMPLE: &str = r#"{
  "name": "demo",
  "version": "1.2.0",
  "main": "lib/main",
  "resolve_root": "lib",
  "bin": {"demo": "lib/cli"},
  "scripts": {"post-install": "!echo done"},
  "dependencies": {"b-pkg": "~2.0.0", "a-pkg": "^1.0.0"},
  "python-dependencies": {"requests": ">=2.0"},
  "extensions": ["!require-import-syntax"],
  "dist": {"include_files": ["lib/*"], "exclude_files": ["lib/private*"]}
}"#;

    #[test]
    fn parses_typed_fields() {
        let manifest = PackageManifest::parse(SAMPLE, "nodepy.json").unwrap();
        assert_eq!(manifest.name, "demo");
        assert_eq!(manifest.version, Version::new(1, 2, 0));
        assert_eq!(manifest.main_request(), "lib/main");
        assert_eq!(manifest.resolve_root.as_deref(), Some("lib"));
        assert!(manifest.dependencies["a-pkg"].matches(&Version::new(1, 3, 0)));
    }

    #[test]
    fn maps_preserve_insertion_order() {
        let manifest = PackageManifest::parse(SAMPLE, "nodepy.json").unwrap();
        let keys: Vec<&String> = manifest.dependencies.keys().collect();
        // "b-pkg" was declared first and must stay first.
        assert_eq!(keys, ["b-pkg", "a-pkg"]);
        let serialized = manifest.to_json_string().unwrap();
        assert!(serialized.find("b-pkg").unwrap() < serialized.find("a-pkg").unwrap());
    }

    #[test]
    fn round_trip_is_identity_on_typed_view() {
        let manifest = PackageManifest::parse(SAMPLE, "nodepy.json").unwrap();
        let serialized = manifest.to_json_string().unwrap();
        let reparsed = PackageManifest::parse(&serialized, "nodepy.json").unwrap();
        assert_eq!(manifest, reparsed);
    }

    #[test]
    fn serializes_with_two_space_indent() {
        let manifest = PackageManifest::new("demo", Version::new(1, 0, 0));
        let serialized = manifest.to_json_string().unwrap();
        assert!(serialized.contains("\n  \"name\""));
        assert!(serialized.ends_with('\n'));
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(PackageManifest::parse(r#"{"name": "x"}"#, "m").is_err());
        assert!(PackageManifest::parse(r#"{"version": "1.0.0"}"#, "m").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_package_name("demo").is_ok());
        assert!(validate_package_name("demo-pkg_1.2").is_ok());
        assert!(validate_package_name("@scope/demo").is_ok());
        assert!(validate_package_name("bad name").is_err());
        assert!(validate_package_name("@/demo").is_err());
        assert!(validate_package_name("@scope/").is_err());
        assert!(validate_package_name("a/b").is_err());
        assert!(PackageManifest::parse(r#"{"name": "a b", "version": "1.0.0"}"#, "m").is_err());
    }

    #[test]
    fn scoped_name_split() {
        assert_eq!(split_scoped_name("@scope/demo"), (Some("scope"), "demo"));
        assert_eq!(split_scoped_name("demo"), (None, "demo"));
    }
}
