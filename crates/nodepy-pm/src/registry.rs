//! Registry HTTP client.
//!
//! Request surface: `GET /packages/<name>` for metadata,
//! `GET /packages/<name>/<version>/dist` for the tarball,
//! `POST /packages/<name>/<version>/dist` for uploads and
//! `POST /register` for account creation.

use crate::config::RegistryConfig;
use crate::error::{PmError, Result};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use nodepy_runtime::semver::{Selector, Version};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Built-in registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.nodepy.dev";

/// Package metadata advertised by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionInfo>,
}

/// Per-version information.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub dependencies: IndexMap<String, Selector>,
    #[serde(default, rename = "python-dependencies")]
    pub python_dependencies: IndexMap<String, String>,
}

/// Blocking registry client with a per-process metadata cache.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    cache: RefCell<HashMap<String, PackageMetadata>>,
}

impl RegistryClient {
    /// Create a client for a configured registry.
    pub fn new(config: &RegistryConfig) -> Result<RegistryClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(format!("nppm/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(RegistryClient {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch (and cache) package metadata.
    pub fn get_package(&self, name: &str) -> Result<PackageMetadata> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(cached.clone());
        }
        let url = format!("{}/packages/{}", self.base_url, encode_package_name(name));
        debug!(url = %url, "fetching package metadata");

        let response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PmError::PackageNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(PmError::Registry(format!(
                "GET {} failed: HTTP {}",
                url,
                response.status()
            )));
        }
        let metadata: PackageMetadata = response.json()?;
        self.cache
            .borrow_mut()
            .insert(name.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// All advertised versions of a package, parsed.
    pub fn versions(&self, name: &str) -> Result<Vec<Version>> {
        let metadata = self.get_package(name)?;
        let mut versions = Vec::with_capacity(metadata.versions.len());
        for key in metadata.versions.keys() {
            versions.push(Version::parse(key)?);
        }
        versions.sort();
        Ok(versions)
    }

    /// The best version matching a selector, per the selector's own
    /// ordering rules.
    pub fn find_best(&self, name: &str, selector: &Selector) -> Result<Version> {
        let versions = self.versions(name)?;
        selector
            .best(versions.iter())
            .cloned()
            .ok_or_else(|| PmError::VersionMismatch {
                package: name.to_string(),
                selector: selector.to_string(),
            })
    }

    /// Version info for an exact version.
    pub fn get_version(&self, name: &str, version: &Version) -> Result<VersionInfo> {
        let metadata = self.get_package(name)?;
        metadata
            .versions
            .get(&version.to_string())
            .cloned()
            .ok_or_else(|| PmError::VersionMismatch {
                package: name.to_string(),
                selector: format!("={}", version),
            })
    }

    /// Download the dist tarball for a version into `dest`.
    pub fn download_dist(
        &self,
        name: &str,
        version: &Version,
        dest: &Path,
        progress: bool,
    ) -> Result<()> {
        let url = format!(
            "{}/packages/{}/{}/dist",
            self.base_url,
            encode_package_name(name),
            version
        );
        debug!(url = %url, "downloading dist");

        let mut response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PmError::VersionMismatch {
                package: name.to_string(),
                selector: format!("={}", version),
            });
        }
        if !response.status().is_success() {
            return Err(PmError::Registry(format!(
                "GET {} failed: HTTP {}",
                url,
                response.status()
            )));
        }

        let bar = if progress {
            let bar = match response.content_length() {
                Some(total) => ProgressBar::new(total),
                None => ProgressBar::new_spinner(),
            };
            bar.set_style(
                ProgressStyle::with_template("  {msg} {bar:30} {bytes}/{total_bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(format!("{}@{}", name, version));
            Some(bar)
        } else {
            None
        };

        let mut file = std::fs::File::create(dest)?;
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            std::io::Write::write_all(&mut file, &buffer[..read])?;
            if let Some(bar) = &bar {
                bar.inc(read as u64);
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        Ok(())
    }

    /// Upload a dist tarball. Requires configured credentials.
    pub fn upload(&self, name: &str, version: &Version, archive: &Path) -> Result<()> {
        let (username, password) = match (&self.username, &self.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                return Err(PmError::Registry(
                    "upload requires username and password in the registry config".into(),
                ))
            }
        };
        let url = format!(
            "{}/packages/{}/{}/dist",
            self.base_url,
            encode_package_name(name),
            version
        );
        let data = std::fs::read(archive)?;
        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .header("Content-Type", "application/gzip")
            .body(data)
            .send()?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PmError::Registry("authentication failed".into()));
        }
        if !response.status().is_success() {
            return Err(PmError::Registry(format!(
                "POST {} failed: HTTP {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    /// Create a registry account.
    pub fn register(&self, username: &str, password: &str, email: &str) -> Result<()> {
        let url = format!("{}/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "email": email,
            }))
            .send()?;
        if !response.status().is_success() {
            return Err(PmError::Registry(format!(
                "POST {} failed: HTTP {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Encode a package name for URLs (`@scope/name` → `@scope%2Fname`).
fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        urlencoding::encode(name).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scoped_names() {
        assert_eq!(encode_package_name("demo"), "demo");
        assert_eq!(encode_package_name("@scope/demo"), "@scope%2Fdemo");
    }

    #[test]
    fn version_info_deserializes() {
        let json = r#"{
            "name": "demo",
            "versions": {
                "1.0.0": {"name": "demo", "version": "1.0.0",
                          "dependencies": {"dep": "^2.0.0"}},
                "1.1.0": {"name": "demo", "version": "1.1.0"}
            }
        }"#;
        let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.versions.len(), 2);
        let info = &metadata.versions["1.0.0"];
        assert!(info.dependencies.contains_key("dep"));
    }
}
