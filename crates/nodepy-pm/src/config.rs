//! Configuration file handling.
//!
//! The config lives at `~/.nodepy/config` (overridable through
//! `NODEPY_CONFIG`) in INI form:
//!
//! ```ini
//! [default]
//! author = Ada Lovelace <ada@example.com>
//! license = MIT
//!
//! [registry:work]
//! url = https://registry.example.com
//! username = ada
//! password = hunter2
//! ```
//!
//! Registries resolve in file order; a `[registry:default]` section is
//! implied for the built-in registry URL when none is configured.

use crate::error::{PmError, Result};
use crate::registry::DEFAULT_REGISTRY;
use indexmap::IndexMap;
use std::path::Path;

/// A configured registry endpoint.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Parsed configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `[default]` author, used by `nppm init`.
    pub author: Option<String>,
    /// `[default]` license, used by `nppm init`.
    pub license: Option<String>,
    /// Registries in file order.
    pub registries: Vec<RegistryConfig>,
    /// Remaining `[default]` keys.
    pub values: IndexMap<String, String>,
}

impl Config {
    /// Load the configuration from the default location. A missing file
    /// yields the default configuration.
    pub fn load() -> Result<Config> {
        match nodepy_runtime::context::config_file_path() {
            Some(path) if path.is_file() => Config::read(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Read and parse a configuration file.
    pub fn read(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        Config::parse(&content)
    }

    /// Parse INI-style content.
    pub fn parse(content: &str) -> Result<Config> {
        let mut config = Config::default();
        let mut section = String::from("default");

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    PmError::Config(format!("line {}: unterminated section header", number + 1))
                })?;
                section = name.trim().to_string();
                if let Some(registry) = section.strip_prefix("registry:") {
                    config.registries.push(RegistryConfig {
                        name: registry.trim().to_string(),
                        url: String::new(),
                        username: None,
                        password: None,
                    });
                }
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PmError::Config(format!("line {}: expected key = value", number + 1))
            })?;
            let key = key.trim();
            let value = value.trim().to_string();

            if section == "default" {
                match key {
                    "author" => config.author = Some(value),
                    "license" => config.license = Some(value),
                    _ => {
                        config.values.insert(key.to_string(), value);
                    }
                }
            } else if section.starts_with("registry:") {
                let registry = config
                    .registries
                    .last_mut()
                    .expect("section header pushed an entry");
                match key {
                    "url" => registry.url = value,
                    "username" => registry.username = Some(value),
                    "password" => registry.password = Some(value),
                    other => {
                        return Err(PmError::Config(format!(
                            "line {}: unknown registry key '{}'",
                            number + 1,
                            other
                        )))
                    }
                }
            } else {
                return Err(PmError::Config(format!("unknown section '{}'", section)));
            }
        }

        Ok(config)
    }

    /// Resolve a registry by name; without a name, the first configured
    /// registry wins, falling back to the built-in default.
    pub fn registry(&self, name: Option<&str>) -> Result<RegistryConfig> {
        match name {
            Some(name) => self
                .registries
                .iter()
                .find(|registry| registry.name == name)
                .cloned()
                .ok_or_else(|| PmError::Config(format!("no registry named '{}'", name))),
            None => Ok(self.registries.first().cloned().unwrap_or(RegistryConfig {
                name: "default".into(),
                url: DEFAULT_REGISTRY.into(),
                username: None,
                password: None,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# comment
[default]
author = Ada Lovelace <ada@example.com>
license = MIT
prefix = /opt/nodepy

[registry:work]
url = https://registry.example.com
username = ada
password = hunter2

[registry:public]
url = https://registry.nodepy.dev
";

    #[test]
    fn parses_sections() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.author.as_deref(), Some("Ada Lovelace <ada@example.com>"));
        assert_eq!(config.license.as_deref(), Some("MIT"));
        assert_eq!(config.values.get("prefix").map(String::as_str), Some("/opt/nodepy"));
        assert_eq!(config.registries.len(), 2);
        assert_eq!(config.registries[0].name, "work");
        assert_eq!(config.registries[0].username.as_deref(), Some("ada"));
    }

    #[test]
    fn registry_resolution_order() {
        let config = Config::parse(SAMPLE).unwrap();
        // Without a name the first section in file order wins.
        assert_eq!(config.registry(None).unwrap().name, "work");
        assert_eq!(config.registry(Some("public")).unwrap().url, "https://registry.nodepy.dev");
        assert!(config.registry(Some("missing")).is_err());
    }

    #[test]
    fn default_registry_when_unconfigured() {
        let config = Config::parse("[default]\nauthor = x\n").unwrap();
        let registry = config.registry(None).unwrap();
        assert_eq!(registry.url, DEFAULT_REGISTRY);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Config::parse("[default\n").is_err());
        assert!(Config::parse("[default]\nnot a pair\n").is_err());
        assert!(Config::parse("[registry:x]\nbogus = 1\n").is_err());
    }
}
