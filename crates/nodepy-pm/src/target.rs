//! Install target parsing.
//!
//! Accepted forms: `<pkg>[@<selector>]`, `./path`, `../path`, absolute
//! paths, `<file>.tar.gz`, `git+<url>[@<ref>]` and `py/<host-pkg>[==ver]`.

use crate::error::{PmError, Result};
use nodepy_runtime::manifest::validate_package_name;
use nodepy_runtime::semver::Selector;
use std::path::{Path, PathBuf};

/// A parsed install target.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallTarget {
    /// Fetch from the configured registry.
    Registry { name: String, selector: Selector },
    /// Install from a local directory, optionally in develop mode.
    Directory { path: PathBuf, develop: bool },
    /// Install from a local archive.
    Archive { path: PathBuf },
    /// Clone and install from a Git repository.
    Git { url: String, refspec: Option<String> },
    /// Delegate to the host-language installer.
    Python { name: String, version: Option<String> },
}

/// Parse a command-line install target. `develop` applies to directory
/// targets (`-e`).
pub fn parse_target(spec: &str, develop: bool) -> Result<InstallTarget> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(PmError::InvalidTarget(spec.to_string()));
    }

    if let Some(rest) = spec.strip_prefix("py/") {
        if rest.is_empty() {
            return Err(PmError::InvalidTarget(spec.to_string()));
        }
        let (name, version) = match rest.split_once("==") {
            Some((name, version)) => (name.to_string(), Some(version.to_string())),
            None => (rest.to_string(), None),
        };
        return Ok(InstallTarget::Python { name, version });
    }

    if let Some(rest) = spec.strip_prefix("git+") {
        let (url, refspec) = match rest.rsplit_once('@') {
            Some((url, refspec)) if !refspec.contains('/') && !refspec.is_empty() => {
                (url.to_string(), Some(refspec.to_string()))
            }
            _ => (rest.to_string(), None),
        };
        return Ok(InstallTarget::Git { url, refspec });
    }

    if spec.ends_with(".tar.gz") {
        return Ok(InstallTarget::Archive { path: PathBuf::from(spec) });
    }

    if spec.starts_with("./") || spec.starts_with("../") || Path::new(spec).is_absolute() {
        return Ok(InstallTarget::Directory { path: PathBuf::from(spec), develop });
    }

    // `<pkg>[@<selector>]`; scoped names keep their leading `@`.
    let (name, selector) = split_name_and_selector(spec);
    validate_package_name(name).map_err(PmError::InvalidTarget)?;
    let selector = match selector {
        Some(selector) => Selector::parse(selector)?,
        None => Selector::parse("*")?,
    };
    Ok(InstallTarget::Registry { name: name.to_string(), selector })
}

/// Split `name@selector`, keeping `@scope/name` prefixes intact.
pub fn split_name_and_selector(spec: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(at) => {
            let at = at + search_from;
            (&spec[..at], Some(&spec[at + 1..]))
        }
        None => (spec, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_targets() {
        match parse_target("demo", false).unwrap() {
            InstallTarget::Registry { name, selector } => {
                assert_eq!(name, "demo");
                assert_eq!(selector.to_string(), "*");
            }
            other => panic!("unexpected target {:?}", other),
        }
        match parse_target("demo@~1.2.0", false).unwrap() {
            InstallTarget::Registry { name, selector } => {
                assert_eq!(name, "demo");
                assert_eq!(selector.to_string(), "~1.2.0");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn scoped_registry_targets() {
        match parse_target("@scope/demo@^2.0.0", false).unwrap() {
            InstallTarget::Registry { name, selector } => {
                assert_eq!(name, "@scope/demo");
                assert_eq!(selector.to_string(), "^2.0.0");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn path_archive_git_and_python_targets() {
        assert_eq!(
            parse_target("./local", true).unwrap(),
            InstallTarget::Directory { path: PathBuf::from("./local"), develop: true }
        );
        assert_eq!(
            parse_target("demo-1.0.0.tar.gz", false).unwrap(),
            InstallTarget::Archive { path: PathBuf::from("demo-1.0.0.tar.gz") }
        );
        assert_eq!(
            parse_target("git+https://example.com/r.git@main", false).unwrap(),
            InstallTarget::Git {
                url: "https://example.com/r.git".into(),
                refspec: Some("main".into())
            }
        );
        assert_eq!(
            parse_target("py/requests==2.31", false).unwrap(),
            InstallTarget::Python { name: "requests".into(), version: Some("2.31".into()) }
        );
    }

    #[test]
    fn rejects_bad_names() {
        assert!(parse_target("bad name", false).is_err());
        assert!(parse_target("", false).is_err());
        assert!(parse_target("py/", false).is_err());
    }
}
