//! Dist packer: filter package files by include/exclude patterns and
//! build the `.tar.gz` distribution archive.

use crate::error::Result;
use nodepy_runtime::manifest::{PackageManifest, MANIFEST_FILENAME};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Patterns excluded from every package archive.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".svn/*",
    ".git",
    ".git/*",
    ".DS_Store",
    "*.pyc",
    "*.pyo",
    "dist/*",
    "nodepy_modules/*",
];

/// Shell-style pattern match over a relative path: `*` matches any run of
/// characters (including separators), `?` a single character and `[..]` a
/// character set.
pub fn fnmatch(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[char], name: &[char]) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some(('*', rest)) => {
                (0..=name.len()).any(|skip| matches(rest, &name[skip..]))
            }
            Some(('?', rest)) => match name.split_first() {
                Some((_, name_rest)) => matches(rest, name_rest),
                None => false,
            },
            Some(('[', rest)) => {
                let Some(end) = rest.iter().position(|c| *c == ']') else {
                    return match name.split_first() {
                        Some(('[', name_rest)) => matches(rest, name_rest),
                        _ => false,
                    };
                };
                let (set, tail) = rest.split_at(end);
                let tail = &tail[1..];
                match name.split_first() {
                    Some((c, name_rest)) => {
                        let (negated, set) = match set.split_first() {
                            Some(('!', set)) => (true, set),
                            _ => (false, set),
                        };
                        let mut found = false;
                        let mut i = 0;
                        while i < set.len() {
                            if i + 2 < set.len() && set[i + 1] == '-' {
                                if (set[i]..=set[i + 2]).contains(c) {
                                    found = true;
                                }
                                i += 3;
                            } else {
                                if set[i] == *c {
                                    found = true;
                                }
                                i += 1;
                            }
                        }
                        if found != negated {
                            matches(tail, name_rest)
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            }
            Some((c, rest)) => match name.split_first() {
                Some((n, name_rest)) if n == c => matches(rest, name_rest),
                _ => false,
            },
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches(&pattern, &name)
}

fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| fnmatch(pattern, name))
}

/// Decide whether a relative path belongs in the archive. Include
/// patterns override excludes; with a non-empty include list only matching
/// files are packed. The manifest file is always included.
pub fn file_included(relative: &str, include: &[String], exclude: &[String]) -> bool {
    if relative == MANIFEST_FILENAME {
        return true;
    }
    if matches_any(relative, include) {
        return true;
    }
    let mut excluded = matches_any(relative, exclude);
    if !excluded {
        excluded = DEFAULT_EXCLUDES.iter().any(|pattern| fnmatch(pattern, relative));
    }
    if excluded {
        return false;
    }
    include.is_empty()
}

/// Walk the files of a package, yielding `(absolute, relative)` pairs in
/// deterministic order.
pub fn walk_package_files(
    manifest: &PackageManifest,
    directory: &Path,
) -> Result<Vec<(PathBuf, String)>> {
    let include = &manifest.dist.include_files;
    let exclude = &manifest.dist.exclude_files;
    let mut files = Vec::new();

    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(directory)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if file_included(&relative, include, exclude) {
            files.push((entry.path().to_path_buf(), relative));
        }
    }

    Ok(files)
}

/// Build `dist/<name>-<version>.tar.gz` for the package at `directory`.
pub fn pack(manifest: &PackageManifest, directory: &Path, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let archive_path = dest_dir.join(format!(
        "{}-{}.tar.gz",
        manifest.name.replace('/', "-").replace('@', ""),
        manifest.version
    ));

    let file = std::fs::File::create(&archive_path)?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (absolute, relative) in walk_package_files(manifest, directory)? {
        debug!(file = %relative, "packing");
        let mut source = std::fs::File::open(&absolute)?;
        builder.append_file(&relative, &mut source)?;
    }

    builder.into_inner()?.finish()?;
    Ok(archive_path)
}

/// Unpack a `.tar.gz` archive into a directory.
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut reader = tar::Archive::new(decoder);
    reader.unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepy_runtime::semver::Version;

    #[test]
    fn fnmatch_basics() {
        assert!(fnmatch("*.pyc", "mod.pyc"));
        assert!(fnmatch("dist/*", "dist/demo-1.0.0.tar.gz"));
        assert!(fnmatch("lib/*", "lib/sub/file.ny"));
        assert!(fnmatch("?.ny", "a.ny"));
        assert!(!fnmatch("?.ny", "ab.ny"));
        assert!(fnmatch("[ab].ny", "a.ny"));
        assert!(!fnmatch("[!ab].ny", "a.ny"));
        assert!(fnmatch("[a-z]1", "q1"));
        assert!(!fnmatch("*.pyc", "mod.py"));
    }

    #[test]
    fn default_excludes_apply() {
        assert!(!file_included(".DS_Store", &[], &[]));
        assert!(!file_included("nodepy_modules/dep/index.ny", &[], &[]));
        assert!(!file_included("dist/old.tar.gz", &[], &[]));
        assert!(file_included("lib/index.ny", &[], &[]));
    }

    #[test]
    fn include_overrides_exclude() {
        let include = vec!["lib/keep.pyc".to_string()];
        let exclude = vec!["lib/*".to_string()];
        // Included despite matching both the exclude list and a default
        // exclude pattern.
        assert!(file_included("lib/keep.pyc", &include, &exclude));
        assert!(!file_included("lib/other.ny", &include, &exclude));
    }

    #[test]
    fn nonempty_include_restricts() {
        let include = vec!["lib/*".to_string()];
        assert!(file_included("lib/a.ny", &include, &[]));
        assert!(!file_included("tools/b.ny", &include, &[]));
        // The manifest is always packed.
        assert!(file_included("nodepy.json", &include, &[]));
    }

    #[test]
    fn pack_then_unpack_round_trips() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("lib")).unwrap();
        std::fs::write(src.path().join("nodepy.json"), "{}").unwrap();
        std::fs::write(src.path().join("lib/a.ny"), "exports = {}\n").unwrap();
        std::fs::write(src.path().join("lib/skip.pyc"), "x").unwrap();

        let mut manifest = PackageManifest::new("demo", Version::new(1, 0, 0));
        manifest.dist.exclude_files = vec![];

        let dist_dir = src.path().join("dist");
        let archive = pack(&manifest, src.path(), &dist_dir).unwrap();
        assert!(archive.ends_with("demo-1.0.0.tar.gz"));

        let out = tempfile::tempdir().unwrap();
        unpack(&archive, out.path()).unwrap();
        assert!(out.path().join("lib/a.ny").exists());
        assert!(out.path().join("nodepy.json").exists());
        assert!(!out.path().join("lib/skip.pyc").exists());
        assert!(!out.path().join("dist").exists());
    }
}
