// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform path abstraction.
//!
//! Every component downstream of the resolver refers to files through
//! [`VPath`], which covers ordinary filesystem paths, URL-backed paths and
//! members of `.tar.gz` archives. Archive members use `/` separators
//! regardless of platform.

use crate::error::{Result, RuntimeError};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use url::Url;

/// A path over one of the supported backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VPath {
    /// Ordinary filesystem path.
    Fs(PathBuf),
    /// URL-backed path; read-only, fetched on open.
    Url(Url),
    /// Member of a gzip-compressed tar archive.
    Archive { archive: PathBuf, member: String },
}

impl VPath {
    /// Wrap a filesystem path.
    pub fn fs(path: impl Into<PathBuf>) -> VPath {
        VPath::Fs(path.into())
    }

    /// Parse a string into a path. `http://`/`https://` strings become URL
    /// paths, everything else is a filesystem path.
    pub fn parse(s: &str) -> VPath {
        if s.starts_with("http://") || s.starts_with("https://") {
            if let Ok(url) = Url::parse(s) {
                return VPath::Url(url);
            }
        }
        VPath::Fs(PathBuf::from(s))
    }

    /// The current working directory.
    pub fn cwd() -> Result<VPath> {
        Ok(VPath::Fs(std::env::current_dir()?))
    }

    /// Join a (possibly multi-component) relative part onto this path.
    pub fn join(&self, part: &str) -> VPath {
        match self {
            VPath::Fs(path) => VPath::Fs(path.join(part)),
            VPath::Url(url) => {
                let mut joined = url.clone();
                {
                    let mut segments = match joined.path_segments_mut() {
                        Ok(segments) => segments,
                        Err(()) => return VPath::Url(url.clone()),
                    };
                    segments.pop_if_empty();
                    for piece in part.split('/').filter(|p| !p.is_empty()) {
                        segments.push(piece);
                    }
                }
                VPath::Url(joined)
            }
            VPath::Archive { archive, member } => {
                let mut member = member.trim_end_matches('/').to_string();
                for piece in part.split('/').filter(|p| !p.is_empty()) {
                    if !member.is_empty() {
                        member.push('/');
                    }
                    member.push_str(piece);
                }
                VPath::Archive { archive: archive.clone(), member }
            }
        }
    }

    /// The parent path, if any. The parent of an archive member at the
    /// archive root is the archive file itself.
    pub fn parent(&self) -> Option<VPath> {
        match self {
            VPath::Fs(path) => path.parent().map(|p| VPath::Fs(p.to_path_buf())),
            VPath::Url(url) => {
                let mut parent = url.clone();
                {
                    let mut segments = parent.path_segments_mut().ok()?;
                    segments.pop_if_empty().pop();
                }
                if parent == *url {
                    None
                } else {
                    Some(VPath::Url(parent))
                }
            }
            VPath::Archive { archive, member } => {
                let member = member.trim_end_matches('/');
                match member.rsplit_once('/') {
                    Some((rest, _)) => Some(VPath::Archive {
                        archive: archive.clone(),
                        member: rest.to_string(),
                    }),
                    None if !member.is_empty() => Some(VPath::Fs(archive.clone())),
                    None => Some(VPath::Fs(archive.clone())),
                }
            }
        }
    }

    /// The final component, if any.
    pub fn file_name(&self) -> Option<String> {
        match self {
            VPath::Fs(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            VPath::Url(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| s.to_string()),
            VPath::Archive { member, .. } => {
                member.trim_end_matches('/').rsplit('/').next().map(|s| s.to_string())
            }
        }
    }

    /// File name without its last extension.
    pub fn stem(&self) -> Option<String> {
        self.file_name().map(|name| match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name.clone(),
        })
    }

    /// The suffix including the leading dot (e.g. `.ny`), or an empty
    /// string when the name has none.
    pub fn suffix(&self) -> String {
        match self.file_name() {
            Some(name) => match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!(".{}", ext),
                _ => String::new(),
            },
            None => String::new(),
        }
    }

    /// Replace the suffix (the `suffix` argument includes the leading dot).
    pub fn with_suffix(&self, suffix: &str) -> VPath {
        let name = self.file_name().unwrap_or_default();
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name.clone(),
        };
        self.with_file_name(&format!("{}{}", stem, suffix))
    }

    /// Append a suffix to the file name without replacing anything
    /// (`request` + `.ny` → `request.ny`).
    pub fn append_suffix(&self, suffix: &str) -> VPath {
        let name = self.file_name().unwrap_or_default();
        self.with_file_name(&format!("{}{}", name, suffix))
    }

    /// Replace the final component.
    pub fn with_file_name(&self, name: &str) -> VPath {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => self.join(name),
        }
    }

    /// Whether this path is absolute. URL and archive paths are always
    /// absolute (archive members are anchored at the archive file).
    pub fn is_absolute(&self) -> bool {
        match self {
            VPath::Fs(path) => path.is_absolute(),
            VPath::Url(_) | VPath::Archive { .. } => true,
        }
    }

    /// Normalize `.`/`..` components lexically, *without* consulting the
    /// filesystem. Logical parent elimination is required so that two
    /// references like `pkg/sub/..` and `pkg` compare equal even when the
    /// intermediate directory only exists logically.
    pub fn normalized(&self) -> VPath {
        match self {
            VPath::Fs(path) => VPath::Fs(normalize_fs(path)),
            VPath::Url(url) => VPath::Url(url.clone()),
            VPath::Archive { archive, member } => VPath::Archive {
                archive: normalize_fs(archive),
                member: normalize_member(member),
            },
        }
    }

    /// Resolve the path: lexical normalization first, then symlink
    /// canonicalization of the longest existing prefix. With `strict` the
    /// whole path must exist.
    pub fn resolve(&self, strict: bool) -> Result<VPath> {
        let normalized = self.normalized();
        match &normalized {
            VPath::Fs(path) => {
                let absolute = if path.is_absolute() {
                    path.clone()
                } else {
                    normalize_fs(&std::env::current_dir()?.join(path))
                };
                if let Ok(canonical) = absolute.canonicalize() {
                    return Ok(VPath::Fs(canonical));
                }
                if strict {
                    return Err(RuntimeError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no such path: {}", absolute.display()),
                    )));
                }
                // Canonicalize the longest existing prefix and re-attach
                // the nonexistent tail.
                let mut prefix = absolute.clone();
                let mut tail = Vec::new();
                while !prefix.exists() {
                    match (prefix.parent(), prefix.file_name()) {
                        (Some(parent), Some(name)) => {
                            tail.push(name.to_os_string());
                            prefix = parent.to_path_buf();
                        }
                        _ => return Ok(VPath::Fs(absolute)),
                    }
                }
                let mut resolved = prefix.canonicalize().unwrap_or(prefix);
                for name in tail.iter().rev() {
                    resolved.push(name);
                }
                Ok(VPath::Fs(resolved))
            }
            VPath::Url(_) | VPath::Archive { .. } => {
                if strict && !normalized.exists() {
                    return Err(RuntimeError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no such path: {}", normalized),
                    )));
                }
                Ok(normalized)
            }
        }
    }

    /// Whether the path exists.
    pub fn exists(&self) -> bool {
        match self {
            VPath::Fs(path) => path.exists(),
            VPath::Url(_) => true,
            VPath::Archive { archive, member } => {
                archive_find(archive, member, |_| true).unwrap_or(false)
            }
        }
    }

    /// Whether the path is a regular file.
    pub fn is_file(&self) -> bool {
        match self {
            VPath::Fs(path) => path.is_file(),
            VPath::Url(_) => true,
            VPath::Archive { archive, member } => {
                archive_entry_kind(archive, member).map_or(false, |kind| kind == EntryKind::File)
            }
        }
    }

    /// Whether the path is a directory.
    pub fn is_dir(&self) -> bool {
        match self {
            VPath::Fs(path) => path.is_dir(),
            VPath::Url(_) => false,
            VPath::Archive { archive, member } => {
                member.is_empty()
                    || archive_entry_kind(archive, member)
                        .map_or(false, |kind| kind == EntryKind::Dir)
            }
        }
    }

    /// Read the full contents as bytes.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            VPath::Fs(path) => Ok(std::fs::read(path)?),
            VPath::Url(url) => {
                let response = reqwest::blocking::get(url.clone())?.error_for_status()?;
                Ok(response.bytes()?.to_vec())
            }
            VPath::Archive { archive, member } => {
                archive_read(archive, member)?.ok_or_else(|| {
                    RuntimeError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no member '{}' in {}", member, archive.display()),
                    ))
                })
            }
        }
    }

    /// Read the full contents as UTF-8 text.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| {
            RuntimeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", self),
            ))
        })
    }

    /// Open the path for reading.
    pub fn open(&self) -> Result<Box<dyn Read>> {
        match self {
            VPath::Fs(path) => Ok(Box::new(File::open(path)?)),
            _ => Ok(Box::new(std::io::Cursor::new(self.read_bytes()?))),
        }
    }

    /// Modification time, when the backend has one.
    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            VPath::Fs(path) => path.metadata().and_then(|m| m.modified()).ok(),
            VPath::Url(_) => None,
            VPath::Archive { archive, .. } => {
                archive.metadata().and_then(|m| m.modified()).ok()
            }
        }
    }

    /// List directory entries.
    pub fn iterdir(&self) -> Result<Vec<VPath>> {
        match self {
            VPath::Fs(path) => {
                let mut entries = Vec::new();
                for entry in std::fs::read_dir(path)? {
                    entries.push(VPath::Fs(entry?.path()));
                }
                entries.sort();
                Ok(entries)
            }
            VPath::Url(_) => Ok(Vec::new()),
            VPath::Archive { archive, member } => archive_list(archive, member),
        }
    }

    /// The underlying filesystem path, when this is a plain one.
    pub fn as_fs_path(&self) -> Option<&Path> {
        match self {
            VPath::Fs(path) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Re-root a nonexistent filesystem path into an archive when one of
    /// its ancestors is an existing `.tar.gz` file. Returns the path
    /// unchanged in every other case.
    pub fn augment(self) -> VPath {
        let VPath::Fs(path) = &self else { return self };
        if path.exists() {
            return self;
        }
        let mut ancestor = path.as_path();
        let mut member_parts: Vec<String> = Vec::new();
        while let (Some(parent), Some(name)) = (ancestor.parent(), ancestor.file_name()) {
            member_parts.push(name.to_string_lossy().into_owned());
            ancestor = parent;
            if ancestor.is_file()
                && ancestor.to_string_lossy().ends_with(".tar.gz")
            {
                member_parts.reverse();
                return VPath::Archive {
                    archive: ancestor.to_path_buf(),
                    member: member_parts.join("/"),
                };
            }
            if ancestor.exists() {
                break;
            }
        }
        self
    }
}

impl std::fmt::Display for VPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VPath::Fs(path) => write!(f, "{}", path.display()),
            VPath::Url(url) => write!(f, "{}", url),
            VPath::Archive { archive, member } => {
                write!(f, "{}!/{}", archive.display(), member)
            }
        }
    }
}

impl From<PathBuf> for VPath {
    fn from(path: PathBuf) -> VPath {
        VPath::Fs(path)
    }
}

impl From<&Path> for VPath {
    fn from(path: &Path) -> VPath {
        VPath::Fs(path.to_path_buf())
    }
}

/// Lexically normalize a filesystem path: drop `.`, fold `..` into the
/// preceding component where possible.
fn normalize_fs(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    let mut result = PathBuf::new();
    for part in parts {
        result.push(part.as_os_str());
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

/// Normalize an archive member path the same way.
fn normalize_member(member: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for piece in member.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Scan an archive for a member matching `member`, applying `pred` to the
/// normalized entry path.
fn archive_find(
    archive: &Path,
    member: &str,
    pred: impl Fn(&str) -> bool,
) -> Result<bool> {
    let target = normalize_member(member);
    let file = File::open(archive)?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    for entry in reader.entries()? {
        let entry = entry?;
        let path = entry.path()?;
        let name = normalize_member(&path.to_string_lossy());
        if (name == target || name.starts_with(&format!("{}/", target))) && pred(&name) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn archive_entry_kind(archive: &Path, member: &str) -> Option<EntryKind> {
    let target = normalize_member(member);
    let file = File::open(archive).ok()?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    for entry in reader.entries().ok()? {
        let entry = entry.ok()?;
        let path = entry.path().ok()?;
        let name = normalize_member(&path.to_string_lossy());
        if name == target {
            return Some(match entry.header().entry_type() {
                tar::EntryType::Directory => EntryKind::Dir,
                _ => EntryKind::File,
            });
        }
        if name.starts_with(&format!("{}/", target)) {
            return Some(EntryKind::Dir);
        }
    }
    None
}

fn archive_read(archive: &Path, member: &str) -> Result<Option<Vec<u8>>> {
    let target = normalize_member(member);
    let file = File::open(archive)?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    for entry in reader.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        let name = normalize_member(&path.to_string_lossy());
        if name == target {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            return Ok(Some(contents));
        }
    }
    Ok(None)
}

fn archive_list(archive: &Path, member: &str) -> Result<Vec<VPath>> {
    let target = normalize_member(member);
    let file = File::open(archive)?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    let mut names = std::collections::BTreeSet::new();
    for entry in reader.entries()? {
        let entry = entry?;
        let path = entry.path()?;
        let name = normalize_member(&path.to_string_lossy());
        let relative = if target.is_empty() {
            Some(name.as_str())
        } else {
            name.strip_prefix(&format!("{}/", target))
        };
        if let Some(relative) = relative {
            if let Some(first) = relative.split('/').next() {
                if !first.is_empty() {
                    names.insert(if target.is_empty() {
                        first.to_string()
                    } else {
                        format!("{}/{}", target, first)
                    });
                }
            }
        }
    }
    Ok(names
        .into_iter()
        .map(|member| VPath::Archive { archive: archive.to_path_buf(), member })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_parent_components_lexically() {
        // `pkg/sub/..` must equal `pkg` even when `sub` does not exist.
        let path = VPath::fs("/work/pkg/sub/..");
        assert_eq!(path.normalized(), VPath::fs("/work/pkg"));
        let path = VPath::fs("/work/./pkg/../pkg");
        assert_eq!(path.normalized(), VPath::fs("/work/pkg"));
    }

    #[test]
    fn parent_dir_at_root_is_dropped() {
        assert_eq!(VPath::fs("/../a").normalized(), VPath::fs("/a"));
    }

    #[test]
    fn suffix_and_stem() {
        let path = VPath::fs("/a/b/mod.ny");
        assert_eq!(path.suffix(), ".ny");
        assert_eq!(path.stem().as_deref(), Some("mod"));
        assert_eq!(path.with_suffix(".nyc"), VPath::fs("/a/b/mod.nyc"));
        assert_eq!(
            VPath::fs("/a/b/mod").append_suffix(".ny"),
            VPath::fs("/a/b/mod.ny")
        );
    }

    #[test]
    fn dotfiles_have_no_suffix() {
        assert_eq!(VPath::fs("/a/.hidden").suffix(), "");
    }

    #[test]
    fn join_and_parent_round_trip() {
        let base = VPath::fs("/work");
        let joined = base.join("pkg/lib");
        assert_eq!(joined, VPath::fs("/work/pkg/lib"));
        assert_eq!(joined.parent(), Some(VPath::fs("/work/pkg")));
    }

    #[test]
    fn url_paths_join() {
        let base = VPath::parse("https://example.com/pkg");
        let joined = base.join("lib/mod.ny");
        assert_eq!(joined.to_string(), "https://example.com/pkg/lib/mod.ny");
        assert_eq!(joined.file_name().as_deref(), Some("mod.ny"));
    }

    #[test]
    fn archive_member_paths() {
        let path = VPath::Archive {
            archive: PathBuf::from("/dist/p-1.0.0.tar.gz"),
            member: "lib/m.ny".into(),
        };
        assert_eq!(path.file_name().as_deref(), Some("m.ny"));
        assert_eq!(path.suffix(), ".ny");
        assert_eq!(
            path.parent(),
            Some(VPath::Archive {
                archive: PathBuf::from("/dist/p-1.0.0.tar.gz"),
                member: "lib".into(),
            })
        );
    }

    #[test]
    fn resolve_tolerates_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = VPath::Fs(dir.path().join("a/b/../c"));
        let resolved = missing.resolve(false).unwrap();
        // Lexical normalization happened, and the existing prefix was kept.
        assert!(resolved.to_string().ends_with("a/c"));
        assert!(missing.resolve(true).is_err());
    }

    #[test]
    fn archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let data = b"exports = {x: 1}\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "lib/m.ny", &data[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let member = VPath::Archive {
            archive: archive_path.clone(),
            member: "lib/m.ny".into(),
        };
        assert!(member.exists());
        assert!(member.is_file());
        assert_eq!(member.read_bytes().unwrap(), data);

        let lib = VPath::Archive { archive: archive_path.clone(), member: "lib".into() };
        assert!(lib.is_dir());
        assert_eq!(lib.iterdir().unwrap(), vec![member.clone()]);

        // A nonexistent fs path pointing into the archive is augmented.
        let logical = VPath::Fs(archive_path.join("lib/m.ny"));
        assert_eq!(logical.augment(), member);
    }
}
