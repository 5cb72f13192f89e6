// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reduced SemVer dialect: versions and version selectors.
//!
//! Selectors support `*`, exact (`=`/`==`), inequalities, `~` and `^`
//! ranges, hyphen ranges (`1.0.0 - 1.4.0`), `x` placeholders (`1.x`),
//! disjunction with `||` and conjunction with whitespace, plus two
//! provenance-only forms: `git+<url>[@<ref>]` and local paths.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from version and selector parsing.
#[derive(Debug, Error)]
pub enum SemverError {
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),

    #[error("invalid version selector: {0:?}")]
    InvalidSelector(String),
}

/// A version of the form `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`.
/// Missing minor/patch components parse as zero. Build metadata is kept
/// for display but ignored for precedence.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Version {
        Version { major, minor, patch, prerelease: None, build: None }
    }

    /// Parse a version string. A leading `v` is tolerated.
    pub fn parse(s: &str) -> Result<Version, SemverError> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        if s.is_empty() {
            return Err(SemverError::InvalidVersion(s.to_string()));
        }

        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) if !build.is_empty() => (rest, Some(build.to_string())),
            Some(_) => return Err(SemverError::InvalidVersion(s.to_string())),
            None => (s, None),
        };
        let (core, prerelease) = match rest.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(SemverError::InvalidVersion(s.to_string())),
            None => (rest, None),
        };

        let mut parts = [0u64; 3];
        let pieces: Vec<&str> = core.split('.').collect();
        if pieces.is_empty() || pieces.len() > 3 {
            return Err(SemverError::InvalidVersion(s.to_string()));
        }
        for (i, piece) in pieces.iter().enumerate() {
            parts[i] = piece
                .parse::<u64>()
                .map_err(|_| SemverError::InvalidVersion(s.to_string()))?;
        }

        Ok(Version {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            prerelease,
            build,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Version, SemverError> {
        Version::parse(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Version) -> bool {
        self.triple() == other.triple() && self.prerelease == other.prerelease
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        match self.triple().cmp(&other.triple()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // A pre-release sorts below the release of the same triple.
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => cmp_prerelease(a, b),
        }
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.triple().hash(state);
        self.prerelease.hash(state);
    }
}

/// Dotted-identifier pre-release comparison (SemVer 2.0 §11): numeric
/// identifiers compare numerically and sort below alphanumeric ones; a
/// shorter identifier list sorts below a longer one with the same prefix.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(m), Ok(n)) => m.cmp(&n),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A single comparison term inside a selector clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Any,
    Exact(Version),
    Gt(Version),
    Ge(Version),
    Lt(Version),
    Le(Version),
    /// Same MAJOR.MINOR, PATCH >= the given one.
    Tilde(Version),
    /// Same MAJOR, (MINOR, PATCH) >= the given ones.
    Caret(Version),
    /// Inclusive hyphen range `a - b`.
    Range(Version, Version),
    /// `x` placeholders; `None` components match anything.
    Wildcard { major: Option<u64>, minor: Option<u64>, patch: Option<u64> },
}

impl Term {
    fn matches(&self, v: &Version) -> bool {
        match self {
            Term::Any => true,
            Term::Exact(w) => v == w,
            Term::Gt(w) => v > w,
            Term::Ge(w) => v >= w,
            Term::Lt(w) => v < w,
            Term::Le(w) => v <= w,
            Term::Tilde(w) => v.major == w.major && v.minor == w.minor && v >= w,
            Term::Caret(w) => v.major == w.major && v >= w,
            Term::Range(lo, hi) => lo <= v && v <= hi,
            Term::Wildcard { major, minor, patch } => {
                major.map_or(true, |m| v.major == m)
                    && minor.map_or(true, |m| v.minor == m)
                    && patch.map_or(true, |p| v.patch == p)
            }
        }
    }

    /// Whether the term itself names a pre-release.
    fn names_prerelease(&self) -> bool {
        match self {
            Term::Exact(v) | Term::Gt(v) | Term::Ge(v) | Term::Lt(v) | Term::Le(v)
            | Term::Tilde(v) | Term::Caret(v) => v.is_prerelease(),
            Term::Range(lo, hi) => lo.is_prerelease() || hi.is_prerelease(),
            Term::Any | Term::Wildcard { .. } => false,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Any => write!(f, "*"),
            Term::Exact(v) => write!(f, "={}", v),
            Term::Gt(v) => write!(f, ">{}", v),
            Term::Ge(v) => write!(f, ">={}", v),
            Term::Lt(v) => write!(f, "<{}", v),
            Term::Le(v) => write!(f, "<={}", v),
            Term::Tilde(v) => write!(f, "~{}", v),
            Term::Caret(v) => write!(f, "^{}", v),
            Term::Range(lo, hi) => write!(f, "{} - {}", lo, hi),
            Term::Wildcard { major, minor, patch } => {
                let part = |x: &Option<u64>| match x {
                    Some(n) => n.to_string(),
                    None => "x".to_string(),
                };
                write!(f, "{}.{}.{}", part(major), part(minor), part(patch))
            }
        }
    }
}

/// A conjunction of terms (all must match).
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub terms: Vec<Term>,
}

impl Clause {
    fn matches(&self, v: &Version, opts: &MatchOptions) -> bool {
        if v.is_prerelease()
            && !opts.include_prereleases
            && !self.terms.iter().any(Term::names_prerelease)
        {
            // Pre-releases are opt-in: the selector must name one (or the
            // caller must pass the compatibility flag).
            return self.terms.iter().any(|t| matches!(t, Term::Exact(w) if w == v));
        }
        self.terms.iter().all(|t| t.matches(v))
    }
}

/// Match-time options; `include_prereleases` restores the historical
/// behavior where range operators also admit pre-release versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    pub include_prereleases: bool,
}

/// A parsed version or provenance constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// A semver constraint: disjunction (`||`) of clauses.
    Semver { clauses: Vec<Clause>, raw: String },
    /// `git+<url>[@<ref>]`; matches by provenance only.
    Git { url: String, refspec: Option<String>, raw: String },
    /// `[-e ]./path` or `../path`; matches by provenance only.
    Local { path: String, develop: bool, raw: String },
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(s: &str) -> Result<Selector, SemverError> {
        let raw = s.trim().to_string();

        if let Some(rest) = raw.strip_prefix("git+") {
            let (url, refspec) = match rest.rsplit_once('@') {
                // Keep `git+ssh://user@host/..` intact: only treat the `@`
                // as a ref separator when it comes after the last `/`.
                Some((url, refspec))
                    if !refspec.contains('/') && !url.is_empty() && !refspec.is_empty() =>
                {
                    (url.to_string(), Some(refspec.to_string()))
                }
                _ => (rest.to_string(), None),
            };
            return Ok(Selector::Git { url, refspec, raw });
        }

        if raw.starts_with("./") || raw.starts_with("../") {
            return Ok(Selector::Local { path: raw.clone(), develop: false, raw });
        }
        if let Some(rest) = raw.strip_prefix("-e ") {
            let path = rest.trim().to_string();
            if path.starts_with("./") || path.starts_with("../") {
                return Ok(Selector::Local { path, develop: true, raw });
            }
            return Err(SemverError::InvalidSelector(raw));
        }

        let mut clauses = Vec::new();
        let alternatives: Vec<&str> = if raw.is_empty() {
            vec!["*"]
        } else {
            raw.split("||").collect()
        };
        for alternative in alternatives {
            clauses.push(parse_clause(alternative)?);
        }
        Ok(Selector::Semver { clauses, raw })
    }

    /// Whether this selector matches by provenance only.
    pub fn is_provenance(&self) -> bool {
        !matches!(self, Selector::Semver { .. })
    }

    /// Match a version with default options.
    pub fn matches(&self, v: &Version) -> bool {
        self.matches_with(v, &MatchOptions::default())
    }

    /// Match a version with explicit options. Provenance selectors never
    /// match a version.
    pub fn matches_with(&self, v: &Version, opts: &MatchOptions) -> bool {
        match self {
            Selector::Semver { clauses, .. } => clauses.iter().any(|c| c.matches(v, opts)),
            _ => false,
        }
    }

    /// If the selector pins exactly one version, return it.
    pub fn fixed_version(&self) -> Option<&Version> {
        match self {
            Selector::Semver { clauses, .. } => match clauses.as_slice() {
                [clause] => match clause.terms.as_slice() {
                    [Term::Exact(v)] => Some(v),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    /// The maximum matching version from `versions`, or `None`.
    pub fn best<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        self.best_with(versions, &MatchOptions::default())
    }

    /// `best` with explicit match options.
    pub fn best_with<'a, I>(&self, versions: I, opts: &MatchOptions) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions
            .into_iter()
            .filter(|v| self.matches_with(v, opts))
            .max()
    }
}

fn parse_clause(s: &str) -> Result<Clause, SemverError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SemverError::InvalidSelector(s.to_string()));
    }

    let tokens: Vec<&str> = s.split_whitespace().collect();

    // Hyphen range: exactly `V1 - V2`.
    if tokens.len() == 3 && tokens[1] == "-" {
        let lo = Version::parse(tokens[0])?;
        let hi = Version::parse(tokens[2])?;
        return Ok(Clause { terms: vec![Term::Range(lo, hi)] });
    }

    let mut terms = Vec::new();
    for token in tokens {
        terms.push(parse_term(token)?);
    }
    Ok(Clause { terms })
}

fn parse_term(s: &str) -> Result<Term, SemverError> {
    if s == "*" {
        return Ok(Term::Any);
    }
    let operators: [(&str, fn(Version) -> Term); 8] = [
        ("==", Term::Exact),
        ("=", Term::Exact),
        (">=", Term::Ge),
        ("<=", Term::Le),
        (">", Term::Gt),
        ("<", Term::Lt),
        ("~", Term::Tilde),
        ("^", Term::Caret),
    ];
    for (prefix, build) in operators {
        if let Some(rest) = s.strip_prefix(prefix) {
            let version = Version::parse(rest.trim())
                .map_err(|_| SemverError::InvalidSelector(s.to_string()))?;
            return Ok(build(version));
        }
    }
    if s.contains('x') || s.contains('X') {
        return parse_wildcard(s);
    }
    let version = Version::parse(s).map_err(|_| SemverError::InvalidSelector(s.to_string()))?;
    Ok(Term::Exact(version))
}

fn parse_wildcard(s: &str) -> Result<Term, SemverError> {
    let pieces: Vec<&str> = s.split('.').collect();
    if pieces.is_empty() || pieces.len() > 3 {
        return Err(SemverError::InvalidSelector(s.to_string()));
    }
    let mut components = [None, None, None];
    for (i, piece) in pieces.iter().enumerate() {
        components[i] = match *piece {
            "x" | "X" => None,
            n => Some(
                n.parse::<u64>()
                    .map_err(|_| SemverError::InvalidSelector(s.to_string()))?,
            ),
        };
    }
    Ok(Term::Wildcard {
        major: components[0],
        minor: components[1],
        patch: components[2],
    })
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Semver { raw, .. }
            | Selector::Git { raw, .. }
            | Selector::Local { raw, .. } => write!(f, "{}", raw),
        }
    }
}

impl FromStr for Selector {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Selector, SemverError> {
        Selector::parse(s)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Selector, D::Error> {
        let s = String::deserialize(deserializer)?;
        Selector::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn parses_versions() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("1.2.3-rc.1").prerelease.as_deref(), Some("rc.1"));
        assert_eq!(v("1.2.3+build.5").build.as_deref(), Some("build.5"));
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("one.two").is_err());
    }

    #[test]
    fn version_ordering() {
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.2.0") < v("1.10.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-alpha.2"));
        assert!(v("1.0.0-alpha.2") < v("1.0.0-alpha.10"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        // Build metadata is ignored for precedence.
        assert_eq!(v("1.0.0+a").cmp(&v("1.0.0+b")), Ordering::Equal);
    }

    #[test]
    fn exact_and_any() {
        assert!(sel("*").matches(&v("0.0.1")));
        assert!(sel("").matches(&v("9.9.9")));
        assert!(sel("=1.2.3").matches(&v("1.2.3")));
        assert!(sel("==1.2.3").matches(&v("1.2.3")));
        assert!(sel("1.2.3").matches(&v("1.2.3")));
        assert!(!sel("=1.2.3").matches(&v("1.2.4")));
    }

    #[test]
    fn tilde_and_caret() {
        let tilde = sel("~1.2.3");
        assert!(tilde.matches(&v("1.2.3")));
        assert!(tilde.matches(&v("1.2.9")));
        assert!(!tilde.matches(&v("1.3.0")));
        assert!(!tilde.matches(&v("1.2.2")));

        let caret = sel("^1.2.3");
        assert!(caret.matches(&v("1.2.3")));
        assert!(caret.matches(&v("1.9.0")));
        assert!(!caret.matches(&v("2.0.0")));
        assert!(!caret.matches(&v("1.2.2")));
    }

    #[test]
    fn disjunction_and_conjunction() {
        let s = sel("=1.0.0 || >2.5.0");
        assert!(s.matches(&v("1.0.0")));
        assert!(s.matches(&v("2.6.0")));
        assert!(!s.matches(&v("2.0.0")));

        let s = sel(">=1.0.0 <2.0.0");
        assert!(s.matches(&v("1.5.0")));
        assert!(!s.matches(&v("2.0.0")));
    }

    #[test]
    fn hyphen_range_and_wildcards() {
        let s = sel("1.0.0 - 1.4.0");
        assert!(s.matches(&v("1.0.0")));
        assert!(s.matches(&v("1.4.0")));
        assert!(!s.matches(&v("1.4.1")));

        let s = sel("1.2.x");
        assert!(s.matches(&v("1.2.9")));
        assert!(!s.matches(&v("1.3.0")));
        let s = sel("1.x");
        assert!(s.matches(&v("1.9.9")));
        assert!(!s.matches(&v("2.0.0")));
    }

    #[test]
    fn prereleases_are_opt_in() {
        // The registry advertises {1.1.9, 1.2.0, 1.3.0-pre}.
        let versions = [v("1.1.9"), v("1.2.0"), v("1.3.0-pre")];
        assert_eq!(sel("~1.2.0").best(&versions), Some(&v("1.2.0")));
        assert_eq!(sel("^1.2.0").best(&versions), Some(&v("1.2.0")));

        // A selector that names a pre-release admits them.
        assert!(sel(">=1.3.0-a").matches(&v("1.3.0-pre")));
        assert!(sel("=1.3.0-pre").matches(&v("1.3.0-pre")));

        // The compatibility flag restores the historical behavior.
        let opts = MatchOptions { include_prereleases: true };
        assert_eq!(
            sel("^1.2.0").best_with(&versions, &opts),
            Some(&v("1.3.0-pre"))
        );
    }

    #[test]
    fn best_is_monotone() {
        let versions = [v("1.0.0"), v("1.2.0"), v("1.2.5"), v("2.0.0")];
        let narrow = sel("~1.2.0");
        let wide = sel("^1.0.0");
        let narrow_best = narrow.best(&versions).unwrap();
        let wide_best = wide.best(&versions).unwrap();
        assert!(narrow_best <= wide_best);
    }

    #[test]
    fn provenance_selectors() {
        match sel("git+https://example.com/repo.git@v2") {
            Selector::Git { url, refspec, .. } => {
                assert_eq!(url, "https://example.com/repo.git");
                assert_eq!(refspec.as_deref(), Some("v2"));
            }
            other => panic!("unexpected selector {:?}", other),
        }
        match sel("-e ./local") {
            Selector::Local { path, develop, .. } => {
                assert_eq!(path, "./local");
                assert!(develop);
            }
            other => panic!("unexpected selector {:?}", other),
        }
        assert!(sel("../elsewhere").is_provenance());
        // Provenance selectors never match a version.
        assert!(!sel("./local").matches(&v("1.0.0")));
    }

    #[test]
    fn format_parse_round_trip() {
        for input in ["*", "=1.2.3", "~1.2.3 || ^2.0.0", "1.0.0 - 2.0.0", "1.2.x",
                      "git+https://example.com/r.git@main", "-e ./local"] {
            let parsed = sel(input);
            assert_eq!(sel(&parsed.to_string()), parsed);
        }
    }

    #[test]
    fn invalid_selectors_error() {
        assert!(Selector::parse(">=").is_err());
        assert!(Selector::parse("^a.b.c").is_err());
        assert!(Selector::parse("-e /absolute").is_err());
    }
}
