// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request resolution: the ordered resolver chain and the filesystem
//! resolver implementing the search-path walk, package discovery and
//! `.nodepy-link` traversal.

use crate::context::{find_nearest_modules_directory, Context, LINK_SUFFIX};
use crate::error::{Result, RuntimeError};
use crate::module::{ModuleRef, Request};
use crate::path::VPath;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// What a resolver produced for a request.
pub enum ResolveOutcome {
    /// A module (possibly fetched from the module cache).
    Module(ModuleRef),
    /// The request names a context binding.
    Binding(String),
    /// This resolver cannot serve the request; `searched` lists the
    /// locations it tried, for the aggregate resolve error.
    Skip { searched: Vec<VPath> },
}

/// A request-to-module mapper. Resolvers are asked in insertion order and
/// the first non-skip outcome wins.
pub trait Resolver {
    fn resolve_module(&self, ctx: &Rc<Context>, request: &Request) -> Result<ResolveOutcome>;
}

/// Serves `!name` requests from the context binding table.
pub struct BindingResolver;

impl Resolver for BindingResolver {
    fn resolve_module(&self, ctx: &Rc<Context>, request: &Request) -> Result<ResolveOutcome> {
        match request.name.strip_prefix('!') {
            Some(name) if ctx.has_binding(name) => Ok(ResolveOutcome::Binding(name.to_string())),
            Some(name) => Err(RuntimeError::NoSuchBinding(name.to_string())),
            None => Ok(ResolveOutcome::Skip { searched: Vec::new() }),
        }
    }
}

/// Terminates the chain for scheme-qualified requests no other resolver
/// claimed, so they fail with a clean resolve error instead of being
/// misread as filesystem paths.
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve_module(&self, _ctx: &Rc<Context>, _request: &Request) -> Result<ResolveOutcome> {
        Ok(ResolveOutcome::Skip { searched: Vec::new() })
    }
}

/// A memoized resolution: where a (current_dir, request) pair landed.
#[derive(Clone)]
struct CachedResolution {
    filename: VPath,
    loader: String,
    original_resolve_location: Option<VPath>,
}

/// The primary resolver: walks the filesystem (and archive/URL paths via
/// the path abstraction) according to the request kind.
pub struct FsResolver {
    index_files: Vec<String>,
    cache: RefCell<HashMap<(String, String), CachedResolution>>,
}

impl FsResolver {
    pub fn new() -> FsResolver {
        FsResolver {
            index_files: vec![crate::context::INDEX_FILE.to_string()],
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn to_module(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        resolution: &CachedResolution,
    ) -> Result<ModuleRef> {
        if request.use_cache {
            if let Some(existing) = ctx.cached_module(&resolution.filename) {
                return Ok(existing);
            }
        }
        let loader = ctx.get_loader(&resolution.loader).ok_or_else(|| {
            RuntimeError::load(
                resolution.filename.to_string(),
                format!("unknown loader '{}'", resolution.loader),
            )
        })?;
        let mut effective = request.copy();
        effective.original_resolve_location = resolution.original_resolve_location.clone();
        let module = loader.load(ctx, &resolution.filename, &effective)?;
        if let Some(link_site) = &resolution.original_resolve_location {
            // Modules reached through a package link keep resolving module
            // requests against the link site's modules directory.
            if let Some(modules_dir) = find_nearest_modules_directory(link_site) {
                module.borrow().require.path.borrow_mut().push(modules_dir);
            }
        }
        let package = module.borrow().package.clone();
        if let Some(package) = package {
            let vendor = package.vendor_directories();
            if !vendor.is_empty() {
                module.borrow().require.path.borrow_mut().extend(vendor);
            }
        }
        Ok(module)
    }

    /// Follow a `<dir>.nodepy-link` or `<dir>/.nodepy-link` redirection.
    /// Returns the link target and records the link site.
    fn follow_link(
        &self,
        path: &VPath,
        original: &mut Option<VPath>,
    ) -> Result<Option<VPath>> {
        let mut link_file = None;
        let sibling = path.parent().map(|parent| {
            parent.join(&format!(
                "{}{}",
                path.file_name().unwrap_or_default(),
                LINK_SUFFIX
            ))
        });
        if let Some(sibling) = sibling {
            if sibling.is_file() {
                link_file = Some(sibling);
            }
        }
        if link_file.is_none() {
            let inner = path.join(LINK_SUFFIX);
            if inner.is_file() {
                link_file = Some(inner);
            }
        }
        let Some(link_file) = link_file else {
            return Ok(None);
        };
        let target = link_file.read_to_string()?;
        let target = VPath::parse(target.trim());
        if original.is_none() {
            *original = Some(path.clone());
        }
        debug!(link = %link_file, target = %target, "following package link");
        Ok(Some(target))
    }

    /// Try to resolve a concrete path to a loadable file: the exact file,
    /// loader-suggested suffix variants, then directory handling via
    /// manifest `main` or index files.
    fn try_path(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        path: VPath,
        searched: &mut Vec<VPath>,
        original: &mut Option<VPath>,
        depth: usize,
    ) -> Result<Option<(VPath, String)>> {
        if depth > 16 {
            return Ok(None);
        }
        let path = path.normalized().augment();

        let path = match self.follow_link(&path, original)? {
            Some(target) => target,
            None => path,
        };

        let loaders = ctx.loaders_for_hint(request.loader.as_deref());

        if path.is_file() {
            for loader in &loaders {
                if loader.can_load(&path) {
                    return Ok(Some((path.resolve(false)?, loader.id().to_string())));
                }
            }
        }

        for loader in &loaders {
            for candidate in loader.suggest_files(&path) {
                if candidate.is_file() {
                    return Ok(Some((candidate.resolve(false)?, loader.id().to_string())));
                }
            }
        }

        if path.is_dir() {
            if let Some(package) = ctx.get_package(&path)? {
                if package.manifest.main.is_some() {
                    let main = path.join(package.main_request());
                    if let Some(found) =
                        self.try_path(ctx, request, main, searched, original, depth + 1)?
                    {
                        return Ok(Some(found));
                    }
                }
            }
            for index in &self.index_files {
                if let Some(found) = self.try_path(
                    ctx,
                    request,
                    path.join(index),
                    searched,
                    original,
                    depth + 1,
                )? {
                    return Ok(Some(found));
                }
            }
        }

        searched.push(path);
        Ok(None)
    }

    /// Resolve a module request (`pkg`, `@scope/pkg/sub`, ...) against the
    /// search path.
    fn resolve_module_request(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        searched: &mut Vec<VPath>,
        original: &mut Option<VPath>,
    ) -> Result<Option<(VPath, String)>> {
        let (package_name, subpath) = split_request_string(&request.name);

        // A main request may be resolved in the current directory even if
        // it is not written relatively.
        if request.is_main {
            let direct = request.current_dir.join(&request.name);
            if let Some(found) = self.try_path(ctx, request, direct, searched, original, 0)? {
                return Ok(Some(found));
            }
        }

        let mut bases: Vec<VPath> = request.path.clone();
        if let Some(nearest) = find_nearest_modules_directory(&request.current_dir) {
            bases.push(nearest);
        }
        bases.extend(ctx.path.borrow().iter().cloned());

        for base in bases {
            let package_dir = base.join(package_name);
            let mut package_dir = package_dir.normalized();
            if !package_dir.exists() {
                match self.follow_link(&package_dir, original)? {
                    Some(target) => package_dir = target,
                    None => {
                        searched.push(package_dir);
                        continue;
                    }
                }
            } else if let Some(target) = self.follow_link(&package_dir, original)? {
                package_dir = target;
            }

            let package = ctx.get_package(&package_dir)?;
            let target = match (&package, subpath) {
                (Some(package), "") => package_dir.join(package.main_request()),
                (Some(package), sub) => package.root_dir().join(sub),
                (None, "") => package_dir.clone(),
                (None, sub) => package_dir.join(sub),
            };
            if let Some(found) = self.try_path(ctx, request, target, searched, original, 0)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

impl Default for FsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for FsResolver {
    fn resolve_module(&self, ctx: &Rc<Context>, request: &Request) -> Result<ResolveOutcome> {
        if request.name.starts_with('!') {
            return Ok(ResolveOutcome::Skip { searched: Vec::new() });
        }

        let cache_key = (request.current_dir.to_string(), request.name.clone());
        let cached = self.cache.borrow().get(&cache_key).cloned();
        if let Some(resolution) = cached {
            return Ok(ResolveOutcome::Module(self.to_module(ctx, request, &resolution)?));
        }

        let mut searched = Vec::new();
        let mut original = None;

        let found = if request.is_absolute() {
            self.try_path(
                ctx,
                request,
                VPath::parse(&request.name),
                &mut searched,
                &mut original,
                0,
            )?
        } else if request.is_relative() {
            let base = request.current_dir.join(&request.name);
            self.try_path(ctx, request, base, &mut searched, &mut original, 0)?
        } else {
            self.resolve_module_request(ctx, request, &mut searched, &mut original)?
        };

        match found {
            Some((filename, loader)) => {
                let resolution = CachedResolution {
                    filename,
                    loader,
                    original_resolve_location: original,
                };
                // Explicit loader hints bypass the memo cache so a later
                // unhinted request re-detects by suffix.
                if request.loader.is_none() {
                    self.cache.borrow_mut().insert(cache_key, resolution.clone());
                }
                Ok(ResolveOutcome::Module(self.to_module(ctx, request, &resolution)?))
            }
            None => Ok(ResolveOutcome::Skip { searched }),
        }
    }
}

/// Split a module request into package name and in-package path.
/// `@scope/pkg/lib/x` → (`@scope/pkg`, `lib/x`); `pkg` → (`pkg`, ``).
pub fn split_request_string(request: &str) -> (&str, &str) {
    if let Some(rest) = request.strip_prefix('@') {
        if let Some(slash) = rest.find('/') {
            let after_scope = &rest[slash + 1..];
            if let Some(next) = after_scope.find('/') {
                let name_end = 1 + slash + 1 + next;
                return (&request[..name_end], &request[name_end + 1..]);
            }
        }
        return (request, "");
    }
    match request.split_once('/') {
        Some((package, subpath)) => (package, subpath),
        None => (request, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_request_strings() {
        assert_eq!(split_request_string("pkg"), ("pkg", ""));
        assert_eq!(split_request_string("pkg/lib/x"), ("pkg", "lib/x"));
        assert_eq!(split_request_string("@scope/pkg"), ("@scope/pkg", ""));
        assert_eq!(
            split_request_string("@scope/pkg/lib/x"),
            ("@scope/pkg", "lib/x")
        );
    }
}
