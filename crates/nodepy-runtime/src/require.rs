// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-module `require` capability.
//!
//! A `Require` is a value holding weak references to its context and its
//! owning module plus per-require search-path additions. The loader hands
//! it to the module's execution scope; scripts reach it through the
//! host-dispatched `require(..)` call forms.

use crate::context::{Context, Event};
use crate::error::{Result, RuntimeError};
use crate::module::{Module, ModuleRef, Request};
use crate::path::VPath;
use nodepy_script::{ScopeRef, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Options for a `require` call. The defaults mirror a plain
/// `require("x")`: cached, executed, exports returned.
#[derive(Debug, Clone)]
pub struct RequireOptions {
    /// Base directory override for the resolution.
    pub current_dir: Option<VPath>,
    /// Load the target as the context's main module.
    pub is_main: bool,
    /// Consult and populate the caches.
    pub cache: bool,
    /// Return the exported value rather than the module handle.
    pub exports: bool,
    /// Execute the module (modules may already be executed from an
    /// earlier request).
    pub exec: bool,
    /// Explicit loader id overriding suffix detection.
    pub loader: Option<String>,
}

impl Default for RequireOptions {
    fn default() -> RequireOptions {
        RequireOptions {
            current_dir: None,
            is_main: false,
            cache: true,
            exports: true,
            exec: true,
            loader: None,
        }
    }
}

/// What a `require` call produced, depending on `exports`.
pub enum RequireOutcome {
    Exports(Value),
    Module(ModuleRef),
}

impl std::fmt::Debug for RequireOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequireOutcome::Exports(value) => f.debug_tuple("Exports").field(value).finish(),
            RequireOutcome::Module(_) => f.debug_tuple("Module").finish(),
        }
    }
}

impl RequireOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            RequireOutcome::Exports(value) => Some(value),
            RequireOutcome::Module(_) => None,
        }
    }

    pub fn into_module(self) -> Option<ModuleRef> {
        match self {
            RequireOutcome::Module(module) => Some(module),
            RequireOutcome::Exports(_) => None,
        }
    }
}

/// The per-module require capability.
pub struct Require {
    context: Weak<Context>,
    module: Weak<RefCell<Module>>,
    directory: VPath,
    /// Per-require search-path additions, consulted before the context's
    /// search path.
    pub path: RefCell<Vec<VPath>>,
    cache: RefCell<HashMap<String, ModuleRef>>,
}

impl Require {
    pub(crate) fn new(
        context: Weak<Context>,
        module: Weak<RefCell<Module>>,
        directory: VPath,
    ) -> Require {
        Require {
            context,
            module,
            directory,
            path: RefCell::new(Vec::new()),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn ctx(&self) -> Result<Rc<Context>> {
        self.context.upgrade().ok_or(RuntimeError::ContextDropped)
    }

    /// The context this require belongs to.
    pub fn context(&self) -> Result<Rc<Context>> {
        self.ctx()
    }

    /// The directory relative requests resolve against.
    pub fn directory(&self) -> &VPath {
        &self.directory
    }

    /// Full `require` with explicit options.
    pub fn call(&self, request: &str, opts: RequireOptions) -> Result<RequireOutcome> {
        let ctx = self.ctx()?;

        if let Some(binding_name) = request.strip_prefix('!') {
            let value = ctx.binding_value(binding_name)?;
            return Ok(RequireOutcome::Exports(value));
        }

        if opts.cache {
            let cached = self.cache.borrow().get(request).cloned();
            if let Some(module) = cached {
                if opts.is_main && ctx.main_module().is_some() {
                    return Err(RuntimeError::MainAlreadyLoaded);
                }
                if opts.exec
                    && ctx.option_truthy("require.autoreload")
                    && module.borrow().source_changed()
                {
                    ctx.reload_module(&module)?;
                } else if opts.exec && !module.borrow().executed {
                    ctx.ensure_registered(&module);
                    ctx.exec_module(&module)?;
                }
                return finish(&module, &opts);
            }
        }

        let current_dir = opts
            .current_dir
            .clone()
            .unwrap_or_else(|| self.directory.clone());
        ctx.emit(&Event::Require {
            request,
            current_dir: &current_dir,
            is_main: opts.is_main,
        });

        let mut resolution_request = Request::new(request, current_dir);
        resolution_request.is_main = opts.is_main;
        resolution_request.loader = opts.loader.clone();
        resolution_request.path = self.path.borrow().clone();
        resolution_request.parent = Some(self.module.clone());
        resolution_request.use_cache = opts.cache;

        let module = ctx.resolve_and_load(&resolution_request, opts.cache, opts.exec)?;
        if opts.cache {
            self.cache
                .borrow_mut()
                .insert(request.to_string(), module.clone());
        }
        finish(&module, &opts)
    }

    /// `require("x")`: resolve, load, execute, return the exported value.
    pub fn require(&self, request: &str) -> Result<Value> {
        match self.call(request, RequireOptions::default())? {
            RequireOutcome::Exports(value) => Ok(value),
            RequireOutcome::Module(module) => Ok(module.borrow().exports()),
        }
    }

    /// `require(exports=false)`: the module handle.
    pub fn require_module(&self, request: &str) -> Result<ModuleRef> {
        let outcome = self.call(
            request,
            RequireOptions { exports: false, ..RequireOptions::default() },
        )?;
        match outcome {
            RequireOutcome::Module(module) => Ok(module),
            RequireOutcome::Exports(_) => Err(RuntimeError::load(
                request,
                "binding requests have no module handle",
            )),
        }
    }

    /// `require.resolve`: resolve without executing; the canonical
    /// filename of the target.
    pub fn resolve(&self, request: &str) -> Result<VPath> {
        let outcome = self.call(
            request,
            RequireOptions { exports: false, exec: false, ..RequireOptions::default() },
        )?;
        match outcome {
            RequireOutcome::Module(module) => Ok(module.borrow().filename.clone()),
            RequireOutcome::Exports(_) => Err(RuntimeError::load(
                request,
                "binding requests have no filename",
            )),
        }
    }

    /// Star-import: copy the target's public symbols into `into`. With
    /// `symbols` only the named members are copied.
    pub fn star(
        &self,
        request: &str,
        into: &ScopeRef,
        symbols: Option<&[String]>,
    ) -> Result<()> {
        let value = self.require(request)?;
        let Value::Object(exported) = value else {
            // Nothing importable on scalar exports.
            return Ok(());
        };
        let source = exported.borrow();
        match symbols {
            Some(symbols) => {
                for name in symbols {
                    let value = source.get(name).cloned().unwrap_or(Value::Null);
                    into.borrow_mut().insert(name.clone(), value);
                }
            }
            None => {
                for (name, value) in source.iter() {
                    if name.starts_with('_')
                        || matches!(name.as_str(), "module" | "require" | "exports")
                    {
                        continue;
                    }
                    into.borrow_mut().insert(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// The context's main module.
    pub fn main(&self) -> Result<Option<ModuleRef>> {
        Ok(self.ctx()?.main_module())
    }

    /// Reassign the context's main module.
    pub fn set_main(&self, module: Option<ModuleRef>) -> Result<()> {
        self.ctx()?.set_main_module(module);
        Ok(())
    }

    /// The topmost entry of the current-module stack.
    pub fn current(&self) -> Result<Option<ModuleRef>> {
        Ok(self.ctx()?.current_module())
    }

    /// Temporarily detach the main module while `f` runs.
    pub fn hide_main<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let ctx = self.ctx()?;
        let previous = ctx.take_main_module();
        let result = f();
        ctx.set_main_module(previous);
        Ok(result)
    }

    /// A snapshot of this require's request cache.
    pub fn cache_view(&self) -> Vec<(String, ModuleRef)> {
        self.cache
            .borrow()
            .iter()
            .map(|(request, module)| (request.clone(), module.clone()))
            .collect()
    }
}

fn finish(module: &ModuleRef, opts: &RequireOptions) -> Result<RequireOutcome> {
    if opts.exports {
        Ok(RequireOutcome::Exports(module.borrow().exports()))
    } else {
        Ok(RequireOutcome::Module(module.clone()))
    }
}
