// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The runtime context: process-scope session state owning the resolver
//! and loader chains, the module and package caches, the search path and
//! the binding table.

use crate::error::{Result, RuntimeError};
use crate::extensions::{Extension, RequireImportSyntax, RequireUnpackSyntax};
use crate::loader::{JsonLoader, Loader, SourceLoader};
use crate::manifest::{PackageManifest, MANIFEST_FILENAME};
use crate::module::{ModuleRef, Request};
use crate::package::{Package, PackageRef};
use crate::path::VPath;
use crate::require::Require;
use crate::resolver::{BindingResolver, FsResolver, NullResolver, ResolveOutcome, Resolver};
use indexmap::IndexMap;
use nodepy_script::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Name of the workspace-local modules directory.
pub const MODULES_DIRECTORY: &str = "nodepy_modules";
/// Suffix of package link files written by develop installs.
pub const LINK_SUFFIX: &str = ".nodepy-link";
/// Index file tried when a request names a directory.
pub const INDEX_FILE: &str = "index";

/// Environment variable holding extra search paths.
pub const PATH_ENV: &str = "NODEPY_PATH";

/// An event dispatched to context subscribers. `Require` and `Load` fire
/// before the corresponding action completes, `Enter` and `Leave` after.
pub enum Event<'a> {
    Require {
        request: &'a str,
        current_dir: &'a VPath,
        is_main: bool,
    },
    Load {
        module: &'a ModuleRef,
    },
    Enter,
    Leave,
}

/// A named entry in the context's binding table.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Extension(Rc<dyn Extension>),
}

type EventHandler = Box<dyn Fn(&Event<'_>)>;

thread_local! {
    static SESSIONS: RefCell<Vec<Weak<Context>>> = const { RefCell::new(Vec::new()) };
}

/// Process-scope session state. One context drives module execution on
/// one thread; multiple contexts share nothing.
pub struct Context {
    pub current_dir: VPath,
    /// Whether `leave` restores the state captured at `enter`.
    pub isolated: bool,
    /// Free-form options (`require.autoreload`, `no_bytecache`, ...).
    pub options: RefCell<IndexMap<String, Value>>,
    /// The context-level search path (after the per-request additions).
    pub path: RefCell<Vec<VPath>>,

    bindings: RefCell<IndexMap<String, Binding>>,
    resolvers: RefCell<Vec<Rc<dyn Resolver>>>,
    loaders: RefCell<Vec<Rc<dyn Loader>>>,
    modules: RefCell<HashMap<VPath, ModuleRef>>,
    packages: RefCell<HashMap<VPath, Option<PackageRef>>>,
    module_stack: RefCell<Vec<ModuleRef>>,
    main_module: RefCell<Option<ModuleRef>>,
    handlers: RefCell<Vec<EventHandler>>,
    init_require: RefCell<Option<Rc<Require>>>,

    saved_path: RefCell<Option<Vec<VPath>>>,
    saved_bindings: RefCell<Vec<String>>,
    entered: Cell<bool>,
}

impl Context {
    /// Create a context rooted at `current_dir` with the standard resolver
    /// and loader chains.
    pub fn new(current_dir: VPath, isolated: bool) -> Rc<Context> {
        let mut path = Vec::new();
        if let Ok(env_path) = std::env::var(PATH_ENV) {
            for entry in std::env::split_paths(&env_path) {
                if !entry.as_os_str().is_empty() {
                    path.push(VPath::Fs(entry));
                }
            }
        }

        let ctx = Rc::new(Context {
            current_dir: current_dir.clone(),
            isolated,
            options: RefCell::new(IndexMap::new()),
            path: RefCell::new(path),
            bindings: RefCell::new(IndexMap::new()),
            resolvers: RefCell::new(vec![
                Rc::new(BindingResolver) as Rc<dyn Resolver>,
                Rc::new(FsResolver::new()),
                Rc::new(NullResolver),
            ]),
            loaders: RefCell::new(vec![
                Rc::new(SourceLoader) as Rc<dyn Loader>,
                Rc::new(JsonLoader),
            ]),
            modules: RefCell::new(HashMap::new()),
            packages: RefCell::new(HashMap::new()),
            module_stack: RefCell::new(Vec::new()),
            main_module: RefCell::new(None),
            handlers: RefCell::new(Vec::new()),
            init_require: RefCell::new(None),
            saved_path: RefCell::new(None),
            saved_bindings: RefCell::new(Vec::new()),
            entered: Cell::new(false),
        });

        let init_require = Rc::new(Require::new(
            Rc::downgrade(&ctx),
            Weak::new(),
            current_dir,
        ));
        *ctx.init_require.borrow_mut() = Some(init_require);
        ctx
    }

    /// The context-level require capability (not bound to a module).
    pub fn require(self: &Rc<Self>) -> Rc<Require> {
        self.init_require
            .borrow()
            .as_ref()
            .cloned()
            .expect("init require is set at construction")
    }

    /// The innermost entered context on this thread.
    pub fn current() -> Option<Rc<Context>> {
        SESSIONS.with(|stack| stack.borrow().last().and_then(Weak::upgrade))
    }

    // ------------------------------------------------------------------
    // Session lifecycle

    /// Enter the session: push it onto the thread's session stack, extend
    /// the search path with the workspace and global modules directories,
    /// register the built-in bindings and dispatch `enter`. The returned
    /// guard leaves the session when dropped.
    pub fn enter(self: &Rc<Self>) -> ContextGuard {
        self.entered.set(true);
        *self.saved_path.borrow_mut() = Some(self.path.borrow().clone());

        let mut additions = Vec::new();
        if let Some(workspace) = find_nearest_modules_directory(&self.current_dir) {
            additions.push(workspace);
        }
        if let Some(global) = global_modules_directory() {
            if global.is_dir() {
                additions.push(global);
            }
        }
        self.path.borrow_mut().extend(additions);

        for (name, extension) in [
            (
                "require-unpack-syntax",
                Rc::new(RequireUnpackSyntax::new()) as Rc<dyn Extension>,
            ),
            (
                "require-import-syntax",
                Rc::new(RequireImportSyntax::new()) as Rc<dyn Extension>,
            ),
        ] {
            if !self.has_binding(name) {
                self.bindings
                    .borrow_mut()
                    .insert(name.to_string(), Binding::Extension(extension));
                self.saved_bindings.borrow_mut().push(name.to_string());
            }
        }

        SESSIONS.with(|stack| stack.borrow_mut().push(Rc::downgrade(self)));
        self.emit(&Event::Enter);
        ContextGuard { context: self.clone() }
    }

    fn leave(self: &Rc<Self>) {
        if !self.entered.get() {
            return;
        }
        self.entered.set(false);
        SESSIONS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(index) = stack
                .iter()
                .rposition(|weak| weak.upgrade().is_some_and(|ctx| Rc::ptr_eq(&ctx, self)))
            {
                stack.remove(index);
            }
        });
        if self.isolated {
            if let Some(saved) = self.saved_path.borrow_mut().take() {
                *self.path.borrow_mut() = saved;
            }
            for name in self.saved_bindings.borrow_mut().drain(..) {
                self.bindings.borrow_mut().shift_remove(&name);
            }
        }
        self.emit(&Event::Leave);
    }

    // ------------------------------------------------------------------
    // Events and options

    /// Register an event subscriber; subscribers fire in registration
    /// order.
    pub fn on_event(&self, handler: impl Fn(&Event<'_>) + 'static) {
        self.handlers.borrow_mut().push(Box::new(handler));
    }

    pub(crate) fn emit(&self, event: &Event<'_>) {
        for handler in self.handlers.borrow().iter() {
            handler(event);
        }
    }

    /// Set a context option.
    pub fn set_option(&self, key: &str, value: Value) {
        self.options.borrow_mut().insert(key.to_string(), value);
    }

    /// Whether an option is set to a truthy value.
    pub fn option_truthy(&self, key: &str) -> bool {
        self.options
            .borrow()
            .get(key)
            .map(Value::is_truthy)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Bindings

    /// Register a value or extension under a binding name.
    pub fn register_binding(&self, name: &str, binding: Binding) -> Result<()> {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(name) {
            return Err(RuntimeError::BindingExists(name.to_string()));
        }
        bindings.insert(name.to_string(), binding);
        Ok(())
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// The value form of a binding, as returned from `require("!name")`.
    pub fn binding_value(&self, name: &str) -> Result<Value> {
        match self.bindings.borrow().get(name) {
            Some(Binding::Value(value)) => Ok(value.clone()),
            Some(Binding::Extension(extension)) => {
                let marker = Value::new_object();
                if let Value::Object(scope) = &marker {
                    scope
                        .borrow_mut()
                        .insert("binding".into(), Value::Str(extension.name().to_string()));
                }
                Ok(marker)
            }
            None => Err(RuntimeError::NoSuchBinding(name.to_string())),
        }
    }

    /// The extension form of a binding.
    pub fn binding_extension(&self, name: &str) -> Result<Rc<dyn Extension>> {
        match self.bindings.borrow().get(name) {
            Some(Binding::Extension(extension)) => Ok(extension.clone()),
            Some(Binding::Value(_)) => Err(RuntimeError::ExtensionFailed {
                extension: name.to_string(),
                reason: "binding is not an extension".into(),
            }),
            None => Err(RuntimeError::NoSuchBinding(name.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Loaders

    /// Loader by id.
    pub fn get_loader(&self, id: &str) -> Option<Rc<dyn Loader>> {
        self.loaders
            .borrow()
            .iter()
            .find(|loader| loader.id() == id)
            .cloned()
    }

    /// All loaders, or just the hinted one when a request carries an
    /// explicit loader id.
    pub fn loaders_for_hint(&self, hint: Option<&str>) -> Vec<Rc<dyn Loader>> {
        match hint {
            Some(id) => self.get_loader(id).into_iter().collect(),
            None => self.loaders.borrow().clone(),
        }
    }

    /// Register an extra loader (appended after the standard chain).
    pub fn register_loader(&self, loader: Rc<dyn Loader>) {
        self.loaders.borrow_mut().push(loader);
    }

    /// Register an extra resolver (appended after the standard chain, but
    /// before the terminating null resolver).
    pub fn register_resolver(&self, resolver: Rc<dyn Resolver>) {
        let mut resolvers = self.resolvers.borrow_mut();
        let index = resolvers.len().saturating_sub(1);
        resolvers.insert(index, resolver);
    }

    // ------------------------------------------------------------------
    // Module cache and execution

    pub fn cached_module(&self, filename: &VPath) -> Option<ModuleRef> {
        self.modules.borrow().get(filename).cloned()
    }

    /// Re-register a module under its canonical filename, e.g. before
    /// retrying a module that a failed execution evicted.
    pub(crate) fn ensure_registered(&self, module: &ModuleRef) {
        let filename = module.borrow().filename.clone();
        self.modules
            .borrow_mut()
            .entry(filename)
            .or_insert_with(|| module.clone());
    }

    /// A snapshot of the module cache.
    pub fn module_cache(&self) -> Vec<(VPath, ModuleRef)> {
        self.modules
            .borrow()
            .iter()
            .map(|(path, module)| (path.clone(), module.clone()))
            .collect()
    }

    pub fn main_module(&self) -> Option<ModuleRef> {
        self.main_module.borrow().clone()
    }

    pub fn set_main_module(&self, module: Option<ModuleRef>) {
        *self.main_module.borrow_mut() = module;
    }

    pub(crate) fn take_main_module(&self) -> Option<ModuleRef> {
        self.main_module.borrow_mut().take()
    }

    /// Whether `filename` is the main module's canonical filename.
    pub fn is_main_module(&self, filename: &VPath) -> bool {
        self.main_module
            .borrow()
            .as_ref()
            .is_some_and(|module| module.borrow().filename == *filename)
    }

    /// The module currently executing, if any.
    pub fn current_module(&self) -> Option<ModuleRef> {
        self.module_stack.borrow().last().cloned()
    }

    /// Walk the resolver chain for a request. The first non-skip outcome
    /// wins; when every resolver skips, the aggregated searched locations
    /// form the resolve error.
    pub fn resolve_request(self: &Rc<Self>, request: &Request) -> Result<ResolveOutcome> {
        let resolvers = self.resolvers.borrow().clone();
        let mut searched = Vec::new();
        for resolver in resolvers {
            match resolver.resolve_module(self, request)? {
                ResolveOutcome::Skip { searched: tried } => {
                    searched.extend(tried.into_iter().map(|path| path.to_string()));
                }
                outcome => return Ok(outcome),
            }
        }
        Err(RuntimeError::resolve(request.name.clone(), searched))
    }

    /// Resolve a request and load (and optionally execute) the result.
    /// With `cache`, the module is registered under its canonical filename
    /// *before* execution so cyclic requires find it.
    pub fn resolve_and_load(
        self: &Rc<Self>,
        request: &Request,
        cache: bool,
        exec: bool,
    ) -> Result<ModuleRef> {
        if request.is_main && self.main_module.borrow().is_some() {
            return Err(RuntimeError::MainAlreadyLoaded);
        }

        let module = match self.resolve_request(request)? {
            ResolveOutcome::Module(module) => module,
            ResolveOutcome::Binding(name) => {
                return Err(RuntimeError::load(
                    request.name.clone(),
                    format!("'!{}' does not resolve to a module", name),
                ))
            }
            ResolveOutcome::Skip { searched } => {
                return Err(RuntimeError::resolve(
                    request.name.clone(),
                    searched.into_iter().map(|p| p.to_string()).collect(),
                ))
            }
        };

        let filename = module.borrow().filename.clone();
        let fresh = !self
            .modules
            .borrow()
            .get(&filename)
            .is_some_and(|existing| Rc::ptr_eq(existing, &module));

        if cache && fresh {
            self.modules.borrow_mut().insert(filename, module.clone());
        }
        if fresh {
            self.emit(&Event::Load { module: &module });
            self.fire_module_loaded(&module)?;
        }
        if request.is_main {
            self.set_main_module(Some(module.clone()));
        }
        if exec && !module.borrow().executed {
            self.exec_module(&module)?;
        }
        Ok(module)
    }

    /// Execute a module under the module stack. A failing execution evicts
    /// the module from the cache and resets it so a later require can
    /// retry; the error propagates unchanged.
    pub fn exec_module(self: &Rc<Self>, module: &ModuleRef) -> Result<()> {
        if module.borrow().executed {
            return Ok(());
        }
        let loader_id = module.borrow().loader_id.clone();
        let loader = self.get_loader(&loader_id).ok_or_else(|| {
            RuntimeError::load(
                module.borrow().filename.to_string(),
                format!("unknown loader '{}'", loader_id),
            )
        })?;

        self.module_stack.borrow_mut().push(module.clone());
        let result = loader.exec(self, module);
        self.module_stack.borrow_mut().pop();

        if let Err(err) = result {
            let filename = module.borrow().filename.clone();
            debug!(module = %filename, "execution failed, evicting from cache");
            self.modules.borrow_mut().remove(&filename);
            module.borrow_mut().reset();
            return Err(err);
        }
        Ok(())
    }

    /// Re-execute a module whose source changed (autoreload).
    pub fn reload_module(self: &Rc<Self>, module: &ModuleRef) -> Result<()> {
        module.borrow_mut().reset();
        let filename = module.borrow().filename.clone();
        self.modules
            .borrow_mut()
            .insert(filename, module.clone());
        self.exec_module(module)
    }

    // ------------------------------------------------------------------
    // Package cache

    /// The package rooted exactly at `directory`, if a manifest exists
    /// there. Results (including "no manifest") are cached per
    /// canonicalized directory.
    pub fn get_package(self: &Rc<Self>, directory: &VPath) -> Result<Option<PackageRef>> {
        let canonical = directory.resolve(false)?;
        if let Some(cached) = self.packages.borrow().get(&canonical) {
            return Ok(cached.clone());
        }
        let manifest_path = canonical.join(MANIFEST_FILENAME);
        let package = if manifest_path.is_file() {
            let manifest = PackageManifest::read(&manifest_path)?;
            debug!(package = %manifest.identifier(), dir = %canonical, "discovered package");
            Some(Package::new(manifest, canonical.clone()))
        } else {
            None
        };
        self.packages
            .borrow_mut()
            .insert(canonical, package.clone());
        Ok(package)
    }

    /// The package owning `directory`: resolves it, then walks upward
    /// until a manifest is found or the root is reached. Directories named
    /// after the modules directory and scope directories (`@scope`) are
    /// not package roots themselves.
    pub fn package_for_directory(self: &Rc<Self>, directory: &VPath) -> Result<Option<PackageRef>> {
        let mut current = Some(directory.resolve(false)?);
        while let Some(dir) = current {
            let name = dir.file_name().unwrap_or_default();
            if name != MODULES_DIRECTORY && !name.starts_with('@') {
                if let Some(package) = self.get_package(&dir)? {
                    return Ok(Some(package));
                }
            }
            current = dir.parent();
        }
        Ok(None)
    }
}

/// Guard returned by [`Context::enter`]; leaving happens on drop.
pub struct ContextGuard {
    context: Rc<Context>,
}

impl ContextGuard {
    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.leave();
    }
}

/// Find the nearest `nodepy_modules/` directory at or above `start`.
pub fn find_nearest_modules_directory(start: &VPath) -> Option<VPath> {
    let mut current = Some(start.clone());
    while let Some(dir) = current {
        let name = dir.file_name().unwrap_or_default();
        if name != MODULES_DIRECTORY && !name.starts_with('@') {
            let candidate = dir.join(MODULES_DIRECTORY);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
        current = dir.parent();
    }
    None
}

/// The per-user global modules directory (`~/.nodepy/modules`).
pub fn global_modules_directory() -> Option<VPath> {
    dirs::home_dir().map(|home| VPath::Fs(home.join(".nodepy").join("modules")))
}

/// The per-user configuration file (`~/.nodepy/config`), overridable via
/// `NODEPY_CONFIG`.
pub fn config_file_path() -> Option<std::path::PathBuf> {
    if let Ok(path) = std::env::var("NODEPY_CONFIG") {
        if !path.is_empty() {
            return Some(std::path::PathBuf::from(path));
        }
    }
    dirs::home_dir().map(|home| home.join(".nodepy").join("config"))
}
