// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory module representation and resolution requests.

use crate::context::Context;
use crate::package::{Package, PackageRef};
use crate::path::VPath;
use crate::require::Require;
use nodepy_script::{new_scope, ScopeRef, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::SystemTime;

/// Shared handle to a module. At most one exists per canonical filename
/// per context (modulo cache invalidation).
pub type ModuleRef = Rc<RefCell<Module>>;

/// An in-flight resolution record. Immutable once handed to the resolver
/// chain; [`Request::copy`] produces a new request with overrides.
#[derive(Debug, Clone)]
pub struct Request {
    /// The raw request string.
    pub name: String,
    /// Directory relative requests resolve in. With `is_main`, module
    /// requests are also tried here first.
    pub current_dir: VPath,
    /// Whether the result becomes the context's main module.
    pub is_main: bool,
    /// Explicit loader id, overriding suffix detection.
    pub loader: Option<String>,
    /// The link site when resolution followed a `.nodepy-link`, so the
    /// loaded module can resolve back into the original modules directory.
    pub original_resolve_location: Option<VPath>,
    /// Additional search paths active at resolution time.
    pub path: Vec<VPath>,
    /// The module that issued the request, if any.
    pub parent: Option<Weak<RefCell<Module>>>,
    /// Whether the module cache may satisfy this request. `false` forces
    /// a fresh module instance.
    pub use_cache: bool,
}

impl Request {
    pub fn new(name: impl Into<String>, current_dir: VPath) -> Request {
        Request {
            name: name.into(),
            current_dir,
            is_main: false,
            loader: None,
            original_resolve_location: None,
            path: Vec::new(),
            parent: None,
            use_cache: true,
        }
    }

    /// Clone this request; callers override fields on the copy.
    pub fn copy(&self) -> Request {
        self.clone()
    }

    /// Whether the request string is relative (`.`, `..`, `./x`, `../x`).
    pub fn is_relative(&self) -> bool {
        is_relative_request(&self.name)
    }

    /// Whether the request string is filesystem-absolute. Windows drive
    /// paths (`C:\..`) count as absolute.
    pub fn is_absolute(&self) -> bool {
        is_absolute_request(&self.name)
    }
}

pub fn is_relative_request(name: &str) -> bool {
    name == "." || name == ".." || name.starts_with("./") || name.starts_with("../")
}

pub fn is_absolute_request(name: &str) -> bool {
    if name.starts_with('/') {
        return true;
    }
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic()
    )
}

/// The in-memory representation of an executable artifact.
pub struct Module {
    /// Canonical filename; the module cache key.
    pub filename: VPath,
    /// The file actually executed (the bytecache when one was preferred).
    pub real_filename: VPath,
    pub directory: VPath,
    pub name: String,
    /// Id of the loader that owns this module.
    pub loader_id: String,
    pub package: Option<PackageRef>,
    /// The request that produced the module (none for synthetic modules).
    pub request: Option<Request>,
    /// The execution scope; published (possibly empty) before execution so
    /// cyclic requires observe partial namespaces.
    pub namespace: ScopeRef,
    pub executed: bool,
    /// Modification time captured when execution started. Set means the
    /// module counts as executed.
    pub exec_mtime: Option<SystemTime>,
    /// Extension requests declared by an in-file comment; they receive
    /// preprocess and module-loaded events for this file only.
    pub file_extensions: Vec<String>,
    pub require: Rc<Require>,
}

impl Module {
    /// Create a module and its per-module require capability.
    pub fn new(
        context: &Rc<Context>,
        filename: VPath,
        loader_id: &str,
        package: Option<PackageRef>,
        request: Option<Request>,
    ) -> ModuleRef {
        let directory = filename
            .parent()
            .unwrap_or_else(|| context.current_dir.clone());
        let name = module_name(&filename, package.as_deref());
        Rc::new_cyclic(|weak: &Weak<RefCell<Module>>| {
            let require = Rc::new(Require::new(
                Rc::downgrade(context),
                weak.clone(),
                directory.clone(),
            ));
            RefCell::new(Module {
                filename,
                real_filename: VPath::fs(""),
                directory,
                name,
                loader_id: loader_id.to_string(),
                package,
                request,
                namespace: new_scope(),
                executed: false,
                exec_mtime: None,
                file_extensions: Vec::new(),
                require,
            })
        })
    }

    /// The exported value: the namespace's `exports` member when present,
    /// otherwise the namespace itself.
    pub fn exports(&self) -> Value {
        self.namespace
            .borrow()
            .get("exports")
            .cloned()
            .unwrap_or_else(|| Value::Object(self.namespace.clone()))
    }

    /// The module that required this one.
    pub fn parent(&self) -> Option<ModuleRef> {
        self.request
            .as_ref()
            .and_then(|r| r.parent.as_ref())
            .and_then(Weak::upgrade)
    }

    /// Populate the module-visible symbols. Called right before execution
    /// (and again on reload).
    pub fn init_namespace(&self, main_name: bool) {
        let mut scope = self.namespace.borrow_mut();
        let module_info = Value::new_object();
        if let Value::Object(info) = &module_info {
            let mut info = info.borrow_mut();
            info.insert("filename".into(), Value::Str(self.filename.to_string()));
            info.insert("directory".into(), Value::Str(self.directory.to_string()));
            info.insert("name".into(), Value::Str(self.name.clone()));
        }
        scope.insert("module".into(), module_info);
        scope.insert(
            "__directory__".into(),
            Value::Str(self.directory.to_string()),
        );
        let name = if main_name { "__main__" } else { self.name.as_str() };
        scope.insert("__name__".into(), Value::Str(name.to_string()));
    }

    /// Mark the module executed and capture the source mtime. Must run
    /// before the module body so that re-entrant requires see the module
    /// as executed and `source_changed` is false afterwards.
    pub fn mark_executed(&mut self) {
        self.executed = true;
        self.exec_mtime = Some(self.current_mtime());
    }

    /// Reset the module so it can be executed again (reload, or retry
    /// after a failed execution).
    pub fn reset(&mut self) {
        self.executed = false;
        self.exec_mtime = None;
        self.namespace.borrow_mut().clear();
    }

    /// Whether the backing source changed since the last execution.
    pub fn source_changed(&self) -> bool {
        match self.exec_mtime {
            None => true,
            Some(executed_at) => self.current_mtime() > executed_at,
        }
    }

    fn current_mtime(&self) -> SystemTime {
        let mut mtime = SystemTime::UNIX_EPOCH;
        for path in [&self.filename, &self.real_filename] {
            if let Some(t) = path.mtime() {
                if t > mtime {
                    mtime = t;
                }
            }
        }
        mtime
    }
}

/// Derive a module name: `package-name/relative/path` when the module
/// lives inside a package, otherwise the file stem.
fn module_name(filename: &VPath, package: Option<&Package>) -> String {
    if let Some(package) = package {
        let root = package.directory.to_string();
        let full = filename.with_suffix("").to_string();
        if let Some(relative) = full.strip_prefix(&root) {
            let relative = relative.trim_start_matches(['/', '\\']);
            if !relative.is_empty() {
                return format!("{}/{}", package.name(), relative.replace('\\', "/"));
            }
            return package.name().to_string();
        }
    }
    filename.stem().unwrap_or_else(|| filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_request_detection() {
        assert!(is_relative_request("."));
        assert!(is_relative_request(".."));
        assert!(is_relative_request("./x"));
        assert!(is_relative_request("../x"));
        assert!(!is_relative_request("x"));
        assert!(!is_relative_request("@scope/x"));
        assert!(!is_relative_request(".hidden"));
    }

    #[test]
    fn absolute_request_detection() {
        assert!(is_absolute_request("/usr/lib/x"));
        assert!(is_absolute_request("C:\\work\\x"));
        assert!(is_absolute_request("c:/work/x"));
        assert!(!is_absolute_request("x"));
        assert!(!is_absolute_request("./x"));
    }

    #[test]
    fn request_copy_allows_overrides() {
        let request = Request::new("./a", VPath::fs("/work"));
        let mut copied = request.copy();
        copied.is_main = true;
        assert!(!request.is_main);
        assert!(copied.is_main);
        assert_eq!(copied.name, request.name);
    }
}
