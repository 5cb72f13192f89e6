// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extension dispatcher and the two built-in source preprocessors.
//!
//! Extensions are per-package plugins receiving load/preprocess events.
//! The built-ins are textual transforms registered as context bindings, so
//! they are reachable through `!require-unpack-syntax` and
//! `!require-import-syntax` even without a manifest. Both preserve line
//! counts so diagnostics keep pointing at the right source lines.

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::module::ModuleRef;
use crate::package::PackageRef;
use crate::path::VPath;
use crate::require::{Require, RequireOptions};
use regex::Regex;
use std::rc::Rc;
use tracing::debug;

/// Event interface for extensions. Every method is optional.
pub trait Extension {
    /// The name the extension was registered under, for diagnostics.
    fn name(&self) -> &str;

    /// Fired once when the extension is first loaded for a package.
    fn init_extension(&self, _package: &PackageRef) -> Result<()> {
        Ok(())
    }

    /// Fired after a module was loaded (before execution).
    fn module_loaded(&self, _module: &ModuleRef) -> Result<()> {
        Ok(())
    }

    /// Source-to-source filter run before a module is compiled. Must
    /// preserve the line count of `source`.
    fn preprocess_source(
        &self,
        _package: Option<&PackageRef>,
        _filename: &VPath,
        source: String,
    ) -> Result<String> {
        Ok(source)
    }
}

/// An extension backed by a loaded module. The script dialect has no
/// callable values, so module extensions participate in the lifecycle (the
/// load itself runs their side effects) but cannot transform source; only
/// native extensions registered as bindings can.
pub struct ModuleExtension {
    name: String,
    #[allow(dead_code)]
    module: ModuleRef,
}

impl Extension for ModuleExtension {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Scan the first comment lines of a source file for a
/// `# nodepy-extensions: ext1, ext2` declaration. Extensions declared this
/// way are active for that file only and do not fire `init_extension`.
pub fn parse_file_extensions(source: &str) -> Vec<String> {
    for line in source.lines() {
        let line = line.trim_start();
        if !line.starts_with('#') {
            break;
        }
        let comment = line.trim_start_matches('#').trim_start();
        if let Some(rest) = comment.strip_prefix("nodepy-extensions:") {
            return rest
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
    }
    Vec::new()
}

impl Context {
    /// Resolve a list of extension requests into extension instances.
    /// `!`-prefixed names come from the binding table, everything else is
    /// required as a module (`exports=false`).
    fn resolve_extensions(
        self: &Rc<Self>,
        names: &[String],
        require: &Rc<Require>,
    ) -> Result<Vec<(String, Rc<dyn Extension>)>> {
        let mut extensions: Vec<(String, Rc<dyn Extension>)> = Vec::new();
        for name in names {
            if let Some(binding_name) = name.strip_prefix('!') {
                extensions.push((name.clone(), self.binding_extension(binding_name)?));
            } else {
                let outcome = require.call(
                    name,
                    RequireOptions { exports: false, ..RequireOptions::default() },
                )?;
                let module = outcome.into_module().ok_or_else(|| {
                    RuntimeError::ExtensionFailed {
                        extension: name.clone(),
                        reason: "request did not produce a module".into(),
                    }
                })?;
                extensions.push((
                    name.clone(),
                    Rc::new(ModuleExtension { name: name.clone(), module }),
                ));
            }
        }
        Ok(extensions)
    }

    /// The extensions declared by a package's manifest, loading and
    /// initializing them on first use.
    pub fn package_extensions(
        self: &Rc<Self>,
        package: &PackageRef,
    ) -> Result<Vec<Rc<dyn Extension>>> {
        if let Some(loaded) = package.extensions.borrow().as_ref() {
            return Ok(loaded.clone());
        }
        let names = package.manifest.extensions.clone();
        let require = self.require();
        let resolved = self.resolve_extensions(&names, &require)?;
        let mut extensions = Vec::with_capacity(resolved.len());
        for (name, extension) in resolved {
            extension
                .init_extension(package)
                .map_err(|err| extension_failure(&name, err))?;
            extensions.push(extension);
        }
        debug!(package = %package.name(), count = extensions.len(), "loaded package extensions");
        *package.extensions.borrow_mut() = Some(extensions.clone());
        Ok(extensions)
    }

    /// Run the preprocess chain for a module source: file-local extensions
    /// first, then the package's, in declaration order.
    pub fn preprocess_source(
        self: &Rc<Self>,
        package: Option<&PackageRef>,
        filename: &VPath,
        mut source: String,
        file_extensions: &[String],
        require: &Rc<Require>,
    ) -> Result<String> {
        for (name, extension) in self.resolve_extensions(file_extensions, require)? {
            source = extension
                .preprocess_source(package, filename, source)
                .map_err(|err| extension_failure(&name, err))?;
        }
        if let Some(package) = package {
            for extension in self.package_extensions(package)? {
                source = extension
                    .preprocess_source(Some(package), filename, source)
                    .map_err(|err| extension_failure(extension.name(), err))?;
            }
        }
        Ok(source)
    }

    /// Fire `module_loaded` on the extensions of the module's package.
    pub(crate) fn fire_module_loaded(self: &Rc<Self>, module: &ModuleRef) -> Result<()> {
        let package = module.borrow().package.clone();
        if let Some(package) = package {
            for extension in self.package_extensions(&package)? {
                extension
                    .module_loaded(module)
                    .map_err(|err| extension_failure(extension.name(), err))?;
            }
        }
        Ok(())
    }

    /// Fire `module_loaded` on the module's file-local extensions. These
    /// are only known once the source was read, so the source loader calls
    /// this separately; file-local extensions never see `init_extension`.
    pub(crate) fn fire_file_module_loaded(self: &Rc<Self>, module: &ModuleRef) -> Result<()> {
        let (file_extensions, require) = {
            let module = module.borrow();
            (module.file_extensions.clone(), module.require.clone())
        };
        if file_extensions.is_empty() {
            return Ok(());
        }
        for (name, extension) in self.resolve_extensions(&file_extensions, &require)? {
            extension
                .module_loaded(module)
                .map_err(|err| extension_failure(&name, err))?;
        }
        Ok(())
    }
}

fn extension_failure(name: &str, err: RuntimeError) -> RuntimeError {
    match err {
        already @ RuntimeError::ExtensionFailed { .. } => already,
        other => RuntimeError::ExtensionFailed {
            extension: name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// `{a, b as c} = require('x')` → explicit attribute assignments.
pub struct RequireUnpackSyntax {
    pattern: Regex,
}

impl RequireUnpackSyntax {
    pub fn new() -> RequireUnpackSyntax {
        let pattern = Regex::new(
            r#"(?x)
            \{\s*
            (?P<members>
                [A-Za-z_]\w*(?:\s+as\s+[A-Za-z_]\w*)?
                (?:\s*,\s*[A-Za-z_]\w*(?:\s+as\s+[A-Za-z_]\w*)?)*
            )
            \s*,?\s*\}
            \s*=\s*
            require\(\s*(?:'(?P<m1>[^']*)'|"(?P<m2>[^"]*)")\s*\)
            "#,
        )
        .expect("static regex");
        RequireUnpackSyntax { pattern }
    }
}

impl Default for RequireUnpackSyntax {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for RequireUnpackSyntax {
    fn name(&self) -> &str {
        "require-unpack-syntax"
    }

    fn preprocess_source(
        &self,
        _package: Option<&PackageRef>,
        _filename: &VPath,
        mut source: String,
    ) -> Result<String> {
        loop {
            let found = self.pattern.captures(&source).map(|caps| {
                let range = caps.get(0).expect("match 0").range();
                let module = caps
                    .name("m1")
                    .or_else(|| caps.name("m2"))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                (range, unpack_statement(module, &caps["members"]))
            });
            match found {
                Some((range, replacement)) => source.replace_range(range, &replacement),
                None => break,
            }
        }
        Ok(source)
    }
}

/// Build `_reqres = require('mod'); a = _reqres.a; ...; _reqres = null`
/// from a member list like `a, b as c`. Single line, so line counts are
/// preserved.
fn unpack_statement(module: &str, members: &str) -> String {
    let mut statement = format!("_reqres = require('{}')", module);
    for member in members.split(',') {
        let member = member.trim();
        if member.is_empty() {
            continue;
        }
        let (name, alias) = match member.split_once(" as ") {
            Some((name, alias)) => (name.trim(), alias.trim()),
            None => (member, member),
        };
        statement.push_str(&format!("; {} = _reqres.{}", alias, name));
    }
    statement.push_str("; _reqres = null");
    statement
}

/// `import {a, b as c} from 'x'` and friends → `require` calls.
pub struct RequireImportSyntax {
    import_as: Regex,
    import_from: Regex,
}

impl RequireImportSyntax {
    pub fn new() -> RequireImportSyntax {
        let import_as = Regex::new(
            r#"(?m)^(?P<indent>[ \t]*)import[ \t]+(?:'(?P<m1>[^']*)'|"(?P<m2>[^"]*)")(?:[ \t]+as[ \t]+(?P<name>[A-Za-z_][\w.]*))?[ \t]*$"#,
        )
        .expect("static regex");
        let import_from = Regex::new(
            r#"(?m)^(?P<indent>[ \t]*)import[ \t]+(?P<members>[^'"\n]+?)[ \t]+from[ \t]+(?:'(?P<m1>[^']*)'|"(?P<m2>[^"]*)")[ \t]*$"#,
        )
        .expect("static regex");
        RequireImportSyntax { import_as, import_from }
    }

    fn rewrite_from(&self, members: &str, module: &str) -> String {
        let members = members.trim();
        if members == "*" {
            return format!("require.star('{}')", module);
        }
        if let Some(inner) = members.strip_prefix('{') {
            let inner = inner.trim_end_matches('}');
            return unpack_statement(module, inner);
        }
        if let Some((default, rest)) = members.split_once(',') {
            let default = default.trim();
            let rest = rest.trim();
            if rest == "*" {
                return format!("require.star('{}'); {} = require('{}')", module, default, module);
            }
            if let Some(inner) = rest.strip_prefix('{') {
                let inner = inner.trim_end_matches('}');
                let mut statement = format!("{} = require('{}'); ", default, module);
                statement.push_str(&unpack_statement(module, inner));
                return statement;
            }
        }
        format!("{} = require('{}')", members, module)
    }
}

impl Default for RequireImportSyntax {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for RequireImportSyntax {
    fn name(&self) -> &str {
        "require-import-syntax"
    }

    fn preprocess_source(
        &self,
        _package: Option<&PackageRef>,
        _filename: &VPath,
        mut source: String,
    ) -> Result<String> {
        loop {
            let found = self.import_as.captures(&source).map(|caps| {
                let range = caps.get(0).expect("match 0").range();
                let module = caps
                    .name("m1")
                    .or_else(|| caps.name("m2"))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let replacement = match caps.name("name") {
                    Some(name) => {
                        format!("{}{} = require('{}')", &caps["indent"], name.as_str(), module)
                    }
                    None => format!("{}require('{}')", &caps["indent"], module),
                };
                (range, replacement)
            });
            if let Some((range, replacement)) = found {
                source.replace_range(range, &replacement);
                continue;
            }

            let found = self.import_from.captures(&source).map(|caps| {
                let range = caps.get(0).expect("match 0").range();
                let module = caps
                    .name("m1")
                    .or_else(|| caps.name("m2"))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let replacement = format!(
                    "{}{}",
                    &caps["indent"],
                    self.rewrite_from(&caps["members"], module)
                );
                (range, replacement)
            });
            match found {
                Some((range, replacement)) => source.replace_range(range, &replacement),
                None => break,
            }
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocess(ext: &dyn Extension, source: &str) -> String {
        ext.preprocess_source(None, &VPath::fs("/test.ny"), source.to_string())
            .unwrap()
    }

    #[test]
    fn unpack_syntax() {
        let ext = RequireUnpackSyntax::new();
        let out = preprocess(&ext, "{app, config as cfg} = require('./app')\n");
        assert_eq!(
            out,
            "_reqres = require('./app'); app = _reqres.app; cfg = _reqres.config; _reqres = null\n"
        );
    }

    #[test]
    fn unpack_preserves_line_count() {
        let ext = RequireUnpackSyntax::new();
        let source = "a = 1\n{x} = require('m')\nb = 2\n";
        let out = preprocess(&ext, source);
        assert_eq!(out.lines().count(), source.lines().count());
        assert!(out.contains("x = _reqres.x"));
    }

    #[test]
    fn import_plain_and_as() {
        let ext = RequireImportSyntax::new();
        assert_eq!(preprocess(&ext, "import 'mod'"), "require('mod')");
        assert_eq!(preprocess(&ext, "import 'mod' as m"), "m = require('mod')");
        assert_eq!(preprocess(&ext, "import m from 'mod'"), "m = require('mod')");
    }

    #[test]
    fn import_members_and_star() {
        let ext = RequireImportSyntax::new();
        assert_eq!(
            preprocess(&ext, "import {a, b as c} from 'mod'"),
            "_reqres = require('mod'); a = _reqres.a; c = _reqres.b; _reqres = null"
        );
        assert_eq!(preprocess(&ext, "import * from 'mod'"), "require.star('mod')");
        assert_eq!(
            preprocess(&ext, "import m, * from 'mod'"),
            "require.star('mod'); m = require('mod')"
        );
        assert_eq!(
            preprocess(&ext, "import m, {a} from 'mod'"),
            "m = require('mod'); _reqres = require('mod'); a = _reqres.a; _reqres = null"
        );
    }

    #[test]
    fn import_keeps_indentation_and_lines() {
        let ext = RequireImportSyntax::new();
        let source = "x = 1\n  import {a} from 'mod'\ny = 2";
        let out = preprocess(&ext, source);
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().nth(1).unwrap().starts_with("  _reqres"));
    }

    #[test]
    fn transformed_source_parses() {
        let ext = RequireImportSyntax::new();
        let out = preprocess(&ext, "import {a, b as c} from './mod'\nexports = {a: a}\n");
        nodepy_script::parse(&out).unwrap();
    }

    #[test]
    fn file_extension_comment() {
        let source = "# nodepy-extensions: !require-import-syntax, my-ext\nx = 1\n";
        assert_eq!(
            parse_file_extensions(source),
            vec!["!require-import-syntax".to_string(), "my-ext".to_string()]
        );
        // Only leading comment lines are scanned.
        let late = "x = 1\n# nodepy-extensions: my-ext\n";
        assert!(parse_file_extensions(late).is_empty());
    }
}
