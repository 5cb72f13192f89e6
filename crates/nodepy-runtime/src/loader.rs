// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loaders: suffix-keyed artifact readers and executors.
//!
//! The source loader handles `.ny` files and their `.nyc` bytecache
//! derivatives; the JSON loader makes `require("./x.json")` first-class.

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::extensions::parse_file_extensions;
use crate::module::{Module, ModuleRef, Request};
use crate::path::VPath;
use crate::require::Require;
use nodepy_script::{Program, ScriptError, Value};
use regex::Regex;
use std::rc::Rc;
use tracing::debug;

/// Source file suffix.
pub const SOURCE_SUFFIX: &str = ".ny";
/// Bytecache suffix: the serialized program of the preprocessed source.
pub const BYTECACHE_SUFFIX: &str = ".nyc";

/// Polymorphic loader interface.
pub trait Loader {
    /// Stable id, usable as an explicit loader hint (`-L source`).
    fn id(&self) -> &'static str;

    /// Whether this loader can load the given, existing file.
    fn can_load(&self, path: &VPath) -> bool;

    /// Candidate files for a request path that did not match directly.
    fn suggest_files(&self, path: &VPath) -> Vec<VPath>;

    /// Instantiate the module for a resolved filename (without executing).
    fn load(&self, ctx: &Rc<Context>, filename: &VPath, request: &Request) -> Result<ModuleRef>;

    /// Execute a loaded module.
    fn exec(&self, ctx: &Rc<Context>, module: &ModuleRef) -> Result<()>;
}

/// Host bridging a running script's `require` calls to the module's
/// require capability.
pub struct ModuleHost {
    require: Rc<Require>,
}

impl nodepy_script::Host for ModuleHost {
    fn require(&self, request: &str) -> nodepy_script::Result<Value> {
        self.require
            .require(request)
            .map_err(|err| ScriptError::Host { line: 0, source: Box::new(err) })
    }

    fn require_resolve(&self, request: &str) -> nodepy_script::Result<Value> {
        self.require
            .resolve(request)
            .map(|path| Value::Str(path.to_string()))
            .map_err(|err| ScriptError::Host { line: 0, source: Box::new(err) })
    }

    fn require_star(
        &self,
        request: &str,
        into: &nodepy_script::ScopeRef,
    ) -> nodepy_script::Result<()> {
        self.require
            .star(request, into, None)
            .map_err(|err| ScriptError::Host { line: 0, source: Box::new(err) })
    }
}

/// Loader for the script dialect.
pub struct SourceLoader;

impl SourceLoader {
    /// Produce the program to execute: the bytecache when it is fresh and
    /// readable, the (preprocessed, parsed) source otherwise. Returns the
    /// program, the real filename when it differs from the canonical one,
    /// and the file-local extension requests.
    fn load_program(
        &self,
        ctx: &Rc<Context>,
        filename: &VPath,
        package: Option<&crate::package::PackageRef>,
        require: &Rc<Require>,
    ) -> Result<(Program, Option<VPath>, Vec<String>)> {
        let is_cache_file = filename.suffix() == BYTECACHE_SUFFIX;
        let (source_file, cache_file) = if is_cache_file {
            (filename.with_suffix(SOURCE_SUFFIX), filename.clone())
        } else {
            (filename.clone(), filename.with_suffix(BYTECACHE_SUFFIX))
        };

        // Prefer the bytecache iff its mtime >= the source mtime and it is
        // actually readable; otherwise fall back to the source.
        let cache_fresh = cache_file.is_file()
            && match (cache_file.mtime(), source_file.mtime()) {
                (Some(cache), Some(source)) => cache >= source,
                (Some(_), None) => true,
                _ => false,
            };
        if cache_fresh {
            match cache_file
                .read_bytes()
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Program>(&bytes).ok())
            {
                Some(program) => return Ok((program, Some(cache_file), Vec::new())),
                None => debug!(cache = %cache_file, "skipping unreadable bytecache"),
            }
        }

        let bytes = source_file.read_bytes().map_err(|err| {
            RuntimeError::load(filename.to_string(), err.to_string())
        })?;
        let text = decode_source(&bytes, &source_file)?;
        let file_extensions = parse_file_extensions(&text);
        let text =
            ctx.preprocess_source(package, filename, text, &file_extensions, require)?;
        let program = nodepy_script::parse(&text).map_err(|err| match err {
            syntax @ ScriptError::Syntax { .. } => {
                RuntimeError::load(filename.to_string(), syntax.to_string())
            }
            other => RuntimeError::Script(other),
        })?;

        if !is_cache_file && !ctx.option_truthy("no_bytecache") {
            if let Some(fs_path) = cache_file.as_fs_path() {
                match serde_json::to_vec(&program) {
                    Ok(encoded) => {
                        if let Err(err) = std::fs::write(fs_path, encoded) {
                            debug!(cache = %cache_file, error = %err, "bytecache write failed");
                        }
                    }
                    Err(err) => debug!(error = %err, "bytecache encode failed"),
                }
            }
        }

        Ok((program, None, file_extensions))
    }
}

impl Loader for SourceLoader {
    fn id(&self) -> &'static str {
        "source"
    }

    fn can_load(&self, path: &VPath) -> bool {
        let suffix = path.suffix();
        suffix == SOURCE_SUFFIX || suffix == BYTECACHE_SUFFIX
    }

    fn suggest_files(&self, path: &VPath) -> Vec<VPath> {
        vec![
            path.append_suffix(SOURCE_SUFFIX),
            path.append_suffix(BYTECACHE_SUFFIX),
        ]
    }

    fn load(&self, ctx: &Rc<Context>, filename: &VPath, request: &Request) -> Result<ModuleRef> {
        let package = ctx.package_for_directory(
            &filename.parent().unwrap_or_else(|| ctx.current_dir.clone()),
        )?;
        Ok(Module::new(ctx, filename.clone(), self.id(), package, Some(request.copy())))
    }

    fn exec(&self, ctx: &Rc<Context>, module: &ModuleRef) -> Result<()> {
        let (filename, package, require, namespace) = {
            let module = module.borrow();
            (
                module.filename.clone(),
                module.package.clone(),
                module.require.clone(),
                module.namespace.clone(),
            )
        };

        let (program, real_filename, file_extensions) =
            self.load_program(ctx, &filename, package.as_ref(), &require)?;

        let main_name = ctx.is_main_module(&filename) && ctx.option_truthy("pymain");
        {
            let mut module = module.borrow_mut();
            module.file_extensions = file_extensions;
            module.real_filename = real_filename.unwrap_or_else(|| filename.clone());
            // Executed is flagged before the body runs so that re-entrant
            // requires observe the (partial) namespace instead of
            // re-executing the module.
            module.mark_executed();
            module.init_namespace(main_name);
        }
        ctx.fire_file_module_loaded(module)?;

        let host = ModuleHost { require };
        nodepy_script::execute(&program, &namespace, &host)?;
        Ok(())
    }
}

/// Loader for JSON documents; the exported value is the parsed document.
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn id(&self) -> &'static str {
        "json"
    }

    fn can_load(&self, path: &VPath) -> bool {
        path.suffix() == ".json"
    }

    fn suggest_files(&self, path: &VPath) -> Vec<VPath> {
        vec![path.append_suffix(".json")]
    }

    fn load(&self, ctx: &Rc<Context>, filename: &VPath, request: &Request) -> Result<ModuleRef> {
        let package = ctx.package_for_directory(
            &filename.parent().unwrap_or_else(|| ctx.current_dir.clone()),
        )?;
        Ok(Module::new(ctx, filename.clone(), self.id(), package, Some(request.copy())))
    }

    fn exec(&self, _ctx: &Rc<Context>, module: &ModuleRef) -> Result<()> {
        let (filename, namespace) = {
            let module = module.borrow();
            (module.filename.clone(), module.namespace.clone())
        };
        let text = filename.read_to_string()?;
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
            RuntimeError::load(filename.to_string(), err.to_string())
        })?;
        {
            let mut module = module.borrow_mut();
            module.real_filename = filename.clone();
            module.mark_executed();
            module.init_namespace(false);
        }
        namespace
            .borrow_mut()
            .insert("exports".into(), Value::from_json(&json));
        Ok(())
    }
}

/// Decode source bytes: UTF-8 by default, honoring a `coding:` declaration
/// on one of the first two lines.
fn decode_source(bytes: &[u8], path: &VPath) -> Result<String> {
    let head: Vec<u8> = bytes
        .split(|b| *b == b'\n')
        .take(2)
        .flat_map(|line| line.iter().copied().chain(std::iter::once(b'\n')))
        .collect();
    let head = String::from_utf8_lossy(&head);
    let decl = Regex::new(r"coding[:=][ \t]*([-_.a-zA-Z0-9]+)").expect("static regex");
    let encoding = decl
        .captures(&head)
        .map(|caps| caps[1].to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string());

    match encoding.as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec()).map_err(|_| {
            RuntimeError::load(path.to_string(), "source is not valid UTF-8")
        }),
        "latin-1" | "latin1" | "iso-8859-1" => {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
        other => Err(RuntimeError::load(
            path.to_string(),
            format!("unsupported source encoding {:?}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_by_default() {
        let text = decode_source("x = 'ü'\n".as_bytes(), &VPath::fs("/t.ny")).unwrap();
        assert_eq!(text, "x = 'ü'\n");
    }

    #[test]
    fn honors_latin1_declaration() {
        let mut bytes = b"# coding: latin-1\ns = '".to_vec();
        bytes.push(0xFC); // u-umlaut in latin-1, invalid as bare UTF-8
        bytes.extend_from_slice(b"'\n");
        let text = decode_source(&bytes, &VPath::fs("/t.ny")).unwrap();
        assert!(text.contains('ü'));
    }

    #[test]
    fn rejects_unknown_encodings() {
        let bytes = b"# -*- coding: ebcdic -*-\n";
        assert!(decode_source(bytes, &VPath::fs("/t.ny")).is_err());
    }

    #[test]
    fn rejects_invalid_utf8_without_declaration() {
        assert!(decode_source(&[0xFF, 0xFE], &VPath::fs("/t.ny")).is_err());
    }

    #[test]
    fn suffix_suggestions() {
        let loader = SourceLoader;
        assert_eq!(
            loader.suggest_files(&VPath::fs("/a/mod")),
            vec![VPath::fs("/a/mod.ny"), VPath::fs("/a/mod.nyc")]
        );
        assert!(loader.can_load(&VPath::fs("/a/mod.ny")));
        assert!(loader.can_load(&VPath::fs("/a/mod.nyc")));
        assert!(!loader.can_load(&VPath::fs("/a/mod.json")));
    }
}
