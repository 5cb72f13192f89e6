// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end resolution and execution scenarios on real temp workspaces.

use nodepy_runtime::{Context, RequireOptions, VPath};
use nodepy_script::Value;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn context_at(dir: &Path) -> (Rc<Context>, nodepy_runtime::ContextGuard) {
    let ctx = Context::new(VPath::fs(dir.to_path_buf()).resolve(false).unwrap(), true);
    ctx.set_option("no_bytecache", Value::Bool(true));
    let guard = ctx.enter();
    (guard.context().clone(), guard)
}

#[test]
fn relative_require_returns_exports() {
    let ws = TempDir::new().unwrap();
    write(
        &ws.path().join("a/index.ny"),
        "b = require('./b')\nassert(b.x == 1)\nexports = {ok: b.x}\n",
    );
    write(&ws.path().join("a/b.ny"), "exports = {x: 1}\n");

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("./a/index").unwrap();
    assert_eq!(exports.get("ok"), Some(Value::Number(1.0)));
}

#[test]
fn resolve_root_shifts_in_package_requests() {
    let ws = TempDir::new().unwrap();
    let pkg = ws.path().join("nodepy_modules/p");
    write(
        &pkg.join("nodepy.json"),
        r#"{"name": "p", "version": "1.0.0", "main": "lib/m.ny", "resolve_root": "lib"}"#,
    );
    write(&pkg.join("lib/m.ny"), "u = require('./u')\nexports = {got: u.tag}\n");
    write(&pkg.join("lib/u.ny"), "exports = {tag: 'lib-u'}\n");

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("p").unwrap();
    assert_eq!(exports.get("got"), Some(Value::Str("lib-u".into())));

    // Subpath requests resolve under the resolve_root.
    let sub = ctx.require().resolve("p/u").unwrap();
    assert!(sub.to_string().ends_with("lib/u.ny"));

    // Modules inside the resolve root belong to the package.
    let module = ctx.require().require_module("p/u").unwrap();
    let package = module.borrow().package.clone().unwrap();
    assert_eq!(package.name(), "p");
}

#[test]
fn circular_requires_observe_partial_namespaces() {
    let ws = TempDir::new().unwrap();
    write(
        &ws.path().join("a.ny"),
        "first = 1\nb = require('./b')\nassert(b)\nexports = {from_b: b.seen}\n",
    );
    write(
        &ws.path().join("b.ny"),
        "a = require('./a')\nassert(a)\nassert(a.first == 1)\nexports = {seen: a.first}\n",
    );

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("./a").unwrap();
    assert_eq!(exports.get("from_b"), Some(Value::Number(1.0)));
}

#[test]
fn resolving_twice_yields_the_same_module() {
    let ws = TempDir::new().unwrap();
    write(&ws.path().join("m.ny"), "exports = {n: 1}\n");

    let (ctx, _guard) = context_at(ws.path());
    let first = ctx.require().require_module("./m").unwrap();
    let second = ctx.require().require_module("./m").unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn execution_failure_evicts_and_allows_retry() {
    let ws = TempDir::new().unwrap();
    let file = ws.path().join("flaky.ny");
    write(&file, "assert(false, 'broken')\nexports = {ok: true}\n");

    let (ctx, _guard) = context_at(ws.path());
    let err = ctx.require().require("./flaky").unwrap_err();
    assert!(err.to_string().contains("broken"));
    assert!(ctx.module_cache().is_empty());

    write(&file, "exports = {ok: true}\n");
    let exports = ctx.require().require("./flaky").unwrap();
    assert_eq!(exports.get("ok"), Some(Value::Bool(true)));
}

#[test]
fn json_requires_are_first_class() {
    let ws = TempDir::new().unwrap();
    write(&ws.path().join("data.json"), r#"{"answer": 42, "items": [1, 2]}"#);

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("./data.json").unwrap();
    assert_eq!(exports.get("answer"), Some(Value::Number(42.0)));
    // Suffix-less requests find the JSON file through suggestions.
    let exports = ctx.require().require("./data").unwrap();
    assert_eq!(exports.get("answer"), Some(Value::Number(42.0)));
}

#[test]
fn package_link_resolves_siblings_in_target() {
    let ws = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let local = target.path().join("local");
    write(
        &local.join("nodepy.json"),
        r#"{"name": "local", "version": "0.1.0", "main": "index.ny"}"#,
    );
    write(&local.join("index.ny"), "s = require('./sibling')\nexports = {tag: s.tag}\n");
    write(&local.join("sibling.ny"), "exports = {tag: 'target-side'}\n");

    fs::create_dir_all(ws.path().join("nodepy_modules")).unwrap();
    write(
        &ws.path().join("nodepy_modules/local.nodepy-link"),
        &format!("{}\n", local.display()),
    );

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("local").unwrap();
    assert_eq!(exports.get("tag"), Some(Value::Str("target-side".into())));

    // The sibling was resolved in the link target directory.
    let sibling = ctx.require().resolve("local/sibling").unwrap();
    assert!(sibling.to_string().starts_with(
        &VPath::fs(target.path().to_path_buf())
            .resolve(false)
            .unwrap()
            .to_string()
    ));
}

#[test]
fn import_syntax_extension_applies_per_package() {
    let ws = TempDir::new().unwrap();
    let pkg = ws.path().join("nodepy_modules/uses-imports");
    write(
        &pkg.join("nodepy.json"),
        r#"{"name": "uses-imports", "version": "1.0.0", "main": "index.ny",
            "extensions": ["!require-import-syntax"]}"#,
    );
    write(
        &pkg.join("index.ny"),
        "import {tag as t} from './vals'\nexports = {tag: t}\n",
    );
    write(&pkg.join("vals.ny"), "exports = {tag: 'imported'}\n");

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("uses-imports").unwrap();
    assert_eq!(exports.get("tag"), Some(Value::Str("imported".into())));
}

#[test]
fn file_comment_extensions_apply_to_that_file_only() {
    let ws = TempDir::new().unwrap();
    write(
        &ws.path().join("with-ext.ny"),
        "# nodepy-extensions: !require-unpack-syntax\n{tag} = require('./vals')\nexports = {tag: tag}\n",
    );
    write(&ws.path().join("vals.ny"), "exports = {tag: 'unpacked'}\n");

    let (ctx, _guard) = context_at(ws.path());
    let exports = ctx.require().require("./with-ext").unwrap();
    assert_eq!(exports.get("tag"), Some(Value::Str("unpacked".into())));
}

#[test]
fn main_module_can_only_be_set_once() {
    let ws = TempDir::new().unwrap();
    write(&ws.path().join("one.ny"), "exports = {}\n");
    write(&ws.path().join("two.ny"), "exports = {}\n");

    let (ctx, _guard) = context_at(ws.path());
    let opts = || RequireOptions {
        is_main: true,
        exports: false,
        ..RequireOptions::default()
    };
    ctx.require().call("./one", opts()).unwrap();
    let err = ctx.require().call("./two", opts()).unwrap_err();
    assert!(matches!(err, nodepy_runtime::RuntimeError::MainAlreadyLoaded));

    // hide_main temporarily detaches the main module.
    let require = ctx.require();
    require
        .hide_main(|| require.call("./two", opts()).map(|_| ()))
        .unwrap()
        .unwrap();
}

#[test]
fn missing_requests_report_searched_locations() {
    let ws = TempDir::new().unwrap();
    let (ctx, _guard) = context_at(ws.path());
    let err = ctx.require().require("definitely-missing").unwrap_err();
    match err {
        nodepy_runtime::RuntimeError::Resolve { request, .. } => {
            assert_eq!(request, "definitely-missing");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn bytecache_is_preferred_when_fresh() {
    let ws = TempDir::new().unwrap();
    let file = ws.path().join("cached.ny");
    write(&file, "exports = {n: 1}\n");

    // First run with caching enabled writes the bytecache.
    {
        let ctx = Context::new(VPath::fs(ws.path().to_path_buf()).resolve(false).unwrap(), true);
        let _guard = ctx.enter();
        ctx.require().require("./cached").unwrap();
    }
    let cache_file = ws.path().join("cached.nyc");
    assert!(cache_file.exists());

    // Make the bytecache strictly newer than the source, then load again:
    // the module must come from the cache file.
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
    let file_handle = fs::File::options().append(true).open(&cache_file).unwrap();
    file_handle.set_modified(later).unwrap();
    drop(file_handle);

    let ctx = Context::new(VPath::fs(ws.path().to_path_buf()).resolve(false).unwrap(), true);
    let _guard = ctx.enter();
    let module = ctx.require().require_module("./cached").unwrap();
    assert_eq!(
        module.borrow().real_filename.to_string(),
        VPath::fs(cache_file).resolve(false).unwrap().to_string()
    );
}
