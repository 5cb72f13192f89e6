//! Installer integration tests against temp workspaces. Everything here
//! works from local directories; no registry is contacted.

use nodepy_pm::config::RegistryConfig;
use nodepy_pm::installer::{Installer, InstallerOptions};
use nodepy_pm::RegistryClient;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn offline_installer(cwd: &Path) -> Installer {
    let registry = RegistryClient::new(&RegistryConfig {
        name: "default".into(),
        url: "http://127.0.0.1:1/unreachable".into(),
        username: None,
        password: None,
    })
    .unwrap();
    Installer::new(registry, cwd, InstallerOptions { progress: false, ..Default::default() })
        .unwrap()
}

fn sample_package(dir: &Path, name: &str) {
    write(
        &dir.join("nodepy.json"),
        &format!(
            r#"{{"name": "{}", "version": "1.0.0", "main": "index.ny",
                "bin": {{"{}-cli": "cli.ny"}}}}"#,
            name, name
        ),
    );
    write(&dir.join("index.ny"), "exports = {ok: true}\n");
    write(&dir.join("cli.ny"), "print('hello')\n");
    write(&dir.join("notes/README.md"), "docs\n");
}

#[test]
fn directory_install_places_files_and_shims() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    sample_package(src.path(), "demo");

    let mut installer = offline_installer(ws.path());
    let (name, version) = installer
        .install_from_directory(src.path(), false, false, None)
        .unwrap();
    assert_eq!(name, "demo");
    assert_eq!(version.to_string(), "1.0.0");

    let placed = ws.path().join("nodepy_modules/demo");
    assert!(placed.join("nodepy.json").is_file());
    assert!(placed.join("index.ny").is_file());
    assert!(placed.join("notes/README.md").is_file());
    assert!(placed.join("installed-files.txt").is_file());
    assert!(!placed.join(".partial").exists());

    // The lock was released.
    assert!(!ws.path().join("nodepy_modules/.lock").exists());

    #[cfg(unix)]
    {
        let shim = ws.path().join("nodepy_modules/.bin/demo-cli");
        assert!(shim.is_file());
        let content = fs::read_to_string(&shim).unwrap();
        assert!(content.contains("cli.ny"));
    }

    // installed-files.txt lists every placed file.
    let listed = fs::read_to_string(placed.join("installed-files.txt")).unwrap();
    assert!(listed.lines().any(|l| l.ends_with("index.ny")));
}

#[test]
fn reinstall_is_idempotent() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    sample_package(src.path(), "demo");

    let mut installer = offline_installer(ws.path());
    installer
        .install_from_directory(src.path(), false, false, None)
        .unwrap();

    let placed_index = ws.path().join("nodepy_modules/demo/index.ny");
    let mtime_before = fs::metadata(&placed_index).unwrap().modified().unwrap();
    let content_before = fs::read_to_string(&placed_index).unwrap();

    // Second run on the unchanged workspace changes nothing.
    installer
        .install_from_directory(src.path(), false, false, None)
        .unwrap();
    assert_eq!(
        fs::metadata(&placed_index).unwrap().modified().unwrap(),
        mtime_before
    );
    assert_eq!(fs::read_to_string(&placed_index).unwrap(), content_before);
}

#[test]
fn develop_install_writes_link_file_only() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let local = src.path().join("local");
    sample_package(&local, "local");

    let mut installer = offline_installer(ws.path());
    installer
        .install_from_directory(&local, true, false, None)
        .unwrap();

    let link = ws.path().join("nodepy_modules/local.nodepy-link");
    assert!(link.is_file());
    let content = fs::read_to_string(&link).unwrap();
    assert_eq!(
        Path::new(content.trim()),
        local.canonicalize().unwrap().as_path()
    );

    // No package directory was materialized.
    assert!(!ws.path().join("nodepy_modules/local").exists());

    // find_installed follows the link.
    let installed = installer.find_installed("local").unwrap().unwrap();
    assert_eq!(installed.manifest.name, "local");
    assert!(installed.link.is_some());
}

#[test]
fn uninstall_removes_package_and_shims() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    sample_package(src.path(), "demo");

    let mut installer = offline_installer(ws.path());
    installer
        .install_from_directory(src.path(), false, false, None)
        .unwrap();
    assert!(ws.path().join("nodepy_modules/demo").exists());

    installer.uninstall("demo").unwrap();
    assert!(!ws.path().join("nodepy_modules/demo").exists());
    #[cfg(unix)]
    assert!(!ws.path().join("nodepy_modules/.bin/demo-cli").exists());

    assert!(matches!(
        installer.uninstall("demo"),
        Err(nodepy_pm::PmError::NotInstalled(_))
    ));
}

#[cfg(unix)]
#[test]
fn failed_post_install_leaves_partial_sentinel() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write(
        &src.path().join("nodepy.json"),
        r#"{"name": "hooked", "version": "1.0.0",
            "scripts": {"post-install": "!exit 1"}}"#,
    );
    write(&src.path().join("index.ny"), "exports = {}\n");

    let mut installer = offline_installer(ws.path());
    let err = installer
        .install_from_directory(src.path(), false, false, None)
        .unwrap_err();
    assert!(matches!(err, nodepy_pm::PmError::HookFailed { .. }));

    let placed = ws.path().join("nodepy_modules/hooked");
    // Files remain but the directory is marked partial.
    assert!(placed.join("index.ny").is_file());
    assert!(placed.join(".partial").is_file());

    // A partial directory does not count as installed.
    assert!(installer.find_installed("hooked").unwrap().is_none());
}

#[test]
fn second_lock_acquisition_fails() {
    let ws = TempDir::new().unwrap();
    let installer = offline_installer(ws.path());
    let _lock = installer.lock().unwrap();
    assert!(matches!(
        installer.lock(),
        Err(nodepy_pm::PmError::Locked(_))
    ));
}

#[cfg(unix)]
#[test]
fn hook_failure_during_install_is_reported_with_package() {
    let ws = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    write(
        &src.path().join("nodepy.json"),
        r#"{"name": "pre-fail", "version": "1.0.0",
            "scripts": {"pre-install": "!exit 7"}}"#,
    );

    let mut installer = offline_installer(ws.path());
    match installer.install_from_directory(src.path(), false, false, None) {
        Err(nodepy_pm::PmError::HookFailed { hook, package, code }) => {
            assert_eq!(hook, "pre-install");
            assert_eq!(package, "pre-fail");
            assert_eq!(code, 7);
        }
        other => panic!("unexpected outcome {:?}", other.map(|_| ())),
    }
    // Nothing was placed.
    assert!(!ws.path().join("nodepy_modules/pre-fail").exists());
}
