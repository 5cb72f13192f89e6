//! Publish, upload and register commands.

use crate::cli::{DistArgs, PublishArgs, RegisterArgs, UploadArgs};
use crate::commands::CommandContext;
use crate::error::{PmError, Result};
use crate::hooks::PackageLifecycle;
use owo_colors::OwoColorize;

/// `publish` = pre-publish hook + dist + upload + post-publish hook.
pub fn publish(args: &PublishArgs, ctx: &CommandContext) -> Result<()> {
    let manifest = ctx.manifest()?;
    if manifest.private {
        return Err(PmError::Other(format!(
            "'{}' is marked private and cannot be published",
            manifest.name
        )));
    }
    if manifest.license.is_none() {
        return Err(PmError::Other(
            "publishing requires a 'license' field in the manifest".into(),
        ));
    }

    let lifecycle = PackageLifecycle::new(manifest.clone(), ctx.cwd.clone());
    lifecycle.run("pre-publish", &[])?;

    let archive = super::dist::build(&DistArgs { dest: None }, ctx)?;
    if args.dry_run {
        println!("{} {} (dry run)", "built".green(), archive.display());
    } else {
        let registry = ctx.registry()?;
        registry.upload(&manifest.name, &manifest.version, &archive)?;
        println!(
            "{} {}@{} to {}",
            "published".green(),
            manifest.name.cyan(),
            manifest.version,
            registry.base_url()
        );
    }

    lifecycle.run("post-publish", &[])?;
    Ok(())
}

/// Upload an archive without rebuilding.
pub fn upload(args: &UploadArgs, ctx: &CommandContext) -> Result<()> {
    let manifest = ctx.manifest()?;
    let archive = match &args.file {
        Some(file) => ctx.cwd.join(file),
        None => ctx.cwd.join("dist").join(format!(
            "{}-{}.tar.gz",
            manifest.name.replace('/', "-").replace('@', ""),
            manifest.version
        )),
    };
    if !archive.is_file() {
        return Err(PmError::Other(format!(
            "no archive at '{}', run 'nppm dist' first",
            archive.display()
        )));
    }
    let registry = ctx.registry()?;
    registry.upload(&manifest.name, &manifest.version, &archive)?;
    println!("{} {}", "uploaded".green(), archive.display());
    Ok(())
}

/// Create a registry account.
pub fn register(args: &RegisterArgs, ctx: &CommandContext) -> Result<()> {
    let registry = ctx.registry()?;
    registry.register(&args.username, &args.password, &args.email)?;
    println!(
        "{} account '{}' at {}",
        "registered".green(),
        args.username.cyan(),
        registry.base_url()
    );
    Ok(())
}
