//! Init command: write a fresh manifest.

use crate::cli::InitArgs;
use crate::commands::CommandContext;
use crate::error::{PmError, Result};
use nodepy_runtime::manifest::{validate_package_name, PackageManifest};
use nodepy_runtime::semver::Version;
use owo_colors::OwoColorize;

pub fn run(args: &InitArgs, ctx: &CommandContext) -> Result<()> {
    let manifest_path = ctx.manifest_path();
    if manifest_path.exists() && !args.force {
        return Err(PmError::Other(
            "nodepy.json already exists, use --force to overwrite".into(),
        ));
    }

    let name = match &args.name {
        Some(name) => name.clone(),
        None => ctx
            .cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".into()),
    };
    validate_package_name(&name).map_err(PmError::Other)?;

    let mut manifest = PackageManifest::new(name, Version::new(0, 1, 0));
    manifest.main = Some("index".into());
    manifest.author = ctx.config.author.clone();
    manifest.license = ctx.config.license.clone();
    manifest.write(&manifest_path)?;

    println!("{} {}", "wrote".green(), manifest_path.display());
    Ok(())
}
