//! Dist command: build the package archive.

use crate::cli::DistArgs;
use crate::commands::CommandContext;
use crate::dist;
use crate::error::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(args: &DistArgs, ctx: &CommandContext) -> Result<()> {
    let archive = build(args, ctx)?;
    println!("{} {}", "packed".green(), archive.display());
    Ok(())
}

/// Build `dist/<name>-<version>.tar.gz` and return its path.
pub fn build(args: &DistArgs, ctx: &CommandContext) -> Result<PathBuf> {
    let manifest = ctx.manifest()?;
    let dest = match &args.dest {
        Some(dest) => ctx.cwd.join(dest),
        None => ctx.cwd.join("dist"),
    };
    dist::pack(&manifest, &ctx.cwd, &dest)
}
