//! Uninstall command implementation.

use crate::cli::UninstallArgs;
use crate::commands::{resolve_location, CommandContext};
use crate::error::Result;
use crate::installer::{Installer, InstallerOptions};
use owo_colors::OwoColorize;

pub fn run(args: &UninstallArgs, ctx: &CommandContext) -> Result<()> {
    let location = resolve_location(&ctx.config, args.global, args.root);
    let options = InstallerOptions { location, ..InstallerOptions::default() };
    let mut installer = Installer::new(ctx.registry()?, &ctx.cwd, options)?;

    for name in &args.packages {
        installer.uninstall(name)?;
        println!("{} {}", "removed".green(), name.cyan());
    }
    Ok(())
}
