//! Small informational commands: bin, dirs, version.

use crate::cli::LocationArgs;
use crate::commands::{resolve_location, CommandContext};
use crate::error::Result;
use crate::installer::directories;

pub fn bin(args: &LocationArgs, ctx: &CommandContext) -> Result<()> {
    let location = resolve_location(&ctx.config, args.global, args.root);
    let dirs = directories(location, &ctx.cwd)?;
    if args.pip {
        println!("{}", dirs.pip_bin.display());
    } else {
        println!("{}", dirs.bin.display());
    }
    Ok(())
}

pub fn dirs(args: &LocationArgs, ctx: &CommandContext) -> Result<()> {
    let location = resolve_location(&ctx.config, args.global, args.root);
    let dirs = directories(location, &ctx.cwd)?;
    println!("packages: {}", dirs.packages.display());
    println!("bin:      {}", dirs.bin.display());
    println!("pip:      {}", dirs.pip_prefix.display());
    println!("pip bin:  {}", dirs.pip_bin.display());
    Ok(())
}

pub fn version(ctx: &CommandContext) -> Result<()> {
    let manifest = ctx.manifest()?;
    println!("{}", manifest.version);
    Ok(())
}
