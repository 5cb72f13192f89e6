//! Run command: execute a script from the manifest.

use crate::cli::RunArgs;
use crate::commands::CommandContext;
use crate::error::Result;
use crate::hooks::PackageLifecycle;
use crate::installer::{directories, InstallLocation};

pub fn run(args: &RunArgs, ctx: &CommandContext) -> Result<()> {
    let manifest = ctx.manifest()?;
    let dirs = directories(InstallLocation::Local, &ctx.cwd)?;
    let lifecycle =
        PackageLifecycle::new(manifest, ctx.cwd.clone()).with_bin_dir(dirs.bin);
    lifecycle.run_named(&args.script, &args.args)
}
