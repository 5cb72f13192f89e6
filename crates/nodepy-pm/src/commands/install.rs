//! Install command implementation.

use crate::cli::InstallArgs;
use crate::commands::{resolve_location, CommandContext};
use crate::error::Result;
use crate::installer::{save_dependency, Installer, InstallerOptions, SaveKind};
use crate::target::{parse_target, InstallTarget};
use nodepy_runtime::semver::Selector;
use owo_colors::OwoColorize;
use tracing::info;

pub fn run(args: &InstallArgs, ctx: &CommandContext) -> Result<()> {
    let location = resolve_location(&ctx.config, args.global, args.root);
    let options = InstallerOptions {
        location,
        upgrade: args.upgrade,
        dev: args.dev,
        ignore_installed: args.ignore_installed,
        recursive: args.recursive,
        pip_separate_process: args.pip_separate_process,
        progress: !args.no_progress,
    };
    let mut installer = Installer::new(ctx.registry()?, &ctx.cwd, options)?;

    if args.packages.is_empty() {
        // Install the current package's dependencies.
        let manifest = ctx.manifest()?;
        info!("installing dependencies of '{}'", manifest.identifier());
        // Dev dependencies of the root are included unless --production.
        let dev = !args.production;
        let _lock = installer.lock()?;
        installer.install_dependencies_for(&manifest, &ctx.cwd, dev)?;
        print_summary(&installer);
        return Ok(());
    }

    let mut targets = Vec::with_capacity(args.packages.len());
    for spec in &args.packages {
        targets.push(parse_target(spec, args.develop)?);
    }
    installer.install_targets(&targets)?;

    // Manifest edits for --save/--save-dev/--save-ext.
    if args.save || args.save_dev || args.save_ext {
        let kind = if args.save_ext {
            SaveKind::Extensions
        } else if args.save_dev {
            SaveKind::DevDependencies
        } else {
            SaveKind::Dependencies
        };
        let manifest_path = ctx.manifest_path();
        for (spec, target) in args.packages.iter().zip(&targets) {
            let (name, selector) = match target {
                InstallTarget::Registry { name, selector } => (name.clone(), selector.clone()),
                InstallTarget::Directory { path, develop } => {
                    let manifest = crate::commands::CommandContext {
                        config: ctx.config.clone(),
                        registry_name: ctx.registry_name.clone(),
                        cwd: ctx.cwd.join(path),
                    }
                    .manifest()?;
                    let raw = if *develop {
                        format!("-e {}", path.display())
                    } else {
                        path.display().to_string()
                    };
                    (manifest.name, Selector::parse(&raw)?)
                }
                InstallTarget::Git { .. }
                | InstallTarget::Archive { .. }
                | InstallTarget::Python { .. } => {
                    println!(
                        "{} cannot save target '{}' into the manifest",
                        "note:".yellow(),
                        spec
                    );
                    continue;
                }
            };
            save_dependency(&manifest_path, &name, &selector, kind)?;
            println!(
                "{} {} {} {}",
                "saved".green(),
                name.cyan(),
                "→".dimmed(),
                selector
            );
        }
    }

    print_summary(&installer);
    Ok(())
}

fn print_summary(installer: &Installer) {
    for decision in installer.decisions() {
        println!("{} {}", "note:".yellow(), decision);
    }
}
