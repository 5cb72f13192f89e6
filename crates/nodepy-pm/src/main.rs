//! nppm - package manager CLI for the nodepy runtime.

use clap::Parser;
use owo_colors::OwoColorize;

use nodepy_pm::cli::{Cli, Commands};
use nodepy_pm::commands::{self, CommandContext};
use nodepy_pm::error::Result;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = dispatch(&cli) {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::new(cli)?;
    match &cli.command {
        Commands::Bin(args) => commands::misc::bin(args, &ctx),
        Commands::Dirs(args) => commands::misc::dirs(args, &ctx),
        Commands::Dist(args) => commands::dist::run(args, &ctx),
        Commands::Init(args) => commands::init::run(args, &ctx),
        Commands::Install(args) => commands::install::run(args, &ctx),
        Commands::Publish(args) => commands::publish::publish(args, &ctx),
        Commands::Register(args) => commands::publish::register(args, &ctx),
        Commands::Run(args) => commands::run::run(args, &ctx),
        Commands::Uninstall(args) => commands::uninstall::run(args, &ctx),
        Commands::Upload(args) => commands::publish::upload(args, &ctx),
        Commands::Version => commands::misc::version(&ctx),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "nodepy_pm=debug,nodepy_runtime=debug" } else { "nodepy_pm=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
