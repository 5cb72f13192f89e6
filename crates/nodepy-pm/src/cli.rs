//! CLI argument parsing for nppm.

use clap::{Args, Parser, Subcommand};

/// nppm - package manager for the nodepy runtime
#[derive(Parser, Debug)]
#[command(name = "nppm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Registry name from the configuration file
    #[arg(long, global = true, value_name = "NAME")]
    pub registry: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the executable shim directory
    Bin(LocationArgs),

    /// Print the install directories
    Dirs(LocationArgs),

    /// Build the package archive into dist/
    Dist(DistArgs),

    /// Create a nodepy.json manifest
    Init(InitArgs),

    /// Install packages or the current package's dependencies
    #[command(alias = "i")]
    Install(InstallArgs),

    /// Build and upload the current package
    Publish(PublishArgs),

    /// Create a registry account
    Register(RegisterArgs),

    /// Run a script from the manifest
    Run(RunArgs),

    /// Uninstall packages
    #[command(alias = "rm")]
    Uninstall(UninstallArgs),

    /// Upload an existing archive to the registry
    Upload(UploadArgs),

    /// Print the current package's version
    Version,
}

#[derive(Args, Debug, Default, Clone)]
pub struct LocationArgs {
    /// Use the per-user location
    #[arg(short, long)]
    pub global: bool,

    /// Use the system prefix location
    #[arg(long)]
    pub root: bool,

    /// Include the host-installer bin directory
    #[arg(long)]
    pub pip: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct InstallArgs {
    /// Install targets: <pkg>[@<selector>], ./path, <file>.tar.gz,
    /// git+<url>[@<ref>], py/<host-pkg>[==ver]. Empty installs the
    /// current package's dependencies.
    #[arg(value_name = "TARGET")]
    pub packages: Vec<String>,

    /// Install path targets as links (develop mode)
    #[arg(short = 'e', long)]
    pub develop: bool,

    /// Also install dev dependencies
    #[arg(long)]
    pub dev: bool,

    /// Only install production dependencies
    #[arg(long)]
    pub production: bool,

    /// Save installed packages under "dependencies"
    #[arg(long)]
    pub save: bool,

    /// Save installed packages under "dev-dependencies"
    #[arg(long)]
    pub save_dev: bool,

    /// Save installed packages under "extensions"
    #[arg(long)]
    pub save_ext: bool,

    /// Install into the per-user location
    #[arg(short, long)]
    pub global: bool,

    /// Install into the system prefix
    #[arg(long)]
    pub root: bool,

    /// Replace already-installed packages
    #[arg(short = 'U', long)]
    pub upgrade: bool,

    /// Re-place packages even when satisfied
    #[arg(long)]
    pub ignore_installed: bool,

    /// Re-evaluate dependency subtrees of satisfied packages
    #[arg(long)]
    pub recursive: bool,

    /// Run pip as a separate python process
    #[arg(long)]
    pub pip_separate_process: bool,

    /// Hide download progress
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UninstallArgs {
    /// Package names to remove
    #[arg(required = true)]
    pub packages: Vec<String>,

    /// Uninstall from the per-user location
    #[arg(short, long)]
    pub global: bool,

    /// Uninstall from the system prefix
    #[arg(long)]
    pub root: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Package name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Overwrite an existing manifest
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DistArgs {
    /// Output directory (defaults to dist/)
    #[arg(long, value_name = "DIR")]
    pub dest: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Skip the upload, only run hooks and build the archive
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub password: String,

    #[arg(long)]
    pub email: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Script name from the manifest's "scripts" map
    pub script: String,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Archive to upload (defaults to the current package's dist file)
    #[arg(value_name = "FILE")]
    pub file: Option<String>,
}
