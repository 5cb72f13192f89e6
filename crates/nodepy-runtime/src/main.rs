// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! nodepy CLI - resolve a request and execute it as the main module.

use clap::Parser;
use nodepy_runtime::{
    Context, RequireOptions, RuntimeError, VPath, VERSION,
};
use nodepy_script::Value;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "nodepy",
    about = "Module runtime with Node.js-style require semantics",
    disable_version_flag = true
)]
struct Cli {
    /// Request to resolve and execute, followed by script arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    arguments: Vec<String>,

    /// Enter the post-mortem debugger on an uncaught error
    #[arg(short = 'd', long)]
    debug: bool,

    /// Evaluate an expression instead of executing a request
    #[arg(short = 'c', long = "exec", value_name = "EXPR")]
    exec: Option<String>,

    /// Directory the initial request is resolved in
    #[arg(long = "current-dir", value_name = "DIR", default_value = ".")]
    current_dir: PathBuf,

    /// Print the runtime version and exit
    #[arg(long)]
    version: bool,

    /// Do not overwrite argv[0] with the main module's filename
    #[arg(long = "keep-arg0")]
    keep_arg0: bool,

    /// Modules to load before the main module
    #[arg(short = 'P', long = "preload", value_name = "MODULE")]
    preload: Vec<String>,

    /// Loader id overriding suffix-based detection
    #[arg(short = 'L', long = "loader", value_name = "LOADER")]
    loader: Option<String>,

    /// Expose the main module under the name `__main__`
    #[arg(long)]
    pymain: bool,

    /// Write profiling data to a file
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Isolate session state; entering and leaving restores it
    #[arg(long)]
    isolated: bool,
}

fn main() {
    let cli = Cli::parse();

    let debug_env = std::env::var("NODEPY_DEBUG").map_or(false, |v| v == "true");
    init_tracing(debug_env);

    if cli.version {
        println!("nodepy {}", VERSION);
        std::process::exit(0);
    }

    let post_mortem = cli.debug || debug_env || consume_pmd_env();

    let started = Instant::now();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(&cli)));
    if let Some(profile) = &cli.profile {
        write_profile(profile, started);
    }

    match outcome {
        Ok(Ok(())) => std::process::exit(0),
        Ok(Err(err)) => {
            report_error(&err);
            if post_mortem {
                enter_post_mortem(&cli, &err);
            }
            std::process::exit(1);
        }
        // An error kind unknown to the runtime.
        Err(_) => std::process::exit(127),
    }
}

fn run(cli: &Cli) -> Result<(), RuntimeError> {
    let current_dir = VPath::Fs(cli.current_dir.clone()).resolve(false)?;
    let ctx = Context::new(current_dir.clone(), cli.isolated);
    let guard = ctx.enter();
    let ctx = guard.context();
    if cli.pymain {
        ctx.set_option("pymain", Value::Bool(true));
    }

    let require = ctx.require();
    for request in &cli.preload {
        require.require(request)?;
    }

    if let Some(expr) = &cli.exec {
        return eval_expression(ctx, expr);
    }

    let mut arguments = cli.arguments.clone();
    if arguments.is_empty() {
        eprintln!("usage: nodepy [flags] [REQUEST | -c EXPR] [args...]");
        eprintln!("(the interactive console is provided by a separate tool)");
        return Ok(());
    }
    let request = arguments.remove(0);

    let outcome = require.call(
        &request,
        RequireOptions {
            current_dir: Some(current_dir),
            is_main: true,
            exec: false,
            exports: false,
            loader: cli.loader.clone(),
            ..RequireOptions::default()
        },
    )?;
    let module = outcome.into_module().ok_or_else(|| {
        RuntimeError::load(request.clone(), "main request did not produce a module")
    })?;

    // Make the script arguments visible to the main module.
    let arg0 = if cli.keep_arg0 {
        std::env::args().next().unwrap_or_else(|| "nodepy".into())
    } else {
        module.borrow().filename.to_string()
    };
    let mut argv = vec![Value::Str(arg0)];
    argv.extend(arguments.iter().map(|a| Value::Str(a.clone())));
    module.borrow().namespace.borrow_mut().insert(
        "argv".into(),
        Value::Array(Rc::new(std::cell::RefCell::new(argv))),
    );

    ctx.exec_module(&module)
}

/// Evaluate a `-c EXPR` program against the context's own namespace.
fn eval_expression(ctx: &Rc<Context>, expr: &str) -> Result<(), RuntimeError> {
    use nodepy_script::Host;

    struct CliHost {
        require: Rc<nodepy_runtime::Require>,
    }

    impl Host for CliHost {
        fn require(&self, request: &str) -> nodepy_script::Result<Value> {
            self.require.require(request).map_err(|err| {
                nodepy_script::ScriptError::Host { line: 0, source: Box::new(err) }
            })
        }

        fn require_resolve(&self, request: &str) -> nodepy_script::Result<Value> {
            self.require
                .resolve(request)
                .map(|path| Value::Str(path.to_string()))
                .map_err(|err| nodepy_script::ScriptError::Host {
                    line: 0,
                    source: Box::new(err),
                })
        }

        fn require_star(
            &self,
            request: &str,
            into: &nodepy_script::ScopeRef,
        ) -> nodepy_script::Result<()> {
            self.require.star(request, into, None).map_err(|err| {
                nodepy_script::ScriptError::Host { line: 0, source: Box::new(err) }
            })
        }
    }

    let program = nodepy_script::parse(expr)?;
    let scope = nodepy_script::new_scope();
    let host = CliHost { require: ctx.require() };
    nodepy_script::execute(&program, &scope, &host)?;
    Ok(())
}

/// `NODEPY_PMD`: an integer value is decremented and propagated to child
/// processes, enabling post-mortem mode when it reaches zero; any other
/// non-empty value enables it directly.
fn consume_pmd_env() -> bool {
    let Ok(value) = std::env::var("NODEPY_PMD") else {
        return false;
    };
    if value.is_empty() {
        return false;
    }
    match value.parse::<i64>() {
        Ok(n) if n > 1 => {
            std::env::set_var("NODEPY_PMD", (n - 1).to_string());
            false
        }
        Ok(n) if n == 1 => {
            std::env::remove_var("NODEPY_PMD");
            true
        }
        Ok(_) => false,
        Err(_) => true,
    }
}

fn report_error(err: &RuntimeError) {
    eprintln!("{} {}", "error:".red().bold(), err);
    if let RuntimeError::Resolve { searched, .. } = err {
        if !searched.is_empty() {
            eprintln!("  searched in:");
            for location in searched {
                eprintln!("    - {}", location.dimmed());
            }
        }
    }
}

/// Post-mortem hook: `NODEPY_BREAKPOINT` selects the debugger module
/// (`0` disables, empty means none is configured).
fn enter_post_mortem(cli: &Cli, err: &RuntimeError) {
    let selector = std::env::var("NODEPY_BREAKPOINT").unwrap_or_default();
    if selector == "0" {
        return;
    }
    if selector.is_empty() {
        eprintln!(
            "{}",
            "post-mortem: no debugger configured (set NODEPY_BREAKPOINT)".dimmed()
        );
        return;
    }
    let current_dir = VPath::Fs(cli.current_dir.clone());
    let ctx = Context::new(current_dir, true);
    let guard = ctx.enter();
    if let Err(debugger_err) = guard.context().require().require(&selector) {
        eprintln!(
            "{} failed to load debugger '{}': {}",
            "post-mortem:".dimmed(),
            selector,
            debugger_err
        );
    } else {
        eprintln!("{} {}", "post-mortem:".dimmed(), err);
    }
}

fn write_profile(path: &PathBuf, started: Instant) {
    let elapsed = started.elapsed();
    let report = format!("elapsed_us {}\n", elapsed.as_micros());
    if let Err(err) = std::fs::write(path, report) {
        eprintln!("warning: could not write profile: {}", err);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "nodepy_runtime=debug" } else { "nodepy_runtime=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
