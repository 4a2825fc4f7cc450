//! iniq - main entry point.
//!
//! Wires the CLI to the feature pipeline: parse flags, overlay the optional
//! config file, detect the host OS, then hand the registry to the
//! orchestrator and exit with its verdict.

use std::process::ExitCode;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use iniq::cli::Cli;
use iniq::keys::HttpKeyFetcher;
use iniq::orchestrator::Orchestrator;
use iniq::osinfo::OsInfo;
use iniq::prompt::{Prompter, ScriptedPrompter, StdinPrompter};
use iniq::runner::CommandRunner;
use iniq::Registry;

/// Initialize tracing with RUST_LOG override support.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse_args();
    let config_path = cli.config.clone();
    let mut options = cli.into_options();

    if let Some(path) = config_path {
        if let Err(e) = options.apply_config_file(&path) {
            error!("cannot load config file {}: {}", path.display(), e);
            return ExitCode::from(1);
        }
        info!(config = %path.display(), "applied config file defaults");
    }
    options.finalize();
    debug!(?options, "resolved run options");

    let os = match OsInfo::detect() {
        Ok(os) => os,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    info!(distro = %os.name, family = %os.family, "detected host");

    if options.dry_run {
        info!("dry-run mode: no changes will be made");
    }

    let runner = CommandRunner::new(options.dry_run);
    let fetcher = match HttpKeyFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("cannot initialize key fetcher: {}", e);
            return ExitCode::from(1);
        }
    };

    // `--yes` answers every prompt with its default instead of blocking on
    // stdin; everything else shares the same code path.
    let mut prompter: Box<dyn Prompter> = if options.interactive {
        Box::new(StdinPrompter)
    } else {
        Box::new(ScriptedPrompter::new())
    };

    let registry = Registry::with_default_features();
    let orchestrator = Orchestrator::new(&os, &runner, &fetcher);
    let report = orchestrator.run(&registry, &mut options, prompter.as_mut());

    print!("{}", report.summary());
    ExitCode::from(report.exit_code() as u8)
}
