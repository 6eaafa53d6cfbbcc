//! wpprovision - Main entry point
//!
//! Parses the command line, loads configuration, sets up logging and hands
//! control to the step runner. The process exit code is derived from the
//! error that ended the run.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use wpprovision::artifacts::HttpFetcher;
use wpprovision::cli::{Cli, Commands, ConfigArgs};
use wpprovision::command_runner::SystemRunner;
use wpprovision::config::ProvisionConfig;
use wpprovision::error::ProvisionError;
use wpprovision::metadata::ImdsClient;
use wpprovision::process_guard::{self, ProcessGuard};
use wpprovision::sanity;
use wpprovision::steps::{self, ProvisionContext, Provisioner, RunReport, Step};

/// Initialize tracing: human-readable output on stderr and, when `log_file`
/// can be opened, the same events appended to it without colours.
fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("warning: logging to stderr only: {e:#}");
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

/// Exit code for an error: a failed command's own code, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .map_or(1, ProvisionError::exit_code)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = process_guard::init_signal_handlers() {
        // Children are still cleaned up by ProcessGuard on normal exit
        eprintln!("warning: failed to initialize signal handlers: {e}");
    }

    let result = dispatch(cli);

    if let Err(e) = result {
        if tracing::dispatcher::has_been_set() {
            error!("{:#}", e);
        } else {
            eprintln!("error: {e:#}");
        }
        std::process::exit(exit_code(&e));
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let dry_run = cli.dry_run;
    let command = cli.command.unwrap_or(Commands::Run {
        config: ConfigArgs::default(),
        no_skip: false,
        skip_root_check: false,
    });

    match command {
        Commands::Run {
            config,
            no_skip,
            skip_root_check,
        } => {
            let config = load_config(&config)?;
            init_logging(Some(&config.log_file));
            info!(version = env!("CARGO_PKG_VERSION"), dry_run, "wpprovision starting");

            sanity::run_preflight_checks(
                &sanity::required_for_run(config.package_manager),
                skip_root_check || dry_run,
            )?;

            let skip_completed = config.skip_completed_steps && !no_skip;
            let report = provision(&config, steps::default_steps(), skip_completed, dry_run)?;
            info!(
                applied = report.applied.len(),
                skipped = report.skipped.len(),
                "provisioning complete"
            );
            Ok(())
        }
        Commands::CheckSecret { config } => {
            let config = load_config(&config)?;
            init_logging(None);

            sanity::run_preflight_checks(&sanity::required_for_secret_check(), true)?;
            provision(&config, steps::secret_check_steps(), false, dry_run)?;
            println!("Secret `{}` is complete and valid", config.secret_id);
            Ok(())
        }
        Commands::Plan { config } => {
            init_logging(None);
            let config = ProvisionConfig::load_or_default(config.as_deref())?;
            config.validate()?;

            let provisioner = Provisioner::with_default_steps(&config);
            for (i, planned) in provisioner.plan().iter().enumerate() {
                println!("{:>2}. [{}] {}", i + 1, planned.stage, planned.name);
            }
            Ok(())
        }
        Commands::Validate { config } => {
            init_logging(None);
            info!("Validating configuration file: {:?}", config);
            let loaded = ProvisionConfig::load_from_file(&config)?;
            loaded.validate().context("Configuration validation failed")?;
            println!("✓ Configuration file is valid: {}", config.display());
            Ok(())
        }
        Commands::InitConfig { path } => {
            init_logging(None);
            if path.exists() {
                anyhow::bail!("refusing to overwrite existing file {:?}", path);
            }
            ProvisionConfig::default().save_to_file(&path)?;
            println!("✓ Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<ProvisionConfig> {
    let mut config = ProvisionConfig::load_or_default(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Run `steps` against the real host.
fn provision(
    config: &ProvisionConfig,
    steps: Vec<Box<dyn Step>>,
    skip_completed: bool,
    dry_run: bool,
) -> Result<RunReport> {
    let _guard = ProcessGuard::new();

    let runner = SystemRunner::new(dry_run);
    let imds = ImdsClient::new(&config.metadata_endpoint, config.http_timeout())?;
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    let mut ctx = ProvisionContext::new(config, &runner, &imds, &fetcher, dry_run);

    let mut provisioner = Provisioner::new(steps, skip_completed);
    debug!(steps = provisioner.plan().len(), skip_completed, "starting run");
    let report = provisioner.run(&mut ctx)?;

    if !report.skipped.is_empty() {
        info!(skipped = ?report.skipped, "steps already satisfied");
    }
    if report.is_complete() {
        match ctx.metadata() {
            Ok(metadata) => info!("WordPress is available at {}", metadata.site_url()),
            Err(e) => warn!("{}", e),
        }
    }
    Ok(report)
}
