use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ProvisionConfig;

/// wpprovision - bootstrap WordPress on a fresh EC2 instance
#[derive(Parser, Debug)]
#[command(name = "wpprovision")]
#[command(about = "Provision WordPress, MariaDB and phpMyAdmin on an EC2 instance")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Mutating commands (package installs, service changes, SQL statements)
    /// are logged and reported as successful. Read-only probes still execute
    /// so the preview reflects the host. Downloads and file writes are skipped.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Settings shared by every subcommand that talks to AWS.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigArgs {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Secrets Manager secret holding the credential bundle
    #[arg(long)]
    pub secret_id: Option<String>,

    /// AWS region; looked up from instance metadata when omitted
    #[arg(long)]
    pub region: Option<String>,

    /// Log file the run is appended to
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ConfigArgs {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut ProvisionConfig) {
        if let Some(secret_id) = &self.secret_id {
            config.secret_id = secret_id.clone();
        }
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every provisioning step
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Apply every step even when its outcome is already present
        #[arg(long)]
        no_skip: bool,

        /// Skip the root privilege check
        #[arg(long, hide = true)]
        skip_root_check: bool,
    },
    /// Print the ordered steps and their stages without running anything
    Plan {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Fetch and validate the secret bundle, then stop
    CheckSecret {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}
