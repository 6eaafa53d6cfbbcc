//! Provisioning steps and the runner that drives them.
//!
//! A run is an ordered list of `Step`s, each tagged with the `ProvisionStage`
//! it belongs to. The `Provisioner` walks the list once: it moves the stage
//! tracker forward as steps of later stages come up, asks every step whether
//! its outcome is already in place, and applies it otherwise. The first error
//! marks the run failed and stops it.
//!
//! # Example
//!
//! ```no_run
//! use wpprovision::artifacts::HttpFetcher;
//! use wpprovision::command_runner::SystemRunner;
//! use wpprovision::config::ProvisionConfig;
//! use wpprovision::metadata::ImdsClient;
//! use wpprovision::steps::{ProvisionContext, Provisioner};
//!
//! let config = ProvisionConfig::default();
//! let runner = SystemRunner::new(false);
//! let imds = ImdsClient::new(&config.metadata_endpoint, config.http_timeout()).unwrap();
//! let fetcher = HttpFetcher::new(config.http_timeout()).unwrap();
//!
//! let mut ctx = ProvisionContext::new(&config, &runner, &imds, &fetcher, false);
//! let report = Provisioner::with_default_steps(&config).run(&mut ctx).unwrap();
//! assert!(report.is_complete());
//! ```

pub mod application;
pub mod artifacts;
pub mod database;
pub mod metadata;
pub mod packages;
pub mod permissions;
pub mod secrets;
pub mod services;

use tracing::{error, info, warn};

use crate::artifacts::ArtifactFetcher;
use crate::command_runner::CommandRunner;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::metadata::{InstanceMetadata, MetadataSource};
use crate::secrets::SecretBundle;
use crate::stage::{ProvisionStage, StageTracker};

/// One unit of provisioning work.
pub trait Step {
    /// Short identifier used in logs and `plan` output.
    fn name(&self) -> &'static str;

    fn stage(&self) -> ProvisionStage;

    /// Whether the step's outcome is already present on the host.
    ///
    /// Must not change anything. Steps without a cheap probe keep the default
    /// and always run.
    fn is_satisfied(&self, _ctx: &ProvisionContext<'_>) -> Result<bool> {
        Ok(false)
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()>;
}

/// Everything a step may read or produce during a run.
pub struct ProvisionContext<'a> {
    pub config: &'a ProvisionConfig,
    pub runner: &'a dyn CommandRunner,
    pub metadata_source: &'a dyn MetadataSource,
    pub fetcher: &'a dyn ArtifactFetcher,
    /// Mutating commands, downloads, file writes and readiness waits are skipped
    pub dry_run: bool,

    pub metadata: Option<InstanceMetadata>,
    /// Raw secret string; cleared once parsed
    pub secret_payload: Option<String>,
    pub secrets: Option<SecretBundle>,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        runner: &'a dyn CommandRunner,
        metadata_source: &'a dyn MetadataSource,
        fetcher: &'a dyn ArtifactFetcher,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            runner,
            metadata_source,
            fetcher,
            dry_run,
            metadata: None,
            secret_payload: None,
            secrets: None,
        }
    }

    pub fn metadata(&self) -> Result<&InstanceMetadata> {
        self.metadata
            .as_ref()
            .ok_or(ProvisionError::NotLoaded("instance metadata"))
    }

    pub fn secrets(&self) -> Result<&SecretBundle> {
        self.secrets
            .as_ref()
            .ok_or(ProvisionError::NotLoaded("secret bundle"))
    }

    /// Configured region, else the one reported by the metadata service.
    pub fn region(&self) -> Result<&str> {
        match &self.config.region {
            Some(region) => Ok(region),
            None => Ok(&self.metadata()?.region),
        }
    }
}

/// A line of `plan` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub stage: ProvisionStage,
    pub name: &'static str,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    pub final_stage: ProvisionStage,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.final_stage == ProvisionStage::Completed
    }
}

pub struct Provisioner {
    steps: Vec<Box<dyn Step>>,
    tracker: StageTracker,
    skip_completed: bool,
}

impl Provisioner {
    /// Steps must be ordered by stage; a step of an earlier stage than its
    /// predecessor fails the run with a stage transition error.
    pub fn new(steps: Vec<Box<dyn Step>>, skip_completed: bool) -> Self {
        Self {
            steps,
            tracker: StageTracker::new(),
            skip_completed,
        }
    }

    pub fn with_default_steps(config: &ProvisionConfig) -> Self {
        Self::new(default_steps(), config.skip_completed_steps)
    }

    pub fn plan(&self) -> Vec<PlannedStep> {
        self.steps
            .iter()
            .map(|step| PlannedStep {
                stage: step.stage(),
                name: step.name(),
            })
            .collect()
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    pub fn run(&mut self, ctx: &mut ProvisionContext<'_>) -> Result<RunReport> {
        match self.run_steps(ctx) {
            Ok(report) => Ok(report),
            Err(e) => {
                let stage = self.tracker.current_stage();
                error!(stage = %stage, "provisioning failed: {}", e);
                if let Err(te) = self.tracker.fail() {
                    warn!("could not record failure: {}", te);
                }
                Err(e)
            }
        }
    }

    fn run_steps(&mut self, ctx: &mut ProvisionContext<'_>) -> Result<RunReport> {
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for step in &self.steps {
            let target = step.stage();
            if target.order() < self.tracker.current_stage().order() {
                // Surfaces as BackwardTransition
                self.tracker.transition_to(target)?;
            }
            while self.tracker.current_stage().order() < target.order() {
                let stage = self.tracker.advance()?;
                info!("==> {}", stage);
            }

            if self.skip_completed && step.is_satisfied(ctx)? {
                info!(step = step.name(), "already satisfied, skipping");
                skipped.push(step.name());
                continue;
            }

            info!(step = step.name(), "applying");
            step.apply(ctx)?;
            applied.push(step.name());
        }

        if self.tracker.current_stage().next() == Some(ProvisionStage::Completed) {
            self.tracker.advance()?;
            info!("==> {}", ProvisionStage::Completed);
        }

        Ok(RunReport {
            applied,
            skipped,
            final_stage: self.tracker.current_stage(),
        })
    }
}

/// The full bootstrap, in execution order.
pub fn default_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(metadata::FetchMetadata),
        Box::new(secrets::RetrieveSecrets),
        Box::new(secrets::ValidateSecrets),
        Box::new(packages::InstallPackages),
        Box::new(database::BootstrapDatabase),
        Box::new(artifacts::InstallWordPress),
        Box::new(artifacts::InstallPhpMyAdmin),
        Box::new(artifacts::InstallWpCli),
        Box::new(application::InstallCore),
        Box::new(application::ActivateTheme),
        Box::new(application::SetSiteUrl),
        Box::new(permissions::FixPermissions),
        Box::new(services::RestartServices),
    ]
}

/// Metadata lookup plus secret retrieval and validation, nothing else.
pub fn secret_check_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(metadata::FetchMetadata),
        Box::new(secrets::RetrieveSecrets),
        Box::new(secrets::ValidateSecrets),
    ]
}
