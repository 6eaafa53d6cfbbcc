//! Provisioning stage machine
//!
//! The `StageTracker` is the single source of truth for how far a run has
//! progressed. Stages only move forward, one at a time, and any non-terminal
//! stage may fail.
//!
//! ```text
//! NotStarted
//!     ↓
//! FetchingMetadata
//!     ↓
//! RetrievingSecrets
//!     ↓
//! ValidatingSecrets
//!     ↓
//! InstallingPackages
//!     ↓
//! BootstrappingDatabase
//!     ↓
//! InstallingArtifacts
//!     ↓
//! FinalizingApplication
//!     ↓
//! FixingPermissions
//!     ↓
//! RestartingServices
//!     ↓
//! Completed
//!
//! (Any stage can transition to Failed)
//! ```

use std::fmt;

use thiserror::Error;

/// Provisioning stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProvisionStage {
    /// Nothing has run yet
    NotStarted = 0,

    /// Region, public hostname and public IP from the instance metadata service
    FetchingMetadata = 1,

    /// Secret bundle download from the secret store
    RetrievingSecrets = 2,

    /// Required secret fields present and well-formed
    ValidatingSecrets = 3,

    /// OS packages installed, web and database services enabled
    InstallingPackages = 4,

    /// Root password set, application database and user created
    BootstrappingDatabase = 5,

    /// WordPress, phpMyAdmin and wp-cli on disk
    InstallingArtifacts = 6,

    /// wp-cli install, theme activation, site URL
    FinalizingApplication = 7,

    /// Ownership and modes for the web server identity
    FixingPermissions = 8,

    /// Final service restart and readiness wait
    RestartingServices = 9,

    /// Run finished successfully (terminal state)
    Completed = 10,

    /// Run aborted (terminal state)
    Failed = 255,
}

impl ProvisionStage {
    /// Returns the numeric order of this stage (0-10, 255 for Failed)
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::FetchingMetadata),
            Self::FetchingMetadata => Some(Self::RetrievingSecrets),
            Self::RetrievingSecrets => Some(Self::ValidatingSecrets),
            Self::ValidatingSecrets => Some(Self::InstallingPackages),
            Self::InstallingPackages => Some(Self::BootstrappingDatabase),
            Self::BootstrappingDatabase => Some(Self::InstallingArtifacts),
            Self::InstallingArtifacts => Some(Self::FinalizingApplication),
            Self::FinalizingApplication => Some(Self::FixingPermissions),
            Self::FixingPermissions => Some(Self::RestartingServices),
            Self::RestartingServices => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::FetchingMetadata => "Fetching instance metadata",
            Self::RetrievingSecrets => "Retrieving secrets",
            Self::ValidatingSecrets => "Validating secrets",
            Self::InstallingPackages => "Installing packages",
            Self::BootstrappingDatabase => "Bootstrapping database",
            Self::InstallingArtifacts => "Installing artifacts",
            Self::FinalizingApplication => "Finalizing application",
            Self::FixingPermissions => "Fixing permissions",
            Self::RestartingServices => "Restarting services",
            Self::Completed => "Provisioning complete",
            Self::Failed => "Provisioning failed",
        }
    }

    /// Returns all stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::FetchingMetadata,
            Self::RetrievingSecrets,
            Self::ValidatingSecrets,
            Self::InstallingPackages,
            Self::BootstrappingDatabase,
            Self::InstallingArtifacts,
            Self::FinalizingApplication,
            Self::FixingPermissions,
            Self::RestartingServices,
            Self::Completed,
        ]
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    /// Attempted to go backwards
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: ProvisionStage,
        to: ProvisionStage,
    },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: ProvisionStage },

    /// Attempted to transition to the same state
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: ProvisionStage },
}

/// Tracks the stage of one provisioning run.
///
/// ```
/// use wpprovision::stage::{ProvisionStage, StageTracker};
///
/// let mut tracker = StageTracker::new();
/// tracker.advance().unwrap();
/// assert_eq!(tracker.current_stage(), ProvisionStage::FetchingMetadata);
///
/// // Cannot skip stages
/// assert!(tracker.transition_to(ProvisionStage::InstallingPackages).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: ProvisionStage,

    /// Stage at which failure occurred (if any)
    failed_at: Option<ProvisionStage>,

    /// Entered stages with unix timestamps
    stage_history: Vec<(ProvisionStage, u64)>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    /// Create a tracker in the NotStarted state.
    pub fn new() -> Self {
        Self {
            current: ProvisionStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(ProvisionStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> ProvisionStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<ProvisionStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == ProvisionStage::Completed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == ProvisionStage::Failed
    }

    /// Returns the stage history as a slice of (stage, timestamp) pairs
    pub fn stage_history(&self) -> &[(ProvisionStage, u64)] {
        &self.stage_history
    }

    /// Advance to the next stage in sequence.
    pub fn advance(&mut self) -> Result<ProvisionStage, StageTransitionError> {
        let Some(next_stage) = self.current.next() else {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        };

        self.record_stage_transition(next_stage);
        self.current = next_stage;

        Ok(next_stage)
    }

    /// Transition to a specific stage, which must be the immediate successor.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if current is a terminal state
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    pub fn transition_to(
        &mut self,
        target: ProvisionStage,
    ) -> Result<ProvisionStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }

        if target == self.current {
            return Err(StageTransitionError::AlreadyAtStage { stage: target });
        }

        // Failed is only reachable through fail()
        if target == ProvisionStage::Failed {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.order() < self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.record_stage_transition(target);
        self.current = target;

        Ok(target)
    }

    /// Mark the run as failed, remembering the stage it failed in.
    pub fn fail(&mut self) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record_stage_transition(ProvisionStage::Failed);
        self.current = ProvisionStage::Failed;

        Ok(())
    }

    fn record_stage_transition(&mut self, stage: ProvisionStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.stage_history.push((stage, timestamp));
    }
}
