//! wpprovision library
//!
//! Bootstraps a single-host WordPress stack (Apache, PHP, MariaDB,
//! phpMyAdmin, wp-cli) on a freshly launched EC2 instance. Credentials come
//! from one Secrets Manager bundle; every external program is driven through
//! typed command structs and a `CommandRunner`.

pub mod artifacts;
pub mod cli;
pub mod command_args;
pub mod command_runner;
pub mod commands;
pub mod config;
pub mod error;
pub mod metadata;
pub mod process_guard;
pub mod readiness;
pub mod sanity;
pub mod secrets;
pub mod stage;
pub mod steps;
pub mod wpconfig;

// Re-export main types for convenience
pub use command_args::CommandArgs;
pub use command_runner::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use config::ProvisionConfig;
pub use error::ProvisionError;
pub use metadata::{InstanceMetadata, MetadataSource};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use secrets::SecretBundle;
pub use stage::{ProvisionStage, StageTracker, StageTransitionError};
pub use steps::{ProvisionContext, Provisioner, RunReport, Step};
