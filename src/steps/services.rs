use tracing::info;

use super::{ProvisionContext, Step};
use crate::command_runner::{probe, run_checked};
use crate::commands::mysql::MysqladminPingArgs;
use crate::commands::systemctl::{ServiceAction, SystemctlArgs};
use crate::error::Result;
use crate::readiness::wait_until;
use crate::stage::ProvisionStage;

/// Restart both services and wait until they answer.
pub struct RestartServices;

impl Step for RestartServices {
    fn name(&self) -> &'static str {
        "restart-services"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::RestartingServices
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let config = ctx.config;
        let runner = ctx.runner;
        let services = [config.web_service.as_str(), config.db_service.as_str()];

        run_checked(runner, &SystemctlArgs::new(ServiceAction::Restart, &services))?;

        if ctx.dry_run {
            info!("[DRY RUN] Skipped readiness waits");
            return Ok(());
        }

        let policy = config.readiness_policy();
        for service in services {
            wait_until(service, policy, || {
                probe(runner, &SystemctlArgs::new(ServiceAction::IsActive, &[service]))
            })?;
        }
        wait_until("database connections", policy, || {
            probe(runner, &MysqladminPingArgs)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::CommandOutput;
    use crate::config::ProvisionConfig;
    use crate::error::ProvisionError;
    use crate::steps::test_support::*;

    #[test]
    fn test_restart_then_wait() {
        let config = ProvisionConfig::default();
        let runner = FakeRunner::succeeding();
        let mut ctx = ProvisionContext::new(&config, &runner, &FixedMetadata, &NoFetch, false);

        RestartServices.apply(&mut ctx).unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl restart httpd mariadb",
                "systemctl is-active --quiet httpd",
                "systemctl is-active --quiet mariadb",
                "mysqladmin ping --silent",
            ]
        );
    }

    #[test]
    fn test_web_server_never_active() {
        let config = ProvisionConfig {
            readiness_timeout_secs: 1,
            readiness_interval_ms: 250,
            ..ProvisionConfig::default()
        };
        let runner = FakeRunner::new(|inv| {
            if inv.args.first().map(String::as_str) == Some("is-active") {
                CommandOutput::failed(3, "")
            } else {
                CommandOutput::succeeded("")
            }
        });
        let mut ctx = ProvisionContext::new(&config, &runner, &FixedMetadata, &NoFetch, false);

        let err = RestartServices.apply(&mut ctx).unwrap_err();
        match err {
            ProvisionError::Readiness { probe, .. } => assert_eq!(probe, "httpd"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
