use super::{ProvisionContext, Step};
use crate::command_runner::{probe, run_checked};
use crate::commands::packages::{InstallPackagesArgs, QueryPackagesArgs};
use crate::commands::systemctl::{ServiceAction, SystemctlArgs};
use crate::error::Result;
use crate::stage::ProvisionStage;

/// Install the OS packages and enable the web and database services.
pub struct InstallPackages;

impl Step for InstallPackages {
    fn name(&self) -> &'static str {
        "install-packages"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::InstallingPackages
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        let installed = probe(
            ctx.runner,
            &QueryPackagesArgs {
                packages: ctx.config.packages.clone(),
            },
        )?;
        if !installed {
            return Ok(false);
        }

        for service in [&ctx.config.web_service, &ctx.config.db_service] {
            let enabled = SystemctlArgs::new(ServiceAction::IsEnabled, &[service.as_str()]);
            if !probe(ctx.runner, &enabled)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        run_checked(
            ctx.runner,
            &InstallPackagesArgs {
                manager: ctx.config.package_manager,
                packages: ctx.config.packages.clone(),
            },
        )?;
        run_checked(
            ctx.runner,
            &SystemctlArgs::new(
                ServiceAction::EnableNow,
                &[ctx.config.web_service.as_str(), ctx.config.db_service.as_str()],
            ),
        )?;
        Ok(())
    }
}
