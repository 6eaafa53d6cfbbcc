//! wp-cli driven site setup.

use super::{ProvisionContext, Step};
use crate::command_runner::{probe, run_checked};
use crate::commands::wp_cli::{WpArgs, WpCommand};
use crate::error::Result;
use crate::stage::ProvisionStage;

fn wp(ctx: &ProvisionContext<'_>, command: WpCommand) -> WpArgs {
    WpArgs::new(
        ctx.config.wp_cli_path.display().to_string(),
        &ctx.config.document_root,
        command,
    )
}

/// Run a read-only wp-cli check; false while wp-cli is not installed yet.
fn wp_probe(ctx: &ProvisionContext<'_>, command: WpCommand) -> Result<bool> {
    if !ctx.config.wp_cli_path.is_file() {
        return Ok(false);
    }
    probe(ctx.runner, &wp(ctx, command))
}

/// `wp core install` with the admin account from the secret bundle.
pub struct InstallCore;

impl Step for InstallCore {
    fn name(&self) -> &'static str {
        "wp-core-install"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::FinalizingApplication
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        wp_probe(ctx, WpCommand::CoreIsInstalled)
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let bundle = ctx.secrets()?;
        let command = WpCommand::CoreInstall {
            url: ctx.metadata()?.site_url(),
            title: ctx.config.site_title.clone(),
            admin_user: bundle.wp_admin_user.clone(),
            admin_email: bundle.wp_admin_email.clone(),
            admin_password: bundle.wp_admin_password.clone(),
        };
        run_checked(ctx.runner, &wp(ctx, command))?;
        Ok(())
    }
}

pub struct ActivateTheme;

impl Step for ActivateTheme {
    fn name(&self) -> &'static str {
        "wp-theme-activate"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::FinalizingApplication
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> Result<bool> {
        wp_probe(ctx, WpCommand::ThemeIsActive(ctx.config.theme.clone()))
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        run_checked(
            ctx.runner,
            &wp(ctx, WpCommand::ThemeInstall(ctx.config.theme.clone())),
        )?;
        Ok(())
    }
}

/// Point `siteurl` and `home` at the instance's public address.
pub struct SetSiteUrl;

impl Step for SetSiteUrl {
    fn name(&self) -> &'static str {
        "wp-site-url"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::FinalizingApplication
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let url = ctx.metadata()?.site_url();
        for key in ["siteurl", "home"] {
            let command = WpCommand::OptionUpdate {
                key: key.to_string(),
                value: url.clone(),
            };
            run_checked(ctx.runner, &wp(ctx, command))?;
        }
        Ok(())
    }
}
