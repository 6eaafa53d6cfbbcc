use super::{ProvisionContext, Step};
use crate::command_runner::run_checked;
use crate::commands::files::{AddToGroupArgs, ChmodTreeArgs, ChownArgs, EntryKind};
use crate::error::Result;
use crate::stage::ProvisionStage;

/// Setgid so new files inherit the web group.
const DIRECTORY_MODE: &str = "2775";
const FILE_MODE: &str = "0664";

/// Hand the document root to the web server identity and let the login user
/// edit it through group membership.
pub struct FixPermissions;

impl Step for FixPermissions {
    fn name(&self) -> &'static str {
        "fix-permissions"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::FixingPermissions
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let config = ctx.config;

        run_checked(
            ctx.runner,
            &AddToGroupArgs {
                user: config.login_user.clone(),
                group: config.web_group.clone(),
            },
        )?;
        run_checked(
            ctx.runner,
            &ChownArgs {
                owner: config.web_user.clone(),
                group: config.web_group.clone(),
                path: config.document_root.clone(),
            },
        )?;
        for (kind, mode) in [
            (EntryKind::Directories, DIRECTORY_MODE),
            (EntryKind::Files, FILE_MODE),
        ] {
            run_checked(
                ctx.runner,
                &ChmodTreeArgs {
                    path: config.document_root.clone(),
                    kind,
                    mode: mode.to_string(),
                },
            )?;
        }
        Ok(())
    }
}
