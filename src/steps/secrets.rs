//! Secret bundle steps.
//!
//! Retrieval and validation are separate stages so a failure report says
//! whether the secret store or the payload was at fault. The raw payload is
//! dropped from the context as soon as it has been parsed.

use tracing::info;

use super::{ProvisionContext, Step};
use crate::error::{ProvisionError, Result};
use crate::secrets::{SecretBundle, fetch_secret_payload};
use crate::stage::ProvisionStage;

pub struct RetrieveSecrets;

impl Step for RetrieveSecrets {
    fn name(&self) -> &'static str {
        "retrieve-secrets"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::RetrievingSecrets
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let payload = fetch_secret_payload(ctx.runner, ctx.region()?, &ctx.config.secret_id)?;
        ctx.secret_payload = Some(payload);
        Ok(())
    }
}

pub struct ValidateSecrets;

impl Step for ValidateSecrets {
    fn name(&self) -> &'static str {
        "validate-secrets"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::ValidatingSecrets
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let payload = ctx
            .secret_payload
            .take()
            .ok_or(ProvisionError::NotLoaded("secret payload"))?;
        let bundle = SecretBundle::from_json(&payload)?;

        info!(
            db_name = %bundle.db_name,
            db_user = %bundle.db_user,
            admin = %bundle.wp_admin_user,
            "secret bundle validated"
        );
        ctx.secrets = Some(bundle);
        Ok(())
    }
}
