use tracing::info;

use super::{ProvisionContext, Step};
use crate::error::Result;
use crate::stage::ProvisionStage;

/// Region and public address from the instance metadata service.
pub struct FetchMetadata;

impl Step for FetchMetadata {
    fn name(&self) -> &'static str {
        "fetch-metadata"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::FetchingMetadata
    }

    fn apply(&self, ctx: &mut ProvisionContext<'_>) -> Result<()> {
        let metadata = ctx.metadata_source.fetch(ctx.config.region.as_deref())?;
        info!(url = %metadata.site_url(), "site address resolved");
        ctx.metadata = Some(metadata);
        Ok(())
    }
}
