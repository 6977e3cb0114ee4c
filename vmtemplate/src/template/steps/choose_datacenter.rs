//! Step: Choose datacenter - resolve the datacenter later steps work in.
//!
//! A configured name must exist. Without one the endpoint must have exactly
//! one datacenter; anything else needs explicit disambiguation.

use super::{log_step_error, step_start};
use crate::pipeline::{PipelineStep, StepAction};
use crate::template::TemplateContext;
use crate::vsphere::{DatacenterRef, VsphereClient};
use async_trait::async_trait;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

pub struct ChooseDatacenterStep {
    pub datacenter: Option<String>,
}

#[async_trait]
impl PipelineStep<TemplateContext> for ChooseDatacenterStep {
    async fn run(&self, ctx: &mut TemplateContext) -> VmTemplateResult<StepAction> {
        let step_name = self.name();
        step_start(ctx, step_name);

        let datacenter = resolve_datacenter(ctx.client.as_ref(), self.datacenter.as_deref())
            .await
            .inspect_err(|e| log_step_error(ctx, step_name, e))?;

        tracing::info!(datacenter = %datacenter.name, "Using datacenter");
        ctx.datacenter = Some(datacenter);

        Ok(StepAction::Continue)
    }

    fn name(&self) -> &str {
        "choose_datacenter"
    }
}

async fn resolve_datacenter(
    client: &dyn VsphereClient,
    name: Option<&str>,
) -> VmTemplateResult<DatacenterRef> {
    if let Some(name) = name {
        return client
            .find_datacenter(name)
            .await?
            .ok_or_else(|| VmTemplateError::NotFound(format!("datacenter '{}'", name)));
    }

    let mut datacenters = client.datacenters().await?;
    match datacenters.len() {
        0 => Err(VmTemplateError::NotFound("no datacenter on the endpoint".into())),
        1 => Ok(datacenters.remove(0)),
        _ => Err(VmTemplateError::AmbiguousDatacenter(
            datacenters.into_iter().map(|dc| dc.name).collect(),
        )),
    }
}
