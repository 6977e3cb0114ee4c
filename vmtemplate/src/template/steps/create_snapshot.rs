//! Step: Create snapshot - optionally snapshot the VM before conversion.

use super::{log_step_error, remote_detail, step_start};
use crate::pipeline::{PipelineStep, StepAction};
use crate::template::TemplateContext;
use crate::vsphere::SnapshotSpec;
use async_trait::async_trait;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

pub struct CreateSnapshotStep {
    pub enabled: bool,
    pub name: String,
    pub description: String,
}

#[async_trait]
impl PipelineStep<TemplateContext> for CreateSnapshotStep {
    async fn run(&self, ctx: &mut TemplateContext) -> VmTemplateResult<StepAction> {
        let step_name = self.name();
        step_start(ctx, step_name);

        if !self.enabled {
            tracing::debug!("Snapshot disabled, skipping");
            return Ok(StepAction::Continue);
        }

        let vm = ctx.vm.clone();

        // Powered-off VM: no memory, nothing to quiesce.
        let spec = SnapshotSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            memory: false,
            quiesce: false,
        };
        ctx.client
            .create_snapshot(&vm, &spec)
            .await
            .map_err(|e| VmTemplateError::Snapshot(remote_detail(e)))
            .inspect_err(|e| log_step_error(ctx, step_name, e))?;

        tracing::info!(vm = %vm, snapshot = %spec.name, "Created snapshot");
        ctx.snapshot = Some(spec.name);

        Ok(StepAction::Continue)
    }

    async fn cleanup(&self, ctx: &mut TemplateContext) {
        if ctx.error.is_some()
            && let Some(snapshot) = &ctx.snapshot
        {
            tracing::warn!(snapshot = %snapshot, "Run failed, snapshot is left on the VM");
        }
    }

    fn name(&self) -> &str {
        "create_snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::steps::test_support::context;
    use crate::vsphere::fake::{FakeOp, FakeVsphere, RemoteCall};

    fn enabled_step() -> CreateSnapshotStep {
        CreateSnapshotStep {
            enabled: true,
            name: "golden".into(),
            description: "before templating".into(),
        }
    }

    #[tokio::test]
    async fn test_disabled_makes_no_remote_call() {
        let fake = FakeVsphere::new().with_datacenter("dc1").with_vm("dc1", "", "vm1");
        let mut ctx = context(&fake);

        let step = CreateSnapshotStep {
            enabled: false,
            name: String::new(),
            description: String::new(),
        };
        assert_eq!(step.run(&mut ctx).await.unwrap(), StepAction::Continue);

        assert!(fake.calls().is_empty());
        assert!(ctx.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_enabled_creates_named_snapshot() {
        let fake = FakeVsphere::new().with_datacenter("dc1").with_vm("dc1", "", "vm1");
        let mut ctx = context(&fake);

        enabled_step().run(&mut ctx).await.unwrap();

        assert_eq!(fake.snapshots_of("vm1"), vec!["golden".to_string()]);
        assert_eq!(ctx.snapshot.as_deref(), Some("golden"));
        let spec = fake.calls().into_iter().find_map(|c| match c {
            RemoteCall::CreateSnapshot { spec, .. } => Some(spec),
            _ => None,
        });
        let spec = spec.unwrap();
        assert_eq!(spec.description, "before templating");
        assert!(!spec.memory);
        assert!(!spec.quiesce);
    }

    #[tokio::test]
    async fn test_stale_vm_handle_is_snapshot_error() {
        let fake = FakeVsphere::new().with_datacenter("dc1");
        let mut ctx = context(&fake);

        let err = enabled_step().run(&mut ctx).await.unwrap_err();

        assert!(matches!(err, VmTemplateError::Snapshot(_)));
        assert!(ctx.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_is_snapshot_error() {
        let fake = FakeVsphere::new()
            .with_datacenter("dc1")
            .with_vm("dc1", "", "vm1")
            .fail_on(FakeOp::CreateSnapshot);
        let mut ctx = context(&fake);

        let err = enabled_step().run(&mut ctx).await.unwrap_err();
        assert_eq!(
            err,
            VmTemplateError::Snapshot("injected CreateSnapshot failure".into())
        );
        assert!(ctx.snapshot.is_none());
    }
}
