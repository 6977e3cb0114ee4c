//! Template finalization stage.
//!
//! Takes the artifact produced by an earlier build stage, connects to the
//! vSphere endpoint, waits for the VM to settle and runs the fixed step plan:
//!
//! ```text
//! choose_datacenter → create_folder → create_snapshot → mark_as_template
//! ```

mod context;
pub mod steps;

pub use context::TemplateContext;

use crate::artifact::{Artifact, ArtifactGate, ProducerRegistry, VmLocator};
use crate::config::TemplateConfig;
use crate::pipeline::{ExecutionPlan, PauseHook, RunReport, StepRunner};
use crate::session::{Session, SessionManager};
use crate::vsphere::{Endpoint, VsphereConnector};
use std::sync::Arc;
use steps::{ChooseDatacenterStep, CreateFolderStep, CreateSnapshotStep, MarkAsTemplateStep};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Build the step plan for `config`.
///
/// The order is fixed; each step relies on what its predecessors stored in
/// the context.
pub fn execution_plan(config: &TemplateConfig) -> ExecutionPlan<TemplateContext> {
    ExecutionPlan::new(vec![
        Box::new(ChooseDatacenterStep {
            datacenter: config.datacenter().map(str::to_string),
        }),
        Box::new(CreateFolderStep {
            folder: config.folder().map(str::to_string),
        }),
        Box::new(CreateSnapshotStep {
            enabled: config.snapshot_enable,
            name: config.snapshot_name.clone(),
            description: config.snapshot_description.clone(),
        }),
        Box::new(MarkAsTemplateStep {
            reregister: config.reregister,
        }),
    ])
}

/// Result of a successful invocation.
#[derive(Debug)]
pub struct PostProcessOutput {
    /// The input artifact, now marked as a template.
    pub artifact: Artifact,
    /// Keep the input artifact instead of deleting it.
    pub keep: bool,
    /// Keep it even if the user asked otherwise.
    pub force_override: bool,
    pub report: RunReport,
    /// Logout failure after an otherwise successful run.
    pub session_close_error: Option<VmTemplateError>,
}

/// Converts artifacts from supported builders into vSphere templates.
pub struct PostProcessor {
    config: TemplateConfig,
    endpoint: Endpoint,
    gate: ArtifactGate,
    sessions: SessionManager,
    pause: Option<Arc<dyn PauseHook>>,
}

impl PostProcessor {
    /// Validate `config` and prepare the stage. Nothing remote happens here.
    pub fn new(
        config: TemplateConfig,
        connector: Arc<dyn VsphereConnector>,
    ) -> VmTemplateResult<Self> {
        let endpoint = config.validate()?;
        let sessions = SessionManager::new(connector, config.settle);

        Ok(Self {
            config,
            endpoint,
            gate: ArtifactGate::default(),
            sessions,
            pause: None,
        })
    }

    pub fn with_registry(mut self, registry: ProducerRegistry) -> Self {
        self.gate = ArtifactGate::new(registry);
        self
    }

    pub fn with_pause(mut self, hook: Arc<dyn PauseHook>) -> Self {
        self.pause = Some(hook);
        self
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Turn the VM behind `artifact` into a template.
    ///
    /// Unsupported artifacts are rejected before any connection is opened.
    /// Once a session exists it is logged out exactly once, whatever the
    /// outcome. A logout failure after a successful run is returned in
    /// [`PostProcessOutput::session_close_error`]; after a failed run it is
    /// only logged and the run's own error is returned. Triggering `cancel`
    /// stops the run at the next step boundary (or interrupts the settle
    /// wait).
    pub async fn post_process(
        &self,
        artifact: Artifact,
        cancel: CancellationToken,
    ) -> VmTemplateResult<PostProcessOutput> {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "post_process",
            %invocation_id,
            artifact = %artifact.id()
        );
        self.execute(invocation_id, artifact, cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        invocation_id: Uuid,
        artifact: Artifact,
        cancel: CancellationToken,
    ) -> VmTemplateResult<PostProcessOutput> {
        let kind = self
            .gate
            .validate(&artifact)
            .inspect_err(|e| tracing::warn!("Artifact rejected: {}", e))?;
        let locator = VmLocator::from_artifact(&artifact, kind)?;

        if cancel.is_cancelled() {
            return Err(VmTemplateError::Cancelled);
        }

        let session = self.sessions.connect(&self.endpoint).await?;
        let result = self
            .run_in_session(&session, invocation_id, artifact, locator, &cancel)
            .await;

        let session_close_error = match session.close().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    run_failed = result.is_err(),
                    "Failed to log out of vSphere"
                );
                Some(e)
            }
        };

        let mut output = result?;
        output.session_close_error = session_close_error;
        Ok(output)
    }

    async fn run_in_session(
        &self,
        session: &Session,
        invocation_id: Uuid,
        artifact: Artifact,
        locator: VmLocator,
        cancel: &CancellationToken,
    ) -> VmTemplateResult<PostProcessOutput> {
        let vm = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Cancelled while waiting for the VM to settle");
                return Err(VmTemplateError::Cancelled);
            }
            vm = self.sessions.wait_until_settled(session, &locator) => vm?,
        };

        let mut ctx = TemplateContext::new(invocation_id, session.client(), artifact, locator, vm);

        let mut runner = StepRunner::from_plan(execution_plan(&self.config))
            .with_cancellation(cancel.clone());
        if let Some(pause) = &self.pause {
            runner = runner.with_pause(Arc::clone(pause));
        }

        let report = runner.run(&mut ctx).await;
        tracing::info!(
            outcome = ?report.outcome,
            duration_ms = report.metrics.total_duration_ms,
            "Template steps finished"
        );

        if let Some(error) = ctx.error.take() {
            return Err(error);
        }

        Ok(PostProcessOutput {
            artifact: ctx.artifact,
            keep: true,
            force_override: true,
            report,
            session_close_error: None,
        })
    }
}
