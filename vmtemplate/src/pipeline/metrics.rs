use crate::pipeline::StepAction;

#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub index: usize,
    pub name: String,
    pub duration_ms: u128,
    /// `None` when the step failed.
    pub action: Option<StepAction>,
}

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub total_duration_ms: u128,
    pub steps: Vec<StepMetrics>,
}

impl RunMetrics {
    /// Names of the steps that ran, in execution order.
    pub fn executed(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }
}
