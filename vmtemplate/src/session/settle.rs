//! Waiting for the hypervisor to report a stable VM power state.
//!
//! Right after the upstream builder hands the VM over, vSphere can still
//! report it as powered on, and converting it at that point fails. Instead of
//! sleeping a fixed amount of time, poll the power state with exponential
//! backoff until it reads `PoweredOff` or the timeout expires.

use crate::artifact::VmLocator;
use crate::vsphere::{PowerState, VmRef, VsphereClient};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use vmtemplate_shared::errors::{VmTemplateError, VmTemplateResult};

/// Backoff and timeout for [`wait_until_settled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Delay before the second poll.
    pub poll_interval_ms: u64,
    /// Upper bound for the doubled delay.
    pub max_interval_ms: u64,
    /// Give up after this long.
    pub timeout_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_interval_ms: 8_000,
            timeout_ms: 120_000,
        }
    }
}

impl SettlePolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Values that would make the wait spin or never poll.
    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.poll_interval_ms == 0 {
            problems.push("settle.poll_interval_ms must be greater than 0".to_string());
        }
        if self.max_interval_ms < self.poll_interval_ms {
            problems.push(format!(
                "settle.max_interval_ms ({}) must not be below settle.poll_interval_ms ({})",
                self.max_interval_ms, self.poll_interval_ms
            ));
        }
        if self.timeout_ms == 0 {
            problems.push("settle.timeout_ms must be greater than 0".to_string());
        }
        problems
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval())
    }
}

/// Poll until the VM named by `locator` is registered and powered off.
///
/// Returns the VM handle so later steps do not have to look it up again.
/// If the VM never shows up in the inventory the error is `NotFound`;
/// if it shows up but keeps reporting another power state it is `SettleTimeout`.
pub(crate) async fn wait_until_settled(
    client: &dyn VsphereClient,
    locator: &VmLocator,
    policy: &SettlePolicy,
) -> VmTemplateResult<VmRef> {
    let start = Instant::now();
    let deadline = start + policy.timeout();
    let mut interval = policy.poll_interval();
    let mut seen = false;
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let Some(vm) = client.find_vm(locator).await? {
            seen = true;
            let state = client.power_state(&vm).await?;
            if state == PowerState::PoweredOff {
                tracing::info!(
                    vm = %vm,
                    polls,
                    waited_ms = start.elapsed().as_millis(),
                    "Virtual machine settled"
                );
                return Ok(vm);
            }
            tracing::debug!(vm = %vm, state = ?state, "Virtual machine not settled yet");
        } else {
            tracing::debug!(locator = %locator, "Virtual machine not in inventory yet");
        }

        let now = Instant::now();
        if now >= deadline {
            let waited_ms = start.elapsed().as_millis();
            return Err(if seen {
                VmTemplateError::SettleTimeout {
                    vm: locator.to_string(),
                    waited_ms,
                }
            } else {
                VmTemplateError::NotFound(format!("virtual machine {}", locator))
            });
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = policy.next_interval(interval);
    }
}
