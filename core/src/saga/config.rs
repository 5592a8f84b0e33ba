// sagaflow/src/saga/config.rs

use std::time::Duration;

/// What the engine does when a compensating action reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationPolicy {
  /// Record the failure and keep unwinding toward the first step.
  #[default]
  Continue,
  /// Re-run the compensation up to `max_attempts` times in total, sleeping `backoff`
  /// between attempts. If every attempt fails the failure is recorded and unwinding continues.
  Retry { max_attempts: u32, backoff: Duration },
  /// Record the failure and stop unwinding. The instance terminates with
  /// `SagaOutcome::CompensationAborted` so the caller can dead-letter it.
  Abort,
}

impl CompensationPolicy {
  pub(crate) fn max_attempts(&self) -> u32 {
    match self {
      CompensationPolicy::Retry { max_attempts, .. } => (*max_attempts).max(1),
      CompensationPolicy::Continue | CompensationPolicy::Abort => 1,
    }
  }

  pub(crate) fn backoff(&self) -> Duration {
    match self {
      CompensationPolicy::Retry { backoff, .. } => *backoff,
      CompensationPolicy::Continue | CompensationPolicy::Abort => Duration::ZERO,
    }
  }
}

/// Execution settings shared by every instance of one definition.
#[derive(Debug, Clone, Default)]
pub struct SagaConfig {
  /// Deadline applied to each forward and compensating action. `None` lets a
  /// stalled action block its instance indefinitely.
  pub step_timeout: Option<Duration>,
  pub compensation_policy: CompensationPolicy,
}
