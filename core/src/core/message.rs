// sagaflow/src/core/message.rs

//! Saga instance identity and the transition message that travels through the dispatch queue.

use crate::core::payload::Payload;
use crate::core::state::SagaState;
use crate::error::{CompensationError, StepFailure};
use crate::saga::engine::SagaReport;
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Unique identifier of one saga instance, assigned by `SagaEngine::start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SagaId(Uuid);

impl SagaId {
  pub(crate) fn new() -> Self {
    Self(Uuid::new_v4())
  }

  pub fn as_uuid(&self) -> &Uuid {
    &self.0
  }
}

impl fmt::Display for SagaId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Bookkeeping that follows an instance across transitions until it reaches a terminal.
pub(crate) struct Journey<E: std::error::Error + 'static> {
  pub(crate) failure: Option<StepFailure<E>>,
  pub(crate) compensation_errors: Vec<CompensationError<E>>,
  pub(crate) history: Vec<SagaState>,
  /// Set when a compensation failed under `CompensationPolicy::Abort`.
  pub(crate) aborted_at: Option<usize>,
  pub(crate) completion: oneshot::Sender<SagaReport<E>>,
}

/// `{payload, state}`: the unit placed on the dispatch queue.
///
/// Produced by `start` or by the task that just ran a step, consumed only by the
/// dispatch loop. Messages are moved, never cloned, so exactly one message per
/// instance exists at any time.
pub(crate) struct SagaMessage<P: Send + Sync + 'static, E: std::error::Error + 'static> {
  pub(crate) id: SagaId,
  pub(crate) payload: Payload<P>,
  pub(crate) state: SagaState,
  pub(crate) journey: Journey<E>,
}

impl<P: Send + Sync + 'static, E: std::error::Error + 'static> SagaMessage<P, E> {
  pub(crate) fn initial(id: SagaId, payload: Payload<P>, completion: oneshot::Sender<SagaReport<E>>) -> Self {
    Self {
      id,
      payload,
      state: SagaState::initial(),
      journey: Journey {
        failure: None,
        compensation_errors: Vec::new(),
        history: Vec::new(),
        aborted_at: None,
        completion,
      },
    }
  }

  /// The same instance moved to `state`.
  pub(crate) fn transition(self, state: SagaState) -> Self {
    Self { state, ..self }
  }
}
