// sagaflow/src/saga/engine.rs

//! `SagaEngine<P, E>`: the caller-facing handle used to start saga instances,
//! and the completion report each instance produces.

use crate::core::message::{SagaId, SagaMessage};
use crate::core::payload::Payload;
use crate::core::state::{Phase, SagaOutcome, SagaState};
use crate::error::{CompensationError, SagaError, SagaResult, StepFailure};
use crate::saga::definition::SagaDefinition;
use crate::saga::dispatch::Dispatcher;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{event, instrument, Level};

/// State shared between every `SagaEngine` clone, the dispatch loop and the step tasks.
///
/// The queue is the only mutable structure instances contend on; the definition is read-only.
pub(crate) struct EngineShared<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  pub(crate) definition: Arc<SagaDefinition<P, E>>,
  pub(crate) sender: mpsc::UnboundedSender<SagaMessage<P, E>>,
  pub(crate) accepting: AtomicBool,
  pub(crate) in_flight: AtomicUsize,
  pub(crate) shutdown: Notify,
}

impl<P, E> EngineShared<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Drain is complete once nothing new can start and nothing is running.
  pub(crate) fn is_drained(&self) -> bool {
    !self.accepting.load(Ordering::SeqCst) && self.in_flight.load(Ordering::SeqCst) == 0
  }

  /// Releases an in-flight slot from outside the dispatch loop and wakes the loop so it
  /// re-checks the drain condition.
  pub(crate) fn release(&self) {
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    self.shutdown.notify_one();
  }
}

/// Starts saga instances against one definition.
///
/// Cheap to clone; every clone feeds the same dispatch queue. Instances only make
/// progress while the paired [`Dispatcher`] is running.
pub struct SagaEngine<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  shared: Arc<EngineShared<P, E>>,
}

impl<P, E> Clone for SagaEngine<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<P, E> SagaEngine<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Binds an existing definition to a new dispatch queue.
  ///
  /// The same `Arc<SagaDefinition>` may back several engine/dispatcher pairs.
  pub fn from_definition(definition: Arc<SagaDefinition<P, E>>) -> (Self, Dispatcher<P, E>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let shared = Arc::new(EngineShared {
      definition,
      sender,
      accepting: AtomicBool::new(true),
      in_flight: AtomicUsize::new(0),
      shutdown: Notify::new(),
    });
    (
      Self {
        shared: Arc::clone(&shared),
      },
      Dispatcher::new(shared, receiver),
    )
  }

  /// Enqueues a new instance at `FORWARD(0)` and returns immediately.
  ///
  /// The saga runs asynchronously on the dispatcher. The returned handle may be
  /// dropped for fire-and-forget use, or awaited for the instance's [`SagaReport`].
  /// Accepts either an owned `P` or a `Payload<P>` the caller keeps a clone of.
  ///
  /// # Errors
  ///
  /// Returns [`SagaError::EngineStopped`] after [`SagaEngine::shutdown`], or once the
  /// dispatcher has been dropped.
  #[instrument(
        name = "SagaEngine::start",
        skip_all,
        fields(saga = %self.shared.definition.name(), num_steps = self.shared.definition.len())
    )]
  pub fn start(&self, payload: impl Into<Payload<P>>) -> SagaResult<SagaHandle<E>> {
    // Count the instance before checking `accepting` so a concurrent drain cannot miss it.
    self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
    if !self.shared.accepting.load(Ordering::SeqCst) {
      self.shared.release();
      event!(Level::WARN, "Saga rejected: engine is shutting down.");
      return Err(SagaError::EngineStopped);
    }

    let id = SagaId::new();
    let (completion_tx, completion_rx) = oneshot::channel();
    let message = SagaMessage::initial(id, payload.into(), completion_tx);

    if self.shared.sender.send(message).is_err() {
      self.shared.release();
      event!(Level::ERROR, saga_id = %id, "Saga rejected: dispatcher is gone.");
      return Err(SagaError::EngineStopped);
    }

    event!(Level::DEBUG, saga_id = %id, "Saga enqueued.");
    Ok(SagaHandle {
      id,
      completion: completion_rx,
    })
  }

  /// Stops accepting new sagas. The dispatcher keeps running until every
  /// in-flight instance reaches a terminal state, then returns.
  pub fn shutdown(&self) {
    if self.shared.accepting.swap(false, Ordering::SeqCst) {
      event!(
        Level::INFO,
        saga = %self.shared.definition.name(),
        in_flight = self.in_flight(),
        "Saga engine shutting down."
      );
      self.shared.shutdown.notify_one();
    }
  }

  pub fn is_accepting(&self) -> bool {
    self.shared.accepting.load(Ordering::SeqCst)
  }

  /// Instances started but not yet terminal.
  pub fn in_flight(&self) -> usize {
    self.shared.in_flight.load(Ordering::SeqCst)
  }

  pub fn definition(&self) -> &Arc<SagaDefinition<P, E>> {
    &self.shared.definition
  }
}

/// Handle to one started instance.
#[derive(Debug)]
pub struct SagaHandle<E>
where
  E: std::error::Error + Send + 'static,
{
  id: SagaId,
  completion: oneshot::Receiver<SagaReport<E>>,
}

impl<E> SagaHandle<E>
where
  E: std::error::Error + Send + 'static,
{
  pub fn id(&self) -> SagaId {
    self.id
  }

  /// Waits for the instance to reach a terminal state.
  ///
  /// # Errors
  ///
  /// Returns [`SagaError::EngineStopped`] if the dispatcher stopped before the
  /// instance finished.
  pub async fn wait(self) -> SagaResult<SagaReport<E>> {
    self.completion.await.map_err(|_| SagaError::EngineStopped)
  }
}

/// Everything observable about a finished instance.
#[derive(Debug)]
pub struct SagaReport<E>
where
  E: std::error::Error + 'static,
{
  pub id: SagaId,
  pub outcome: SagaOutcome,
  /// The forward step that triggered rollback; `None` for completed sagas.
  pub failure: Option<StepFailure<E>>,
  /// Compensations that failed after every attempt the policy allowed.
  pub compensation_errors: Vec<CompensationError<E>>,
  /// Every state the dispatch loop received for this instance, terminal included.
  pub history: Vec<SagaState>,
}

impl<E> SagaReport<E>
where
  E: std::error::Error + 'static,
{
  pub fn is_success(&self) -> bool {
    self.outcome.is_success()
  }

  /// Indices of the steps whose forward action ran, in execution order.
  pub fn forward_indices(&self) -> Vec<usize> {
    self.indices_in(Phase::Forward)
  }

  /// Indices of the steps whose compensating action ran, in execution order.
  pub fn backward_indices(&self) -> Vec<usize> {
    self.indices_in(Phase::Backward)
  }

  fn indices_in(&self, phase: Phase) -> Vec<usize> {
    let steps_visited = match self.outcome {
      // The last aborted BACKWARD state did run its (failing) compensation.
      SagaOutcome::CompensationAborted { .. } => self.history.len(),
      // The terminal state itself runs no action.
      SagaOutcome::Completed | SagaOutcome::Compensated => self.history.len().saturating_sub(1),
    };
    self.history[..steps_visited]
      .iter()
      .filter(|state| state.phase == phase)
      .filter_map(|state| usize::try_from(state.index).ok())
      .collect()
  }
}
