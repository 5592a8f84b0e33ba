// sagaflow/src/saga/dispatch.rs

//! The dispatch loop: the single consumer of the transition queue.
//!
//! For every message the loop either finishes the instance (terminal states) or
//! hands the step's action to its own task. That task awaits the action's result,
//! decides the next transition and enqueues it. An instance therefore never has two
//! steps running at once, while different instances progress concurrently.

use crate::core::message::SagaMessage;
use crate::core::payload::Payload;
use crate::core::state::{Phase, Position, SagaOutcome};
use crate::error::{CompensationError, FailureCause, SagaError, StepFailure};
use crate::saga::config::CompensationPolicy;
use crate::saga::definition::SagaDefinition;
use crate::saga::engine::{EngineShared, SagaReport};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};

/// Drives saga instances for one [`SagaEngine`](crate::SagaEngine).
///
/// Must be run (`run().await`) or spawned (`spawn()`) for started sagas to make progress.
/// Returns after `SagaEngine::shutdown` once every in-flight instance is terminal.
pub struct Dispatcher<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  shared: Arc<EngineShared<P, E>>,
  receiver: mpsc::UnboundedReceiver<SagaMessage<P, E>>,
}

impl<P, E> Dispatcher<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  pub(crate) fn new(shared: Arc<EngineShared<P, E>>, receiver: mpsc::UnboundedReceiver<SagaMessage<P, E>>) -> Self {
    Self { shared, receiver }
  }

  /// Runs the loop on a new tokio task.
  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  #[instrument(
        name = "Dispatcher::run",
        skip_all,
        fields(
            saga = %self.shared.definition.name(),
            payload_type = %std::any::type_name::<P>(),
            num_steps = self.shared.definition.len(),
        )
    )]
  pub async fn run(mut self) {
    event!(Level::DEBUG, "Dispatch loop starting.");

    while !self.shared.is_drained() {
      tokio::select! {
        message = self.receiver.recv() => match message {
          Some(message) => self.dispatch(message),
          // Unreachable while `shared` holds a sender.
          None => break,
        },
        _ = self.shared.shutdown.notified() => {
          event!(
            Level::DEBUG,
            in_flight = self.shared.in_flight.load(Ordering::SeqCst),
            "Shutdown requested; draining in-flight sagas."
          );
        }
      }
    }

    event!(Level::INFO, "Dispatch loop stopped.");
  }

  /// Routes one transition message. Never blocks on an action.
  fn dispatch(&self, mut message: SagaMessage<P, E>) {
    if let Some(index) = message.journey.aborted_at {
      self.finish(message, SagaOutcome::CompensationAborted { index });
      return;
    }

    message.journey.history.push(message.state);
    event!(Level::DEBUG, saga_id = %message.id, state = %message.state, "Transition received.");

    match message.state.locate(self.shared.definition.len()) {
      Position::Terminal(outcome) => self.finish(message, outcome),
      Position::Step(index) => {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(run_step(shared, message, index));
      }
    }
  }

  /// Terminal: the message is not re-enqueued and the caller's handle is resolved.
  fn finish(&self, message: SagaMessage<P, E>, outcome: SagaOutcome) {
    let SagaMessage { id, journey, .. } = message;

    match outcome {
      SagaOutcome::Completed => {
        event!(Level::INFO, saga_id = %id, "Saga completed.");
      }
      SagaOutcome::Compensated => {
        event!(
          Level::WARN,
          saga_id = %id,
          failed_step = journey.failure.as_ref().map(|f| f.step_name.as_str()).unwrap_or_default(),
          compensation_errors = journey.compensation_errors.len(),
          "Saga rolled back."
        );
      }
      SagaOutcome::CompensationAborted { index } => {
        event!(Level::ERROR, saga_id = %id, step_index = index, "Saga compensation aborted.");
      }
    }

    self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);

    let report = SagaReport {
      id,
      outcome,
      failure: journey.failure,
      compensation_errors: journey.compensation_errors,
      history: journey.history,
    };
    if journey.completion.send(report).is_err() {
      event!(Level::TRACE, saga_id = %id, "Saga handle dropped; report discarded.");
    }
  }
}

/// Runs the action addressed by `message.state` and enqueues the resulting transition.
async fn run_step<P, E>(shared: Arc<EngineShared<P, E>>, message: SagaMessage<P, E>, index: usize)
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  let definition = &shared.definition;
  let next = match message.state.phase {
    Phase::Forward => step_forward(definition, message, index).await,
    Phase::Backward => step_backward(definition, message, index).await,
  };

  if let Err(mpsc::error::SendError(lost)) = shared.sender.send(next) {
    // The dispatcher is gone; dropping the message resolves the handle with EngineStopped.
    shared.release();
    event!(Level::ERROR, saga_id = %lost.id, state = %lost.state, "Dispatch queue closed; saga abandoned.");
  }
}

/// `FORWARD(i)`: advance on success, start rolling back from `i - 1` on failure.
async fn step_forward<P, E>(
  definition: &SagaDefinition<P, E>,
  mut message: SagaMessage<P, E>,
  index: usize,
) -> SagaMessage<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  let step_name = definition.steps[index].name.as_str();
  event!(Level::DEBUG, saga_id = %message.id, step_name, step_index = index, "Running forward action.");

  let cause = match invoke(definition, index, Phase::Forward, message.payload.clone()).await {
    Ok(()) => {
      let forced = definition.rollback_requested(index, &message.payload.read());
      if !forced {
        let next = message.state.advance();
        return message.transition(next);
      }
      event!(Level::WARN, saga_id = %message.id, step_name, step_index = index, "Rollback requested after successful forward action.");
      FailureCause::RollbackRequested
    }
    Err(err) => {
      event!(Level::WARN, saga_id = %message.id, step_name, step_index = index, error = %err, "Forward action failed; compensating.");
      FailureCause::Error(err)
    }
  };

  message.journey.failure = Some(StepFailure {
    step_name: step_name.to_string(),
    index,
    cause,
  });
  let next = message.state.retreat();
  message.transition(next)
}

/// `BACKWARD(i)`: compensate step `i`, then keep unwinding (or stop, under `Abort`).
async fn step_backward<P, E>(
  definition: &SagaDefinition<P, E>,
  mut message: SagaMessage<P, E>,
  index: usize,
) -> SagaMessage<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  let step_name = definition.steps[index].name.as_str();
  let policy = definition.config.compensation_policy;
  let max_attempts = policy.max_attempts();
  let mut attempt = 0;

  loop {
    attempt += 1;
    event!(Level::DEBUG, saga_id = %message.id, step_name, step_index = index, attempt, "Running compensating action.");

    match invoke(definition, index, Phase::Backward, message.payload.clone()).await {
      Ok(()) => break,
      Err(err) if attempt < max_attempts => {
        event!(Level::WARN, saga_id = %message.id, step_name, step_index = index, attempt, error = %err, "Compensation failed; retrying.");
        tokio::time::sleep(policy.backoff()).await;
      }
      Err(err) => {
        event!(Level::ERROR, saga_id = %message.id, step_name, step_index = index, attempts = attempt, error = %err, "Compensation failed.");
        message.journey.compensation_errors.push(CompensationError {
          step_name: step_name.to_string(),
          index,
          attempts: attempt,
          source: err,
        });
        if policy == CompensationPolicy::Abort {
          message.journey.aborted_at = Some(index);
          return message;
        }
        break;
      }
    }
  }

  let next = message.state.retreat();
  message.transition(next)
}

/// Runs one action on its own task, applying the step deadline and converting
/// panics and timeouts into the definition's error type.
async fn invoke<P, E>(definition: &SagaDefinition<P, E>, index: usize, phase: Phase, payload: Payload<P>) -> Result<(), E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  let step = &definition.steps[index];
  let action = match phase {
    Phase::Forward => &step.forward,
    Phase::Backward => &step.backward,
  };
  let mut task = tokio::spawn(action(payload));

  let joined = match definition.config.step_timeout {
    None => (&mut task).await,
    Some(timeout) => match tokio::time::timeout(timeout, &mut task).await {
      Ok(joined) => joined,
      Err(_elapsed) => {
        task.abort();
        return Err(E::from(SagaError::StepTimedOut {
          step_name: step.name.clone(),
          index,
          phase,
          timeout,
        }));
      }
    },
  };

  match joined {
    Ok(result) => result,
    Err(join_err) if join_err.is_panic() => Err(E::from(SagaError::ActionPanicked {
      step_name: step.name.clone(),
      index,
      phase,
    })),
    Err(join_err) => Err(E::from(SagaError::Internal(format!(
      "{phase} action of step '{}' was cancelled: {join_err}",
      step.name
    )))),
  }
}
