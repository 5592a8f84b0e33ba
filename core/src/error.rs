// sagaflow/src/error.rs
use std::time::Duration;

use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::core::state::Phase;

/// Failures raised by the orchestrator itself rather than by a step's business logic.
///
/// Action error types must be `From<SagaError>` so that timeouts and panics travel
/// through the same rollback routing as ordinary action errors.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Saga engine is stopped and no longer accepts new sagas")]
    EngineStopped,

    #[error("{phase} action of step '{step_name}' (index {index}) timed out after {timeout:?}")]
    StepTimedOut {
        step_name: String,
        index: usize,
        phase: Phase,
        timeout: Duration,
    },

    #[error("{phase} action of step '{step_name}' (index {index}) panicked")]
    ActionPanicked {
        step_name: String,
        index: usize,
        phase: Phase,
    },

    #[error("Error in user-provided action or external operation. Source: {source}")]
    HandlerError {
        #[source]
        source: AnyhowError,
    },

    #[error("Internal saga error: {0}")]
    Internal(String),
}

impl From<AnyhowError> for SagaError {
    fn from(err: AnyhowError) -> Self {
        // Unwrap a SagaError that was boxed into anyhow on the way out of an action.
        match err.downcast::<SagaError>() {
            Ok(saga_err) => saga_err,
            Err(source) => SagaError::HandlerError { source },
        }
    }
}

pub type SagaResult<T, E = SagaError> = std::result::Result<T, E>;

/// Why an instance left the forward phase.
#[derive(Debug)]
pub enum FailureCause<E> {
    /// The forward action returned an error (including timeouts and panics).
    Error(E),
    /// The forward action succeeded but the rollback predicate forced compensation.
    RollbackRequested,
}

/// The forward step that turned an instance around.
#[derive(Debug)]
pub struct StepFailure<E> {
    pub step_name: String,
    pub index: usize,
    pub cause: FailureCause<E>,
}

impl<E> StepFailure<E> {
    /// The action error, if the rollback was caused by one.
    pub fn error(&self) -> Option<&E> {
        match &self.cause {
            FailureCause::Error(err) => Some(err),
            FailureCause::RollbackRequested => None,
        }
    }
}

/// A compensating action that still failed after every attempt the policy allowed.
#[derive(Debug, Error)]
#[error("compensation failed for step '{step_name}' (index {index}) after {attempts} attempt(s): {source}")]
pub struct CompensationError<E>
where
    E: std::error::Error + 'static,
{
    pub step_name: String,
    pub index: usize,
    pub attempts: u32,
    #[source]
    pub source: E,
}
