// sagaflow/src/saga/builder.rs

//! `SagaBuilder<P, E>`: append-only registration of steps, finalised by `build()`.
//!
//! Registration is setup-time only. Once `build()` consumes the builder the step
//! table is frozen and shared read-only with the dispatch loop.

use crate::core::action::{boxed_action, split_saga_action, SagaAction};
use crate::core::payload::Payload;
use crate::core::step::{RollbackPredicate, Step};
use crate::error::SagaError;
use crate::saga::config::{CompensationPolicy, SagaConfig};
use crate::saga::definition::SagaDefinition;
use crate::saga::dispatch::Dispatcher;
use crate::saga::engine::SagaEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

/// Builds a [`SagaDefinition`] over payload type `P` whose actions fail with `E`.
///
/// `E` must be `From<SagaError>` so framework failures (step timeouts, panicking
/// actions) are routed to compensation like any other action error.
pub struct SagaBuilder<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  name: String,
  steps: Vec<Step<P, E>>,
  rollback_if: Option<RollbackPredicate<P>>,
  config: SagaConfig,
}

impl<P, E> SagaBuilder<P, E>
where
  P: 'static + Send + Sync,
  E: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Starts an empty definition. `name` is used only in diagnostics.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      steps: Vec::new(),
      rollback_if: None,
      config: SagaConfig::default(),
    }
  }

  /// Appends a step built from two async closures.
  ///
  /// Steps execute in the order they are added. Names are diagnostic only and may repeat.
  /// Each closure's error type must convert into the definition's `E`.
  pub fn add_step<FF, FB, ForwardErr, BackwardErr>(
    &mut self,
    name: impl Into<String>,
    forward: impl Fn(Payload<P>) -> FF + Send + Sync + 'static,
    backward: impl Fn(Payload<P>) -> FB + Send + Sync + 'static,
  ) where
    FF: Future<Output = Result<(), ForwardErr>> + Send + 'static,
    FB: Future<Output = Result<(), BackwardErr>> + Send + 'static,
    ForwardErr: Into<E> + Send + 'static,
    BackwardErr: Into<E> + Send + 'static,
  {
    self.push_step(name.into(), boxed_action(forward), boxed_action(backward));
  }

  /// Appends a step whose forward and compensating logic live on one [`SagaAction`].
  pub fn add_action(&mut self, name: impl Into<String>, action: impl SagaAction<P, E>) {
    let (forward, backward) = split_saga_action(Arc::new(action));
    self.push_step(name.into(), forward, backward);
  }

  fn push_step(&mut self, name: String, forward: crate::core::Action<P, E>, backward: crate::core::Action<P, E>) {
    // The new step's index is the current length of the table.
    let index = self.steps.len();
    event!(Level::DEBUG, saga = %self.name, step_name = %name, step_index = index, "Step added.");
    self.steps.push(Step::new(name, forward, backward));
  }

  /// Installs a hook that may force rollback after a forward action succeeded.
  ///
  /// The predicate receives the index of the step that just ran and the payload. Unset by default.
  pub fn rollback_if(&mut self, predicate: impl Fn(usize, &P) -> bool + Send + Sync + 'static) {
    self.rollback_if = Some(Arc::new(predicate));
  }

  pub fn with_config(&mut self, config: SagaConfig) {
    self.config = config;
  }

  pub fn step_timeout(&mut self, timeout: Duration) {
    self.config.step_timeout = Some(timeout);
  }

  pub fn compensation_policy(&mut self, policy: CompensationPolicy) {
    self.config.compensation_policy = policy;
  }

  /// Number of steps registered so far.
  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Freezes the step table without binding it to a queue.
  ///
  /// Wrap the result in an `Arc` and pass it to [`SagaEngine::from_definition`] to run
  /// several dispatch loops over the same definition.
  pub fn into_definition(self) -> SagaDefinition<P, E> {
    SagaDefinition {
      name: self.name,
      steps: self.steps,
      rollback_if: self.rollback_if,
      config: self.config,
    }
  }

  /// Freezes the definition and binds it to a fresh dispatch queue.
  ///
  /// Returns the cloneable [`SagaEngine`] used to start sagas and the [`Dispatcher`]
  /// that must be run (or spawned) to drive them.
  pub fn build(self) -> (SagaEngine<P, E>, Dispatcher<P, E>) {
    SagaEngine::from_definition(Arc::new(self.into_definition()))
  }
}
