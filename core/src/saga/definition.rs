// sagaflow/src/saga/definition.rs

//! The immutable, shareable step table produced by `SagaBuilder::build`.

use crate::core::step::{RollbackPredicate, Step};
use crate::saga::config::SagaConfig;

/// An ordered sequence of steps addressed by index `0..len`.
///
/// A definition never changes after `build()`; it is held behind an `Arc` and read
/// concurrently by every in-flight instance (and by any number of dispatchers).
pub struct SagaDefinition<P, E>
where
  P: 'static + Send + Sync,
  E: 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<Step<P, E>>,
  pub(crate) rollback_if: Option<RollbackPredicate<P>>,
  pub(crate) config: SagaConfig,
}

impl<P, E> SagaDefinition<P, E>
where
  P: 'static + Send + Sync,
  E: 'static,
{
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn step(&self, index: usize) -> Option<&Step<P, E>> {
    self.steps.get(index)
  }

  /// Step names in execution order.
  pub fn step_names(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().map(Step::name)
  }

  pub fn config(&self) -> &SagaConfig {
    &self.config
  }

  pub fn has_rollback_predicate(&self) -> bool {
    self.rollback_if.is_some()
  }

  /// Whether the rollback hook forces compensation after a successful forward action at `index`.
  pub(crate) fn rollback_requested(&self, index: usize, payload: &P) -> bool {
    self.rollback_if.as_ref().is_some_and(|predicate| predicate(index, payload))
  }
}

impl<P, E> std::fmt::Debug for SagaDefinition<P, E>
where
  P: 'static + Send + Sync,
  E: 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SagaDefinition")
      .field("name", &self.name)
      .field("steps", &self.steps)
      .field("rollback_if_present", &self.rollback_if.is_some())
      .field("config", &self.config)
      .finish()
  }
}
