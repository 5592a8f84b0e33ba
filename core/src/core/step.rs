// sagaflow/src/core/step.rs

//! Defines a single step of a saga definition.

use super::action::Action;

/// Predicate evaluated after a forward action succeeds. Returning `true` forces the
/// instance into rollback exactly as if the action had failed.
///
/// Receives the index of the step that just ran and a read-only view of the payload.
pub type RollbackPredicate<P> = std::sync::Arc<dyn Fn(usize, &P) -> bool + Send + Sync + 'static>;

/// One named stage of a saga: a forward action and the compensating action that undoes it.
///
/// The name labels the external system the step talks to and is used only for diagnostics;
/// steps are addressed exclusively by their index in the definition.
pub struct Step<P: 'static + Send + Sync, E: 'static> {
  pub(crate) name: String,
  pub(crate) forward: Action<P, E>,
  pub(crate) backward: Action<P, E>,
}

impl<P: 'static + Send + Sync, E: 'static> Step<P, E> {
  pub(crate) fn new(name: String, forward: Action<P, E>, backward: Action<P, E>) -> Self {
    Self { name, forward, backward }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

// Actions are boxed closures, so Debug only shows the name.
impl<P: 'static + Send + Sync, E: 'static> std::fmt::Debug for Step<P, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Step").field("name", &self.name).finish_non_exhaustive()
  }
}
