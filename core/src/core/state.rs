// sagaflow/src/core/state.rs

//! The per-instance cursor of the saga state machine and the terminal outcomes it can reach.

use std::fmt;

/// Direction an instance is travelling through the step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  /// Progressing toward completion by running forward actions.
  Forward,
  /// Unwinding toward the start by running compensating actions.
  Backward,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Forward => f.write_str("forward"),
      Phase::Backward => f.write_str("backward"),
    }
  }
}

/// "Which step, in which direction" for one in-flight instance.
///
/// The index is signed because the backward phase legitimately retreats to `-1`,
/// which is how the dispatch loop recognises a fully unwound instance.
/// States are never mutated in place: every transition produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SagaState {
  pub index: isize,
  pub phase: Phase,
}

impl SagaState {
  /// The state every instance starts in: `FORWARD(0)`.
  pub const fn initial() -> Self {
    Self {
      index: 0,
      phase: Phase::Forward,
    }
  }

  pub const fn forward(index: isize) -> Self {
    Self {
      index,
      phase: Phase::Forward,
    }
  }

  pub const fn backward(index: isize) -> Self {
    Self {
      index,
      phase: Phase::Backward,
    }
  }

  /// `FORWARD(i) -> FORWARD(i + 1)`.
  pub const fn advance(self) -> Self {
    Self::forward(self.index + 1)
  }

  /// `X(i) -> BACKWARD(i - 1)`. Used both to start a rollback and to continue one.
  pub const fn retreat(self) -> Self {
    Self::backward(self.index - 1)
  }

  /// The step this state addresses, if it lies inside a table of `len` steps.
  pub fn step_index(self, len: usize) -> Option<usize> {
    usize::try_from(self.index).ok().filter(|idx| *idx < len)
  }

  /// Resolves this state against a table of `len` steps: either the step to run next,
  /// or the terminal reached by walking off one end of the table.
  pub fn locate(self, len: usize) -> Position {
    match (self.phase, self.step_index(len)) {
      (_, Some(index)) => Position::Step(index),
      (Phase::Forward, None) => Position::Terminal(SagaOutcome::Completed),
      (Phase::Backward, None) => Position::Terminal(SagaOutcome::Compensated),
    }
  }
}

/// Where a state sits relative to the step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
  /// A valid index: the step's action for the state's phase must run.
  Step(usize),
  /// `FORWARD(i >= len)` or `BACKWARD(i < 0)`.
  Terminal(SagaOutcome),
}

impl fmt::Display for SagaState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.phase {
      Phase::Forward => write!(f, "FORWARD({})", self.index),
      Phase::Backward => write!(f, "BACKWARD({})", self.index),
    }
  }
}

/// Terminal outcome of one saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOutcome {
  /// Every forward action succeeded (`SUCCESS`).
  Completed,
  /// A forward step failed and the rollback reached past the first step (`FAILED`).
  Compensated,
  /// A compensating action failed under `CompensationPolicy::Abort`; steps
  /// `0..=index` were left uncompensated.
  CompensationAborted { index: usize },
}

impl SagaOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, SagaOutcome::Completed)
  }
}
