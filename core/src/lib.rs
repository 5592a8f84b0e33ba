// src/lib.rs

//! Sagaflow: an ASYNC, type-safe saga orchestrator for Rust.
//!
//! A saga runs an ordered sequence of steps against one business transaction. If a
//! step fails, the steps that already ran are unwound in reverse order by invoking
//! each one's compensating action. Sagaflow provides:
//!  - A builder that appends named steps, each a forward and a compensating async action.
//!  - An immutable, `Arc`-shared definition that many instances read concurrently.
//!  - A single dispatch loop per engine that drives every instance through its
//!    `FORWARD(i)` / `BACKWARD(i)` state machine, running each action on its own task.
//!  - Optional per-step deadlines, a rollback predicate hook, and an explicit policy
//!    for failing compensations.
//!  - A completion handle per instance reporting how it ended.
//!
//! Saga state is memory-resident: in-flight instances are lost if the process exits.

pub mod core;
pub mod error;
pub mod saga;

// --- Re-exports for the Public API ---

pub use crate::core::action::{Action, ActionFuture, SagaAction};
pub use crate::core::message::SagaId;
pub use crate::core::payload::Payload;
pub use crate::core::state::{Phase, Position, SagaOutcome, SagaState};
pub use crate::core::step::{RollbackPredicate, Step};

pub use crate::saga::builder::SagaBuilder;
pub use crate::saga::config::{CompensationPolicy, SagaConfig};
pub use crate::saga::definition::SagaDefinition;
pub use crate::saga::dispatch::Dispatcher;
pub use crate::saga::engine::{SagaEngine, SagaHandle, SagaReport};

pub use crate::error::{CompensationError, FailureCause, SagaError, SagaResult, StepFailure};

/*
    Core Workflow:
    1. Define a payload struct `Order` and an error enum with a `#[from] SagaError` variant.
    2. Create a `SagaBuilder::<Order, OrderError>::new("checkout")`.
    3. Call `.add_step(name, forward, backward)` once per stage, in execution order
       (or `.add_action(name, impl SagaAction)`).
    4. Optionally set `.step_timeout(..)`, `.compensation_policy(..)`, `.rollback_if(..)`.
    5. `let (engine, dispatcher) = builder.build();` and `dispatcher.spawn();`.
    6. `engine.start(order)?` returns immediately; `.wait().await` on the handle for the report.
    7. `engine.shutdown()` drains in-flight sagas and lets the dispatcher return.
*/
