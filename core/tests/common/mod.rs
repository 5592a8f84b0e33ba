// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use once_cell::sync::Lazy;
use sagaflow::{ActionFuture, Dispatcher, Payload, SagaBuilder, SagaEngine, SagaError, SagaState};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Common Payload ---
#[derive(Clone, Debug, Default)]
pub struct TestOrder {
  pub customer: String,
  /// Every action appends its label here, e.g. "A.forward".
  pub calls: Vec<String>,
}

impl TestOrder {
  pub fn for_customer(customer: &str) -> Self {
    Self {
      customer: customer.to_string(),
      calls: Vec::new(),
    }
  }
}

// --- Common Error Type for Tests ---
#[derive(Debug, thiserror::Error)]
pub enum TestError {
  #[error(transparent)]
  Saga(#[from] SagaError),

  #[error("Test step failed: {0}")]
  Step(String),

  #[error("Test compensation failed: {0}")]
  Compensation(String),
}

pub type TestAction = Box<dyn Fn(Payload<TestOrder>) -> ActionFuture<TestError> + Send + Sync>;

// --- Common Action Creators ---
pub fn succeed(label: &'static str) -> TestAction {
  Box::new(move |payload: Payload<TestOrder>| -> ActionFuture<TestError> {
    Box::pin(async move {
      payload.write().calls.push(label.to_string());
      tracing::debug!(target: "test_actions", %label, "succeeded");
      Ok(())
    })
  })
}

pub fn fail(label: &'static str) -> TestAction {
  Box::new(move |payload: Payload<TestOrder>| -> ActionFuture<TestError> {
    Box::pin(async move {
      payload.write().calls.push(label.to_string());
      tracing::warn!(target: "test_actions", %label, "failing");
      Err(TestError::Step(label.to_string()))
    })
  })
}

/// Compensation that fails on its first `failures` invocations and succeeds afterwards.
pub fn fail_compensation(label: &'static str, failures: usize, attempts: Arc<AtomicUsize>) -> TestAction {
  Box::new(move |payload: Payload<TestOrder>| -> ActionFuture<TestError> {
    let attempts = Arc::clone(&attempts);
    Box::pin(async move {
      payload.write().calls.push(label.to_string());
      let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
      if attempt <= failures {
        Err(TestError::Compensation(format!("{label} attempt {attempt}")))
      } else {
        Ok(())
      }
    })
  })
}

pub fn sleep_then_succeed(label: &'static str, delay: Duration) -> TestAction {
  Box::new(move |payload: Payload<TestOrder>| -> ActionFuture<TestError> {
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      payload.write().calls.push(label.to_string());
      Ok(())
    })
  })
}

/// Adds `names.len()` steps that all succeed, recording "<name>.forward" / "<name>.backward".
pub fn add_succeeding_steps(builder: &mut SagaBuilder<TestOrder, TestError>, names: &[&'static str]) {
  for name in names {
    let (forward, backward) = labels(name);
    builder.add_step(*name, succeed(forward), succeed(backward));
  }
}

/// Leaks "<name>.forward" and "<name>.backward" so actions can hold `&'static str` labels.
pub fn labels(name: &str) -> (&'static str, &'static str) {
  (
    Box::leak(format!("{name}.forward").into_boxed_str()),
    Box::leak(format!("{name}.backward").into_boxed_str()),
  )
}

/// Builds the saga and spawns its dispatch loop.
pub fn launch(builder: SagaBuilder<TestOrder, TestError>) -> SagaEngine<TestOrder, TestError> {
  let (engine, dispatcher): (_, Dispatcher<TestOrder, TestError>) = builder.build();
  dispatcher.spawn();
  engine
}

/// No two consecutive transitions of one instance may differ by more than one index.
pub fn assert_transitions_adjacent(history: &[SagaState]) {
  for pair in history.windows(2) {
    let distance = (pair[0].index - pair[1].index).abs();
    assert!(distance <= 1, "non-adjacent transitions {} -> {} in {:?}", pair[0], pair[1], history);
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
