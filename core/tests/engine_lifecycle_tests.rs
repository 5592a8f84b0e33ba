// tests/engine_lifecycle_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use sagaflow::{
  ActionFuture, CompensationPolicy, Payload, Phase, SagaAction, SagaBuilder, SagaEngine, SagaError, SagaOutcome,
};
use serial_test::serial;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_step_timeout_triggers_compensation() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("timeout");
  builder.step_timeout(Duration::from_millis(20));
  builder.add_step("A", succeed("A.forward"), succeed("A.backward"));
  builder.add_step(
    "stalled",
    sleep_then_succeed("stalled.forward", Duration::from_secs(5)),
    succeed("stalled.backward"),
  );
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::Compensated);
  // The stalled action was aborted before it could record anything.
  assert_eq!(order.read().calls, vec!["A.forward", "A.backward"]);
  match report.failure.as_ref().and_then(|f| f.error()) {
    Some(TestError::Saga(SagaError::StepTimedOut {
      step_name,
      index,
      phase,
      timeout,
    })) => {
      assert_eq!(step_name, "stalled");
      assert_eq!(*index, 1);
      assert_eq!(*phase, Phase::Forward);
      assert_eq!(*timeout, Duration::from_millis(20));
    }
    other => panic!("Expected StepTimedOut, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_panicking_action_is_routed_to_compensation() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("panic");
  builder.add_step("A", succeed("A.forward"), succeed("A.backward"));
  builder.add_step(
    "explodes",
    |order: Payload<TestOrder>| -> ActionFuture<TestError> {
      Box::pin(async move {
        if order.read().customer.is_empty() {
          panic!("boom");
        }
        Ok(())
      })
    },
    succeed("explodes.backward"),
  );
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::Compensated);
  assert_eq!(order.read().calls, vec!["A.forward", "A.backward"]);
  assert!(matches!(
    report.failure.as_ref().and_then(|f| f.error()),
    Some(TestError::Saga(SagaError::ActionPanicked { index: 1, .. }))
  ));
}

#[tokio::test]
#[serial]
async fn test_stalled_compensation_times_out_and_unwinding_continues() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("backward_timeout");
  builder.step_timeout(Duration::from_millis(20));
  builder.add_step(
    "A",
    succeed("A.forward"),
    sleep_then_succeed("A.backward", Duration::from_secs(5)),
  );
  builder.add_step("B", fail("B.forward"), succeed("B.backward"));
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::Compensated);
  assert_eq!(order.read().calls, vec!["A.forward", "B.forward"]);
  assert_eq!(report.compensation_errors.len(), 1);
  let compensation = &report.compensation_errors[0];
  assert_eq!(compensation.step_name, "A");
  assert_eq!(compensation.attempts, 1);
  match &compensation.source {
    TestError::Saga(SagaError::StepTimedOut { index, phase, timeout, .. }) => {
      assert_eq!(*index, 0);
      assert_eq!(*phase, Phase::Backward);
      assert_eq!(*timeout, Duration::from_millis(20));
    }
    other => panic!("Expected StepTimedOut, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_panicking_compensation_is_recorded_and_unwinding_continues() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("backward_panic");
  builder.add_step("A", succeed("A.forward"), succeed("A.backward"));
  builder.add_step(
    "explodes",
    succeed("explodes.forward"),
    |order: Payload<TestOrder>| -> ActionFuture<TestError> {
      Box::pin(async move {
        if order.read().calls.iter().any(|c| c == "explodes.forward") {
          panic!("compensation exploded");
        }
        Ok(())
      })
    },
  );
  builder.add_step("C", fail("C.forward"), succeed("C.backward"));
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::Compensated);
  assert_eq!(
    order.read().calls,
    vec!["A.forward", "explodes.forward", "C.forward", "A.backward"]
  );
  assert_eq!(report.backward_indices(), vec![1, 0]);
  assert_eq!(report.compensation_errors.len(), 1);
  assert!(matches!(
    &report.compensation_errors[0].source,
    TestError::Saga(SagaError::ActionPanicked {
      index: 1,
      phase: Phase::Backward,
      ..
    })
  ));
}

#[tokio::test]
#[serial]
async fn test_stalled_compensation_under_abort_stops_unwinding() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("backward_timeout_abort");
  builder.step_timeout(Duration::from_millis(20));
  builder.compensation_policy(CompensationPolicy::Abort);
  builder.add_step("A", succeed("A.forward"), succeed("A.backward"));
  builder.add_step(
    "B",
    succeed("B.forward"),
    sleep_then_succeed("B.backward", Duration::from_secs(5)),
  );
  builder.add_step("C", fail("C.forward"), succeed("C.backward"));
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::CompensationAborted { index: 1 });
  // A is never compensated once B's compensation is abandoned.
  assert_eq!(order.read().calls, vec!["A.forward", "B.forward", "C.forward"]);
  assert_eq!(report.backward_indices(), vec![1]);
  assert_eq!(report.compensation_errors.len(), 1);
  assert!(matches!(
    &report.compensation_errors[0].source,
    TestError::Saga(SagaError::StepTimedOut {
      index: 1,
      phase: Phase::Backward,
      ..
    })
  ));
}

#[tokio::test]
#[serial]
async fn test_shutdown_rejects_new_sagas_and_drains_in_flight() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("shutdown");
  builder.add_step(
    "slow",
    sleep_then_succeed("slow.forward", Duration::from_millis(50)),
    succeed("slow.backward"),
  );
  add_succeeding_steps(&mut builder, &["B"]);
  let (engine, dispatcher) = builder.build();
  let loop_handle = dispatcher.spawn();

  let order = Payload::new(TestOrder::default());
  let handle = engine.start(order.clone()).unwrap();
  assert_eq!(engine.in_flight(), 1);

  engine.shutdown();
  assert!(!engine.is_accepting());
  assert!(matches!(engine.start(TestOrder::default()), Err(SagaError::EngineStopped)));

  let report = handle.wait().await.unwrap();
  assert_eq!(report.outcome, SagaOutcome::Completed);
  assert_eq!(order.read().calls, vec!["slow.forward", "B.forward"]);

  tokio::time::timeout(Duration::from_secs(2), loop_handle)
    .await
    .expect("dispatcher should stop once drained")
    .unwrap();
  assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
#[serial]
async fn test_shutdown_with_nothing_in_flight_stops_dispatcher() {
  setup_tracing();
  let (engine, dispatcher) = SagaBuilder::<TestOrder, TestError>::new("idle").build();
  let loop_handle = dispatcher.spawn();

  engine.shutdown();
  engine.shutdown(); // idempotent

  tokio::time::timeout(Duration::from_secs(2), loop_handle)
    .await
    .expect("idle dispatcher should stop")
    .unwrap();
}

#[tokio::test]
#[serial]
async fn test_start_fails_when_dispatcher_is_dropped() {
  setup_tracing();
  let (engine, dispatcher) = SagaBuilder::<TestOrder, TestError>::new("orphan").build();
  drop(dispatcher);

  assert!(matches!(engine.start(TestOrder::default()), Err(SagaError::EngineStopped)));
  assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
#[serial]
async fn test_definition_can_back_several_dispatchers() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("shared");
  add_succeeding_steps(&mut builder, &["A", "B"]);
  let definition = Arc::new(builder.into_definition());

  let (first, first_loop) = SagaEngine::from_definition(Arc::clone(&definition));
  let (second, second_loop) = SagaEngine::from_definition(Arc::clone(&definition));
  first_loop.spawn();
  second_loop.spawn();
  assert!(Arc::ptr_eq(first.definition(), second.definition()));

  let a = first.start(TestOrder::default()).unwrap();
  let b = second.start(TestOrder::default()).unwrap();
  assert_eq!(a.wait().await.unwrap().outcome, SagaOutcome::Completed);
  assert_eq!(b.wait().await.unwrap().outcome, SagaOutcome::Completed);
}

struct Inventory {
  reserved: AtomicUsize,
}

#[async_trait]
impl SagaAction<TestOrder, TestError> for Inventory {
  async fn forward(&self, order: Payload<TestOrder>) -> Result<(), TestError> {
    self.reserved.fetch_add(1, Ordering::SeqCst);
    order.write().calls.push("inventory.forward".to_string());
    Ok(())
  }

  async fn backward(&self, order: Payload<TestOrder>) -> Result<(), TestError> {
    // Saturating: safe even if the reservation never happened.
    let _ = self
      .reserved
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    order.write().calls.push("inventory.backward".to_string());
    Ok(())
  }
}

#[tokio::test]
#[serial]
async fn test_saga_action_trait_steps() {
  setup_tracing();
  let mut builder = SagaBuilder::<TestOrder, TestError>::new("trait_steps");
  builder.add_action(
    "inventory",
    Inventory {
      reserved: AtomicUsize::new(0),
    },
  );
  builder.add_step("payment", fail("payment.forward"), succeed("payment.backward"));
  let engine = launch(builder);

  let order = Payload::new(TestOrder::default());
  let report = engine.start(order.clone()).unwrap().wait().await.unwrap();

  assert_eq!(report.outcome, SagaOutcome::Compensated);
  assert_eq!(
    order.read().calls,
    vec!["inventory.forward", "payment.forward", "inventory.backward"]
  );
}
