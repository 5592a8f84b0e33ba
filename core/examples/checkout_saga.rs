// sagaflow/examples/checkout_saga.rs

use sagaflow::{Payload, SagaBuilder, SagaError, SagaOutcome};
use std::time::Duration;
use tracing::info;

// 1. Define the payload carried through every step
#[derive(Clone, Debug, Default)]
struct Cart {
  customer: String,
  items: Vec<String>,
  total_cents: u64,
  log: Vec<String>,
}

// 2. Define an error type for the saga's actions.
//    It must be constructible from SagaError so timeouts and panics can be routed.
#[derive(Debug, thiserror::Error)]
enum CartError {
  #[error("cart is empty")]
  Empty,
  #[error(transparent)]
  Saga(#[from] SagaError),
}

async fn stage(cart: Payload<Cart>, entry: &'static str) -> Result<(), CartError> {
  tokio::time::sleep(Duration::from_millis(10)).await;
  cart.write().log.push(entry.to_string());
  Ok(())
}

#[tokio::main]
async fn main() -> Result<(), SagaError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Checkout Saga Example ---");

  // 3. Register steps in the order they should execute
  let mut builder = SagaBuilder::<Cart, CartError>::new("checkout");
  builder.step_timeout(Duration::from_secs(1));

  builder.add_step(
    "CREATE_EMPTY_CART",
    |cart: Payload<Cart>| stage(cart, "cart created"),
    |cart: Payload<Cart>| stage(cart, "cart deleted"),
  );
  builder.add_step(
    "VALIDATE_CART",
    |cart: Payload<Cart>| async move {
      if cart.read().items.is_empty() {
        return Err(CartError::Empty);
      }
      cart.write().log.push("cart validated".to_string());
      Ok(())
    },
    |_cart: Payload<Cart>| async { Ok::<(), CartError>(()) },
  );
  builder.add_step(
    "PRICE_CART",
    |cart: Payload<Cart>| async move {
      let mut guard = cart.write();
      let total = guard.items.len() as u64 * 1_250;
      guard.total_cents = total;
      guard.log.push(format!("priced at {total} cents"));
      Ok::<(), CartError>(())
    },
    |cart: Payload<Cart>| async move {
      cart.write().total_cents = 0;
      Ok::<(), CartError>(())
    },
  );
  builder.add_step(
    "PERSIST_NEW_CART",
    |cart: Payload<Cart>| stage(cart, "cart persisted"),
    |cart: Payload<Cart>| stage(cart, "persisted cart removed"),
  );

  // 4. Freeze the definition and start the dispatch loop
  let (engine, dispatcher) = builder.build();
  let dispatch_loop = dispatcher.spawn();

  // 5. Start two sagas: one that completes, one that rolls back
  let full = Payload::new(Cart {
    customer: "alice".to_string(),
    items: vec!["tea".to_string(), "cups".to_string()],
    ..Default::default()
  });
  let empty = Payload::new(Cart {
    customer: "lee".to_string(),
    ..Default::default()
  });

  let full_handle = engine.start(full.clone())?;
  let empty_handle = engine.start(empty.clone())?;

  for (cart, handle) in [(full, full_handle), (empty, empty_handle)] {
    let report = handle.wait().await?;
    let cart = cart.read();
    match report.outcome {
      SagaOutcome::Completed => info!(customer = %cart.customer, total = cart.total_cents, "Checkout completed."),
      SagaOutcome::Compensated => info!(
        customer = %cart.customer,
        failed_step = ?report.failure.as_ref().map(|f| f.step_name.as_str()),
        "Checkout rolled back."
      ),
      SagaOutcome::CompensationAborted { index } => info!(customer = %cart.customer, index, "Checkout needs manual repair."),
    }
    for entry in &cart.log {
      info!("- {}", entry);
    }
  }

  // 6. Drain and stop
  engine.shutdown();
  dispatch_loop
    .await
    .map_err(|e| SagaError::Internal(format!("dispatch loop failed: {e}")))?;

  Ok(())
}
