// sagaflow/examples/compensation_policies.rs

use async_trait::async_trait;
use sagaflow::{CompensationPolicy, Payload, SagaAction, SagaBuilder, SagaError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Booking {
  flight: Option<String>,
  hotel: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum TripError {
  #[error("{0} is unavailable")]
  Unavailable(&'static str),
  #[error("{0} provider timed out")]
  ProviderDown(&'static str),
  #[error(transparent)]
  Saga(#[from] SagaError),
}

// A step whose compensation is flaky: it succeeds on the third call.
struct FlightDesk {
  cancel_calls: AtomicU32,
}

#[async_trait]
impl SagaAction<Booking, TripError> for FlightDesk {
  async fn forward(&self, booking: Payload<Booking>) -> Result<(), TripError> {
    booking.write().flight = Some("LH-454".to_string());
    Ok(())
  }

  async fn backward(&self, booking: Payload<Booking>) -> Result<(), TripError> {
    let call = self.cancel_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call < 3 {
      warn!(call, "flight cancellation failed");
      return Err(TripError::ProviderDown("flight"));
    }
    booking.write().flight = None;
    Ok(())
  }
}

async fn run_with(policy: CompensationPolicy) -> Result<(), SagaError> {
  let mut builder = SagaBuilder::<Booking, TripError>::new("trip");
  builder.compensation_policy(policy);
  builder.add_action(
    "flight",
    FlightDesk {
      cancel_calls: AtomicU32::new(0),
    },
  );
  builder.add_step(
    "hotel",
    |_booking: Payload<Booking>| async { Err::<(), _>(TripError::Unavailable("hotel")) },
    |booking: Payload<Booking>| async move {
      booking.write().hotel = None;
      Ok::<(), TripError>(())
    },
  );

  let (engine, dispatcher) = builder.build();
  dispatcher.spawn();

  let booking = Payload::new(Booking::default());
  let report = engine.start(booking.clone())?.wait().await?;

  info!(?policy, outcome = ?report.outcome, flight = ?booking.read().flight, "Trip saga finished.");
  for err in &report.compensation_errors {
    warn!(%err, "Compensation left unresolved.");
  }
  engine.shutdown();
  Ok(())
}

#[tokio::main]
async fn main() -> Result<(), SagaError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Compensation Policy Example ---");
  run_with(CompensationPolicy::Continue).await?;
  run_with(CompensationPolicy::Retry {
    max_attempts: 3,
    backoff: Duration::from_millis(20),
  })
  .await?;
  run_with(CompensationPolicy::Abort).await?;
  Ok(())
}
