// sagaflow/src/core/action.rs

//! Forward and compensating actions: the business logic a step plugs into the engine.
//!
//! Actions come in two forms:
//! - plain async closures registered with `SagaBuilder::add_step`, and
//! - types implementing [`SagaAction`], registered with `SagaBuilder::add_action`.
//!
//! Both are normalised into the boxed [`Action`] the dispatch loop invokes.

use crate::core::payload::Payload;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by an [`Action`]. It is `'static` so the engine can run it on its own task.
pub type ActionFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;

/// Type-erased forward or compensating action.
///
/// An action takes a clone of the instance's `Payload<P>` and resolves to `Ok(())` or the
/// definition's error type `E`. Actions must:
/// 1. Drop payload lock guards BEFORE any `.await` suspension point.
/// 2. Be callable from a task other than the one that registered them.
/// 3. (Compensations) Be safe to run even when the matching forward action never committed.
pub type Action<P, E> = Box<dyn Fn(Payload<P>) -> ActionFuture<E> + Send + Sync>;

/// A step's business logic expressed as a type with both directions.
///
/// ```ignore
/// struct ReserveStock { inventory: InventoryClient }
///
/// #[async_trait]
/// impl SagaAction<Order, OrderError> for ReserveStock {
///   async fn forward(&self, order: Payload<Order>) -> Result<(), OrderError> { .. }
///   async fn backward(&self, order: Payload<Order>) -> Result<(), OrderError> { .. }
/// }
/// ```
#[async_trait]
pub trait SagaAction<P, E>: Send + Sync + 'static
where
  P: Send + Sync + 'static,
  E: Send + 'static,
{
  /// Performs the step's effect.
  async fn forward(&self, payload: Payload<P>) -> Result<(), E>;

  /// Semantically undoes [`SagaAction::forward`]. Must tolerate running without a prior forward.
  async fn backward(&self, payload: Payload<P>) -> Result<(), E>;
}

/// Wraps a user closure whose error type converts into `E`.
pub(crate) fn boxed_action<P, E, F, UserErr>(action_fn: impl Fn(Payload<P>) -> F + Send + Sync + 'static) -> Action<P, E>
where
  P: Send + Sync + 'static,
  E: Send + 'static,
  F: Future<Output = Result<(), UserErr>> + Send + 'static,
  UserErr: Into<E> + Send + 'static,
{
  Box::new(move |payload| {
    let user_fut = action_fn(payload);
    Box::pin(async move { user_fut.await.map_err(Into::into) })
  })
}

/// Splits a [`SagaAction`] into its forward and backward [`Action`]s sharing one instance.
pub(crate) fn split_saga_action<P, E>(action: Arc<dyn SagaAction<P, E>>) -> (Action<P, E>, Action<P, E>)
where
  P: Send + Sync + 'static,
  E: Send + 'static,
{
  let forward_target = Arc::clone(&action);
  let forward: Action<P, E> = Box::new(move |payload| {
    let target = Arc::clone(&forward_target);
    Box::pin(async move { target.forward(payload).await })
  });

  let backward: Action<P, E> = Box::new(move |payload| {
    let target = Arc::clone(&action);
    Box::pin(async move { target.backward(payload).await })
  });

  (forward, backward)
}
