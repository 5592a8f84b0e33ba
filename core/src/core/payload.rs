// sagaflow/src/core/payload.rs
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared handle to the business payload a saga instance carries from step to step.
///
/// Every forward and compensating action receives a clone of the same handle, so an
/// action can record what it did (a reservation id, a charge reference) for the
/// compensation that may later undo it.
///
/// IMPORTANT: Lock guards obtained from this struct are blocking and MUST NOT
/// be held across `.await` suspension points.
#[derive(Debug)]
pub struct Payload<T: Send + Sync + 'static>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> Payload<T> {
  pub fn new(data: T) -> Self {
    Payload(Arc::new(RwLock::new(data)))
  }

  /// Acquires a read lock. The returned guard MUST be dropped before any `.await` point.
  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.0.read()
  }

  /// Acquires a write lock. The returned guard MUST be dropped before any `.await` point.
  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.0.write()
  }

  pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
    self.0.try_read()
  }

  pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
    self.0.try_write()
  }

  // e.g. payload.map_read(|order| &order.customer_id)
  pub fn map_read<F, U: ?Sized>(&self, f: F) -> MappedRwLockReadGuard<'_, U>
  where
    F: FnOnce(&T) -> &U,
  {
    RwLockReadGuard::map(self.read(), f)
  }

  pub fn map_write<F, U: ?Sized>(&self, f: F) -> MappedRwLockWriteGuard<'_, U>
  where
    F: FnOnce(&mut T) -> &mut U,
  {
    RwLockWriteGuard::map(self.write(), f)
  }

  /// Clones the current value out of the lock.
  pub fn snapshot(&self) -> T
  where
    T: Clone,
  {
    self.read().clone()
  }

  /// Consumes the handle and returns the inner value if no other clone is alive.
  pub fn try_into_inner(self) -> Result<T, Self> {
    Arc::try_unwrap(self.0).map(RwLock::into_inner).map_err(Payload)
  }
}

impl<T: Send + Sync + 'static> Clone for Payload<T> {
  fn clone(&self) -> Self {
    Payload(Arc::clone(&self.0))
  }
}

impl<T: Send + Sync + 'static + Default> Default for Payload<T> {
  fn default() -> Self {
    Self::new(Default::default())
  }
}

impl<T: Send + Sync + 'static> From<T> for Payload<T> {
  fn from(data: T) -> Self {
    Self::new(data)
  }
}
