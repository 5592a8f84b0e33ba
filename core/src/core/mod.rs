pub mod action;
pub(crate) mod message;
pub mod payload;
pub mod state;
pub mod step;

pub use action::{Action, ActionFuture, SagaAction};
pub use message::SagaId;
pub use payload::Payload;
pub use state::{Phase, Position, SagaOutcome, SagaState};
pub use step::{RollbackPredicate, Step};
