// sagaflow/src/saga/mod.rs

//! Saga definition, its builder, the engine handle and the dispatch loop that runs instances.

pub mod builder;
pub mod config;
pub mod definition;
pub mod dispatch;
pub mod engine;

pub use builder::SagaBuilder;
pub use config::{CompensationPolicy, SagaConfig};
pub use definition::SagaDefinition;
pub use dispatch::Dispatcher;
pub use engine::{SagaEngine, SagaHandle, SagaReport};
