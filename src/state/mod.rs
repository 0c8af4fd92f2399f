//! Durable, transition-validated agent state: the store and the generic
//! machine built on top of it.

pub mod machine;
pub mod snapshot;
pub mod store;

pub use machine::{BaseStateMachine, IsValidTransition};
pub use snapshot::{AgentSnapshot, ContextSnapshot, StateData, StateTransition};
pub use store::{FileStateStore, StateStore};
