pub mod engine;
pub mod states;

pub use engine::{FlowEngine, TransitionError};
pub use states::{RouterAction, RouterEvent, RouterState, TransitionOutcome};
