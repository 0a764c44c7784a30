pub mod algorithms;
pub mod engine;
pub mod state_machine;

pub use engine::EventEngine;
pub use state_machine::{EventStateMachine, Transition};
