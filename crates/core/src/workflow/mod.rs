pub mod engine;

pub use engine::{decide, open_flow, DecidedStep, Decision, WorkflowError};
