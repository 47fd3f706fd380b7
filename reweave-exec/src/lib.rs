//! Monte-Carlo plan execution and the act-plan-repair controller.

pub mod actor;
pub mod executor;

pub use actor::{Actor, ActorError};
pub use executor::{DeviationHandler, ExecutionRecord, MonteCarloExecutor};
