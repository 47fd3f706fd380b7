//! Domain model for the reweave planner: world state, goals, to-do items,
//! and the action/method registries a planning domain is declared through.

pub mod actions;
pub mod methods;
pub mod multigoal;
pub mod state;
pub mod todo;

pub use actions::{ActionFn, ActionRegistry};
pub use methods::{
    alternatives, no_decomposition, single, split_multigoal, Decomposition, DecompositionIter,
    Method, MethodPayload, MethodRegistry,
};
pub use multigoal::MultiGoal;
pub use state::{Fluent, State, Value};
pub use todo::{ActionCall, TaskCall, TodoItem, Unigoal};
