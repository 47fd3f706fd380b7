use reweave_core::State;
use thiserror::Error;

/// Failures surfaced by [`Planner::plan`](crate::Planner::plan).
#[derive(Debug, Error)]
pub enum PlanError {
    /// A to-do item's name matched no action, task, or goal registry entry.
    #[error("to-do item `{name}` matches no registered action, task, or multigoal tag")]
    UnknownTodo { name: String },

    /// Refinement backtracked past the root: no combination of methods and
    /// bindings discharges the to-do list.
    #[error("refinement backtracked past the root; the problem is infeasible")]
    Infeasible,
}

/// Failures surfaced by [`Planner::replan`](crate::Planner::replan). Both
/// repair outcomes carry the last known good state and the plan index at
/// which the failure was detected.
#[derive(Debug, Error)]
pub enum RepairError {
    /// The escalation stack emptied (or reached the root) without finding a
    /// re-expansion that survives simulation.
    #[error("plan repair exhausted all alternatives (failure at plan index {failed_at})")]
    Exhausted { state: Box<State>, failed_at: usize },

    /// Repair changed the root's children, dropping an original top-level
    /// to-do item.
    #[error("plan repair dropped a top-level to-do item (failure at plan index {failed_at})")]
    Infeasible { state: Box<State>, failed_at: usize },

    /// The failure index does not name an action of the current plan.
    #[error("failure index {0} is outside the current plan")]
    InvalidFailureIndex(usize),

    /// A re-expansion produced a to-do item that dispatches nowhere.
    #[error(transparent)]
    Planning(#[from] PlanError),
}

/// Failures while reading a solution tree back from its text form.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("missing `{0}` delimiter")]
    MissingDelimiter(&'static str),

    #[error("malformed line: `{0}`")]
    MalformedLine(String),

    #[error("`{0}` names no registered action, task, or goal fluent")]
    UnknownName(String),

    #[error("method `{method}` is not declared for `{name}`")]
    UnknownMethod { name: String, method: String },

    #[error("node {0} is referenced but never defined")]
    UndefinedNode(usize),

    #[error("node {0} is defined but referenced by no parent")]
    UnlinkedNode(usize),

    #[error("duplicate node id {0}")]
    DuplicateNode(usize),

    #[error("multigoal nodes cannot be reconstructed from text")]
    UnsupportedNode,

    #[error("action at plan index {0} is inapplicable while reconstructing states")]
    SimulationFailed(usize),
}
