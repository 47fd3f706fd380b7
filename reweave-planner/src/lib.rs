//! Iterative, refinement-based HTN/HGN planner with in-place plan repair.
//!
//! The planner decomposes a to-do list of tasks and goals into primitive
//! actions by expanding a solution tree node by node, depth first, with
//! chronological backtracking over method choices. When execution diverges
//! from the plan, [`Planner::replan`] repairs the existing tree locally
//! instead of replanning from scratch.

pub mod config;
pub mod error;
pub mod interchange;
pub mod planner;
pub mod tree;

mod repair;

pub use config::PlannerConfig;
pub use error::{PlanError, ReadError, RepairError};
pub use interchange::{read_solution_tree, write_solution_tree};
pub use planner::Planner;
pub use tree::{MethodSearch, Node, NodeId, NodeKind, NodeStatus, SolutionTree, ROOT};
