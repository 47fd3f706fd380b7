//! The act-plan-repair controller.

use crate::executor::MonteCarloExecutor;
use reweave_core::{ActionCall, State, TodoItem};
use reweave_planner::{PlanError, Planner, RepairError};
use thiserror::Error;
use tracing::{debug, trace};

/// Why a to-do run gave up. Both variants carry everything the caller needs
/// to diagnose the stop: the repair case additionally reports the actions
/// committed so far, the last good state, and the plan index of the final
/// failure.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("planning failed: {source}")]
    Planning {
        #[source]
        source: PlanError,
    },

    #[error("plan repair failed at index {failed_at}: {source}")]
    Repair {
        #[source]
        source: RepairError,
        history: Vec<ActionCall>,
        state: Box<State>,
        failed_at: usize,
    },
}

/// Drives a plan to completion against a stochastic executor, repairing the
/// solution tree whenever execution diverges.
pub struct Actor {
    pub planner: Planner,
    pub executor: MonteCarloExecutor,
}

impl Actor {
    pub fn new(planner: Planner, executor: MonteCarloExecutor) -> Self {
        Self { planner, executor }
    }

    /// Plan, execute, and repair until every to-do item is discharged.
    /// Returns the committed action history: exactly the actions whose
    /// effects survived into the final state, in execution order.
    pub fn execute_to_do(
        &mut self,
        initial_state: &State,
        to_do_list: &[TodoItem],
    ) -> Result<Vec<ActionCall>, ActorError> {
        let mut plan = self
            .planner
            .plan(initial_state, to_do_list)
            .map_err(|source| ActorError::Planning { source })?;
        debug!(len = plan.len(), "initial plan");

        let mut history: Vec<ActionCall> = Vec::new();
        let mut cursor = 0usize;
        let mut current = initial_state.clone();

        loop {
            let records = self.executor.run(&current, &plan[cursor..]);
            let succeeded = records
                .last()
                .is_some_and(|(_, state)| state.is_some());

            if succeeded {
                history.extend(records.into_iter().skip(1).filter_map(|(call, _)| call));
                debug!(len = history.len(), "plan executed");
                return Ok(history);
            }

            // the trace ends at its first failure
            let k = records.len() - 1;
            history.extend(
                records[1..k]
                    .iter()
                    .filter_map(|(call, _)| call.clone()),
            );
            cursor += k - 1;
            let last_good = match records[k - 1].1.clone() {
                Some(state) => state,
                // unreachable: only the final record carries no state
                None => current.clone(),
            };
            trace!(cursor, "execution failed");
            current = last_good;

            match self.planner.replan(&current, cursor) {
                Ok((new_plan, resume)) => {
                    debug!(resume, len = new_plan.len(), "plan repaired");
                    plan = new_plan;
                    // actions at or past the resume point are superseded by
                    // the repair; the repaired plan re-covers them
                    history.truncate(resume);
                    cursor = resume;
                }
                Err(source) => {
                    return Err(ActorError::Repair {
                        source,
                        history,
                        state: Box::new(current),
                        failed_at: cursor,
                    });
                }
            }
        }
    }
}
