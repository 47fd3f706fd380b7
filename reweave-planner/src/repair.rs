//! The repair engine: localized re-expansion of the solution tree after an
//! execution failure, escalating upward only as far as necessary.

use crate::error::RepairError;
use crate::planner::Planner;
use crate::tree::{NodeId, NodeStatus, ROOT};
use reweave_core::{ActionCall, State};
use std::collections::BTreeMap;
use tracing::{debug, trace};

impl Planner {
    /// Repair the stored solution tree for a failure at `fail_index` (the
    /// zero-based position of the failed action within the current plan),
    /// given the world state observed after the failure.
    ///
    /// A LIFO stack of (node, state) frames drives the escalation: each
    /// frame's node is reopened and re-expanded from the frame's state;
    /// when its methods are spent the frame climbs to the parent. A
    /// re-expansion that closes the node is validated by deterministic,
    /// deviation-free simulation of the remaining plan; a simulated failure
    /// pushes a new frame and the loop continues. On success returns the
    /// new plan and the index execution should resume from.
    pub fn replan(
        &mut self,
        state: &State,
        fail_index: usize,
    ) -> Result<(Vec<ActionCall>, usize), RepairError> {
        let original_children = self.tree.children(ROOT).to_vec();
        let action_ids = self.tree.action_nodes();
        let &fail_node = action_ids
            .get(fail_index)
            .ok_or(RepairError::InvalidFailureIndex(fail_index))?;

        // the failing node is an action; repair starts at its parent
        let mut node_stack: Vec<NodeId> = vec![self.tree.parent(fail_node).unwrap_or(ROOT)];
        let mut state_stack: Vec<State> = vec![state.clone()];
        let mut repaired: Option<(Vec<ActionCall>, usize)> = None;

        if self.config().verbose > 0 {
            debug!(fail_index, "repairing plan");
        }

        while let Some(&top) = node_stack.first() {
            if top == ROOT {
                break;
            }
            if self.config().verbose > 2 {
                trace!(?node_stack, "repair escalation");
            }
            let true_state = state_stack[0].clone();
            let parent = self.tree.parent(top).unwrap_or(ROOT);

            // unexpand the node and put it back to its pristine visit state
            self.tree.remove_descendants(top);
            {
                let node = self.tree.node_mut(top);
                node.status = NodeStatus::Open;
                node.reset_visit();
            }
            // the frame now points one level up, ready to escalate
            node_stack[0] = parent;

            let has_methods = self
                .tree
                .node(top)
                .search
                .as_ref()
                .is_some_and(|search| !search.available.is_empty());

            if !has_methods {
                // dead end: climb, but first drop the previous frame when
                // escalation past the grandparent would orphan it
                if parent != ROOT {
                    if let Some(grandparent) = self.tree.parent(parent) {
                        if node_stack.len() > 1 {
                            let previous = node_stack[1];
                            if self.tree.contains(previous)
                                && self.tree.is_ancestor(grandparent, previous)
                            {
                                node_stack.remove(0);
                                state_stack.remove(0);
                            }
                        }
                    }
                }
                continue;
            }

            // re-expand under the parent from the frame's state
            self.state = true_state.clone();
            let marked = self.refine_under(parent)?;
            if !self.tree.contains(top) || self.tree.node(top).is_open() {
                // no method survived; escalate with the same frame
                continue;
            }

            // the re-expansion closed the node: rebuild the plan and find
            // where execution resumes — the first action at or after the
            // first node the re-expansion refined
            let preorder = self.tree.preorder(ROOT);
            let order: BTreeMap<NodeId, usize> = preorder
                .iter()
                .enumerate()
                .map(|(position, &id)| (id, position))
                .collect();
            let plan_ids: Vec<NodeId> = preorder
                .iter()
                .copied()
                .filter(|&id| self.tree.node(id).kind.is_action())
                .collect();
            let plan: Vec<ActionCall> = plan_ids
                .iter()
                .filter_map(|&id| self.tree.node(id).kind.action_call().cloned())
                .collect();
            let mark = marked
                .filter(|&m| self.tree.contains(m))
                .unwrap_or(top);
            let mark_position = order.get(&mark).copied().unwrap_or(0);
            let resume = plan_ids
                .iter()
                .position(|id| order[id] >= mark_position)
                .unwrap_or(plan.len());

            let (sim_state, sim_index, ok) = self.simulate_plan(&true_state, &plan, resume);
            if ok {
                if self.config().verbose > 1 {
                    debug!(resume, len = plan.len(), "repair simulation succeeded");
                }
                repaired = Some((plan, resume));
                break;
            }
            // simulation hit a new failure: repair that context first
            if self.config().verbose > 1 {
                debug!(index = sim_index, "repair simulation failed, pushing frame");
            }
            let failed_parent = self.tree.parent(plan_ids[sim_index]).unwrap_or(ROOT);
            node_stack.insert(0, failed_parent);
            state_stack.insert(0, sim_state);
        }

        // a repair that drops a top-level to-do item is no repair at all
        if self.tree.children(ROOT) != original_children.as_slice() {
            return Err(RepairError::Infeasible {
                state: Box::new(state.clone()),
                failed_at: fail_index,
            });
        }
        match repaired {
            Some((plan, resume)) => {
                self.sol_plan = plan.clone();
                Ok((plan, resume))
            }
            None => Err(RepairError::Exhausted {
                state: Box::new(state.clone()),
                failed_at: fail_index,
            }),
        }
    }
}
