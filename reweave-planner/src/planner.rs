//! The refinement engine: depth-first iterative expansion of the solution
//! tree with chronological backtracking over method choices and bindings.

use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::tree::{MethodSearch, NodeId, NodeKind, NodeStatus, SolutionTree, ROOT};
use reweave_core::{
    ActionCall, ActionRegistry, Decomposition, MethodPayload, MethodRegistry, MultiGoal, State,
    TaskCall, TodoItem, Unigoal, Value,
};
use std::collections::HashSet;
use tracing::{debug, trace};

/// HTN/HGN planner.
///
/// Owns the method and action registries, the live world state of the
/// current run, and the solution tree. `plan` produces an action sequence;
/// `replan` (see the repair module) patches the tree after an execution
/// failure.
pub struct Planner {
    methods: MethodRegistry,
    actions: ActionRegistry,
    config: PlannerConfig,
    pub(crate) state: State,
    task_list: Vec<TodoItem>,
    pub(crate) sol_plan: Vec<ActionCall>,
    pub(crate) tree: SolutionTree,
    blacklist: HashSet<ActionCall>,
    pub(crate) iterations: usize,
    node_expansions: usize,
    max_depth: Option<usize>,
    pub(crate) original_children: Vec<NodeId>,
}

impl Planner {
    pub fn new(methods: MethodRegistry, actions: ActionRegistry) -> Self {
        Self {
            methods,
            actions,
            config: PlannerConfig::default(),
            state: State::default(),
            task_list: Vec::new(),
            sol_plan: Vec::new(),
            tree: SolutionTree::new(),
            blacklist: HashSet::new(),
            iterations: 0,
            node_expansions: 0,
            max_depth: None,
            original_children: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Loop iterations spent so far, across planning and repair. External
    /// policies can budget work by watching this counter.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Nodes refined so far, across planning and repair.
    pub fn node_expansions(&self) -> usize {
        self.node_expansions
    }

    /// The most recent plan: pre-order action leaves of the solution tree.
    pub fn solution_plan(&self) -> &[ActionCall] {
        &self.sol_plan
    }

    pub fn tree(&self) -> &SolutionTree {
        &self.tree
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// Mark a specific ground action invocation as unusable; it fails from
    /// now on as if its preconditions were unmet.
    pub fn blacklist(&mut self, call: ActionCall) {
        self.blacklist.insert(call);
    }

    /// Find a plan discharging `to_do_list` from `state`.
    pub fn plan(
        &mut self,
        state: &State,
        to_do_list: &[TodoItem],
    ) -> Result<Vec<ActionCall>, PlanError> {
        self.state = state.clone();
        self.task_list = to_do_list.to_vec();
        self.sol_plan.clear();
        self.tree = SolutionTree::new();
        self.iterations = 0;
        self.max_depth = self.config.initial_max_depth.or(self.config.depth_step_size);

        if self.config.verbose > 0 {
            debug!(
                state = %state.name(),
                items = to_do_list.len(),
                max_depth = ?self.max_depth,
                "planning"
            );
        }

        self.install_root_children()?;
        if self.task_list.is_empty() {
            return Ok(Vec::new());
        }

        loop {
            self.refine_under(ROOT)?;
            self.sol_plan = self.tree.plan();

            // only the root surviving means the depth cap starved the search
            if self.tree.len() > 1 {
                break;
            }
            let Some(step) = self.config.depth_step_size else {
                break;
            };
            let deepened = self.max_depth.unwrap_or(0) + step;
            if self.config.verbose > 0 {
                debug!(max_depth = deepened, "no solution within depth cap, deepening");
            }
            self.install_root_children()?;
            self.max_depth = Some(deepened);
        }

        if self.tree.children(ROOT) != self.original_children.as_slice() {
            if self.config.verbose > 0 {
                debug!("no plan possible");
            }
            return Err(PlanError::Infeasible);
        }
        if self.config.verbose > 0 {
            debug!(len = self.sol_plan.len(), iterations = self.iterations, "plan found");
        }
        Ok(self.sol_plan.clone())
    }

    /// Simulate the stored plan from `start_index` on `state` with the
    /// deterministic action functions. Returns the visited states, starting
    /// with `state` itself; stops before the first inapplicable action.
    pub fn simulate(&self, state: &State, start_index: usize) -> Vec<State> {
        let mut states = vec![state.clone()];
        let mut current = state.clone();
        for call in self.sol_plan.iter().skip(start_index) {
            match self.actions.invoke(&call.name, &current, &call.args) {
                Some(next) => {
                    states.push(next.clone());
                    current = next;
                }
                None => break,
            }
        }
        states
    }

    /// Deviation-free forward run of `plan[start..]` from `state`. Returns
    /// the last reachable state, the absolute index reached, and whether
    /// the whole suffix applied.
    pub(crate) fn simulate_plan(
        &self,
        state: &State,
        plan: &[ActionCall],
        start: usize,
    ) -> (State, usize, bool) {
        let mut current = state.clone();
        for (offset, call) in plan.iter().skip(start).enumerate() {
            match self.actions.invoke(&call.name, &current, &call.args) {
                Some(next) => current = next,
                None => return (current, start + offset, false),
            }
        }
        (current, plan.len().saturating_sub(1), true)
    }

    /// Install the top-level to-do list as root children and remember the
    /// child ids for the final feasibility check.
    fn install_root_children(&mut self) -> Result<(), PlanError> {
        let items = self.task_list.clone();
        self.add_children(ROOT, &items)?;
        self.original_children = self.tree.children(ROOT).to_vec();
        Ok(())
    }

    /// Depth-first expansion of every open node under `subroot`. Returns
    /// the first open node encountered, which repair uses as the resume
    /// mark.
    pub(crate) fn refine_under(&mut self, subroot: NodeId) -> Result<Option<NodeId>, PlanError> {
        let mut parent = subroot;
        let mut marked: Option<NodeId> = None;
        loop {
            self.iterations += 1;
            // climbed above the subtree under refinement: done
            if self.tree.is_ancestor(parent, subroot) {
                break;
            }
            let open_child = self
                .tree
                .children(parent)
                .iter()
                .copied()
                .find(|&child| self.tree.node(child).is_open());
            match open_child {
                Some(node_id) => {
                    marked.get_or_insert(node_id);
                    if self.config.verbose > 1 {
                        debug!(
                            iteration = self.iterations,
                            node = %self.tree.node(node_id).label(),
                            "refining"
                        );
                    }
                    parent = self.refine_node(node_id, parent)?;
                }
                None => {
                    if parent == subroot {
                        break;
                    }
                    match self.tree.parent(parent) {
                        Some(up) => parent = up,
                        None => break,
                    }
                }
            }
        }
        Ok(marked)
    }

    /// Refine one open node; returns the `current_parent` for the next
    /// iteration of the main loop.
    fn refine_node(&mut self, node_id: NodeId, parent: NodeId) -> Result<NodeId, PlanError> {
        self.node_expansions += 1;

        // First visit: snapshot the world. Revisit of a method-search node:
        // the engine backtracked here, roll the world back to the snapshot.
        {
            let node = self.tree.node_mut(node_id);
            match node.entry_state.clone() {
                Some(snapshot) => {
                    if node.search.is_some() {
                        self.state = snapshot;
                    }
                }
                None => node.entry_state = Some(self.state.clone()),
            }
        }

        match &self.tree.node(node_id).kind {
            NodeKind::Action(call) => {
                let call = call.clone();
                self.refine_action(node_id, parent, call)
            }
            NodeKind::Task(call) => {
                let call = call.clone();
                self.refine_task(node_id, parent, call)
            }
            NodeKind::Unigoal(goal) => {
                let goal = goal.clone();
                self.refine_unigoal(node_id, parent, goal)
            }
            NodeKind::Multigoal(goal) => {
                let goal = goal.clone();
                self.refine_multigoal(node_id, parent, goal)
            }
            NodeKind::VerifyGoal => Ok(self.refine_verify_goal(node_id, parent)),
            NodeKind::VerifyMultigoal => Ok(self.refine_verify_multigoal(node_id, parent)),
            // the root is never open
            NodeKind::Root => Ok(parent),
        }
    }

    fn refine_action(
        &mut self,
        node_id: NodeId,
        parent: NodeId,
        call: ActionCall,
    ) -> Result<NodeId, PlanError> {
        let mut next_state = None;
        if !self.blacklist.contains(&call) {
            if let Some(candidate) = self.actions.invoke(&call.name, &self.state, &call.args) {
                if !self.branch_cyclic(&candidate, node_id) {
                    next_state = Some(candidate);
                }
            }
        }
        match next_state {
            Some(committed) => {
                self.tree.node_mut(node_id).status = NodeStatus::Closed;
                self.state = committed;
                if self.config.verbose > 2 {
                    trace!(action = %call, "action applied");
                }
                Ok(parent)
            }
            None => {
                if self.config.verbose > 2 {
                    trace!(action = %call, "action failed");
                }
                Ok(self.backtrack(parent, node_id))
            }
        }
    }

    fn refine_task(
        &mut self,
        node_id: NodeId,
        parent: NodeId,
        call: TaskCall,
    ) -> Result<NodeId, PlanError> {
        let decomposition = if self.within_depth(node_id) {
            self.next_decomposition(node_id, &MethodPayload::Args(&call.args))
        } else {
            None
        };
        if self.config.verbose > 2 {
            match decomposition {
                Some(_) => trace!(task = %call, "task refined"),
                None => trace!(task = %call, "task refinement failed"),
            }
        }
        self.close_or_backtrack(node_id, parent, decomposition)
    }

    fn refine_unigoal(
        &mut self,
        node_id: NodeId,
        parent: NodeId,
        goal: Unigoal,
    ) -> Result<NodeId, PlanError> {
        if goal.is_satisfied(&self.state) {
            if self.config.verbose > 2 {
                trace!(goal = %goal, "goal already achieved");
            }
            self.tree.node_mut(node_id).status = NodeStatus::Closed;
            self.add_children(node_id, &[])?; // verify child only
            return Ok(node_id);
        }
        let decomposition = if self.within_depth(node_id) {
            let payload = [Value::Str(goal.key.clone()), goal.value.clone()];
            self.next_decomposition(node_id, &MethodPayload::Args(&payload))
        } else {
            None
        };
        if self.config.verbose > 2 && decomposition.is_none() {
            trace!(goal = %goal, "goal refinement failed");
        }
        self.close_or_backtrack(node_id, parent, decomposition)
    }

    fn refine_multigoal(
        &mut self,
        node_id: NodeId,
        parent: NodeId,
        goal: MultiGoal,
    ) -> Result<NodeId, PlanError> {
        if goal.is_achieved(&self.state) {
            if self.config.verbose > 2 {
                trace!(multigoal = goal.name(), "multigoal already achieved");
            }
            self.tree.node_mut(node_id).status = NodeStatus::Closed;
            self.add_children(node_id, &[])?; // verify child only
            return Ok(node_id);
        }
        let decomposition = if self.within_depth(node_id) {
            self.next_decomposition(node_id, &MethodPayload::Multigoal(&goal))
        } else {
            None
        };
        if self.config.verbose > 2 && decomposition.is_none() {
            trace!(multigoal = goal.name(), "multigoal refinement failed");
        }
        self.close_or_backtrack(node_id, parent, decomposition)
    }

    fn refine_verify_goal(&mut self, node_id: NodeId, parent: NodeId) -> NodeId {
        let holds = match &self.tree.node(parent).kind {
            NodeKind::Unigoal(goal) => goal.is_satisfied(&self.state),
            _ => false,
        };
        if holds {
            self.tree.node_mut(node_id).status = NodeStatus::Closed;
            parent
        } else {
            if self.config.verbose > 2 {
                trace!(goal = %self.tree.node(parent).label(), "goal verification failed");
            }
            self.backtrack(parent, node_id)
        }
    }

    fn refine_verify_multigoal(&mut self, node_id: NodeId, parent: NodeId) -> NodeId {
        let holds = match &self.tree.node(parent).kind {
            NodeKind::Multigoal(goal) => goal.is_achieved(&self.state),
            _ => false,
        };
        if holds {
            self.tree.node_mut(node_id).status = NodeStatus::Closed;
            parent
        } else {
            if self.config.verbose > 2 {
                trace!(
                    multigoal = %self.tree.node(parent).label(),
                    "multigoal verification failed"
                );
            }
            self.backtrack(parent, node_id)
        }
    }

    fn within_depth(&self, node_id: NodeId) -> bool {
        self.max_depth
            .map_or(true, |cap| self.tree.node(node_id).depth < cap)
    }

    /// Advance the node's method search to the next untried decomposition:
    /// drain the head method's alternative stream, then move to the next
    /// method. `None` when every method is exhausted.
    fn next_decomposition(
        &mut self,
        node_id: NodeId,
        payload: &MethodPayload<'_>,
    ) -> Option<Decomposition> {
        loop {
            {
                let search = self.tree.node(node_id).search.as_ref()?;
                if search.available.is_empty() {
                    return None;
                }
            }
            let needs_instance = self
                .tree
                .node(node_id)
                .search
                .as_ref()
                .is_some_and(|s| s.instances.is_none());
            if needs_instance {
                let method = self
                    .tree
                    .node(node_id)
                    .search
                    .as_ref()
                    .and_then(|s| s.available.front())?
                    .clone();
                let stream = method.instantiate(&self.state, payload);
                let search = self.tree.node_mut(node_id).search.as_mut()?;
                search.selected = Some(method);
                search.instances = Some(stream);
            }
            let next = self
                .tree
                .node_mut(node_id)
                .search
                .as_mut()?
                .instances
                .as_mut()?
                .next();
            match next {
                Some(decomposition) => return Some(decomposition),
                None => {
                    // head method exhausted: drop it, try the next one
                    let search = self.tree.node_mut(node_id).search.as_mut()?;
                    search.available.pop_front();
                    search.instances = None;
                }
            }
        }
    }

    fn close_or_backtrack(
        &mut self,
        node_id: NodeId,
        parent: NodeId,
        decomposition: Option<Decomposition>,
    ) -> Result<NodeId, PlanError> {
        match decomposition {
            Some(items) => {
                self.tree.node_mut(node_id).status = NodeStatus::Closed;
                self.add_children(node_id, &items)?;
                Ok(node_id)
            }
            None => Ok(self.backtrack(parent, node_id)),
        }
    }

    /// Install a decomposition as ordered children of `parent`, dispatching
    /// each item by tag; goal parents get their synthetic verify child
    /// appended last.
    pub(crate) fn add_children(
        &mut self,
        parent: NodeId,
        items: &[TodoItem],
    ) -> Result<(), PlanError> {
        for item in items {
            match item {
                TodoItem::Action(call) => {
                    if !self.actions.contains(&call.name) {
                        return Err(PlanError::UnknownTodo {
                            name: call.name.clone(),
                        });
                    }
                    self.tree
                        .add_child(parent, NodeKind::Action(call.clone()), None);
                }
                TodoItem::Task(call) => {
                    let Some(methods) = self.methods.task_methods(&call.name) else {
                        return Err(PlanError::UnknownTodo {
                            name: call.name.clone(),
                        });
                    };
                    let search = MethodSearch::new(methods.to_vec());
                    self.tree
                        .add_child(parent, NodeKind::Task(call.clone()), Some(search));
                }
                TodoItem::Unigoal(goal) => {
                    // an unregistered fluent is still a valid goal if the
                    // state already satisfies it; otherwise the empty method
                    // list fails the node at refinement
                    let methods = self
                        .methods
                        .unigoal_methods(&goal.fluent)
                        .unwrap_or(&[])
                        .to_vec();
                    self.tree.add_child(
                        parent,
                        NodeKind::Unigoal(goal.clone()),
                        Some(MethodSearch::new(methods)),
                    );
                }
                TodoItem::Multigoal(goal) => {
                    let methods = self
                        .methods
                        .multigoal_methods(goal.goal_tag())
                        .unwrap_or(&[])
                        .to_vec();
                    self.tree.add_child(
                        parent,
                        NodeKind::Multigoal(goal.clone()),
                        Some(MethodSearch::new(methods)),
                    );
                }
            }
        }
        match self.tree.node(parent).kind {
            NodeKind::Unigoal(_) => {
                self.tree.add_child(parent, NodeKind::VerifyGoal, None);
            }
            NodeKind::Multigoal(_) => {
                self.tree.add_child(parent, NodeKind::VerifyMultigoal, None);
            }
            _ => {}
        }
        Ok(())
    }

    /// True when `candidate` reproduces the entry state of any proper
    /// ancestor of `node_id` (the root excluded): applying the action would
    /// revisit a world state already on this decomposition path.
    fn branch_cyclic(&self, candidate: &State, node_id: NodeId) -> bool {
        if !self.config.branch_cycle_check {
            return false;
        }
        self.tree
            .ancestors(node_id)
            .into_iter()
            .filter(|&ancestor| ancestor != ROOT)
            .any(|ancestor| self.tree.node(ancestor).entry_state.as_ref() == Some(candidate))
    }

    /// Chronological backtracking. Reset the failed node, then walk the
    /// subtree under `parent` in reverse pre-order: flip childless closed
    /// nodes back open (dropping their snapshots), and reopen the first
    /// closed node that still has descendants — the most recent surviving
    /// choice point. Its subtree is deleted; its retained snapshot and
    /// method-search state resume the enumeration at the next alternative.
    fn backtrack(&mut self, parent: NodeId, failed: NodeId) -> NodeId {
        if self.config.verbose > 2 {
            trace!(node = %self.tree.node(failed).label(), "backtracking");
        }
        self.tree.node_mut(failed).reset_visit();
        for id in self.tree.preorder(parent).into_iter().rev() {
            if id == ROOT {
                continue;
            }
            let (closed, has_children) = {
                let node = self.tree.node(id);
                (!node.is_open(), !node.children().is_empty())
            };
            if !closed {
                continue;
            }
            self.tree.node_mut(id).status = NodeStatus::Open;
            if has_children {
                self.tree.remove_descendants(id);
                if self.config.verbose > 2 {
                    trace!(node = %self.tree.node(id).label(), "reopened");
                }
                return self.tree.parent(id).unwrap_or(ROOT);
            }
            self.tree.node_mut(id).entry_state = None;
        }
        // no surviving choice point anywhere: the problem is infeasible
        self.tree.remove_descendants(ROOT);
        ROOT
    }
}
