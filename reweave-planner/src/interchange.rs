//! Plain-text interchange format for solution trees.
//!
//! Two sections between `==>` and `<==`, separated by a blank line. The
//! action section lists the plan's action leaves in pre-order, one
//! `<id> <name> <arg…>` line each. The decomposition section lists the
//! remaining nodes in pre-order: the root as `root <child_id…>`, tasks and
//! goals as `<id> <name> <arg…> -> <method> <child_id…>` (`-` when the node
//! closed without a method), and verify nodes as bare markers. A
//! caller-supplied name table may remap names, arguments, and method names
//! (never node ids or the structural keywords).
//!
//! The reader rebuilds a tree with identical action leaves, method choices,
//! and edges, then reconstructs every node's entry state by forward
//! simulation from a supplied initial state.

use crate::error::ReadError;
use crate::planner::Planner;
use crate::tree::{MethodSearch, Node, NodeId, NodeKind, NodeStatus, SolutionTree, ROOT};
use reweave_core::{
    ActionCall, ActionRegistry, Method, MethodRegistry, State, TaskCall, Unigoal, Value,
};
use std::collections::BTreeMap;

/// Render the tree in the interchange format.
pub fn write_solution_tree(
    tree: &SolutionTree,
    names: Option<&BTreeMap<String, String>>,
) -> String {
    let remap = |token: String| -> String {
        match names.and_then(|table| table.get(&token)) {
            Some(mapped) => mapped.clone(),
            None => token,
        }
    };

    let preorder = tree.preorder(ROOT);
    let mut out = String::from("==>\n");

    for &id in &preorder {
        if let NodeKind::Action(call) = &tree.node(id).kind {
            let mut tokens = vec![id.to_string(), remap(call.name.clone())];
            tokens.extend(call.args.iter().map(|arg| remap(arg.to_string())));
            out.push_str(&tokens.join(" "));
            out.push('\n');
        }
    }
    out.push('\n');

    for &id in &preorder {
        let node = tree.node(id);
        let mut tokens: Vec<String> = Vec::new();
        match &node.kind {
            NodeKind::Action(_) => continue,
            NodeKind::Root => {
                tokens.push("root".to_string());
                tokens.extend(node.children().iter().map(ToString::to_string));
            }
            NodeKind::VerifyGoal => {
                tokens.push(id.to_string());
                tokens.push("VerifyGoal".to_string());
            }
            NodeKind::VerifyMultigoal => {
                tokens.push(id.to_string());
                tokens.push("VerifyMultiGoal".to_string());
            }
            NodeKind::Task(call) => {
                tokens.push(id.to_string());
                tokens.push(remap(call.name.clone()));
                tokens.extend(call.args.iter().map(|arg| remap(arg.to_string())));
                push_expansion(&mut tokens, node, &remap);
            }
            NodeKind::Unigoal(goal) => {
                tokens.push(id.to_string());
                tokens.push(remap(goal.fluent.clone()));
                tokens.push(remap(goal.key.clone()));
                tokens.push(remap(goal.value.to_string()));
                push_expansion(&mut tokens, node, &remap);
            }
            NodeKind::Multigoal(goal) => {
                tokens.push(id.to_string());
                tokens.push("multigoal".to_string());
                tokens.push(remap(goal.goal_tag().to_string()));
                push_expansion(&mut tokens, node, &remap);
            }
        }
        out.push_str(&tokens.join(" "));
        out.push('\n');
    }
    out.push_str("<==\n");
    out
}

fn push_expansion(tokens: &mut Vec<String>, node: &Node, remap: &dyn Fn(String) -> String) {
    tokens.push("->".to_string());
    let method = node
        .search
        .as_ref()
        .and_then(|search| search.selected.as_ref())
        .map(|m| m.name().to_string());
    tokens.push(match method {
        Some(name) => remap(name),
        None => "-".to_string(),
    });
    tokens.extend(node.children().iter().map(ToString::to_string));
}

/// Reconstruct a solution tree from its text form.
///
/// Method choices are resolved by name against `methods`; every node's
/// entry state is rebuilt by simulating the plan's actions forward from
/// `initial_state`. Multigoal lines are rejected: their payload is an
/// object, not a name.
pub fn read_solution_tree(
    text: &str,
    initial_state: &State,
    methods: &MethodRegistry,
    actions: &ActionRegistry,
) -> Result<SolutionTree, ReadError> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let open = lines
        .iter()
        .position(|&l| l == "==>")
        .ok_or(ReadError::MissingDelimiter("==>"))?;
    let close = lines
        .iter()
        .position(|&l| l == "<==")
        .ok_or(ReadError::MissingDelimiter("<=="))?;
    let inner = &lines[open + 1..close];
    let split = inner.iter().position(|l| l.is_empty()).unwrap_or(inner.len());
    let (action_lines, decomposition_lines) = inner.split_at(split);

    let mut pending: BTreeMap<NodeId, (NodeKind, Option<MethodSearch>, Vec<NodeId>)> =
        BTreeMap::new();
    let mut root_children: Vec<NodeId> = Vec::new();

    for &line in action_lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ReadError::MalformedLine(line.to_string()));
        }
        let id = parse_id(tokens[0], line)?;
        let name = tokens[1].to_string();
        if !actions.contains(&name) {
            return Err(ReadError::UnknownName(name));
        }
        let args = tokens[2..].iter().map(|&t| Value::parse_token(t)).collect();
        insert_pending(
            &mut pending,
            id,
            (NodeKind::Action(ActionCall { name, args }), None, Vec::new()),
        )?;
    }

    for &line in decomposition_lines.iter().filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens[0] == "root" {
            root_children = tokens[1..]
                .iter()
                .map(|&t| parse_id(t, line))
                .collect::<Result<_, _>>()?;
            continue;
        }
        let id = parse_id(tokens[0], line)?;
        if tokens.len() == 2 && tokens[1] == "VerifyGoal" {
            insert_pending(&mut pending, id, (NodeKind::VerifyGoal, None, Vec::new()))?;
            continue;
        }
        if tokens.len() == 2 && tokens[1] == "VerifyMultiGoal" {
            insert_pending(&mut pending, id, (NodeKind::VerifyMultigoal, None, Vec::new()))?;
            continue;
        }
        let arrow = tokens
            .iter()
            .position(|&t| t == "->")
            .ok_or_else(|| ReadError::MalformedLine(line.to_string()))?;
        let (left, right) = tokens.split_at(arrow);
        let right = &right[1..]; // drop the arrow
        if left.len() < 2 || right.is_empty() {
            return Err(ReadError::MalformedLine(line.to_string()));
        }
        let name = left[1];
        if name == "multigoal" {
            return Err(ReadError::UnsupportedNode);
        }
        let children = right[1..]
            .iter()
            .map(|&t| parse_id(t, line))
            .collect::<Result<Vec<_>, _>>()?;

        let (kind, candidates) = if let Some(task_methods) = methods.task_methods(name) {
            let args = left[2..].iter().map(|&t| Value::parse_token(t)).collect();
            (
                NodeKind::Task(TaskCall::new(name, args)),
                task_methods.to_vec(),
            )
        } else if let Some(goal_methods) = methods.unigoal_methods(name) {
            if left.len() != 4 {
                return Err(ReadError::MalformedLine(line.to_string()));
            }
            let goal = Unigoal::new(name, left[2], Value::parse_token(left[3]));
            (NodeKind::Unigoal(goal), goal_methods.to_vec())
        } else if left.len() == 4 && right[0] == "-" {
            // a goal over an unregistered fluent that closed as satisfied
            let goal = Unigoal::new(name, left[2], Value::parse_token(left[3]));
            (NodeKind::Unigoal(goal), Vec::new())
        } else {
            return Err(ReadError::UnknownName(name.to_string()));
        };

        let mut search = MethodSearch::new(candidates);
        if right[0] != "-" {
            let selected: Option<Method> = search
                .methods()
                .iter()
                .find(|m| m.name() == right[0])
                .cloned();
            match selected {
                Some(method) => search.selected = Some(method),
                None => {
                    return Err(ReadError::UnknownMethod {
                        name: name.to_string(),
                        method: right[0].to_string(),
                    })
                }
            }
        }
        insert_pending(&mut pending, id, (kind, Some(search), children))?;
    }

    // assemble the arena
    let mut tree = SolutionTree::new();
    let mut max_id = ROOT;
    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    for (&id, _) in &pending {
        if id == ROOT {
            return Err(ReadError::DuplicateNode(ROOT));
        }
        max_id = max_id.max(id);
    }
    for (id, (kind, search, children)) in pending {
        for &child in &children {
            edges.push((id, child));
        }
        tree.insert_detached(Node {
            id,
            parent: None,
            children: Vec::new(),
            kind,
            status: NodeStatus::Closed,
            depth: 0,
            entry_state: None,
            search,
        });
    }
    for &child in &root_children {
        if child == ROOT || !tree.contains(child) {
            return Err(ReadError::UndefinedNode(child));
        }
        tree.link(ROOT, child);
    }
    for (parent, child) in edges {
        if child == ROOT || !tree.contains(child) {
            return Err(ReadError::UndefinedNode(child));
        }
        tree.link(parent, child);
    }
    for id in 1..=max_id {
        if tree.contains(id) && tree.parent(id).is_none() {
            return Err(ReadError::UnlinkedNode(id));
        }
    }
    for id in tree.preorder(ROOT) {
        if id == ROOT {
            continue;
        }
        let depth = tree.node(tree.parent(id).unwrap_or(ROOT)).depth + 1;
        tree.node_mut(id).depth = depth;
    }
    tree.set_next_id(max_id + 1);

    assign_entry_states(&mut tree, initial_state, actions)?;
    Ok(tree)
}

/// Rebuild every node's entry state by forward simulation: each action leaf
/// gets its pre-action state, each internal node the entry state of its
/// leftmost action descendant, and action-free nodes inherit from the next
/// node in pre-order (the final state at the tail).
fn assign_entry_states(
    tree: &mut SolutionTree,
    initial_state: &State,
    actions: &ActionRegistry,
) -> Result<(), ReadError> {
    let preorder = tree.preorder(ROOT);
    let plan_ids: Vec<NodeId> = preorder
        .iter()
        .copied()
        .filter(|&id| tree.node(id).kind.is_action())
        .collect();

    let mut states = vec![initial_state.clone()];
    for (index, &id) in plan_ids.iter().enumerate() {
        let call = tree
            .node(id)
            .kind
            .action_call()
            .cloned()
            .ok_or(ReadError::SimulationFailed(index))?;
        let current = states
            .last()
            .cloned()
            .ok_or(ReadError::SimulationFailed(index))?;
        let next = actions
            .invoke(&call.name, &current, &call.args)
            .ok_or(ReadError::SimulationFailed(index))?;
        states.push(next);
    }

    // leftmost action descendant wins: assign in reverse plan order
    for (index, &action_id) in plan_ids.iter().enumerate().rev() {
        let pre_state = states[index].clone();
        tree.node_mut(action_id).entry_state = Some(pre_state.clone());
        for ancestor in tree.ancestors(action_id) {
            if ancestor != ROOT {
                tree.node_mut(ancestor).entry_state = Some(pre_state.clone());
            }
        }
    }

    // nodes with no action descendant copy from their pre-order successor
    let reversed: Vec<NodeId> = preorder.iter().rev().copied().collect();
    for (position, &id) in reversed.iter().enumerate() {
        if id == ROOT || tree.node(id).entry_state.is_some() {
            continue;
        }
        let inherited = if position == 0 {
            states.last().cloned()
        } else {
            tree.node(reversed[position - 1]).entry_state.clone()
        };
        tree.node_mut(id).entry_state = inherited;
    }
    Ok(())
}

fn parse_id(token: &str, line: &str) -> Result<NodeId, ReadError> {
    token
        .parse::<NodeId>()
        .map_err(|_| ReadError::MalformedLine(line.to_string()))
}

fn insert_pending(
    pending: &mut BTreeMap<NodeId, (NodeKind, Option<MethodSearch>, Vec<NodeId>)>,
    id: NodeId,
    entry: (NodeKind, Option<MethodSearch>, Vec<NodeId>),
) -> Result<(), ReadError> {
    if pending.insert(id, entry).is_some() {
        return Err(ReadError::DuplicateNode(id));
    }
    Ok(())
}

impl Planner {
    /// Render the stored solution tree in the interchange format.
    pub fn write_solution(&self, names: Option<&BTreeMap<String, String>>) -> String {
        write_solution_tree(self.tree(), names)
    }

    /// Replace the stored solution tree with one read from `text`,
    /// reconstructing node states by simulation from `initial_state`.
    pub fn load_solution(&mut self, text: &str, initial_state: &State) -> Result<(), ReadError> {
        let tree = read_solution_tree(text, initial_state, self.methods(), self.actions())?;
        self.sol_plan = tree.plan();
        self.original_children = tree.children(ROOT).to_vec();
        self.tree = tree;
        Ok(())
    }
}
