//! Arena-backed solution tree.
//!
//! Nodes are keyed by stable, monotonically increasing integer ids with
//! explicit parent/child edges, so backtracking and repair can delete and
//! regrow subtrees in place without invalidating the rest of the tree.

use reweave_core::{ActionCall, DecompositionIter, Method, MultiGoal, TaskCall, Unigoal};
use reweave_core::State;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

pub type NodeId = usize;

/// Id of the synthetic root; its children are the top-level to-do items.
pub const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not yet (or no longer) successfully expanded.
    Open,
    /// Expansion succeeded; children exist for internal nodes.
    Closed,
}

/// Node kind plus its payload.
pub enum NodeKind {
    Root,
    Task(TaskCall),
    Action(ActionCall),
    Unigoal(Unigoal),
    Multigoal(MultiGoal),
    VerifyGoal,
    VerifyMultigoal,
}

impl NodeKind {
    pub fn is_action(&self) -> bool {
        matches!(self, NodeKind::Action(_))
    }

    pub fn action_call(&self) -> Option<&ActionCall> {
        match self {
            NodeKind::Action(call) => Some(call),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Root => write!(f, "root"),
            NodeKind::Task(call) => write!(f, "{}", call),
            NodeKind::Action(call) => write!(f, "{}", call),
            NodeKind::Unigoal(goal) => write!(f, "{}", goal),
            NodeKind::Multigoal(goal) => write!(f, "(multigoal {})", goal.name()),
            NodeKind::VerifyGoal => write!(f, "VerifyGoal"),
            NodeKind::VerifyMultigoal => write!(f, "VerifyMultiGoal"),
        }
    }
}

/// Per-visit method enumeration state of a Task / Unigoal / Multigoal node.
///
/// `methods` is the immutable registration-order candidate list; `available`
/// is what remains untried at this choice point; `instances` is the live
/// alternative stream of the selected (head) method.
pub struct MethodSearch {
    methods: Vec<Method>,
    pub available: VecDeque<Method>,
    pub selected: Option<Method>,
    pub instances: Option<DecompositionIter>,
}

impl MethodSearch {
    pub fn new(methods: Vec<Method>) -> Self {
        let available = methods.iter().cloned().collect();
        Self {
            methods,
            available,
            selected: None,
            instances: None,
        }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Restore the untouched search state: all methods available again, no
    /// selection, no live iterator.
    pub fn reset(&mut self) {
        self.available = self.methods.iter().cloned().collect();
        self.selected = None;
        self.instances = None;
    }
}

pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub depth: usize,
    /// Deep copy of the world state taken the first time the node is
    /// visited; restored on revisits after backtracking.
    pub entry_state: Option<State>,
    pub search: Option<MethodSearch>,
}

impl Node {
    pub fn is_open(&self) -> bool {
        self.status == NodeStatus::Open
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Clear the per-visit fields: snapshot gone, method search back to its
    /// initial state.
    pub fn reset_visit(&mut self) {
        self.entry_state = None;
        if let Some(search) = self.search.as_mut() {
            search.reset();
        }
    }

    pub fn label(&self) -> String {
        self.kind.to_string()
    }
}

/// The decomposition tree of one planning problem.
pub struct SolutionTree {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
}

impl SolutionTree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: BTreeMap::new(),
            next_id: 1,
        };
        tree.nodes.insert(
            ROOT,
            Node {
                id: ROOT,
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Root,
                status: NodeStatus::Closed,
                depth: 0,
                entry_state: None,
                search: None,
            },
        );
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).unwrap_or_else(|| panic!("node {} not in tree", id))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Append a child under `parent`; depth is derived, the id is fresh and
    /// never reused.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        search: Option<MethodSearch>,
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        let depth = self.node(parent).depth + 1;
        self.nodes.insert(
            id,
            Node {
                id,
                parent: Some(parent),
                children: Vec::new(),
                kind,
                status: NodeStatus::Open,
                depth,
                entry_state: None,
                search,
            },
        );
        self.node_mut(parent).children.push(id);
        id
    }

    /// Pre-order traversal of the subtree rooted at `from` (children in
    /// insertion order), `from` included.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Proper ancestors of `id`, nearest first, root last.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            chain.push(p);
            current = self.parent(p);
        }
        chain
    }

    /// True when `ancestor` lies strictly above `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.preorder(id).into_iter().skip(1).collect()
    }

    /// Delete the whole subtree below `id`; `id` itself stays, childless.
    pub fn remove_descendants(&mut self, id: NodeId) {
        for gone in self.descendants(id) {
            self.nodes.remove(&gone);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children.clear();
        }
    }

    /// Action leaves in pre-order: the node ids of the current plan.
    pub fn action_nodes(&self) -> Vec<NodeId> {
        self.preorder(ROOT)
            .into_iter()
            .filter(|&id| self.node(id).kind.is_action())
            .collect()
    }

    /// The current plan: action calls in pre-order.
    pub fn plan(&self) -> Vec<ActionCall> {
        self.action_nodes()
            .into_iter()
            .filter_map(|id| self.node(id).kind.action_call().cloned())
            .collect()
    }

    pub(crate) fn insert_detached(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
    }

    pub(crate) fn set_next_id(&mut self, next: NodeId) {
        self.next_id = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> NodeKind {
        NodeKind::Task(TaskCall::new(name, Vec::new()))
    }

    fn action(name: &str) -> NodeKind {
        NodeKind::Action(ActionCall::new(name, Vec::new()))
    }

    #[test]
    fn preorder_follows_insertion_order() {
        let mut tree = SolutionTree::new();
        let t1 = tree.add_child(ROOT, task("t1"), Some(MethodSearch::new(Vec::new())));
        let a1 = tree.add_child(t1, action("a1"), None);
        let a2 = tree.add_child(t1, action("a2"), None);
        let t2 = tree.add_child(ROOT, task("t2"), Some(MethodSearch::new(Vec::new())));

        assert_eq!(tree.preorder(ROOT), vec![ROOT, t1, a1, a2, t2]);
        assert_eq!(tree.action_nodes(), vec![a1, a2]);
        assert_eq!(tree.node(a2).depth, 2);
    }

    #[test]
    fn ancestors_and_descendants() {
        let mut tree = SolutionTree::new();
        let t1 = tree.add_child(ROOT, task("t1"), None);
        let t2 = tree.add_child(t1, task("t2"), None);
        let a1 = tree.add_child(t2, action("a1"), None);

        assert_eq!(tree.ancestors(a1), vec![t2, t1, ROOT]);
        assert!(tree.is_ancestor(ROOT, a1));
        assert!(tree.is_ancestor(t1, a1));
        assert!(!tree.is_ancestor(a1, t1));
        assert!(!tree.is_ancestor(a1, a1));
        assert_eq!(tree.descendants(t1), vec![t2, a1]);
    }

    #[test]
    fn remove_descendants_keeps_the_node() {
        let mut tree = SolutionTree::new();
        let t1 = tree.add_child(ROOT, task("t1"), None);
        let a1 = tree.add_child(t1, action("a1"), None);
        let a2 = tree.add_child(t1, action("a2"), None);

        tree.remove_descendants(t1);
        assert!(tree.contains(t1));
        assert!(!tree.contains(a1));
        assert!(!tree.contains(a2));
        assert!(tree.children(t1).is_empty());

        // ids are never reused
        let a3 = tree.add_child(t1, action("a3"), None);
        assert!(a3 > a2);
    }

    #[test]
    fn ids_are_stable_under_unrelated_removal(){
        let mut tree = SolutionTree::new();
        let t1 = tree.add_child(ROOT, task("t1"), None);
        let t2 = tree.add_child(ROOT, task("t2"), None);
        let a1 = tree.add_child(t1, action("a1"), None);
        tree.remove_descendants(t2);
        assert!(tree.contains(a1));
        assert_eq!(tree.children(ROOT), &[t1, t2]);
    }
}
