use crate::multigoal::MultiGoal;
use crate::state::{State, Value};
use crate::todo::TodoItem;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One alternative expansion of a task or goal: an ordered list of to-do
/// items.
pub type Decomposition = Vec<TodoItem>;

/// Lazy, non-restartable sequence of alternative decompositions.
///
/// Each pulled item is an alternative at the same choice point. The engine
/// pulls only as needed, so the sequence may be infinite. An
/// immediately-empty sequence signals that the method is inapplicable; an
/// empty `Decomposition` is a valid "nothing left to do".
pub type DecompositionIter = Box<dyn Iterator<Item = Decomposition> + Send>;

type ArgsMethodFn = Arc<dyn Fn(&State, &[Value]) -> DecompositionIter + Send + Sync>;
type MultigoalMethodFn = Arc<dyn Fn(&State, &MultiGoal) -> DecompositionIter + Send + Sync>;

/// Payload handed to a method when it is instantiated.
pub enum MethodPayload<'a> {
    /// Task arguments, or `[key, desired]` for a unigoal method.
    Args(&'a [Value]),
    Multigoal(&'a MultiGoal),
}

#[derive(Clone)]
enum MethodBody {
    Args(ArgsMethodFn),
    Multigoal(MultigoalMethodFn),
}

/// A named decomposition method.
///
/// The name identifies the method in logs and in the solution-tree
/// interchange format; the body produces the alternatives. Bindings a
/// method needs beyond the live state (rigid data, tuning records) are
/// captured by its closure.
#[derive(Clone)]
pub struct Method {
    name: String,
    body: MethodBody,
}

impl Method {
    /// Method over positional arguments: task methods, and unigoal methods
    /// (which receive `[key, desired]`).
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&State, &[Value]) -> DecompositionIter + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: MethodBody::Args(Arc::new(f)),
        }
    }

    /// Method over a whole multigoal.
    pub fn for_multigoal<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&State, &MultiGoal) -> DecompositionIter + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: MethodBody::Multigoal(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the method's alternative stream for one visit of a node.
    pub fn instantiate(&self, state: &State, payload: &MethodPayload<'_>) -> DecompositionIter {
        match (&self.body, payload) {
            (MethodBody::Args(f), MethodPayload::Args(args)) => f(state, args),
            (MethodBody::Multigoal(f), MethodPayload::Multigoal(goal)) => f(state, goal),
            // payload kind is fixed by the node kind; a mismatch means the
            // method was declared in the wrong table
            _ => no_decomposition(),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

/// Yield exactly one decomposition.
pub fn single(decomposition: Decomposition) -> DecompositionIter {
    Box::new(std::iter::once(decomposition))
}

/// Yield nothing: the method does not apply.
pub fn no_decomposition() -> DecompositionIter {
    Box::new(std::iter::empty())
}

/// Yield the given decompositions left to right.
pub fn alternatives(decompositions: Vec<Decomposition>) -> DecompositionIter {
    Box::new(decompositions.into_iter())
}

/// Three keyed, ordered method tables: task methods by task name, unigoal
/// methods by fluent name, multigoal methods by goal tag. Registration
/// order is the order methods are tried.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    task_methods: BTreeMap<String, Vec<Method>>,
    unigoal_methods: BTreeMap<String, Vec<Method>>,
    multigoal_methods: BTreeMap<String, Vec<Method>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_task_methods(&mut self, task: impl Into<String>, methods: Vec<Method>) {
        self.task_methods.entry(task.into()).or_default().extend(methods);
    }

    pub fn declare_unigoal_methods(&mut self, fluent: impl Into<String>, methods: Vec<Method>) {
        self.unigoal_methods
            .entry(fluent.into())
            .or_default()
            .extend(methods);
    }

    pub fn declare_multigoal_methods(&mut self, goal_tag: impl Into<String>, methods: Vec<Method>) {
        self.multigoal_methods
            .entry(goal_tag.into())
            .or_default()
            .extend(methods);
    }

    pub fn task_methods(&self, task: &str) -> Option<&[Method]> {
        self.task_methods.get(task).map(Vec::as_slice)
    }

    pub fn unigoal_methods(&self, fluent: &str) -> Option<&[Method]> {
        self.unigoal_methods.get(fluent).map(Vec::as_slice)
    }

    pub fn multigoal_methods(&self, goal_tag: &str) -> Option<&[Method]> {
        self.multigoal_methods.get(goal_tag).map(Vec::as_slice)
    }

    pub fn has_task(&self, task: &str) -> bool {
        self.task_methods.contains_key(task)
    }
}

/// Ready-made multigoal method: decompose into every unachieved unigoal in
/// order, then the multigoal again so the remainder is re-checked.
pub fn split_multigoal() -> Method {
    Method::for_multigoal("split_multigoal", |state, goal| {
        let pending = goal.unachieved(state);
        if pending.is_empty() {
            return single(Vec::new());
        }
        let mut decomposition: Decomposition =
            pending.into_iter().map(TodoItem::Unigoal).collect();
        decomposition.push(TodoItem::Multigoal(goal.clone()));
        single(decomposition)
    })
}
