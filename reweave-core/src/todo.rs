use crate::multigoal::MultiGoal;
use crate::state::{State, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A ground action invocation: primitive, directly executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    pub args: Vec<Value>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_call(f, &self.name, &self.args)
    }
}

/// A compound task invocation, to be decomposed by task methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCall {
    pub name: String,
    pub args: Vec<Value>,
}

impl TaskCall {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl fmt::Display for TaskCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_call(f, &self.name, &self.args)
    }
}

/// A single state predicate: `state.fluent[key] == value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unigoal {
    pub fluent: String,
    pub key: String,
    pub value: Value,
}

impl Unigoal {
    pub fn new(fluent: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fluent: fluent.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_satisfied(&self, state: &State) -> bool {
        state.matches(&self.fluent, &self.key, &self.value)
    }
}

impl fmt::Display for Unigoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.fluent, self.key, self.value)
    }
}

/// One entry of a to-do list or method decomposition.
///
/// Dispatch is on the tag: actions execute, tasks and goals refine through
/// their registries.
#[derive(Debug, Clone, PartialEq)]
pub enum TodoItem {
    Action(ActionCall),
    Task(TaskCall),
    Unigoal(Unigoal),
    Multigoal(MultiGoal),
}

impl TodoItem {
    pub fn action(name: impl Into<String>, args: Vec<Value>) -> Self {
        TodoItem::Action(ActionCall::new(name, args))
    }

    pub fn task(name: impl Into<String>, args: Vec<Value>) -> Self {
        TodoItem::Task(TaskCall::new(name, args))
    }

    pub fn unigoal(
        fluent: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        TodoItem::Unigoal(Unigoal::new(fluent, key, value))
    }

    pub fn multigoal(goal: MultiGoal) -> Self {
        TodoItem::Multigoal(goal)
    }
}

impl fmt::Display for TodoItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TodoItem::Action(a) => write!(f, "{}", a),
            TodoItem::Task(t) => write!(f, "{}", t),
            TodoItem::Unigoal(g) => write!(f, "{}", g),
            TodoItem::Multigoal(m) => write!(f, "(multigoal {})", m.name()),
        }
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[Value]) -> fmt::Result {
    write!(f, "({}", name)?;
    for arg in args {
        write!(f, " {}", arg)?;
    }
    write!(f, ")")
}
