use crate::state::{State, Value};
use crate::todo::Unigoal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named bundle of required fluent values.
///
/// Shaped like a partial state: map fluents only, each entry a value the
/// goal state must hold. The `goal_tag` selects which multigoal methods
/// apply during refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiGoal {
    name: String,
    goal_tag: String,
    goals: BTreeMap<String, BTreeMap<String, Value>>,
}

impl MultiGoal {
    pub fn new(name: impl Into<String>, goal_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal_tag: goal_tag.into(),
            goals: BTreeMap::new(),
        }
    }

    pub fn with_requirement(
        mut self,
        fluent: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.require(fluent, key, value);
        self
    }

    pub fn require(&mut self, fluent: &str, key: impl Into<String>, value: impl Into<Value>) {
        self.goals
            .entry(fluent.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goal_tag(&self) -> &str {
        &self.goal_tag
    }

    /// Required entries whose value differs from `state`, in fluent/key
    /// order.
    pub fn unachieved(&self, state: &State) -> Vec<Unigoal> {
        let mut pending = Vec::new();
        for (fluent, entries) in &self.goals {
            for (key, value) in entries {
                if state.get(fluent, key) != Some(value) {
                    pending.push(Unigoal {
                        fluent: fluent.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        pending
    }

    pub fn is_achieved(&self, state: &State) -> bool {
        self.goals.iter().all(|(fluent, entries)| {
            entries
                .iter()
                .all(|(key, value)| state.get(fluent, key) == Some(value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unachieved_lists_only_unsatisfied_entries() {
        let mut state = State::new("s");
        state.set("pos", "b1", "table");
        state.set("pos", "b2", "b1");

        let goal = MultiGoal::new("stack", "blocks")
            .with_requirement("pos", "b1", "table")
            .with_requirement("pos", "b2", "table");

        let pending = goal.unachieved(&state);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fluent, "pos");
        assert_eq!(pending[0].key, "b2");
        assert!(!goal.is_achieved(&state));

        state.set("pos", "b2", "table");
        assert!(goal.is_achieved(&state));
        assert!(goal.unachieved(&state).is_empty());
    }

    #[test]
    fn missing_fluent_counts_as_unachieved() {
        let state = State::new("s");
        let goal = MultiGoal::new("g", "t").with_requirement("loc", "r", "depot");
        assert_eq!(goal.unachieved(&state).len(), 1);
    }
}
