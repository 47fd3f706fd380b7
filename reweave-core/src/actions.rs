use crate::state::{State, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An action body: mutates the given state in place and reports whether the
/// action applies. `None` means the preconditions do not hold; the caller
/// discards the mutated copy.
pub type ActionFn = Arc<dyn Fn(&mut State, &[Value]) -> Option<()> + Send + Sync>;

const NOMINAL_ONLY: [f64; 1] = [1.0];

/// Name-keyed table of primitive actions with their stochastic outcome
/// models and costs.
///
/// Planning consults only the functions (via [`invoke`](Self::invoke),
/// which is deterministic); the outcome vectors and costs belong to the
/// executor's world.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionFn>,
    outcome_probs: BTreeMap<String, Vec<f64>>,
    costs: BTreeMap<String, f64>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut State, &[Value]) -> Option<()> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(f));
    }

    /// Outcome probability vector for an action. Index 0 is the nominal
    /// success probability; the remaining mass selects alternative outcomes
    /// interpreted by the executor.
    pub fn register_outcome_model(&mut self, name: impl Into<String>, probs: Vec<f64>) {
        self.outcome_probs.insert(name.into(), probs);
    }

    pub fn register_cost(&mut self, name: impl Into<String>, cost: f64) {
        self.costs.insert(name.into(), cost);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Apply an action to a copy of `state`. Returns the successor state,
    /// or `None` when the action is unknown or inapplicable. Deterministic
    /// given its inputs.
    pub fn invoke(&self, name: &str, state: &State, args: &[Value]) -> Option<State> {
        let f = self.actions.get(name)?;
        let mut next = state.clone();
        f(&mut next, args)?;
        Some(next)
    }

    pub fn outcome_model(&self, name: &str) -> &[f64] {
        self.outcome_probs
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&NOMINAL_ONLY)
    }

    pub fn cost(&self, name: &str) -> f64 {
        self.costs.get(name).copied().unwrap_or(1.0)
    }
}
