//! Monte-Carlo execution of a plan against a stochastic outcome model.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reweave_core::{ActionCall, ActionRegistry, State};
use tracing::trace;

/// One step of an execution trace: the action attempted (none for the
/// leading entry) and the state it produced (`None` marks the failure that
/// terminates the trace).
pub type ExecutionRecord = (Option<ActionCall>, Option<State>);

/// Domain-supplied exogenous-event injector.
///
/// Called when an action draws a non-nominal outcome; returns the state the
/// action will actually be applied to. Handlers may be stateless or keep
/// state across calls (e.g. pre-select a single deviation step per run);
/// they must not retain references to the states they are passed.
pub trait DeviationHandler: Send {
    fn deviate(&mut self, plan_index: usize, plan: &[ActionCall], state: &State) -> State;
}

impl<F> DeviationHandler for F
where
    F: FnMut(usize, &[ActionCall], &State) -> State + Send,
{
    fn deviate(&mut self, plan_index: usize, plan: &[ActionCall], state: &State) -> State {
        self(plan_index, plan, state)
    }
}

/// Executes plans step by step, drawing each action's outcome from its
/// registered probability vector.
///
/// Outcome index 0 is the nominal case: the action applies to the current
/// state. Any other index hands the state to the deviation handler first
/// (no handler means plain failure); the record of the state *before* the
/// action is rewritten to the deviated state so that repair sees the true
/// divergence point.
pub struct MonteCarloExecutor {
    actions: ActionRegistry,
    deviation_handler: Option<Box<dyn DeviationHandler>>,
    rng: ChaCha8Rng,
}

impl MonteCarloExecutor {
    pub fn new(actions: ActionRegistry) -> Self {
        Self {
            actions,
            deviation_handler: None,
            rng: ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Pin the outcome stream for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn with_deviation_handler(mut self, handler: Box<dyn DeviationHandler>) -> Self {
        self.deviation_handler = Some(handler);
        self
    }

    /// Execute `plan` from `state`. The trace starts with a
    /// `(None, start-state)` record and holds one record per attempted
    /// action; the first failed action ends it.
    pub fn run(&mut self, state: &State, plan: &[ActionCall]) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = vec![(None, Some(state.clone()))];
        let mut current = state.clone();

        for (index, call) in plan.iter().enumerate() {
            let outcome = {
                let probs = self.actions.outcome_model(&call.name);
                draw_outcome(&mut self.rng, probs)
            };
            let result = if outcome == 0 {
                self.actions.invoke(&call.name, &current, &call.args)
            } else if let Some(handler) = self.deviation_handler.as_mut() {
                trace!(index, action = %call, outcome, "injecting deviation");
                let deviated = handler.deviate(index, plan, &current);
                // rewrite the pre-action record so repair starts from the
                // state the world actually was in
                if let Some(last) = records.last_mut() {
                    last.1 = Some(deviated.clone());
                }
                self.actions.invoke(&call.name, &deviated, &call.args)
            } else {
                trace!(index, action = %call, outcome, "non-nominal outcome without handler");
                None
            };
            records.push((Some(call.clone()), result.clone()));
            match result {
                Some(next) => current = next,
                None => return records,
            }
        }
        records
    }
}

/// Inverse-CDF draw over a probability vector; residual mass (or an empty
/// vector) falls to the last index.
fn draw_outcome(rng: &mut ChaCha8Rng, probs: &[f64]) -> usize {
    if probs.len() <= 1 {
        return 0;
    }
    let roll: f64 = rng.random();
    let mut cumulative = 0.0;
    for (index, p) in probs.iter().enumerate() {
        cumulative += p;
        if roll < cumulative {
            return index;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_core::Value;

    fn domain() -> ActionRegistry {
        let mut actions = ActionRegistry::new();
        actions.register("step", |state: &mut State, args: &[Value]| {
            let k = args[0].as_str()?;
            state.set("done", k, true);
            Some(())
        });
        actions.register("needs_power", |state: &mut State, _args: &[Value]| {
            if state.get("power", "grid")? == &Value::Bool(true) {
                state.set("done", "powered", true);
                Some(())
            } else {
                None
            }
        });
        actions
    }

    fn call(name: &str, args: Vec<Value>) -> ActionCall {
        ActionCall::new(name, args)
    }

    #[test]
    fn nominal_run_produces_full_trace() {
        let mut executor = MonteCarloExecutor::new(domain()).with_seed(7);
        let state = State::new("s0");
        let plan = vec![call("step", vec!["a".into()]), call("step", vec!["b".into()])];

        let records = executor.run(&state, &plan);
        assert_eq!(records.len(), 3);
        assert!(records[0].0.is_none());
        let final_state = records[2].1.as_ref().unwrap();
        assert_eq!(final_state.get("done", "a"), Some(&Value::Bool(true)));
        assert_eq!(final_state.get("done", "b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn failure_terminates_the_trace() {
        let mut executor = MonteCarloExecutor::new(domain()).with_seed(7);
        let mut state = State::new("s0");
        state.set("power", "grid", false);
        let plan = vec![
            call("needs_power", vec![]),
            call("step", vec!["after".into()]),
        ];

        let records = executor.run(&state, &plan);
        assert_eq!(records.len(), 2);
        assert!(records[1].1.is_none());
    }

    #[test]
    fn non_nominal_outcome_without_handler_fails() {
        let mut actions = domain();
        actions.register_outcome_model("step", vec![0.0, 1.0]);
        let mut executor = MonteCarloExecutor::new(actions).with_seed(1);
        let records = executor.run(&State::new("s0"), &[call("step", vec!["a".into()])]);
        assert!(records[1].1.is_none());
    }

    #[test]
    fn deviation_rewrites_previous_record() {
        let mut actions = domain();
        // the second action always deviates
        actions.register_outcome_model("needs_power", vec![0.0, 1.0]);
        let handler = |_: usize, _: &[ActionCall], state: &State| {
            let mut mutated = state.clone();
            mutated.set("power", "grid", false);
            mutated
        };
        let mut executor = MonteCarloExecutor::new(actions)
            .with_seed(3)
            .with_deviation_handler(Box::new(handler));

        let mut state = State::new("s0");
        state.set("power", "grid", true);
        let plan = vec![call("step", vec!["a".into()]), call("needs_power", vec![])];

        let records = executor.run(&state, &plan);
        // the record before the deviating action now shows the mutated state
        let before = records[1].1.as_ref().unwrap();
        assert_eq!(before.get("power", "grid"), Some(&Value::Bool(false)));
        // and the action then failed against that state
        assert!(records[2].1.is_none());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut actions = domain();
        actions.register_outcome_model("step", vec![0.5, 0.5]);
        let state = State::new("s0");
        let plan = vec![call("step", vec!["a".into()]); 8];

        let trace = |seed| {
            let mut executor = MonteCarloExecutor::new(actions.clone()).with_seed(seed);
            executor
                .run(&state, &plan)
                .iter()
                .map(|(_, s)| s.is_some())
                .collect::<Vec<_>>()
        };
        assert_eq!(trace(42), trace(42));
    }
}
