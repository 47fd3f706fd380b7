//! The full act-plan-repair loop: a deviation mid-run invalidates a later
//! action, repair swaps in an alternative decomposition, and execution
//! resumes where the repaired plan says it should.

use reweave_core::{
    single, ActionCall, ActionRegistry, Method, MethodRegistry, State, TodoItem, Value,
};
use reweave_exec::{Actor, ActorError, MonteCarloExecutor};
use reweave_planner::Planner;

fn act(name: &str) -> ActionCall {
    ActionCall::new(name, Vec::new())
}

/// Four-step job [a, b, c, d]; step c needs grid power and has a manual
/// fallback. `act_b` is wired to always draw a non-nominal outcome, and the
/// deviation handler cuts the power, so `act_c` fails at run time.
fn deviating_domain(with_fallback: bool) -> (MethodRegistry, ActionRegistry) {
    let mut actions = ActionRegistry::new();
    actions.register("act_a", |state: &mut State, _: &[Value]| {
        state.set("done", "a", true);
        Some(())
    });
    actions.register("act_b", |state: &mut State, _: &[Value]| {
        state.set("done", "b", true);
        Some(())
    });
    actions.register("act_c", |state: &mut State, _: &[Value]| {
        if state.get("power", "grid")? == &Value::Bool(true) {
            state.set("done", "c", true);
            Some(())
        } else {
            None
        }
    });
    actions.register("act_c_alt", |state: &mut State, _: &[Value]| {
        state.set("done", "c", true);
        Some(())
    });
    actions.register("act_d", |state: &mut State, _: &[Value]| {
        if state.get("done", "c")? == &Value::Bool(true) {
            state.set("done", "d", true);
            Some(())
        } else {
            None
        }
    });
    // act_b never takes its nominal outcome in these tests
    actions.register_outcome_model("act_b", vec![0.0, 1.0]);

    let mut methods = MethodRegistry::new();
    methods.declare_task_methods(
        "job",
        vec![Method::new("m_job", |_: &State, _: &[Value]| {
            single(vec![
                TodoItem::action("act_a", Vec::new()),
                TodoItem::action("act_b", Vec::new()),
                TodoItem::task("do_c", Vec::new()),
                TodoItem::action("act_d", Vec::new()),
            ])
        })],
    );
    let mut do_c = vec![Method::new("mc_power", |_: &State, _: &[Value]| {
        single(vec![TodoItem::action("act_c", Vec::new())])
    })];
    if with_fallback {
        do_c.push(Method::new("mc_manual", |_: &State, _: &[Value]| {
            single(vec![TodoItem::action("act_c_alt", Vec::new())])
        }));
    }
    methods.declare_task_methods("do_c", do_c);
    (methods, actions)
}

fn power_cut() -> Box<dyn reweave_exec::DeviationHandler> {
    Box::new(|_: usize, _: &[ActionCall], state: &State| {
        let mut mutated = state.clone();
        mutated.set("power", "grid", false);
        mutated
    })
}

fn powered_state() -> State {
    let mut state = State::new("s0");
    state.set("power", "grid", true);
    state
}

#[test]
fn deviation_triggers_repair_and_the_run_completes() {
    let (methods, actions) = deviating_domain(true);
    let planner = Planner::new(methods, actions.clone());
    let executor = MonteCarloExecutor::new(actions)
        .with_seed(11)
        .with_deviation_handler(power_cut());
    let mut actor = Actor::new(planner, executor);

    let history = actor
        .execute_to_do(&powered_state(), &[TodoItem::task("job", Vec::new())])
        .unwrap();

    // the manual variant replaced act_c; nothing was executed twice
    assert_eq!(
        history,
        vec![act("act_a"), act("act_b"), act("act_c_alt"), act("act_d")]
    );
    // the repaired plan is what the planner now stores
    assert_eq!(actor.planner.solution_plan(), history.as_slice());
}

#[test]
fn repaired_plan_prefix_matches_the_committed_history() {
    let (methods, actions) = deviating_domain(true);
    let mut planner = Planner::new(methods, actions.clone());
    let plan = planner
        .plan(&powered_state(), &[TodoItem::task("job", Vec::new())])
        .unwrap();
    assert_eq!(plan, vec![act("act_a"), act("act_b"), act("act_c"), act("act_d")]);

    // run the first leg by hand the way the actor does
    let mut executor = MonteCarloExecutor::new(actions)
        .with_seed(5)
        .with_deviation_handler(power_cut());
    let records = executor.run(&powered_state(), &plan);
    let k = records.len() - 1;
    assert!(records[k].1.is_none(), "act_c must fail after the deviation");
    let failed_at = k - 1;
    let last_good = records[k - 1].1.clone().unwrap();

    let (repaired, resume) = planner.replan(&last_good, failed_at).unwrap();
    // law: the plan's prefix up to the resume index is exactly what has
    // already been executed and kept
    assert_eq!(&repaired[..resume], &plan[..resume]);
    assert_eq!(resume, 2);
    assert_eq!(
        repaired,
        vec![act("act_a"), act("act_b"), act("act_c_alt"), act("act_d")]
    );
}

#[test]
fn unrepairable_deviation_surfaces_as_repair_failure() {
    let (methods, actions) = deviating_domain(false);
    let planner = Planner::new(methods, actions.clone());
    let executor = MonteCarloExecutor::new(actions)
        .with_seed(11)
        .with_deviation_handler(power_cut());
    let mut actor = Actor::new(planner, executor);

    let result = actor.execute_to_do(&powered_state(), &[TodoItem::task("job", Vec::new())]);
    match result {
        Err(ActorError::Repair {
            history,
            failed_at,
            state,
            ..
        }) => {
            // a and b committed before the failure at c
            assert_eq!(history, vec![act("act_a"), act("act_b")]);
            assert_eq!(failed_at, 2);
            assert_eq!(state.get("power", "grid"), Some(&Value::Bool(false)));
        }
        other => panic!("expected repair failure, got {:?}", other),
    }
}

#[test]
fn planning_failure_is_reported_before_any_execution() {
    let planner = Planner::new(MethodRegistry::new(), ActionRegistry::new());
    let executor = MonteCarloExecutor::new(ActionRegistry::new());
    let mut actor = Actor::new(planner, executor);

    let result = actor.execute_to_do(&State::new("s0"), &[TodoItem::task("job", Vec::new())]);
    assert!(matches!(result, Err(ActorError::Planning { .. })));
}

#[test]
fn clean_run_needs_no_repair() {
    let (methods, mut actions) = deviating_domain(true);
    // restore act_b's nominal outcome: no deviation this time
    actions.register_outcome_model("act_b", vec![1.0]);
    let planner = Planner::new(methods, actions.clone());
    let executor = MonteCarloExecutor::new(actions).with_seed(11);
    let mut actor = Actor::new(planner, executor);

    let history = actor
        .execute_to_do(&powered_state(), &[TodoItem::task("job", Vec::new())])
        .unwrap();
    assert_eq!(
        history,
        vec![act("act_a"), act("act_b"), act("act_c"), act("act_d")]
    );
}

/// A handler that pre-selects a single deviation step and fires only there,
/// exercising the stateful-handler contract.
struct OneShotPowerCut {
    fire_at: usize,
    fired: bool,
}

impl reweave_exec::DeviationHandler for OneShotPowerCut {
    fn deviate(&mut self, plan_index: usize, _plan: &[ActionCall], state: &State) -> State {
        let mut mutated = state.clone();
        if !self.fired && plan_index == self.fire_at {
            self.fired = true;
            mutated.set("power", "grid", false);
        }
        mutated
    }
}

#[test]
fn stateful_handler_deviates_once() {
    let (methods, actions) = deviating_domain(true);
    let planner = Planner::new(methods, actions.clone());
    let executor = MonteCarloExecutor::new(actions)
        .with_seed(11)
        .with_deviation_handler(Box::new(OneShotPowerCut {
            fire_at: 1,
            fired: false,
        }));
    let mut actor = Actor::new(planner, executor);

    let history = actor
        .execute_to_do(&powered_state(), &[TodoItem::task("job", Vec::new())])
        .unwrap();
    assert_eq!(
        history,
        vec![act("act_a"), act("act_b"), act("act_c_alt"), act("act_d")]
    );
}
