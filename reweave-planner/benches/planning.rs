use criterion::{criterion_group, criterion_main, Criterion};
use reweave_core::{
    no_decomposition, single, ActionCall, ActionRegistry, Method, MethodRegistry, State,
    TodoItem, Value,
};
use reweave_planner::Planner;
use std::hint::black_box;

/// Chain-of-rooms travel domain: the robot moves one room at a time and
/// `goto` recurses until it arrives.
fn travel_chain_domain() -> (MethodRegistry, ActionRegistry) {
    let mut actions = ActionRegistry::new();
    actions.register("step", |state: &mut State, args: &[Value]| {
        let r = args[0].as_str()?;
        if state.get("at", r)? == &args[1] {
            state.set("at", r, args[2].clone());
            Some(())
        } else {
            None
        }
    });

    let mut methods = MethodRegistry::new();
    methods.declare_task_methods(
        "goto",
        vec![Method::new("m_step_towards", |state: &State, args: &[Value]| {
            let Some(r) = args[0].as_str() else {
                return no_decomposition();
            };
            let (Some(here), Some(dest)) = (
                state.get("at", r).and_then(Value::as_i64),
                args[1].as_i64(),
            ) else {
                return no_decomposition();
            };
            if here == dest {
                return single(Vec::new());
            }
            let next = if here < dest { here + 1 } else { here - 1 };
            single(vec![
                TodoItem::Action(ActionCall::new(
                    "step",
                    vec![args[0].clone(), here.into(), next.into()],
                )),
                TodoItem::task("goto", vec![args[0].clone(), args[1].clone()]),
            ])
        })],
    );
    (methods, actions)
}

fn bench_plan_travel_chain(c: &mut Criterion) {
    let (methods, actions) = travel_chain_domain();

    for rooms in [8i64, 32, 128] {
        c.bench_function(&format!("plan_travel_chain_{}", rooms), |b| {
            let mut state = State::new("s0");
            state.set("at", "r", 0i64);
            let todo = vec![TodoItem::task("goto", vec!["r".into(), rooms.into()])];

            b.iter(|| {
                let mut planner = Planner::new(methods.clone(), actions.clone());
                let plan = planner.plan(black_box(&state), black_box(&todo)).unwrap();
                black_box(plan)
            });
        });
    }
}

fn bench_repair_travel_chain(c: &mut Criterion) {
    let (methods, actions) = travel_chain_domain();

    c.bench_function("repair_travel_chain_32", |b| {
        let mut state = State::new("s0");
        state.set("at", "r", 0i64);
        let todo = vec![TodoItem::task("goto", vec!["r".into(), 32i64.into()])];

        b.iter(|| {
            let mut planner = Planner::new(methods.clone(), actions.clone());
            planner.plan(&state, &todo).unwrap();
            // the robot is knocked back to the start after 16 steps
            let mut diverged = State::new("s0");
            diverged.set("at", "r", 0i64);
            let repaired = planner.replan(black_box(&diverged), 16).unwrap();
            black_box(repaired)
        });
    });
}

criterion_group!(benches, bench_plan_travel_chain, bench_repair_travel_chain);
criterion_main!(benches);
