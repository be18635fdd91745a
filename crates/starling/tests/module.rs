//! The host-facing module surface: globals, freezing, limits and serde input.

use pretty_assertions::assert_eq;
use starling::{ExcType, LimitedTracker, Module, Object, ResourceLimits, syntax::*};

fn int_list(len: i64) -> Expr {
    Expr::list((0..len).map(Expr::int).collect())
}

fn frames<T: starling::ResourceTracker>(module: &Module<T>) -> usize {
    module.heap_stats().objects_by_type.get("Frame").copied().unwrap_or(0)
}

#[test]
fn globals_round_trip_through_the_host() {
    let mut module = Module::new("globals");
    module
        .set("a", &Object::List(vec![Object::Int(1), Object::Int(2)]))
        .unwrap();
    module
        .set("d", &Object::Dict(vec![(Object::from("k"), Object::Int(1))]))
        .unwrap();
    module
        .exec(&[
            Stmt::assign("b", Expr::name("a")),
            Stmt::Assign {
                target: Target::Index {
                    object: Box::new(Expr::name("a")),
                    index: Box::new(Expr::int(0)),
                },
                value: Expr::int(9),
            },
            Stmt::assign("v", Expr::index(Expr::name("d"), Expr::str("k"))),
        ])
        .unwrap();

    assert_eq!(module.get("b"), Some(Object::List(vec![Object::Int(9), Object::Int(2)])));
    assert_eq!(module.get("v"), Some(Object::Int(1)));
    assert_eq!(module.get("missing"), None);
    assert_eq!(module.names(), ["a", "d", "b", "v"]);
    assert_eq!(module.name(), "globals");
}

#[test]
fn output_only_objects_are_rejected_as_input() {
    let mut module = Module::new("globals");
    let err = module.set("f", &Object::Repr("<function f>".to_owned())).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::InvalidInput);
    assert_eq!(module.get("f"), None);
}

#[test]
fn eval_runs_an_expression_against_the_globals() {
    let mut module = Module::new("eval");
    module.set("x", &Object::Int(21)).unwrap();
    let result = module
        .eval(&Expr::binop(Expr::name("x"), Operator::Mult, Expr::int(2)))
        .unwrap();
    assert_eq!(result, Object::Int(42));
}

#[test]
fn unknown_globals_are_reported_by_name() {
    let mut module = Module::new("lookup");
    let err = module.exec(&[Stmt::assign("r", Expr::name("missing"))]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::VariableNotFound);
    assert_eq!(err.exc_type().code(), "CM01");
    assert_eq!(err.message(), "Variable 'missing' not found");
    assert_eq!(err.arguments(), ["missing"]);

    let err = module.call("nope", vec![], vec![]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::VariableNotFound);
}

#[test]
fn frozen_module_rejects_assignment_and_mutation() {
    let mut module = Module::new("frozen");
    module
        .exec(&[
            Stmt::assign("x", Expr::int(1)),
            Stmt::assign("items", Expr::list(vec![])),
            Stmt::def("get_x", vec![], vec![Stmt::ret(Expr::name("x"))]),
        ])
        .unwrap();
    module.freeze();
    assert!(module.is_frozen());

    let err = module.exec(&[Stmt::assign("x", Expr::int(2))]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::FrozenEnvironment);
    assert_eq!(err.exc_type().code(), "CM00");

    let err = module.set("y", &Object::Int(3)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::FrozenEnvironment);

    let err = module
        .exec(&[Stmt::AugAssign {
            target: Target::Name("items".to_owned()),
            op: Operator::Add,
            value: Expr::list(vec![Expr::int(1)]),
        }])
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::FrozenValue);
    assert_eq!(module.get("items"), Some(Object::List(vec![])));

    // reading and calling still work
    assert_eq!(module.call("get_x", vec![], vec![]).unwrap(), Object::Int(1));
}

#[test]
fn programs_deserialize_from_json() {
    // def twice(x): return x * 2
    // r = twice(x=4)
    let json = r#"[
        {"Def": {
            "name": "twice",
            "params": [{"Required": "x"}],
            "body": [{"Return": {"BinOp": {"left": {"Name": "x"}, "op": "Mult", "right": {"Int": 2}}}}]
        }},
        {"Assign": {
            "target": {"Name": "r"},
            "value": {"Call": {"func": {"Name": "twice"}, "args": [{"Keyword": ["x", {"Int": 4}]}]}}
        }}
    ]"#;
    let program: Vec<Stmt> = serde_json::from_str(json).unwrap();
    let mut module = Module::new("json");
    module.exec(&program).unwrap();
    assert_eq!(module.get("r"), Some(Object::Int(8)));
}

#[test]
fn limits_load_from_json() {
    let limits: ResourceLimits = serde_json::from_str(r#"{"max_operations": 50, "max_recursion_depth": 20}"#).unwrap();
    assert_eq!(limits.max_operations, Some(50));
    assert_eq!(limits.max_recursion_depth, Some(20));
    assert_eq!(limits.max_allocations, None);

    // for i in range-like list of 100 items: pass
    let mut module = Module::with_tracker("limits", LimitedTracker::new(limits));
    let err = module
        .exec(&[Stmt::For {
            target: Target::Name("i".to_owned()),
            iter: Expr::list((0..100).map(Expr::int).collect()),
            body: vec![Stmt::Pass],
        }])
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ResourceExhausted);
    assert_eq!(err.exc_type().code(), "CR00");
    assert!(module.tracker().operation_count() > 50);
}

#[test]
fn allocation_limit_stops_execution() {
    let mut module = Module::with_tracker(
        "limits",
        LimitedTracker::new(ResourceLimits::new().max_allocations(3)),
    );
    let err = module
        .exec(&[Stmt::assign("r", Expr::list(vec![Expr::list(vec![]); 5]))])
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ResourceExhausted);
    assert_eq!(module.get("r"), None);
}

#[test]
fn unreachable_objects_are_collected() {
    let mut module = Module::new("gc");
    module
        .exec(&[
            Stmt::assign("keep", Expr::list(vec![Expr::list(vec![])])),
            Stmt::assign("drop", Expr::list(vec![Expr::list(vec![]), Expr::list(vec![])])),
        ])
        .unwrap();
    module.set("drop", &Object::None).unwrap();
    assert_eq!(module.collect_garbage(), 3);
    assert_eq!(module.heap_stats().objects_by_type.get("List"), Some(&2));
}

#[test]
fn returned_call_frames_are_freed_immediately() {
    let mut module = Module::new("frames");
    module
        .exec(&[Stmt::def(
            "f",
            vec![Param::required("x")],
            vec![Stmt::ret(Expr::name("x"))],
        )])
        .unwrap();
    for i in 0..5 {
        assert_eq!(module.call("f", vec![Object::Int(i)], vec![]).unwrap(), Object::Int(i));
    }
    assert_eq!(frames(&module), 0);
}

#[test]
fn many_sequential_calls_fit_in_a_small_memory_limit() {
    // def f(x): return x
    // for x in xs: f(x)
    let mut module = Module::with_tracker(
        "frames",
        LimitedTracker::new(ResourceLimits::new().max_memory(50_000)),
    );
    module
        .exec(&[
            Stmt::def("f", vec![Param::required("x")], vec![Stmt::ret(Expr::name("x"))]),
            Stmt::assign("xs", int_list(1000)),
            Stmt::For {
                target: Target::Name("x".to_owned()),
                iter: Expr::name("xs"),
                body: vec![Stmt::expr(Expr::call(
                    Expr::name("f"),
                    vec![Arg::positional(Expr::name("x"))],
                ))],
            },
        ])
        .unwrap();
    assert_eq!(frames(&module), 0);
    assert_eq!(module.get("x"), Some(Object::Int(999)));
}

#[test]
fn gc_interval_applies_between_top_level_statements() {
    let mut module = Module::with_tracker(
        "gc",
        LimitedTracker::new(ResourceLimits::new().max_memory(40_000).gc_interval(1)),
    );
    // each list is about 16 KB; without collection the third one would not fit
    let program: Vec<Stmt> = (0..5).map(|_| Stmt::assign("a", int_list(1000))).collect();
    module.exec(&program).unwrap();
    assert_eq!(module.heap_stats().objects_by_type.get("List"), Some(&1));
}
