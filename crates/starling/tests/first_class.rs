//! Functions as values: callable from any expression that produces them.

use pretty_assertions::assert_eq;
use starling::{ExcType, Module, NativeCall, Object, RunResult, Type, ValueRef, syntax::*};

fn make_struct(call: &mut NativeCall<'_>) -> RunResult<ValueRef> {
    if call.positional_len() > 0 {
        call.check_arity(0)?;
    }
    call.new_struct_from_keywords()
}

fn append(call: &mut NativeCall<'_>) -> RunResult<ValueRef> {
    call.check_arity(1)?;
    let (Some(list), Some(item)) = (call.receiver(), call.arg(0)) else {
        unreachable!("append is only registered as a list method");
    };
    call.list_push(list, item)?;
    Ok(ValueRef::NONE)
}

fn module() -> Module {
    let mut module = Module::new("first_class");
    module.register_native("struct", make_struct);
    module.add_type_value(Type::List, "append", append);
    module
        .exec(&[Stmt::def(
            "shout",
            vec![Param::required("s")],
            vec![Stmt::ret(Expr::binop(Expr::name("s"), Operator::Add, Expr::str("!")))],
        )])
        .unwrap();
    module
}

fn call1(callee: Expr, arg: Expr) -> Expr {
    Expr::call(callee, vec![Arg::positional(arg)])
}

#[test]
fn function_called_through_subscripts() {
    let mut module = module();
    module
        .exec(&[
            Stmt::assign("hf", Expr::dict(vec![(Expr::str("x"), Expr::list(vec![Expr::name("shout")]))])),
            Stmt::assign(
                "r",
                call1(Expr::index(Expr::index(Expr::name("hf"), Expr::str("x")), Expr::int(0)), Expr::str("abc")),
            ),
        ])
        .unwrap();
    assert_eq!(module.get("r"), Some(Object::from("abc!")));
}

#[test]
fn function_returned_from_a_call_is_called_directly() {
    let mut module = module();
    module
        .exec(&[
            Stmt::def(
                "make",
                vec![],
                vec![
                    Stmt::def("inner", vec![], vec![Stmt::ret(Expr::int(42))]),
                    Stmt::ret(Expr::name("inner")),
                ],
            ),
            Stmt::assign("r", Expr::call(Expr::call(Expr::name("make"), vec![]), vec![])),
        ])
        .unwrap();
    assert_eq!(module.get("r"), Some(Object::Int(42)));
}

#[test]
fn lambda_called_immediately_and_passed_as_argument() {
    let mut module = module();
    let double = Expr::lambda(
        vec![Param::required("x")],
        Expr::binop(Expr::name("x"), Operator::Mult, Expr::int(2)),
    );
    module
        .exec(&[
            Stmt::assign("a", call1(double.clone(), Expr::int(21))),
            Stmt::def(
                "apply",
                vec![Param::required("f"), Param::required("x")],
                vec![Stmt::ret(call1(Expr::name("f"), Expr::name("x")))],
            ),
            Stmt::assign(
                "b",
                Expr::call(
                    Expr::name("apply"),
                    vec![Arg::positional(double), Arg::positional(Expr::int(5))],
                ),
            ),
        ])
        .unwrap();
    assert_eq!(module.get("a"), Some(Object::Int(42)));
    assert_eq!(module.get("b"), Some(Object::Int(10)));
}

#[test]
fn struct_field_holding_a_function_is_callable() {
    let mut module = module();
    module
        .exec(&[
            Stmt::assign(
                "s",
                Expr::call(Expr::name("struct"), vec![Arg::keyword("f", Expr::name("shout"))]),
            ),
            Stmt::assign("r", call1(Expr::attr(Expr::name("s"), "f"), Expr::str("hey"))),
        ])
        .unwrap();
    assert_eq!(module.get("r"), Some(Object::from("hey!")));
    assert_eq!(
        module.get("s"),
        Some(Object::Struct(vec![("f".to_owned(), Object::Repr("<function shout>".to_owned()))]))
    );
}

#[test]
fn bound_method_remembers_its_receiver() {
    let mut module = module();
    module
        .exec(&[
            Stmt::assign("x", Expr::list(vec![])),
            Stmt::assign("push", Expr::attr(Expr::name("x"), "append")),
            Stmt::expr(call1(Expr::name("push"), Expr::int(1))),
            Stmt::expr(call1(Expr::name("push"), Expr::int(2))),
        ])
        .unwrap();
    assert_eq!(module.get("x"), Some(Object::List(vec![Object::Int(1), Object::Int(2)])));
    assert_eq!(
        module.get("push"),
        Some(Object::Repr("<bound method append of list>".to_owned()))
    );
    assert_eq!(module.type_value_names(Type::List), ["append"]);
}

#[test]
fn non_callable_values_are_rejected() {
    let mut module = module();
    let err = module.exec(&[Stmt::expr(Expr::call(Expr::int(1), vec![]))]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::NotCallable);
    assert_eq!(err.message(), "'int' object is not callable");

    let err = module
        .exec(&[Stmt::expr(Expr::call(Expr::list(vec![]), vec![]))])
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::NotCallable);
}

#[test]
fn unknown_attribute_is_an_attribute_error() {
    let mut module = module();
    let err = module
        .exec(&[Stmt::expr(Expr::attr(Expr::list(vec![]), "pop"))])
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(err.message(), "'list' object has no attribute 'pop'");
}

#[test]
fn functions_convert_to_reprs() {
    let module = module();
    assert_eq!(module.get("shout"), Some(Object::Repr("<function shout>".to_owned())));
    assert_eq!(module.get("struct"), Some(Object::Repr("<built-in function struct>".to_owned())));
}
