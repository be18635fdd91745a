//! Name resolution and validation of parsed programs.
//!
//! The prepare pass turns [`syntax`] trees into the [`expressions`] tree the
//! evaluator runs:
//! - every name is resolved to a [`NameScope`]: a function's locals are its parameters
//!   and every name it assigns anywhere in its body, names bound by an enclosing
//!   function are free, and everything else is global
//! - every `def` and `lambda` becomes a [`Function`] in the module's function table,
//!   its default expressions staying in the defining scope
//! - parameter lists and statement placement are validated, failing with `SyntaxError`
//!
//! Globals are never resolved here. A function may mention a global that is only
//! defined later, which is what makes mutual recursion between top-level functions work.

use ahash::AHashSet;

use crate::{
    exception::{ExcType, RunResult},
    expressions::{AssignTarget, CallArg, Expr, Identifier, Literal, NameScope, Node},
    function::{Function, FunctionBody, FunctionId},
    intern::{Interns, StringId},
    signature::Signature,
    syntax,
};

/// Prepares a module-level program.
///
/// Function definitions found in `stmts` are appended to `functions`. On error the
/// table is left as it was.
pub(crate) fn prepare_module(
    stmts: &[syntax::Stmt],
    interns: &mut Interns,
    functions: &mut Vec<Function>,
) -> RunResult<Vec<Node>> {
    let saved_len = functions.len();
    let mut p = Prepare::new(interns, functions);
    let result = p.prepare_block(stmts);
    if result.is_err() {
        functions.truncate(saved_len);
    }
    result
}

/// Prepares a single module-level expression.
pub(crate) fn prepare_expression(
    expr: &syntax::Expr,
    interns: &mut Interns,
    functions: &mut Vec<Function>,
) -> RunResult<Expr> {
    let saved_len = functions.len();
    let mut p = Prepare::new(interns, functions);
    let result = p.prepare_expr(expr);
    if result.is_err() {
        functions.truncate(saved_len);
    }
    result
}

/// Locals of one function scope.
struct Scope {
    locals: AHashSet<StringId>,
}

struct Prepare<'a> {
    interns: &'a mut Interns,
    functions: &'a mut Vec<Function>,
    /// Enclosing function scopes, innermost last. Empty at module level.
    scopes: Vec<Scope>,
    /// Number of `for` loops around the current statement, within the current function.
    loop_depth: usize,
}

impl<'a> Prepare<'a> {
    fn new(interns: &'a mut Interns, functions: &'a mut Vec<Function>) -> Self {
        Self {
            interns,
            functions,
            scopes: Vec::new(),
            loop_depth: 0,
        }
    }

    fn resolve(&mut self, name: &str) -> RunResult<Identifier> {
        let name_id = self.interns.intern(name);
        let scope = match self.scopes.iter().rev().position(|scope| scope.locals.contains(&name_id)) {
            Some(0) => NameScope::Local,
            Some(frames_up) => {
                let frames_up = u16::try_from(frames_up)
                    .map_err(|_| ExcType::syntax_error("too many nested function definitions"))?;
                NameScope::Free(frames_up)
            }
            None => NameScope::Global,
        };
        Ok(Identifier::new(name_id, scope))
    }

    fn prepare_block(&mut self, stmts: &[syntax::Stmt]) -> RunResult<Vec<Node>> {
        stmts.iter().map(|stmt| self.prepare_stmt(stmt)).collect()
    }

    fn prepare_stmt(&mut self, stmt: &syntax::Stmt) -> RunResult<Node> {
        use syntax::Stmt;

        let node = match stmt {
            Stmt::Expr(expr) => Node::Expr(self.prepare_expr(expr)?),
            Stmt::Assign { target, value } => Node::Assign {
                value: self.prepare_expr(value)?,
                target: self.prepare_target(target)?,
            },
            Stmt::AugAssign { target, op, value } => {
                if matches!(target, syntax::Target::Tuple(_)) {
                    return Err(ExcType::syntax_error("illegal expression for augmented assignment"));
                }
                Node::AugAssign {
                    value: self.prepare_expr(value)?,
                    target: self.prepare_target(target)?,
                    op: *op,
                }
            }
            Stmt::If { test, body, orelse } => Node::If {
                test: self.prepare_expr(test)?,
                body: self.prepare_block(body)?,
                orelse: self.prepare_block(orelse)?,
            },
            Stmt::For { target, iter, body } => {
                let iter = self.prepare_expr(iter)?;
                let target = self.prepare_target(target)?;
                self.loop_depth += 1;
                let body = self.prepare_block(body);
                self.loop_depth -= 1;
                Node::For { target, iter, body: body? }
            }
            Stmt::Break | Stmt::Continue if self.loop_depth == 0 => {
                let keyword = if matches!(stmt, Stmt::Break) { "break" } else { "continue" };
                return Err(ExcType::syntax_error(format!("'{keyword}' outside loop")));
            }
            Stmt::Break => Node::Break,
            Stmt::Continue => Node::Continue,
            Stmt::Pass => Node::Pass,
            Stmt::Return(_) if self.scopes.is_empty() => {
                return Err(ExcType::syntax_error("'return' outside function"));
            }
            Stmt::Return(value) => Node::Return(value.as_ref().map(|v| self.prepare_expr(v)).transpose()?),
            Stmt::Def(def) => {
                let (function, defaults) =
                    self.prepare_function(&def.name, &def.params, FunctionSource::Block(&def.body))?;
                Node::Def {
                    target: self.resolve(&def.name)?,
                    function,
                    defaults,
                }
            }
        };
        Ok(node)
    }

    fn prepare_target(&mut self, target: &syntax::Target) -> RunResult<AssignTarget> {
        Ok(match target {
            syntax::Target::Name(name) => AssignTarget::Name(self.resolve(name)?),
            syntax::Target::Index { object, index } => AssignTarget::Index {
                object: self.prepare_expr(object)?,
                index: self.prepare_expr(index)?,
            },
            syntax::Target::Tuple(targets) => AssignTarget::Tuple(
                targets
                    .iter()
                    .map(|t| self.prepare_target(t))
                    .collect::<RunResult<_>>()?,
            ),
        })
    }

    fn prepare_exprs(&mut self, exprs: &[syntax::Expr]) -> RunResult<Vec<Expr>> {
        exprs.iter().map(|e| self.prepare_expr(e)).collect()
    }

    fn boxed(&mut self, expr: &syntax::Expr) -> RunResult<Box<Expr>> {
        self.prepare_expr(expr).map(Box::new)
    }

    fn prepare_expr(&mut self, expr: &syntax::Expr) -> RunResult<Expr> {
        use syntax::Expr as E;

        Ok(match expr {
            E::None => Expr::Literal(Literal::None),
            E::Bool(b) => Expr::Literal(Literal::Bool(*b)),
            E::Int(i) => Expr::Literal(Literal::Int(*i)),
            E::Str(s) => Expr::Literal(Literal::Str(self.interns.intern(s))),
            E::Name(name) => Expr::Name(self.resolve(name)?),
            E::List(items) => Expr::List(self.prepare_exprs(items)?),
            E::Tuple(items) => Expr::Tuple(self.prepare_exprs(items)?),
            E::Dict(entries) => Expr::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.prepare_expr(k)?, self.prepare_expr(v)?)))
                    .collect::<RunResult<_>>()?,
            ),
            E::Index { object, index } => Expr::Index {
                object: self.boxed(object)?,
                index: self.boxed(index)?,
            },
            E::Attr { object, attr } => Expr::Attr {
                object: self.boxed(object)?,
                attr: self.interns.intern(attr),
            },
            E::Call { func, args } => Expr::Call {
                callee: self.boxed(func)?,
                args: self.prepare_call_args(args)?,
            },
            E::BinOp { left, op, right } => Expr::BinOp {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            E::Compare { left, op, right } => Expr::Compare {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            E::Not(operand) => Expr::Not(self.boxed(operand)?),
            E::Neg(operand) => Expr::Neg(self.boxed(operand)?),
            E::And(left, right) => Expr::And(self.boxed(left)?, self.boxed(right)?),
            E::Or(left, right) => Expr::Or(self.boxed(left)?, self.boxed(right)?),
            E::IfElse { test, body, orelse } => Expr::IfElse {
                test: self.boxed(test)?,
                body: self.boxed(body)?,
                orelse: self.boxed(orelse)?,
            },
            E::Lambda { params, body } => {
                let (function, defaults) = self.prepare_function("lambda", params, FunctionSource::Expr(body))?;
                Expr::MakeFunction { function, defaults }
            }
        })
    }

    fn prepare_call_args(&mut self, args: &[syntax::Arg]) -> RunResult<Vec<CallArg>> {
        let mut seen_keyword = false;
        let mut prepared = Vec::with_capacity(args.len());
        for arg in args {
            prepared.push(match arg {
                syntax::Arg::Positional(_) if seen_keyword => {
                    return Err(ExcType::syntax_error("positional argument follows keyword argument"));
                }
                syntax::Arg::Positional(value) => CallArg::Positional(self.prepare_expr(value)?),
                syntax::Arg::Star(value) => CallArg::Star(self.prepare_expr(value)?),
                syntax::Arg::Keyword(name, value) => {
                    seen_keyword = true;
                    CallArg::Keyword(self.interns.intern(name), self.prepare_expr(value)?)
                }
                syntax::Arg::StarStar(value) => {
                    seen_keyword = true;
                    CallArg::StarStar(self.prepare_expr(value)?)
                }
            });
        }
        Ok(prepared)
    }

    /// Validates a parameter list, prepares its defaults in the current scope, then
    /// prepares the body in a new scope and registers the function.
    fn prepare_function(
        &mut self,
        name: &str,
        params: &[syntax::Param],
        body: FunctionSource<'_>,
    ) -> RunResult<(FunctionId, Vec<Expr>)> {
        let name_id = self.interns.intern(name);
        let shape = ParamShape::analyze(name, params)?;

        // defaults belong to the defining scope: positional ones first, then keyword-only
        let default_exprs: Vec<&syntax::Expr> = shape
            .positional
            .iter()
            .chain(&shape.keyword_only)
            .filter_map(|&(_, default)| default)
            .collect();
        let defaults = default_exprs
            .into_iter()
            .map(|expr| self.prepare_expr(expr))
            .collect::<RunResult<Vec<_>>>()?;

        let mut locals: AHashSet<StringId> = params
            .iter()
            .filter_map(syntax::Param::name)
            .map(|param| self.interns.intern(param))
            .collect();
        if let FunctionSource::Block(stmts) = body {
            collect_assigned(stmts, self.interns, &mut locals);
        }

        let signature = Signature::new(
            shape.positional.iter().map(|&(param, _)| self.interns.intern(param)).collect(),
            shape.positional.iter().filter(|(_, default)| default.is_some()).count(),
            shape.var_args.map(|param| self.interns.intern(param)),
            shape.keyword_only.iter().map(|&(param, _)| self.interns.intern(param)).collect(),
            {
                let mut next_default = 0;
                shape
                    .keyword_only
                    .iter()
                    .map(|(_, default)| {
                        default.map(|_| {
                            next_default += 1;
                            next_default - 1
                        })
                    })
                    .collect()
            },
            shape.var_kwargs.map(|param| self.interns.intern(param)),
        );

        let is_nested = !self.scopes.is_empty();
        self.scopes.push(Scope { locals });
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let prepared_body = match body {
            FunctionSource::Block(stmts) => self.prepare_block(stmts).map(FunctionBody::Block),
            FunctionSource::Expr(expr) => self.prepare_expr(expr).map(FunctionBody::Expr),
        };
        self.loop_depth = saved_loop_depth;
        self.scopes.pop();

        let id = FunctionId::new(self.functions.len());
        self.functions
            .push(Function::new(name_id, signature, prepared_body?, is_nested));
        Ok((id, defaults))
    }
}

#[derive(Clone, Copy)]
enum FunctionSource<'s> {
    Block(&'s [syntax::Stmt]),
    Expr(&'s syntax::Expr),
}

/// A parameter list split into its groups, after validation.
struct ParamShape<'p> {
    positional: Vec<(&'p str, Option<&'p syntax::Expr>)>,
    var_args: Option<&'p str>,
    keyword_only: Vec<(&'p str, Option<&'p syntax::Expr>)>,
    var_kwargs: Option<&'p str>,
}

impl<'p> ParamShape<'p> {
    fn analyze(func_name: &str, params: &'p [syntax::Param]) -> RunResult<Self> {
        use syntax::Param;

        let mut shape = Self {
            positional: Vec::new(),
            var_args: None,
            keyword_only: Vec::new(),
            var_kwargs: None,
        };
        let mut seen_names: AHashSet<&str> = AHashSet::new();
        let mut star_seen = false;

        for param in params {
            if shape.var_kwargs.is_some() {
                return Err(ExcType::syntax_error(format!(
                    "{func_name}(): parameters cannot follow **{}",
                    shape.var_kwargs.unwrap_or_default()
                )));
            }
            if let Some(name) = param.name()
                && !seen_names.insert(name)
            {
                return Err(ExcType::syntax_error(format!(
                    "duplicate argument '{name}' in function definition {func_name}()"
                )));
            }
            match param {
                Param::Required(name) | Param::Default(name, _) => {
                    let default = match param {
                        Param::Default(_, expr) => Some(expr),
                        _ => None,
                    };
                    if star_seen {
                        shape.keyword_only.push((name.as_str(), default));
                    } else {
                        if default.is_none() && shape.positional.iter().any(|(_, d)| d.is_some()) {
                            return Err(ExcType::syntax_error(format!(
                                "{func_name}(): non-default argument '{name}' follows default argument"
                            )));
                        }
                        shape.positional.push((name.as_str(), default));
                    }
                }
                Param::Args(_) | Param::KwOnlyMarker => {
                    if star_seen {
                        return Err(ExcType::syntax_error(format!("{func_name}(): multiple * parameters")));
                    }
                    star_seen = true;
                    if let Param::Args(name) = param {
                        shape.var_args = Some(name.as_str());
                    }
                }
                Param::Kwargs(name) => shape.var_kwargs = Some(name.as_str()),
            }
        }

        if star_seen && shape.var_args.is_none() && shape.keyword_only.is_empty() {
            return Err(ExcType::syntax_error(format!(
                "{func_name}(): named arguments must follow bare *"
            )));
        }
        Ok(shape)
    }
}

/// Collects names bound by assignments anywhere in a function body.
///
/// Nested `def` bodies are separate scopes and are not entered; the name of the
/// nested function itself is bound in this scope.
fn collect_assigned(stmts: &[syntax::Stmt], interns: &mut Interns, locals: &mut AHashSet<StringId>) {
    use syntax::Stmt;

    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } | Stmt::AugAssign { target, .. } => collect_target(target, interns, locals),
            Stmt::For { target, body, .. } => {
                collect_target(target, interns, locals);
                collect_assigned(body, interns, locals);
            }
            Stmt::If { body, orelse, .. } => {
                collect_assigned(body, interns, locals);
                collect_assigned(orelse, interns, locals);
            }
            Stmt::Def(def) => {
                locals.insert(interns.intern(&def.name));
            }
            Stmt::Expr(_) | Stmt::Break | Stmt::Continue | Stmt::Pass | Stmt::Return(_) => {}
        }
    }
}

fn collect_target(target: &syntax::Target, interns: &mut Interns, locals: &mut AHashSet<StringId>) {
    match target {
        syntax::Target::Name(name) => {
            locals.insert(interns.intern(name));
        }
        syntax::Target::Tuple(targets) => {
            for t in targets {
                collect_target(t, interns, locals);
            }
        }
        syntax::Target::Index { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Param, Stmt, Target};

    fn prepare(stmts: &[Stmt]) -> (RunResult<Vec<Node>>, Interns, Vec<Function>) {
        let mut interns = Interns::new();
        let mut functions = Vec::new();
        let result = prepare_module(stmts, &mut interns, &mut functions);
        (result, interns, functions)
    }

    fn syntax_error(stmts: &[Stmt]) -> String {
        let (result, _, functions) = prepare(stmts);
        let err = result.unwrap_err();
        assert_eq!(err.exc_type(), ExcType::SyntaxError);
        assert!(functions.is_empty(), "failed prepare must not leave functions behind");
        err.message().to_owned()
    }

    #[test]
    fn names_resolve_to_local_free_and_global() {
        // def outer(a):
        //     def inner():
        //         return a + b
        //     return inner
        let program = vec![Stmt::def(
            "outer",
            vec![Param::required("a")],
            vec![
                Stmt::def(
                    "inner",
                    vec![],
                    vec![Stmt::ret(syntax::Expr::binop(
                        syntax::Expr::name("a"),
                        syntax::Operator::Add,
                        syntax::Expr::name("b"),
                    ))],
                ),
                Stmt::ret(syntax::Expr::name("inner")),
            ],
        )];
        let (result, interns, functions) = prepare(&program);
        let nodes = result.unwrap();
        assert!(matches!(
            &nodes[0],
            Node::Def { target, .. } if target.scope == NameScope::Global
        ));

        // inner is registered first, since it is prepared while preparing outer
        assert_eq!(interns.get_str(functions[0].name), "inner");
        assert!(functions[0].is_nested);
        assert!(!functions[1].is_nested);
        let FunctionBody::Block(body) = &functions[0].body else {
            panic!("inner should have a block body");
        };
        let Node::Return(Some(Expr::BinOp { left, right, .. })) = &body[0] else {
            panic!("unexpected body {body:?}");
        };
        assert!(matches!(**left, Expr::Name(Identifier { scope: NameScope::Free(1), .. })));
        assert!(matches!(**right, Expr::Name(Identifier { scope: NameScope::Global, .. })));
    }

    #[test]
    fn assignment_anywhere_makes_a_name_local() {
        // def f():
        //     if x: pass
        //     else: x = 1
        let program = vec![Stmt::def(
            "f",
            vec![],
            vec![Stmt::if_else(
                syntax::Expr::name("x"),
                vec![Stmt::Pass],
                vec![Stmt::Assign {
                    target: Target::Name("x".to_owned()),
                    value: syntax::Expr::int(1),
                }],
            )],
        )];
        let (result, _, functions) = prepare(&program);
        result.unwrap();
        let FunctionBody::Block(body) = &functions[0].body else {
            panic!("expected block body");
        };
        assert!(matches!(
            &body[0],
            Node::If { test: Expr::Name(Identifier { scope: NameScope::Local, .. }), .. }
        ));
    }

    #[test]
    fn invalid_parameter_lists_are_rejected() {
        let msg = syntax_error(&[Stmt::def(
            "f",
            vec![Param::required("a"), Param::required("a")],
            vec![Stmt::Pass],
        )]);
        assert!(msg.contains("duplicate argument 'a'"), "{msg}");

        let msg = syntax_error(&[Stmt::def(
            "f",
            vec![Param::default("a", syntax::Expr::int(1)), Param::required("b")],
            vec![Stmt::Pass],
        )]);
        assert!(msg.contains("non-default argument 'b'"), "{msg}");

        let msg = syntax_error(&[Stmt::def(
            "f",
            vec![Param::Kwargs("kw".to_owned()), Param::required("b")],
            vec![Stmt::Pass],
        )]);
        assert!(msg.contains("cannot follow **kw"), "{msg}");

        let msg = syntax_error(&[Stmt::def("f", vec![Param::KwOnlyMarker], vec![Stmt::Pass])]);
        assert!(msg.contains("bare *"), "{msg}");
    }

    #[test]
    fn misplaced_statements_are_rejected() {
        assert_eq!(syntax_error(&[Stmt::Return(None)]), "'return' outside function");
        assert_eq!(syntax_error(&[Stmt::def("f", vec![], vec![Stmt::Break])]), "'break' outside loop");
    }

    #[test]
    fn keyword_only_defaults_follow_positional_defaults() {
        let program = vec![Stmt::def(
            "f",
            vec![
                Param::default("a", syntax::Expr::int(1)),
                Param::KwOnlyMarker,
                Param::required("b"),
                Param::default("c", syntax::Expr::int(3)),
            ],
            vec![Stmt::Pass],
        )];
        let (result, _, functions) = prepare(&program);
        let nodes = result.unwrap();
        let Node::Def { defaults, .. } = &nodes[0] else {
            panic!("expected def");
        };
        assert!(matches!(
            defaults.as_slice(),
            [Expr::Literal(Literal::Int(1)), Expr::Literal(Literal::Int(3))]
        ));
        assert_eq!(functions[0].defaults_count(), 2);
    }
}
