//! Public interface for running programs.

use crate::{
    args::ArgValues,
    environment::{Environment, TypeValues},
    evaluate::Evaluator,
    exception::{ExcType, RunResult},
    function::Function,
    heap::{Heap, HeapStats},
    intern::Interns,
    native::{NativeFn, NativeFunction, NativeId},
    object::{Object, ReprContext},
    prepare::{prepare_expression, prepare_module},
    resource::{NoLimitTracker, ResourceTracker},
    syntax,
    tracer::{CallTracer, NoopTracer},
    types::Type,
    value::Value,
};

/// A module: global bindings plus everything needed to run code against them.
///
/// Programs are handed over as [`syntax`] trees. Each entry point (`exec`, `eval`,
/// `call`) prepares its input, runs it with a fresh call depth counter, and
/// collects garbage afterwards when enough allocations happened.
///
/// # Example
/// ```
/// use starling::{syntax::*, Module, Object};
///
/// let mut module = Module::new("demo");
/// module
///     .exec(&[Stmt::def(
///         "add",
///         vec![Param::required("a"), Param::default("b", Expr::int(1))],
///         vec![Stmt::ret(Expr::binop(Expr::name("a"), Operator::Add, Expr::name("b")))],
///     )])
///     .unwrap();
/// assert_eq!(module.call("add", vec![Object::Int(41)], vec![]).unwrap(), Object::Int(42));
/// assert_eq!(
///     module.call("add", vec![Object::Int(1)], vec![("b".to_owned(), Object::Int(2))]).unwrap(),
///     Object::Int(3)
/// );
/// ```
#[derive(Debug)]
pub struct Module<T: ResourceTracker = NoLimitTracker> {
    name: String,
    heap: Heap<T>,
    interns: Interns,
    /// Every function definition prepared so far; closures refer to them by index.
    functions: Vec<Function>,
    natives: Vec<NativeFunction>,
    env: Environment,
    type_values: TypeValues,
}

impl Module<NoLimitTracker> {
    /// Creates an empty module with only the default call depth limit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tracker(name, NoLimitTracker::new())
    }
}

impl<T: ResourceTracker> Module<T> {
    /// Creates an empty module whose limits are enforced by `tracker`.
    pub fn with_tracker(name: impl Into<String>, tracker: T) -> Self {
        Self {
            name: name.into(),
            heap: Heap::new(tracker),
            interns: Interns::new(),
            functions: Vec::new(),
            natives: Vec::new(),
            env: Environment::new(),
            type_values: TypeValues::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a program at module level.
    pub fn exec(&mut self, program: &[syntax::Stmt]) -> RunResult<()> {
        self.exec_traced(program, NoopTracer)
    }

    /// Runs a program, reporting evaluation events to `tracer`.
    ///
    /// Pass `&mut tracer` to inspect the tracer afterwards.
    pub fn exec_traced(&mut self, program: &[syntax::Stmt], tracer: impl CallTracer) -> RunResult<()> {
        let nodes = prepare_module(program, &mut self.interns, &mut self.functions)?;
        let result = self.evaluator(tracer).exec_module(&nodes);
        self.maybe_collect();
        result
    }

    /// Evaluates a single expression at module level.
    pub fn eval(&mut self, expr: &syntax::Expr) -> RunResult<Object> {
        let prepared = prepare_expression(expr, &mut self.interns, &mut self.functions)?;
        let result = self.evaluator(NoopTracer).eval_module_expr(&prepared);
        let result = result.map(|value| self.to_object(value));
        self.maybe_collect();
        result
    }

    /// Calls the global `name` with host arguments.
    pub fn call(&mut self, name: &str, args: Vec<Object>, kwargs: Vec<(String, Object)>) -> RunResult<Object> {
        self.call_traced(name, args, kwargs, NoopTracer)
    }

    /// Like [`Module::call`], reporting evaluation events to `tracer`.
    pub fn call_traced(
        &mut self,
        name: &str,
        args: Vec<Object>,
        kwargs: Vec<(String, Object)>,
        tracer: impl CallTracer,
    ) -> RunResult<Object> {
        let Some(name_id) = self.interns.get_id(name) else {
            return Err(ExcType::variable_not_found(name));
        };
        let callee = self.env.get(name_id, &self.interns)?;

        let mut positional = Vec::with_capacity(args.len());
        for arg in &args {
            positional.push(arg.to_value(&mut self.heap, &mut self.interns)?);
        }
        let mut keywords = Vec::with_capacity(kwargs.len());
        for (key, value) in &kwargs {
            let value = value.to_value(&mut self.heap, &mut self.interns)?;
            keywords.push((self.interns.intern(key), value));
        }

        let result = self
            .evaluator(tracer)
            .call_value(callee, ArgValues::new(positional, keywords));
        let result = result.map(|value| self.to_object(value));
        self.maybe_collect();
        result
    }

    /// Returns a deep copy of the global `name`, if it is bound.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Object> {
        let name_id = self.interns.get_id(name)?;
        let value = self.env.get(name_id, &self.interns).ok()?;
        Some(self.to_object(value))
    }

    /// Binds the global `name` to a host object.
    pub fn set(&mut self, name: &str, object: &Object) -> RunResult<()> {
        let value = object.to_value(&mut self.heap, &mut self.interns)?;
        let name_id = self.interns.intern(name);
        self.env.set(name_id, value, &self.interns)
    }

    /// Names of the module globals, in first-assignment order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.env.names().map(|id| self.interns.get_str(id)).collect()
    }

    /// Makes a host function available as a builtin named `name`.
    ///
    /// Module globals of the same name shadow it.
    pub fn register_native(&mut self, name: &str, func: NativeFn) {
        let native = self.add_native(name, func);
        let name_id = self.interns.intern(name);
        self.env.add_builtin(name_id, native);
    }

    /// Makes a host function available as `value.attr` on values of type `ty`.
    ///
    /// Looking the attribute up binds the value as the receiver of the call.
    pub fn add_type_value(&mut self, ty: Type, attr: &str, func: NativeFn) {
        let native = self.add_native(attr, func);
        let attr_id = self.interns.intern(attr);
        self.type_values.add_type_value(ty, attr_id, native);
    }

    /// Attribute names registered for `ty`, in registration order.
    #[must_use]
    pub fn type_value_names(&self, ty: Type) -> Vec<&str> {
        self.type_values
            .list_type_value(ty)
            .into_iter()
            .map(|id| self.interns.get_str(id))
            .collect()
    }

    /// Freezes the module.
    ///
    /// Later assignments to globals fail with `FrozenEnvironment`, and every list or
    /// dict reachable from a global (including default values) rejects in-place
    /// mutation with `FrozenValue`.
    pub fn freeze(&mut self) {
        self.env.freeze();
        self.heap.freeze_reachable(self.env.roots());
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.env.is_frozen()
    }

    /// Frees every heap object not reachable from a global. Returns the number freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.heap.collect_garbage(self.env.roots())
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats(self.interns.len())
    }

    #[must_use]
    pub fn tracker(&self) -> &T {
        self.heap.tracker()
    }

    fn add_native(&mut self, name: &str, func: NativeFn) -> NativeId {
        let id = NativeId::new(self.natives.len());
        self.natives.push(NativeFunction {
            name: self.interns.intern(name),
            func,
        });
        id
    }

    fn evaluator<Tr: CallTracer>(&mut self, tracer: Tr) -> Evaluator<'_, T, Tr> {
        Evaluator::new(
            &mut self.heap,
            &mut self.interns,
            &self.functions,
            &self.natives,
            &mut self.env,
            &self.type_values,
            tracer,
        )
    }

    fn to_object(&self, value: Value) -> Object {
        let ctx = ReprContext {
            interns: &self.interns,
            functions: &self.functions,
            natives: &self.natives,
        };
        Object::from_value(value, &self.heap, &ctx)
    }

    /// Entry points only return here once no evaluation is in progress, so the
    /// globals are the only roots.
    fn maybe_collect(&mut self) {
        if self.heap.should_gc() {
            self.collect_garbage();
        }
    }
}
