//! The tree-walking evaluator and call dispatcher.
//!
//! An [`Evaluator`] lives for one entry point of a [`Module`](crate::Module): one
//! `exec`, `eval` or `call`. It owns the call depth counter of that execution
//! context, so the recursion limit applies per entry point and a failed call can
//! never leave a stale depth behind.
//!
//! Every call goes through [`Evaluator::call_value`], whatever the callee expression
//! was: a name, a subscript, an attribute or the result of another call. Callability
//! is a property of the value alone.

use std::slice;

use smallvec::SmallVec;

use crate::{
    args::ArgValues,
    environment::{Environment, TypeValues},
    exception::{ExcType, Exception, RunResult},
    expressions::{AssignTarget, CallArg, Expr, Identifier, Literal, NameScope, Node},
    frame::Frame,
    function::{Closure, Function, FunctionBody, FunctionId},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StringId},
    native::{BoundMethod, NativeCall, NativeFunction, NativeId},
    resource::ResourceTracker,
    stack::ensure_sufficient_stack,
    syntax::{CmpOperator, Operator},
    tracer::CallTracer,
    types::{Dict, List},
    value::{Value, allocate_dict, binary_op},
};

/// How a statement finished.
#[derive(Debug)]
enum Flow {
    Next,
    Return(Value),
    Break,
    Continue,
}

pub(crate) struct Evaluator<'a, T: ResourceTracker, Tr: CallTracer> {
    heap: &'a mut Heap<T>,
    interns: &'a mut Interns,
    functions: &'a [Function],
    natives: &'a [NativeFunction],
    env: &'a mut Environment,
    type_values: &'a TypeValues,
    tracer: Tr,
    /// Number of calls currently active in this execution context.
    depth: usize,
}

impl<'a, T: ResourceTracker, Tr: CallTracer> Evaluator<'a, T, Tr> {
    pub fn new(
        heap: &'a mut Heap<T>,
        interns: &'a mut Interns,
        functions: &'a [Function],
        natives: &'a [NativeFunction],
        env: &'a mut Environment,
        type_values: &'a TypeValues,
        tracer: Tr,
    ) -> Self {
        Self {
            heap,
            interns,
            functions,
            natives,
            env,
            type_values,
            tracer,
            depth: 0,
        }
    }

    /// Runs prepared module-level statements.
    ///
    /// Between two top-level statements the globals hold every live value, so
    /// that is where collection runs once the tracker's interval is reached.
    pub fn exec_module(&mut self, nodes: &[Node]) -> RunResult<()> {
        for node in nodes {
            // the prepare pass rejects return, break and continue at module level
            self.exec_block(slice::from_ref(node), None)?;
            if self.heap.should_gc() {
                self.heap.collect_garbage(self.env.roots());
            }
        }
        Ok(())
    }

    /// Evaluates a prepared module-level expression.
    pub fn eval_module_expr(&mut self, expr: &Expr) -> RunResult<Value> {
        self.eval_expr(expr, None)
    }

    /// Calls `callee` with already evaluated arguments.
    ///
    /// Closures get a fresh frame chained to the frame they were defined in.
    /// Natives and bound methods are called directly. Every other value raises
    /// `NotCallable`. Entering any call first checks the depth counter against the
    /// tracker's limit, so runaway recursion fails with `RecursionTooDeep` before
    /// the arguments are even bound.
    pub fn call_value(&mut self, callee: Value, args: ArgValues) -> RunResult<Value> {
        match callee {
            Value::Native(native) => self.call_native(native, None, args),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Closure(closure) => {
                    let function = closure.function;
                    let defaults = closure.defaults.clone();
                    let captured = closure.frame;
                    self.call_closure(function, &defaults, captured, args)
                }
                HeapData::BoundMethod(method) => {
                    let (native, receiver) = (method.native, method.receiver);
                    self.call_native(native, Some(receiver), args)
                }
                _ => Err(ExcType::not_callable(callee.type_name(&*self.heap))),
            },
            _ => Err(ExcType::not_callable(callee.type_name(&*self.heap))),
        }
    }

    fn call_closure(
        &mut self,
        function_id: FunctionId,
        defaults: &[Value],
        captured: Option<HeapId>,
        args: ArgValues,
    ) -> RunResult<Value> {
        self.heap.tracker().check_recursion_depth(self.depth)?;

        let functions = self.functions;
        let function = &functions[function_id.index()];
        let name = function.name;
        let bindings = function.signature.bind(
            args,
            defaults,
            &mut *self.heap,
            &*self.interns,
            self.interns.get_str(name),
        )?;
        let frame = self
            .heap
            .allocate(HeapData::Frame(Frame::with_bindings(captured, bindings)))?;

        self.depth += 1;
        self.tracer.on_call(self.interns.get_str(name), self.depth);
        let result = match &function.body {
            FunctionBody::Block(body) => self.exec_block(body, Some(frame)).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Expr(expr) => self.eval_expr(expr, Some(frame)),
        };
        self.depth -= 1;
        self.tracer.on_return(self.interns.get_str(name), self.depth);
        self.heap.release_frame(frame);

        result.map_err(|mut exc| {
            exc.push_frame(self.interns.get_str(name));
            exc
        })
    }

    fn call_native(&mut self, native: NativeId, receiver: Option<Value>, args: ArgValues) -> RunResult<Value> {
        self.heap.tracker().check_recursion_depth(self.depth)?;

        let natives = self.natives;
        let entry = &natives[native.index()];
        self.depth += 1;
        self.tracer.on_call(self.interns.get_str(entry.name), self.depth);
        let result = {
            let mut call = NativeCall::new(
                entry.name,
                receiver,
                args,
                &mut *self.heap,
                &mut *self.interns,
                self.functions,
                self.natives,
            );
            (entry.func)(&mut call)
        };
        self.depth -= 1;
        self.tracer.on_return(self.interns.get_str(entry.name), self.depth);

        match result {
            Ok(value) => Ok(value.0),
            Err(mut exc) => {
                exc.push_frame(self.interns.get_str(entry.name));
                Err(exc)
            }
        }
    }

    fn exec_block(&mut self, nodes: &[Node], frame: Option<HeapId>) -> RunResult<Flow> {
        for node in nodes {
            self.heap.tracker_mut().check_time()?;
            self.tracer.on_statement(node.kind(), self.depth);
            match self.exec_node(node, frame)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_node(&mut self, node: &Node, frame: Option<HeapId>) -> RunResult<Flow> {
        match node {
            Node::Expr(expr) => {
                self.eval_expr(expr, frame)?;
            }
            Node::Assign { target, value } => {
                let value = self.eval_expr(value, frame)?;
                self.assign(target, value, frame)?;
            }
            Node::AugAssign { target, op, value } => self.aug_assign(target, *op, value, frame)?,
            Node::If { test, body, orelse } => {
                let test = self.eval_expr(test, frame)?;
                let branch = if test.truthy(&*self.heap, &*self.interns) { body } else { orelse };
                return self.exec_block(branch, frame);
            }
            Node::For { target, iter, body } => {
                let items = self.eval_expr(iter, frame)?.iterate(&*self.heap)?;
                for item in items {
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Next | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
            Node::Pass => {}
            Node::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Node::Def {
                target,
                function,
                defaults,
            } => {
                let value = self.make_function(*function, defaults, frame)?;
                self.store(*target, value, frame)?;
            }
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, target: &AssignTarget, value: Value, frame: Option<HeapId>) -> RunResult<()> {
        match target {
            AssignTarget::Name(ident) => self.store(*ident, value, frame),
            AssignTarget::Index { object, index } => {
                let object = self.eval_expr(object, frame)?;
                let index = self.eval_expr(index, frame)?;
                object.set_index(index, value, &mut *self.heap, &*self.interns)
            }
            AssignTarget::Tuple(targets) => {
                let items = value.iterate(&*self.heap)?;
                if items.len() != targets.len() {
                    return Err(Exception::new(
                        ExcType::TypeError,
                        format!(
                            "cannot unpack {} values into {} targets",
                            items.len(),
                            targets.len()
                        ),
                    ));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
                Ok(())
            }
        }
    }

    /// `target op= value`. `+=` on a list extends it in place, so every alias of the
    /// list (a shared default, another variable) observes the new items.
    fn aug_assign(&mut self, target: &AssignTarget, op: Operator, value: &Expr, frame: Option<HeapId>) -> RunResult<()> {
        match target {
            AssignTarget::Name(ident) => {
                let current = self.load(*ident, frame)?;
                let rhs = self.eval_expr(value, frame)?;
                let updated = self.apply_aug_op(current, op, rhs)?;
                self.store(*ident, updated, frame)
            }
            AssignTarget::Index { object, index } => {
                let object = self.eval_expr(object, frame)?;
                let index = self.eval_expr(index, frame)?;
                let current = object.get_index(index, &*self.heap, &*self.interns)?;
                let rhs = self.eval_expr(value, frame)?;
                let updated = self.apply_aug_op(current, op, rhs)?;
                object.set_index(index, updated, &mut *self.heap, &*self.interns)
            }
            AssignTarget::Tuple(_) => Err(ExcType::syntax_error("illegal expression for augmented assignment")),
        }
    }

    fn apply_aug_op(&mut self, current: Value, op: Operator, rhs: Value) -> RunResult<Value> {
        if op == Operator::Add
            && let Value::Ref(id) = current
            && matches!(self.heap.get(id), HeapData::List(_))
        {
            let items = rhs.iterate(&*self.heap)?;
            if let HeapData::List(list) = self.heap.get_mut(id) {
                list.extend(items)?;
            }
            return Ok(current);
        }
        binary_op(op, current, rhs, &mut *self.heap, &*self.interns)
    }

    /// Frame `frames_up` closure levels above `frame`.
    fn enclosing_frame(&self, frame: Option<HeapId>, frames_up: u16) -> Option<HeapId> {
        let mut current = frame;
        for _ in 0..frames_up {
            current = current.and_then(|id| match self.heap.get(id) {
                HeapData::Frame(f) => f.parent(),
                _ => None,
            });
        }
        current
    }

    fn load(&mut self, ident: Identifier, frame: Option<HeapId>) -> RunResult<Value> {
        let frame_id = match ident.scope {
            NameScope::Global => return self.env.get(ident.name_id, &*self.interns),
            NameScope::Local => frame,
            NameScope::Free(frames_up) => {
                self.tracer
                    .on_free_load(self.interns.get_str(ident.name_id), frames_up);
                self.enclosing_frame(frame, frames_up)
            }
        };
        let value = frame_id.and_then(|id| match self.heap.get(id) {
            HeapData::Frame(f) => f.get(ident.name_id),
            _ => None,
        });
        value.ok_or_else(|| ExcType::local_before_assignment(self.interns.get_str(ident.name_id)))
    }

    fn store(&mut self, ident: Identifier, value: Value, frame: Option<HeapId>) -> RunResult<()> {
        let frame_id = match ident.scope {
            NameScope::Global => None,
            NameScope::Local => frame,
            NameScope::Free(frames_up) => self.enclosing_frame(frame, frames_up),
        };
        if let Some(id) = frame_id
            && let HeapData::Frame(f) = self.heap.get_mut(id)
        {
            f.set(ident.name_id, value);
            return Ok(());
        }
        self.env.set(ident.name_id, value, &*self.interns)
    }

    /// Evaluates the defaults in the defining scope and builds a new function value.
    fn make_function(&mut self, function_id: FunctionId, defaults: &[Expr], frame: Option<HeapId>) -> RunResult<Value> {
        let mut values = Vec::with_capacity(defaults.len());
        for expr in defaults {
            values.push(self.eval_expr(expr, frame)?);
        }
        let functions = self.functions;
        let function = &functions[function_id.index()];
        self.tracer.on_make_function(
            self.interns.get_str(function.name),
            function.defaults_count(),
            function.is_nested,
        );
        if function.is_nested
            && let Some(id) = frame
            && let HeapData::Frame(f) = self.heap.get_mut(id)
        {
            f.mark_captured();
        }
        let closure = Closure {
            function: function_id,
            defaults: values,
            frame: if function.is_nested { frame } else { None },
        };
        Ok(Value::Ref(self.heap.allocate(HeapData::Closure(closure))?))
    }

    fn eval_expr(&mut self, expr: &Expr, frame: Option<HeapId>) -> RunResult<Value> {
        ensure_sufficient_stack(|| self.eval_expr_inner(expr, frame))
    }

    fn eval_expr_inner(&mut self, expr: &Expr, frame: Option<HeapId>) -> RunResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match *literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(b),
                Literal::Int(i) => Value::Int(i),
                Literal::Str(id) => Value::InternString(id),
            }),
            Expr::Name(ident) => self.load(*ident, frame),
            Expr::List(items) => {
                let items = self.eval_exprs(items, frame)?;
                Ok(Value::Ref(self.heap.allocate(HeapData::List(List::new(items)))?))
            }
            Expr::Tuple(items) => {
                let items = self.eval_exprs(items, frame)?;
                Ok(Value::Ref(self.heap.allocate(HeapData::Tuple(items))?))
            }
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval_expr(key, frame)?;
                    let value = self.eval_expr(value, frame)?;
                    dict.insert(key.hash_key(&*self.heap, &*self.interns)?, key, value)?;
                }
                allocate_dict(&mut *self.heap, dict)
            }
            Expr::Index { object, index } => {
                let object = self.eval_expr(object, frame)?;
                let index = self.eval_expr(index, frame)?;
                object.get_index(index, &*self.heap, &*self.interns)
            }
            Expr::Attr { object, attr } => {
                let object = self.eval_expr(object, frame)?;
                self.get_attr(object, *attr)
            }
            Expr::Call { callee, args } => {
                let callee = self.eval_expr(callee, frame)?;
                let args = self.eval_call_args(args, frame)?;
                self.call_value(callee, args)
            }
            Expr::BinOp { left, op, right } => {
                let left = self.eval_expr(left, frame)?;
                let right = self.eval_expr(right, frame)?;
                binary_op(*op, left, right, &mut *self.heap, &*self.interns)
            }
            Expr::Compare { left, op, right } => {
                let left = self.eval_expr(left, frame)?;
                let right = self.eval_expr(right, frame)?;
                self.compare(left, *op, right).map(Value::Bool)
            }
            Expr::Not(operand) => {
                let value = self.eval_expr(operand, frame)?;
                Ok(Value::Bool(!value.truthy(&*self.heap, &*self.interns)))
            }
            Expr::Neg(operand) => match self.eval_expr(operand, frame)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Exception::new(ExcType::OverflowError, format!("integer overflow in -({i})"))),
                other => Err(Exception::new(
                    ExcType::TypeError,
                    format!("bad operand type for unary -: '{}'", other.type_name(&*self.heap)),
                )),
            },
            Expr::And(left, right) => {
                let left = self.eval_expr(left, frame)?;
                if left.truthy(&*self.heap, &*self.interns) {
                    self.eval_expr(right, frame)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval_expr(left, frame)?;
                if left.truthy(&*self.heap, &*self.interns) {
                    Ok(left)
                } else {
                    self.eval_expr(right, frame)
                }
            }
            Expr::IfElse { test, body, orelse } => {
                let test = self.eval_expr(test, frame)?;
                if test.truthy(&*self.heap, &*self.interns) {
                    self.eval_expr(body, frame)
                } else {
                    self.eval_expr(orelse, frame)
                }
            }
            Expr::MakeFunction { function, defaults } => self.make_function(*function, defaults, frame),
        }
    }

    fn eval_exprs(&mut self, exprs: &[Expr], frame: Option<HeapId>) -> RunResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval_expr(expr, frame)).collect()
    }

    /// Evaluates call-site arguments left to right, spreading `*iterable` and `**mapping`.
    fn eval_call_args(&mut self, args: &[CallArg], frame: Option<HeapId>) -> RunResult<ArgValues> {
        let mut positional: SmallVec<[Value; 4]> = SmallVec::new();
        let mut keywords: Vec<(StringId, Value)> = Vec::new();
        for arg in args {
            match arg {
                CallArg::Positional(expr) => positional.push(self.eval_expr(expr, frame)?),
                CallArg::Keyword(name, expr) => {
                    let value = self.eval_expr(expr, frame)?;
                    keywords.push((*name, value));
                }
                CallArg::Star(expr) => {
                    let value = self.eval_expr(expr, frame)?;
                    positional.extend(value.iterate(&*self.heap)?);
                }
                CallArg::StarStar(expr) => {
                    let mapping = self.eval_expr(expr, frame)?;
                    let items: Vec<(Value, Value)> = match mapping {
                        Value::Ref(id) => match self.heap.get(id) {
                            HeapData::Dict(dict) => dict.items().collect(),
                            _ => return Err(mapping_expected(mapping.type_name(&*self.heap))),
                        },
                        _ => return Err(mapping_expected(mapping.type_name(&*self.heap))),
                    };
                    for (key, value) in items {
                        let Some(text) = key.as_str(&*self.heap, &*self.interns) else {
                            return Err(Exception::new(
                                ExcType::TypeError,
                                format!("keywords must be strings, not '{}'", key.type_name(&*self.heap)),
                            ));
                        };
                        let text = text.to_owned();
                        keywords.push((self.interns.intern(&text), value));
                    }
                }
            }
        }
        Ok(ArgValues { positional, keywords })
    }

    /// `value.attr`: struct fields first, then type values of the value's type.
    fn get_attr(&mut self, value: Value, attr: StringId) -> RunResult<Value> {
        if let Value::Ref(id) = value
            && let HeapData::Struct(s) = self.heap.get(id)
            && let Some(field) = s.get(attr)
        {
            return Ok(field);
        }
        let ty = value.value_type(&*self.heap);
        match self.type_values.get_type_value(ty, attr) {
            Some(native) => {
                let method = BoundMethod { receiver: value, native };
                Ok(Value::Ref(self.heap.allocate(HeapData::BoundMethod(method))?))
            }
            None => Err(ExcType::no_attribute(ty.into(), self.interns.get_str(attr))),
        }
    }

    fn compare(&self, left: Value, op: CmpOperator, right: Value) -> RunResult<bool> {
        let heap = &*self.heap;
        let interns = &*self.interns;
        Ok(match op {
            CmpOperator::Eq => left.equals(right, heap, interns)?,
            CmpOperator::NotEq => !left.equals(right, heap, interns)?,
            CmpOperator::Lt => left.compare(right, heap, interns)?.is_lt(),
            CmpOperator::LtE => left.compare(right, heap, interns)?.is_le(),
            CmpOperator::Gt => left.compare(right, heap, interns)?.is_gt(),
            CmpOperator::GtE => left.compare(right, heap, interns)?.is_ge(),
            CmpOperator::In => right.contains(left, heap, interns)?,
            CmpOperator::NotIn => !right.contains(left, heap, interns)?,
        })
    }
}

fn mapping_expected(type_name: &str) -> Exception {
    Exception::new(
        ExcType::TypeError,
        format!("argument after ** must be a dict, not '{type_name}'"),
    )
}
