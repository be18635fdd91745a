//! Host functions callable from the language.
//!
//! The standard library is not part of this crate. A host supplies the functions
//! it needs as plain function pointers, registered either as globals
//! ([`Module::register_native`](crate::Module::register_native)) or as type values
//! reachable by attribute ([`Module::add_type_value`](crate::Module::add_type_value)):
//!
//! ```
//! use starling::{syntax::*, Module, NativeCall, Object, RunResult, Type, ValueRef};
//!
//! fn append(call: &mut NativeCall<'_>) -> RunResult<ValueRef> {
//!     call.check_arity(1)?;
//!     let (Some(list), Some(item)) = (call.receiver(), call.arg(0)) else {
//!         unreachable!("bound methods always have a receiver");
//!     };
//!     call.list_push(list, item)?;
//!     Ok(ValueRef::NONE)
//! }
//!
//! let mut module = Module::new("demo");
//! module.add_type_value(Type::List, "append", append);
//! module
//!     .exec(&[
//!         Stmt::assign("x", Expr::list(vec![])),
//!         Stmt::expr(Expr::call(Expr::attr(Expr::name("x"), "append"), vec![Arg::positional(Expr::int(1))])),
//!     ])
//!     .unwrap();
//! assert_eq!(module.get("x"), Some(Object::List(vec![Object::Int(1)])));
//! ```

use indexmap::IndexMap;

use crate::{
    args::ArgValues,
    exception::{ExcType, Exception, RunResult},
    function::Function,
    heap::{HeapAccess, HeapData},
    intern::{Interns, StringId},
    object::{Object, ReprContext},
    types::Struct,
    value::Value,
};

/// Signature of a host function.
pub type NativeFn = fn(&mut NativeCall<'_>) -> RunResult<ValueRef>;

/// Index of a native in the module's native table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NativeId(u32);

impl NativeId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("Invalid native id"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A registered host function.
#[derive(Debug)]
pub(crate) struct NativeFunction {
    pub name: StringId,
    pub func: NativeFn,
}

/// A type value bound to the object it was looked up on, e.g. `x.append`.
#[derive(Debug)]
pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub native: NativeId,
}

/// Opaque handle to a runtime value, valid for the duration of one native call.
#[derive(Debug, Clone, Copy)]
pub struct ValueRef(pub(crate) Value);

impl ValueRef {
    pub const NONE: Self = Self(Value::None);

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self(Value::Int(value))
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self(Value::Bool(value))
    }
}

/// Everything a native sees of the call that invoked it.
pub struct NativeCall<'a> {
    name: StringId,
    receiver: Option<Value>,
    args: ArgValues,
    heap: &'a mut dyn HeapAccess,
    interns: &'a mut Interns,
    functions: &'a [Function],
    natives: &'a [NativeFunction],
}

impl<'a> NativeCall<'a> {
    pub(crate) fn new(
        name: StringId,
        receiver: Option<Value>,
        args: ArgValues,
        heap: &'a mut dyn HeapAccess,
        interns: &'a mut Interns,
        functions: &'a [Function],
        natives: &'a [NativeFunction],
    ) -> Self {
        Self {
            name,
            receiver,
            args,
            heap,
            interns,
            functions,
            natives,
        }
    }

    /// Name the native was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        self.interns.get_str(self.name)
    }

    /// The object a method was looked up on; `None` for plain functions.
    #[must_use]
    pub fn receiver(&self) -> Option<ValueRef> {
        self.receiver.map(ValueRef)
    }

    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.args.positional.len()
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<ValueRef> {
        self.args.positional.get(index).copied().map(ValueRef)
    }

    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<ValueRef> {
        let id = self.interns.get_id(name)?;
        self.args
            .keywords
            .iter()
            .find(|(key, _)| *key == id)
            .map(|&(_, value)| ValueRef(value))
    }

    /// Keyword argument names in call-site order.
    #[must_use]
    pub fn keyword_names(&self) -> Vec<&str> {
        self.args
            .keywords
            .iter()
            .map(|&(key, _)| self.interns.get_str(key))
            .collect()
    }

    /// Requires exactly `expected` positional arguments and no keywords.
    pub fn check_arity(&self, expected: usize) -> RunResult<()> {
        self.args
            .check_no_keywords(self.name(), |key| self.interns.get_str(key).to_owned())?;
        self.args.check_positional_count(self.name(), expected)
    }

    #[must_use]
    pub fn type_name(&self, value: ValueRef) -> &'static str {
        value.0.type_name(&*self.heap)
    }

    #[must_use]
    pub fn as_int(&self, value: ValueRef) -> Option<i64> {
        match value.0 {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self, value: ValueRef) -> Option<&str> {
        value.0.as_str(&*self.heap, &*self.interns)
    }

    /// Deep copy of a value into a host object.
    #[must_use]
    pub fn to_object(&self, value: ValueRef) -> Object {
        let ctx = ReprContext {
            interns: &*self.interns,
            functions: self.functions,
            natives: self.natives,
        };
        Object::from_value(value.0, &*self.heap, &ctx)
    }

    pub fn from_object(&mut self, object: &Object) -> RunResult<ValueRef> {
        object.to_value(&mut *self.heap, &mut *self.interns).map(ValueRef)
    }

    /// Number of items of a string, list, tuple or dict.
    pub fn length(&self, value: ValueRef) -> RunResult<usize> {
        if let Some(s) = value.0.as_str(&*self.heap, &*self.interns) {
            return Ok(s.chars().count());
        }
        if let Value::Ref(id) = value.0 {
            match self.heap.get(id) {
                HeapData::List(list) => return Ok(list.len()),
                HeapData::Tuple(items) => return Ok(items.len()),
                HeapData::Dict(dict) => return Ok(dict.len()),
                _ => {}
            }
        }
        Err(Exception::new(
            ExcType::TypeError,
            format!("object of type '{}' has no len()", self.type_name(value)),
        ))
    }

    /// Appends `item` to a list in place.
    pub fn list_push(&mut self, list: ValueRef, item: ValueRef) -> RunResult<()> {
        let type_name = self.type_name(list);
        match list.0 {
            Value::Ref(id) => match self.heap.get_mut(id) {
                HeapData::List(items) => items.push(item.0),
                _ => Err(expected_list(self.interns.get_str(self.name), type_name)),
            },
            _ => Err(expected_list(self.interns.get_str(self.name), type_name)),
        }
    }

    /// Removes every item of a list in place.
    pub fn list_clear(&mut self, list: ValueRef) -> RunResult<()> {
        let type_name = self.type_name(list);
        match list.0 {
            Value::Ref(id) => match self.heap.get_mut(id) {
                HeapData::List(items) => items.clear(),
                _ => Err(expected_list(self.interns.get_str(self.name), type_name)),
            },
            _ => Err(expected_list(self.interns.get_str(self.name), type_name)),
        }
    }

    /// Builds a struct whose fields are the call's keyword arguments.
    pub fn new_struct_from_keywords(&mut self) -> RunResult<ValueRef> {
        let fields: IndexMap<StringId, Value> = self.args.keywords.iter().copied().collect();
        let id = self.heap.allocate(HeapData::Struct(Struct::new(fields)))?;
        Ok(ValueRef(Value::Ref(id)))
    }

    /// Allocates a new string value.
    pub fn new_string(&mut self, text: impl Into<String>) -> RunResult<ValueRef> {
        let id = self.heap.allocate(HeapData::Str(text.into()))?;
        Ok(ValueRef(Value::Ref(id)))
    }
}

fn expected_list(name: &str, type_name: &str) -> Exception {
    Exception::new(
        ExcType::TypeError,
        format!("{name}() expected a list, got '{type_name}'"),
    )
}
