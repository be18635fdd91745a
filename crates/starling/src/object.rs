use std::fmt::{self, Write};

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    exception::{ExcType, Exception, RunResult},
    function::Function,
    heap::{HeapAccess, HeapData, HeapId},
    intern::Interns,
    native::NativeFunction,
    resource::MAX_DATA_RECURSION_DEPTH,
    types::{Dict, List, Struct},
    value::Value,
};

/// A value passed to or returned from the evaluator.
///
/// This is the public-facing type for language values. It owns all its data and can
/// be freely cloned, compared or serialized. Unlike the internal `Value` type,
/// `Object` does not need the module heap.
///
/// # Input vs Output Variants
///
/// Most variants work both as inputs (call arguments, [`Module::set`](crate::Module::set))
/// and outputs. `Repr` and `Cycle` are output-only: functions have no owned form,
/// and a container reached again while it is being converted becomes a `Cycle`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Object {
    #[serde(alias = "none", alias = "NoneType")]
    None,
    #[serde(alias = "bool")]
    Bool(bool),
    #[serde(alias = "int")]
    Int(i64),
    #[serde(alias = "str")]
    String(String),
    #[serde(alias = "list")]
    List(Vec<Self>),
    #[serde(alias = "tuple")]
    Tuple(Vec<Self>),
    /// Insertion-ordered key/value pairs.
    #[serde(alias = "dict")]
    Dict(Vec<(Self, Self)>),
    /// Named fields in definition order.
    #[serde(alias = "struct")]
    Struct(Vec<(String, Self)>),
    /// A value without an owned form, e.g. `<function f>`.
    Repr(String),
    /// A container that contains itself, e.g. `[...]`.
    Cycle(String),
}

/// Name tables needed to describe functions while converting.
pub(crate) struct ReprContext<'a> {
    pub interns: &'a Interns,
    pub functions: &'a [Function],
    pub natives: &'a [NativeFunction],
}

impl ReprContext<'_> {
    fn function_name(&self, function: &Function) -> &str {
        self.interns.get_str(function.name)
    }

    fn native_name(&self, native: &NativeFunction) -> &str {
        self.interns.get_str(native.name)
    }
}

impl Object {
    /// Converts a runtime value into an owned object.
    pub(crate) fn from_value(value: Value, heap: &(impl HeapAccess + ?Sized), ctx: &ReprContext<'_>) -> Self {
        let mut visiting = AHashSet::new();
        Self::from_value_inner(value, heap, ctx, &mut visiting)
    }

    /// `visiting` holds the containers on the current conversion path; meeting one of
    /// them again means the value is cyclic.
    fn from_value_inner(
        value: Value,
        heap: &(impl HeapAccess + ?Sized),
        ctx: &ReprContext<'_>,
        visiting: &mut AHashSet<HeapId>,
    ) -> Self {
        match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::Int(i),
            Value::InternString(id) => Self::String(ctx.interns.get_str(id).to_owned()),
            Value::Native(id) => Self::Repr(format!("<built-in function {}>", ctx.native_name(&ctx.natives[id.index()]))),
            Value::Ref(id) => {
                if visiting.contains(&id) {
                    return match heap.get(id) {
                        HeapData::List(_) => Self::Cycle("[...]".to_owned()),
                        HeapData::Tuple(_) => Self::Cycle("(...)".to_owned()),
                        HeapData::Dict(_) => Self::Cycle("{...}".to_owned()),
                        _ => Self::Cycle("...".to_owned()),
                    };
                }
                if visiting.len() >= MAX_DATA_RECURSION_DEPTH {
                    return Self::Repr("...".to_owned());
                }
                visiting.insert(id);
                let mut convert = |v: Value| Self::from_value_inner(v, heap, ctx, visiting);
                let result = match heap.get(id) {
                    HeapData::Str(s) => Self::String(s.clone()),
                    HeapData::List(list) => Self::List(list.items().iter().map(|&v| convert(v)).collect()),
                    HeapData::Tuple(items) => Self::Tuple(items.iter().map(|&v| convert(v)).collect()),
                    HeapData::Dict(dict) => Self::Dict(dict.items().map(|(k, v)| (convert(k), convert(v))).collect()),
                    HeapData::Struct(s) => Self::Struct(
                        s.fields()
                            .map(|(name, v)| (ctx.interns.get_str(name).to_owned(), convert(v)))
                            .collect(),
                    ),
                    HeapData::Closure(closure) => {
                        Self::Repr(format!("<function {}>", ctx.function_name(&ctx.functions[closure.function.index()])))
                    }
                    HeapData::BoundMethod(method) => Self::Repr(format!(
                        "<bound method {} of {}>",
                        ctx.native_name(&ctx.natives[method.native.index()]),
                        method.receiver.type_name(heap)
                    )),
                    HeapData::Frame(_) => Self::Repr("<frame>".to_owned()),
                };
                visiting.remove(&id);
                result
            }
        }
    }

    /// Converts this object into a runtime value, allocating containers on the heap.
    ///
    /// # Errors
    /// `InvalidInput` for the output-only `Repr` and `Cycle` variants, `TypeError` for
    /// unhashable dict keys, `ResourceExhausted` if an allocation limit is hit.
    pub(crate) fn to_value(&self, heap: &mut (impl HeapAccess + ?Sized), interns: &mut Interns) -> RunResult<Value> {
        self.to_value_inner(heap, interns, 0)
    }

    fn to_value_inner(&self, heap: &mut (impl HeapAccess + ?Sized), interns: &mut Interns, depth: usize) -> RunResult<Value> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(Exception::new(ExcType::InvalidInput, "object nested too deeply"));
        }
        let data = match self {
            Self::None => return Ok(Value::None),
            Self::Bool(b) => return Ok(Value::Bool(*b)),
            Self::Int(i) => return Ok(Value::Int(*i)),
            Self::String(s) => HeapData::Str(s.clone()),
            Self::List(items) => HeapData::List(List::new(Self::to_values(items, heap, interns, depth)?)),
            Self::Tuple(items) => HeapData::Tuple(Self::to_values(items, heap, interns, depth)?),
            Self::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = key.to_value_inner(heap, interns, depth + 1)?;
                    let value = value.to_value_inner(heap, interns, depth + 1)?;
                    dict.insert(key.hash_key(&*heap, interns)?, key, value)?;
                }
                HeapData::Dict(dict)
            }
            Self::Struct(fields) => {
                let mut converted = IndexMap::with_capacity(fields.len());
                for (name, value) in fields {
                    let value = value.to_value_inner(heap, interns, depth + 1)?;
                    converted.insert(interns.intern(name), value);
                }
                HeapData::Struct(Struct::new(converted))
            }
            Self::Repr(_) | Self::Cycle(_) => {
                return Err(Exception::new(
                    ExcType::InvalidInput,
                    format!("{} objects cannot be passed into the evaluator", self.type_name()),
                ));
            }
        };
        Ok(Value::Ref(heap.allocate(data)?))
    }

    fn to_values(
        items: &[Self],
        heap: &mut (impl HeapAccess + ?Sized),
        interns: &mut Interns,
        depth: usize,
    ) -> RunResult<Vec<Value>> {
        items
            .iter()
            .map(|item| item.to_value_inner(heap, interns, depth + 1))
            .collect()
    }

    /// Language type name of this object.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Struct(_) => "struct",
            Self::Repr(_) => "repr",
            Self::Cycle(_) => "cycle",
        }
    }

    /// Returns the source-like representation, e.g. `["a", 1]`.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut s = String::new();
        // writing to a String cannot fail
        let _ = self.repr_fmt(&mut s);
        s
    }

    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_char('[')?;
                write_items(f, items)?;
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::Dict(pairs) => {
                f.write_char('{')?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    key.repr_fmt(f)?;
                    f.write_str(": ")?;
                    value.repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Struct(fields) => {
                f.write_str("struct(")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = ")?;
                    value.repr_fmt(f)?;
                }
                f.write_char(')')
            }
            Self::Repr(text) | Self::Cycle(text) => f.write_str(text),
        }
    }
}

fn write_items(f: &mut impl Write, items: &[Object]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.repr_fmt(f)?;
    }
    Ok(())
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            _ => self.repr_fmt(f),
        }
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Object {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    fn empty_ctx(interns: &Interns) -> ReprContext<'_> {
        ReprContext {
            interns,
            functions: &[],
            natives: &[],
        }
    }

    #[test]
    fn self_containing_list_becomes_a_cycle() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let interns = Interns::new();
        let id = heap.allocate(HeapData::List(List::new(vec![Value::Int(1)]))).unwrap();
        if let HeapData::List(list) = heap.get_mut(id) {
            list.push(Value::Ref(id)).unwrap();
        }
        let object = Object::from_value(Value::Ref(id), &heap, &empty_ctx(&interns));
        assert_eq!(
            object,
            Object::List(vec![Object::Int(1), Object::Cycle("[...]".to_owned())])
        );
        assert_eq!(object.repr(), "[1, [...]]");
    }

    #[test]
    fn shared_but_acyclic_values_are_copied_twice() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let interns = Interns::new();
        let inner = Value::Ref(heap.allocate(HeapData::List(List::new(vec![]))).unwrap());
        let outer = heap.allocate(HeapData::Tuple(vec![inner, inner])).unwrap();
        let object = Object::from_value(Value::Ref(outer), &heap, &empty_ctx(&interns));
        assert_eq!(object, Object::Tuple(vec![Object::List(vec![]), Object::List(vec![])]));
    }

    #[test]
    fn host_objects_convert_into_values() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let mut interns = Interns::new();
        let object = Object::Dict(vec![
            (Object::from("a"), Object::Tuple(vec![Object::Int(1)])),
            (Object::Int(2), Object::Struct(vec![("f".to_owned(), Object::None)])),
        ]);
        let value = object.to_value(&mut heap, &mut interns).unwrap();
        assert_eq!(Object::from_value(value, &heap, &empty_ctx(&interns)), object);
        assert_eq!(object.repr(), r#"{"a": (1,), 2: struct(f = None)}"#);
    }

    #[test]
    fn unhashable_keys_and_reprs_are_rejected() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let mut interns = Interns::new();
        let bad_key = Object::Dict(vec![(Object::List(vec![]), Object::None)]);
        assert_eq!(
            bad_key.to_value(&mut heap, &mut interns).unwrap_err().exc_type(),
            ExcType::TypeError
        );
        let repr = Object::Repr("<function f>".to_owned());
        assert_eq!(
            repr.to_value(&mut heap, &mut interns).unwrap_err().exc_type(),
            ExcType::InvalidInput
        );
    }
}
