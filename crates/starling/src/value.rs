use std::cmp::Ordering;

use crate::{
    exception::{ExcType, Exception, RunResult},
    heap::{HeapAccess, HeapData, HeapId},
    intern::{Interns, StringId},
    native::NativeId,
    resource::MAX_DATA_RECURSION_DEPTH,
    syntax::Operator,
    types::{Dict, HashKey, List, Type, list::normalize_index},
};

/// A runtime value.
///
/// Immediate values (`None`, booleans, integers, interned strings, natives) are
/// stored inline. Everything else lives in the heap and is referenced by id, so
/// copying a `Value` never copies a container: assignment, argument passing and
/// default values all share the referenced object.
///
/// `Value` deliberately does not implement `PartialEq`. Language equality needs the
/// heap ([`Value::equals`]), identity is [`Value::is_identical`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// A string whose text lives in the interner (literals, keyword names, field names).
    InternString(StringId),
    Ref(HeapId),
    /// A host function registered with the module.
    Native(NativeId),
}

impl Value {
    pub fn value_type(self, heap: &(impl HeapAccess + ?Sized)) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::InternString(_) => Type::String,
            Self::Native(_) => Type::BuiltinFunction,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(_) => Type::String,
                HeapData::List(_) => Type::List,
                HeapData::Tuple(_) => Type::Tuple,
                HeapData::Dict(_) => Type::Dict,
                HeapData::Struct(_) => Type::Struct,
                HeapData::Closure(_) => Type::Function,
                HeapData::BoundMethod(_) => Type::BuiltinFunction,
                // frames are never stored in values
                HeapData::Frame(_) => Type::NoneType,
            },
        }
    }

    #[inline]
    pub fn type_name(self, heap: &(impl HeapAccess + ?Sized)) -> &'static str {
        self.value_type(heap).into()
    }

    /// Same object (heap values) or same immediate value.
    pub fn is_identical(self, other: Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::InternString(a), Self::InternString(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Native(a), Self::Native(b)) => a == b,
            _ => false,
        }
    }

    pub fn truthy(self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::InternString(id) => !interns.get_str(id).is_empty(),
            Self::Native(_) => true,
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => !s.is_empty(),
                HeapData::List(list) => list.len() > 0,
                HeapData::Tuple(items) => !items.is_empty(),
                HeapData::Dict(dict) => dict.len() > 0,
                _ => true,
            },
        }
    }

    /// Text of a string value, wherever it is stored.
    pub fn as_str<'a>(self, heap: &'a (impl HeapAccess + ?Sized), interns: &'a Interns) -> Option<&'a str> {
        match self {
            Self::InternString(id) => Some(interns.get_str(id)),
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Hash projection for use as a dict key; mutable values are unhashable.
    pub fn hash_key(self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<HashKey> {
        self.hash_key_inner(heap, interns, 0)
    }

    fn hash_key_inner(self, heap: &(impl HeapAccess + ?Sized), interns: &Interns, depth: usize) -> RunResult<HashKey> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(data_too_deep("hash"));
        }
        match self {
            Self::None => Ok(HashKey::None),
            Self::Bool(b) => Ok(HashKey::Bool(b)),
            Self::Int(i) => Ok(HashKey::Int(i)),
            Self::InternString(id) => Ok(HashKey::Str(interns.get_str(id).to_owned())),
            Self::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => Ok(HashKey::Str(s.clone())),
                HeapData::Tuple(items) => items
                    .iter()
                    .map(|item| item.hash_key_inner(heap, interns, depth + 1))
                    .collect::<RunResult<Vec<_>>>()
                    .map(HashKey::Tuple),
                _ => Err(ExcType::unhashable(self.type_name(heap))),
            },
            Self::Native(_) => Err(ExcType::unhashable(self.type_name(heap))),
        }
    }

    /// Language-level equality (`==`).
    ///
    /// Strings, lists, tuples, dicts and structs compare by content; functions
    /// compare by identity. Values of different types are never equal.
    pub fn equals(self, other: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<bool> {
        self.equals_inner(other, heap, interns, 0)
    }

    fn equals_inner(self, other: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns, depth: usize) -> RunResult<bool> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(data_too_deep("comparison"));
        }
        if self.is_identical(other) {
            return Ok(true);
        }
        if let (Some(a), Some(b)) = (self.as_str(heap, interns), other.as_str(heap, interns)) {
            return Ok(a == b);
        }
        let (Self::Ref(a), Self::Ref(b)) = (self, other) else {
            return Ok(false);
        };
        match (heap.get(a), heap.get(b)) {
            (HeapData::List(x), HeapData::List(y)) => sequences_equal(x.items(), y.items(), heap, interns, depth),
            (HeapData::Tuple(x), HeapData::Tuple(y)) => sequences_equal(x, y, heap, interns, depth),
            (HeapData::Dict(x), HeapData::Dict(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (key, value) in x.hashed_items() {
                    let Some(other_value) = y.get(key) else {
                        return Ok(false);
                    };
                    if !value.equals_inner(other_value, heap, interns, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Struct(x), HeapData::Struct(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (name, value) in x.fields() {
                    let Some(other_value) = y.get(name) else {
                        return Ok(false);
                    };
                    if !value.equals_inner(other_value, heap, interns, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.
    ///
    /// Defined for integers, booleans, strings, and lists or tuples (lexicographic).
    pub fn compare(self, other: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<Ordering> {
        self.compare_inner(other, heap, interns, 0)
    }

    fn compare_inner(self, other: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns, depth: usize) -> RunResult<Ordering> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(data_too_deep("comparison"));
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => return Ok(a.cmp(&b)),
            (Self::Bool(a), Self::Bool(b)) => return Ok(a.cmp(&b)),
            _ => {}
        }
        if let (Some(a), Some(b)) = (self.as_str(heap, interns), other.as_str(heap, interns)) {
            return Ok(a.cmp(b));
        }
        if let (Self::Ref(a), Self::Ref(b)) = (self, other) {
            let pair = match (heap.get(a), heap.get(b)) {
                (HeapData::List(x), HeapData::List(y)) => Some((x.items(), y.items())),
                (HeapData::Tuple(x), HeapData::Tuple(y)) => Some((x.as_slice(), y.as_slice())),
                _ => None,
            };
            if let Some((x, y)) = pair {
                for (&left, &right) in x.iter().zip(y) {
                    let ordering = left.compare_inner(right, heap, interns, depth + 1)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                return Ok(x.len().cmp(&y.len()));
            }
        }
        Err(Exception::new(
            ExcType::TypeError,
            format!(
                "comparison not supported between '{}' and '{}'",
                self.type_name(heap),
                other.type_name(heap)
            ),
        ))
    }

    /// Membership test for `in` / `not in`, with `self` as the container.
    pub fn contains(self, item: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<bool> {
        if let Some(haystack) = self.as_str(heap, interns) {
            let Some(needle) = item.as_str(heap, interns) else {
                return Err(Exception::new(
                    ExcType::TypeError,
                    format!("'in <string>' requires string as left operand, not {}", item.type_name(heap)),
                ));
            };
            return Ok(haystack.contains(needle));
        }
        if let Self::Ref(id) = self {
            match heap.get(id) {
                HeapData::List(list) => return any_equal(list.items(), item, heap, interns),
                HeapData::Tuple(items) => return any_equal(items, item, heap, interns),
                HeapData::Dict(dict) => return Ok(dict.contains_key(&item.hash_key(heap, interns)?)),
                _ => {}
            }
        }
        Err(Exception::new(
            ExcType::TypeError,
            format!("argument of type '{}' is not iterable", self.type_name(heap)),
        ))
    }

    /// Snapshot of the items a `for` loop or `*args` spreading walks over.
    ///
    /// Dicts yield their keys.
    pub fn iterate(self, heap: &(impl HeapAccess + ?Sized)) -> RunResult<Vec<Self>> {
        if let Self::Ref(id) = self {
            match heap.get(id) {
                HeapData::List(list) => return Ok(list.items().to_vec()),
                HeapData::Tuple(items) => return Ok(items.clone()),
                HeapData::Dict(dict) => return Ok(dict.keys().collect()),
                _ => {}
            }
        }
        Err(ExcType::not_iterable(self.type_name(heap)))
    }

    /// Evaluates `self[index]`.
    pub fn get_index(self, index: Self, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<Self> {
        let type_name = self.type_name(heap);
        if let Self::Ref(id) = self {
            match heap.get(id) {
                HeapData::List(list) => {
                    let i = int_index(index, heap)?;
                    return Ok(list.items()[normalize_index(i, list.len(), type_name)?]);
                }
                HeapData::Tuple(items) => {
                    let i = int_index(index, heap)?;
                    return Ok(items[normalize_index(i, items.len(), type_name)?]);
                }
                HeapData::Dict(dict) => {
                    let key = index.hash_key(heap, interns)?;
                    return dict.get(&key).ok_or_else(|| key_error(&key));
                }
                _ => {}
            }
        }
        Err(Exception::new(
            ExcType::TypeError,
            format!("'{type_name}' object is not subscriptable"),
        ))
    }

    /// Performs `self[index] = value` in place.
    pub fn set_index(self, index: Self, value: Self, heap: &mut (impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<()> {
        let type_name = self.type_name(heap);
        if let Self::Ref(id) = self {
            if matches!(heap.get(id), HeapData::List(_)) {
                let i = int_index(index, heap)?;
                if let HeapData::List(list) = heap.get_mut(id) {
                    let position = normalize_index(i, list.len(), type_name)?;
                    return list.set(position, value);
                }
            } else if matches!(heap.get(id), HeapData::Dict(_)) {
                let key = index.hash_key(heap, interns)?;
                if let HeapData::Dict(dict) = heap.get_mut(id) {
                    return dict.insert(key, index, value);
                }
            }
        }
        Err(Exception::new(
            ExcType::TypeError,
            format!("'{type_name}' object does not support item assignment"),
        ))
    }
}

/// Applies a binary arithmetic operator.
///
/// Integer arithmetic is checked: overflow raises `OverflowError` and a zero divisor
/// raises `ZeroDivisionError`. `//` and `%` round toward negative infinity.
/// `+` also concatenates strings, lists and tuples into a new object.
pub(crate) fn binary_op(
    op: Operator,
    left: Value,
    right: Value,
    heap: &mut (impl HeapAccess + ?Sized),
    interns: &Interns,
) -> RunResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return int_op(op, a, b).map(Value::Int);
    }
    if op == Operator::Add {
        if let (Some(a), Some(b)) = (left.as_str(heap, interns), right.as_str(heap, interns)) {
            let joined = format!("{a}{b}");
            return Ok(Value::Ref(heap.allocate(HeapData::Str(joined))?));
        }
        if let (Value::Ref(a), Value::Ref(b)) = (left, right) {
            let joined = match (heap.get(a), heap.get(b)) {
                (HeapData::List(x), HeapData::List(y)) => {
                    Some(HeapData::List(List::new(x.items().iter().chain(y.items()).copied().collect())))
                }
                (HeapData::Tuple(x), HeapData::Tuple(y)) => Some(HeapData::Tuple(x.iter().chain(y).copied().collect())),
                _ => None,
            };
            if let Some(data) = joined {
                return Ok(Value::Ref(heap.allocate(data)?));
            }
        }
    }
    Err(ExcType::unsupported_operand(
        op.into(),
        left.type_name(heap),
        right.type_name(heap),
    ))
}

fn int_op(op: Operator, a: i64, b: i64) -> RunResult<i64> {
    let overflow = || Exception::new(ExcType::OverflowError, format!("integer overflow in {a} {op} {b}"));
    match op {
        Operator::Add => a.checked_add(b).ok_or_else(overflow),
        Operator::Sub => a.checked_sub(b).ok_or_else(overflow),
        Operator::Mult => a.checked_mul(b).ok_or_else(overflow),
        Operator::FloorDiv => {
            if b == 0 {
                return Err(division_by_zero());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(quotient - 1)
            } else {
                Ok(quotient)
            }
        }
        Operator::Mod => {
            if b == 0 {
                return Err(division_by_zero());
            }
            // i64::MIN % -1 is 0 mathematically but overflows in hardware
            let remainder = a.checked_rem(b).unwrap_or(0);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                Ok(remainder + b)
            } else {
                Ok(remainder)
            }
        }
    }
}

fn division_by_zero() -> Exception {
    Exception::new(ExcType::ZeroDivisionError, "integer division or modulo by zero")
}

fn data_too_deep(what: &str) -> Exception {
    Exception::new(
        ExcType::RecursionTooDeep,
        format!("maximum recursion depth exceeded in {what}"),
    )
}

fn int_index(index: Value, heap: &(impl HeapAccess + ?Sized)) -> RunResult<i64> {
    match index {
        Value::Int(i) => Ok(i),
        other => Err(Exception::new(
            ExcType::TypeError,
            format!("indices must be integers, not {}", other.type_name(heap)),
        )),
    }
}

fn key_error(key: &HashKey) -> Exception {
    Exception::new(ExcType::KeyError, format!("key {key} not found in dictionary"))
}

fn sequences_equal(
    x: &[Value],
    y: &[Value],
    heap: &(impl HeapAccess + ?Sized),
    interns: &Interns,
    depth: usize,
) -> RunResult<bool> {
    if x.len() != y.len() {
        return Ok(false);
    }
    for (&a, &b) in x.iter().zip(y) {
        if !a.equals_inner(b, heap, interns, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_equal(items: &[Value], item: Value, heap: &(impl HeapAccess + ?Sized), interns: &Interns) -> RunResult<bool> {
    for &candidate in items {
        if candidate.equals(item, heap, interns)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Allocates an empty dict; used by `**kwargs` collection and dict displays.
pub(crate) fn allocate_dict(heap: &mut (impl HeapAccess + ?Sized), dict: Dict) -> RunResult<Value> {
    Ok(Value::Ref(heap.allocate(HeapData::Dict(dict))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(int_op(Operator::FloorDiv, 7, 2).unwrap(), 3);
        assert_eq!(int_op(Operator::FloorDiv, -7, 2).unwrap(), -4);
        assert_eq!(int_op(Operator::Mod, -7, 2).unwrap(), 1);
        assert_eq!(int_op(Operator::Mod, 7, -2).unwrap(), -1);
        assert_eq!(int_op(Operator::FloorDiv, 1, 0).unwrap_err().exc_type(), ExcType::ZeroDivisionError);
        assert_eq!(int_op(Operator::Add, i64::MAX, 1).unwrap_err().exc_type(), ExcType::OverflowError);
        assert_eq!(int_op(Operator::FloorDiv, i64::MIN, -1).unwrap_err().exc_type(), ExcType::OverflowError);
    }

    #[test]
    fn interned_and_heap_strings_compare_equal() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let mut interns = Interns::new();
        let literal = Value::InternString(interns.intern("abc"));
        let built = Value::Ref(heap.allocate(HeapData::Str("abc".to_owned())).unwrap());
        assert!(literal.equals(built, &heap, &interns).unwrap());
        assert_eq!(
            literal.hash_key(&heap, &interns).unwrap(),
            built.hash_key(&heap, &interns).unwrap()
        );
    }

    #[test]
    fn lists_compare_by_content_but_are_unhashable() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let interns = Interns::new();
        let a = Value::Ref(heap.allocate(HeapData::List(List::new(vec![Value::Int(0)]))).unwrap());
        let b = Value::Ref(heap.allocate(HeapData::List(List::new(vec![Value::Int(0)]))).unwrap());
        assert!(a.equals(b, &heap, &interns).unwrap());
        assert!(!a.is_identical(b));
        assert_eq!(a.hash_key(&heap, &interns).unwrap_err().exc_type(), ExcType::TypeError);
    }

    #[test]
    fn deeply_nested_equality_is_an_error_not_a_crash() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let interns = Interns::new();
        let mut a = Value::None;
        let mut b = Value::None;
        for _ in 0..(MAX_DATA_RECURSION_DEPTH + 5) {
            a = Value::Ref(heap.allocate(HeapData::List(List::new(vec![a]))).unwrap());
            b = Value::Ref(heap.allocate(HeapData::List(List::new(vec![b]))).unwrap());
        }
        let err = a.equals(b, &heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::RecursionTooDeep);
    }

    #[test]
    fn item_assignment_resolves_the_index_before_writing() {
        let mut heap = Heap::new(NoLimitTracker::new());
        let mut interns = Interns::new();
        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let list = Value::Ref(heap.allocate(HeapData::List(List::new(items))).unwrap());
        let ints = |heap: &Heap<NoLimitTracker>| match list {
            Value::Ref(id) => match heap.get(id) {
                HeapData::List(list) => list
                    .items()
                    .iter()
                    .map(|v| if let Value::Int(i) = v { *i } else { -1 })
                    .collect::<Vec<_>>(),
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };

        list.set_index(Value::Int(-1), Value::Int(9), &mut heap, &interns).unwrap();
        assert_eq!(ints(&heap), [1, 2, 9]);

        let err = list.set_index(Value::Int(3), Value::Int(0), &mut heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::IndexError);

        // a non-integer index never falls back to slot 0
        let key = Value::InternString(interns.intern("a"));
        let err = list.set_index(key, Value::Int(0), &mut heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
        assert_eq!(err.message(), "indices must be integers, not string");
        assert_eq!(ints(&heap), [1, 2, 9]);

        let err = key.set_index(Value::Int(0), Value::Int(0), &mut heap, &interns).unwrap_err();
        assert_eq!(err.message(), "'string' object does not support item assignment");
    }
}
