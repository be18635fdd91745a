use std::fmt;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Hashable projection of a value, used as a dict key.
///
/// Only immutable values hash: `None`, booleans, integers, strings and tuples of
/// those. Strings hash by content, so an interned literal and a runtime string
/// with the same text are the same key. `True` and `1` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HashKey {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<HashKey>),
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// An insertion-ordered dictionary.
///
/// Each entry keeps the original key value next to its hash projection so that
/// iteration and host conversion give back the key exactly as it was inserted.
#[derive(Debug, Default)]
pub(crate) struct Dict {
    entries: IndexMap<HashKey, (Value, Value), RandomState>,
    frozen: bool,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &HashKey) -> Option<Value> {
        self.entries.get(key).map(|&(_, value)| value)
    }

    pub fn contains_key(&self, key: &HashKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces an entry. Replacing keeps the original insertion position.
    pub fn insert(&mut self, hash_key: HashKey, key: Value, value: Value) -> RunResult<()> {
        if self.frozen {
            return Err(ExcType::frozen_value("dict"));
        }
        self.entries.insert(hash_key, (key, value));
        Ok(())
    }

    /// Key values in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.values().map(|&(key, _)| key)
    }

    /// `(key, value)` pairs in insertion order.
    pub fn items(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.values().copied()
    }

    /// `(hash key, value)` pairs, for comparing dicts key by key.
    pub fn hashed_items(&self) -> impl Iterator<Item = (&HashKey, Value)> + '_ {
        self.entries.iter().map(|(hash_key, &(_, value))| (hash_key, value))
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_survives_replacement() {
        let mut dict = Dict::new();
        dict.insert(HashKey::Int(2), Value::Int(2), Value::Bool(false)).unwrap();
        dict.insert(HashKey::Int(1), Value::Int(1), Value::Bool(false)).unwrap();
        dict.insert(HashKey::Int(2), Value::Int(2), Value::Bool(true)).unwrap();
        let keys: Vec<i64> = dict
            .keys()
            .map(|key| match key {
                Value::Int(i) => i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, [2, 1]);
        assert!(matches!(dict.get(&HashKey::Int(2)), Some(Value::Bool(true))));
    }

    #[test]
    fn bool_and_int_keys_are_distinct() {
        let mut dict = Dict::new();
        dict.insert(HashKey::Bool(true), Value::Bool(true), Value::None).unwrap();
        assert!(!dict.contains_key(&HashKey::Int(1)));
    }
}
