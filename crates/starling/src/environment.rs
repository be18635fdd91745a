use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    exception::{ExcType, RunResult},
    heap::HeapId,
    intern::{Interns, StringId},
    native::NativeId,
    types::Type,
    value::Value,
};

/// Global bindings of a module.
///
/// Reads fall back to the builtin table, so a module global shadows a builtin of the
/// same name. Once frozen, every assignment fails with `FrozenEnvironment`.
#[derive(Debug, Default)]
pub(crate) struct Environment {
    globals: IndexMap<StringId, Value>,
    builtins: IndexMap<StringId, NativeId>,
    frozen: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: StringId, value: Value, interns: &Interns) -> RunResult<()> {
        if self.frozen {
            return Err(ExcType::frozen_environment(interns.get_str(name)));
        }
        self.globals.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: StringId, interns: &Interns) -> RunResult<Value> {
        if let Some(&value) = self.globals.get(&name) {
            return Ok(value);
        }
        match self.builtins.get(&name) {
            Some(&native) => Ok(Value::Native(native)),
            None => Err(ExcType::variable_not_found(interns.get_str(name))),
        }
    }

    /// Adds a host function to the builtin table.
    pub fn add_builtin(&mut self, name: StringId, native: NativeId) {
        self.builtins.insert(name, native);
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Names of the module globals, in first-assignment order.
    pub fn names(&self) -> impl Iterator<Item = StringId> + '_ {
        self.globals.keys().copied()
    }

    /// Heap objects referenced by globals: the roots for collection and freezing.
    pub fn roots(&self) -> Vec<HeapId> {
        self.globals
            .values()
            .filter_map(|value| match value {
                Value::Ref(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

/// Host functions reachable by attribute on values of a given type, e.g. `x.append`.
#[derive(Debug, Default)]
pub(crate) struct TypeValues {
    by_type: AHashMap<Type, IndexMap<StringId, NativeId>>,
}

impl TypeValues {
    pub fn add_type_value(&mut self, ty: Type, attr: StringId, native: NativeId) {
        self.by_type.entry(ty).or_default().insert(attr, native);
    }

    pub fn get_type_value(&self, ty: Type, attr: StringId) -> Option<NativeId> {
        self.by_type.get(&ty)?.get(&attr).copied()
    }

    /// Attribute names registered for `ty`, in registration order.
    pub fn list_type_value(&self, ty: Type) -> Vec<StringId> {
        self.by_type
            .get(&ty)
            .map(|attrs| attrs.keys().copied().collect())
            .unwrap_or_default()
    }
}
