use indexmap::IndexMap;

use crate::{intern::StringId, value::Value};

/// An immutable record with named fields, built by host natives.
///
/// Fields are read with attribute syntax (`s.field`). A field holding a
/// function value makes `s.field(...)` call it, with no receiver bound.
#[derive(Debug, Default)]
pub(crate) struct Struct {
    fields: IndexMap<StringId, Value>,
}

impl Struct {
    pub fn new(fields: IndexMap<StringId, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: StringId) -> Option<Value> {
        self.fields.get(&name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (StringId, Value)> + '_ {
        self.fields.iter().map(|(&name, &value)| (name, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}
