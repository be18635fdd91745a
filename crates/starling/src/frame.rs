use ahash::AHashMap;

use crate::{heap::HeapId, intern::StringId, value::Value};

/// Local bindings of one function call.
///
/// A frame is allocated on the heap when a call starts. `parent` is the frame the
/// called function was defined in (its closure frame), not the caller's frame:
/// free variables resolve lexically by walking `parent` a fixed number of times.
///
/// The frame is freed when its call returns, unless a nested closure captured it.
/// A captured frame stays alive exactly as long as some closure defined in it is
/// reachable; the collector takes care of that.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    vars: AHashMap<StringId, Value>,
    parent: Option<HeapId>,
    /// Set once a nested `def` or `lambda` runs in this frame.
    captured: bool,
}

impl Frame {
    /// Creates a frame holding bound parameters.
    pub fn with_bindings(parent: Option<HeapId>, bindings: impl IntoIterator<Item = (StringId, Value)>) -> Self {
        Self {
            vars: bindings.into_iter().collect(),
            parent,
            captured: false,
        }
    }

    /// Returns the binding for `name`, or `None` if it has not been assigned yet.
    #[inline]
    pub fn get(&self, name: StringId) -> Option<Value> {
        self.vars.get(&name).copied()
    }

    pub fn set(&mut self, name: StringId, value: Value) {
        self.vars.insert(name, value);
    }

    pub fn parent(&self) -> Option<HeapId> {
        self.parent
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.vars.values().copied()
    }

    pub fn mark_captured(&mut self) {
        self.captured = true;
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}
