use crate::{
    expressions::{Expr, Node},
    heap::HeapId,
    intern::StringId,
    signature::Signature,
    value::Value,
};

/// Index of a [`Function`] in the module's function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FunctionId(u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("Invalid function id"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Body of a function definition.
#[derive(Debug)]
pub(crate) enum FunctionBody {
    /// Statements of a `def`.
    Block(Vec<Node>),
    /// The single expression of a `lambda`, whose value is returned.
    Expr(Expr),
}

/// A function definition, produced once by the prepare pass.
///
/// This is the immutable half of a function value: the name, signature and body.
/// Each execution of the `def` or `lambda` creates a fresh [`Closure`] on the heap
/// that points back here and carries the per-definition state.
#[derive(Debug)]
pub(crate) struct Function {
    /// The function name (used for error messages, tracebacks and tracing).
    pub name: StringId,
    pub signature: Signature,
    pub body: FunctionBody,
    /// Whether the function was defined inside another function and so captures its frame.
    pub is_nested: bool,
}

impl Function {
    pub fn new(name: StringId, signature: Signature, body: FunctionBody, is_nested: bool) -> Self {
        Self {
            name,
            signature,
            body,
            is_nested,
        }
    }

    /// Number of default values each closure of this function carries.
    pub fn defaults_count(&self) -> usize {
        self.signature.defaults_count()
    }
}

/// A function value: what a `def` or `lambda` evaluates to.
///
/// `defaults` were evaluated exactly once, when the definition ran, and are shared
/// by every call that omits the corresponding argument. Running the definition
/// again creates a new closure with new defaults.
#[derive(Debug)]
pub(crate) struct Closure {
    pub function: FunctionId,
    pub defaults: Vec<Value>,
    /// Frame the function was defined in; `None` at module level.
    pub frame: Option<HeapId>,
}
