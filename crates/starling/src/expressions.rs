//! The prepared tree the evaluator runs.
//!
//! Produced from [`crate::syntax`] by the prepare pass. Every name carries its
//! resolved scope, every string is interned, and every `def`/`lambda` refers to
//! a [`Function`](crate::function::Function) definition by id.

use crate::{
    function::FunctionId,
    intern::StringId,
    syntax::{CmpOperator, Operator},
};

/// Where a name is bound, decided once by the prepare pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameScope {
    /// Bound in the frame of the running call.
    Local,
    /// Bound in an enclosing function's frame, this many closure frames up.
    Free(u16),
    /// Module global or builtin, looked up at the time of the read.
    Global,
}

/// An identifier together with its resolved scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Identifier {
    pub name_id: StringId,
    pub scope: NameScope,
}

impl Identifier {
    pub fn new(name_id: StringId, scope: NameScope) -> Self {
        Self { name_id, scope }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Str(StringId),
}

#[derive(Debug)]
pub(crate) enum Expr {
    Literal(Literal),
    Name(Identifier),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Index { object: Box<Expr>, index: Box<Expr> },
    Attr { object: Box<Expr>, attr: StringId },
    Call { callee: Box<Expr>, args: Vec<CallArg> },
    BinOp { left: Box<Expr>, op: Operator, right: Box<Expr> },
    Compare { left: Box<Expr>, op: CmpOperator, right: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
    /// Creates a function value. `defaults` are evaluated in the defining scope.
    MakeFunction { function: FunctionId, defaults: Vec<Expr> },
}

#[derive(Debug)]
pub(crate) enum CallArg {
    Positional(Expr),
    Keyword(StringId, Expr),
    Star(Expr),
    StarStar(Expr),
}

#[derive(Debug)]
pub(crate) enum AssignTarget {
    Name(Identifier),
    Index { object: Expr, index: Expr },
    Tuple(Vec<AssignTarget>),
}

/// A prepared statement.
#[derive(Debug)]
pub(crate) enum Node {
    Expr(Expr),
    Assign { target: AssignTarget, value: Expr },
    AugAssign { target: AssignTarget, op: Operator, value: Expr },
    If { test: Expr, body: Vec<Node>, orelse: Vec<Node> },
    For { target: AssignTarget, iter: Expr, body: Vec<Node> },
    Break,
    Continue,
    Pass,
    Return(Option<Expr>),
    /// `def`: evaluate the defaults, build the function value, bind it to `target`.
    Def { target: Identifier, function: FunctionId, defaults: Vec<Expr> },
}

impl Node {
    /// Short name used by tracers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expr(_) => "expr",
            Self::Assign { .. } => "assign",
            Self::AugAssign { .. } => "aug_assign",
            Self::If { .. } => "if",
            Self::For { .. } => "for",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Pass => "pass",
            Self::Return(_) => "return",
            Self::Def { .. } => "def",
        }
    }
}
