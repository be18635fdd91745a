//! The parsed program handed over by a parser.
//!
//! Parsing is not part of this crate. A host either builds these trees in Rust
//! with the constructor helpers below, or deserializes them with any serde format:
//!
//! ```
//! use starling::syntax::{Expr, Stmt};
//!
//! let json = r#"[{"Assign": {"target": {"Name": "x"}, "value": {"Int": 1}}}]"#;
//! let program: Vec<Stmt> = serde_json::from_str(json).unwrap();
//! assert_eq!(program, vec![Stmt::assign("x", Expr::int(1))]);
//! ```
//!
//! Names are plain strings here; the prepare pass resolves each of them to a
//! local, free or global binding.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// A statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    /// `target op= value`. On a list, `+=` extends the list in place.
    AugAssign { target: Target, op: Operator, value: Expr },
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: Target, iter: Expr, body: Vec<Stmt> },
    Break,
    Continue,
    Pass,
    Return(Option<Expr>),
    Def(FunctionDef),
}

/// `def name(params): body`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// One entry of a parameter list, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    /// `x`
    Required(String),
    /// `x=default`; the default is evaluated once, when the `def` runs.
    Default(String, Expr),
    /// `*args`
    Args(String),
    /// bare `*`: the following parameters are keyword-only
    KwOnlyMarker,
    /// `**kwargs`
    Kwargs(String),
}

/// One argument at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
    /// `*iterable`
    Star(Expr),
    /// `**mapping`
    StarStar(Expr),
}

/// Left-hand side of an assignment or `for` loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    Index { object: Box<Expr>, index: Box<Expr> },
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum Operator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mult,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "%")]
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum CmpOperator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtE,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtE,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Index { object: Box<Expr>, index: Box<Expr> },
    Attr { object: Box<Expr>, attr: String },
    Call { func: Box<Expr>, args: Vec<Arg> },
    BinOp { left: Box<Expr>, op: Operator, right: Box<Expr> },
    Compare { left: Box<Expr>, op: CmpOperator, right: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `body if test else orelse`
    IfElse { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr> },
    Lambda { params: Vec<Param>, body: Box<Expr> },
}

impl Expr {
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(items)
    }

    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items)
    }

    #[must_use]
    pub fn dict(entries: Vec<(Self, Self)>) -> Self {
        Self::Dict(entries)
    }

    #[must_use]
    pub fn call(func: Self, args: Vec<Arg>) -> Self {
        Self::Call {
            func: Box::new(func),
            args,
        }
    }

    #[must_use]
    pub fn index(object: Self, index: Self) -> Self {
        Self::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    #[must_use]
    pub fn attr(object: Self, attr: impl Into<String>) -> Self {
        Self::Attr {
            object: Box::new(object),
            attr: attr.into(),
        }
    }

    #[must_use]
    pub fn binop(left: Self, op: Operator, right: Self) -> Self {
        Self::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn compare(left: Self, op: CmpOperator, right: Self) -> Self {
        Self::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn if_else(test: Self, body: Self, orelse: Self) -> Self {
        Self::IfElse {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        }
    }

    #[must_use]
    pub fn lambda(params: Vec<Param>, body: Self) -> Self {
        Self::Lambda {
            params,
            body: Box::new(body),
        }
    }
}

impl Stmt {
    #[must_use]
    pub fn expr(expr: Expr) -> Self {
        Self::Expr(expr)
    }

    /// `name = value`
    #[must_use]
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Self::Assign {
            target: Target::Name(name.into()),
            value,
        }
    }

    #[must_use]
    pub fn ret(value: Expr) -> Self {
        Self::Return(Some(value))
    }

    #[must_use]
    pub fn if_else(test: Expr, body: Vec<Self>, orelse: Vec<Self>) -> Self {
        Self::If { test, body, orelse }
    }

    #[must_use]
    pub fn def(name: impl Into<String>, params: Vec<Param>, body: Vec<Self>) -> Self {
        Self::Def(FunctionDef {
            name: name.into(),
            params,
            body,
        })
    }
}

impl Param {
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self::Required(name.into())
    }

    #[must_use]
    pub fn default(name: impl Into<String>, value: Expr) -> Self {
        Self::Default(name.into(), value)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Required(name) | Self::Default(name, _) | Self::Args(name) | Self::Kwargs(name) => Some(name),
            Self::KwOnlyMarker => None,
        }
    }
}

impl Arg {
    #[must_use]
    pub fn positional(value: Expr) -> Self {
        Self::Positional(value)
    }

    #[must_use]
    pub fn keyword(name: impl Into<String>, value: Expr) -> Self {
        Self::Keyword(name.into(), value)
    }
}
