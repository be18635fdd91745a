//! Runtime error kinds and the exception type surfaced to hosts.
//!
//! Every failure inside the evaluator is an [`Exception`]: a kind ([`ExcType`]),
//! a human-readable message, the parameter names the error is about (for binding
//! errors) and a traceback of the function calls it unwound through.
//!
//! Constructor helpers on [`ExcType`] build the common errors so that message
//! formats stay consistent across the binder, the dispatcher and the environment.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, Exception>;

/// Kinds of runtime error raised by the evaluator.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    // --- argument binding ---
    /// More positional arguments than positional parameters, and no `*args`.
    TooManyArguments,
    /// A parameter received a value twice (positionally and by keyword, or two keywords).
    MultipleValuesForArgument,
    /// A keyword argument matched no parameter, and there is no `**kwargs`.
    UnexpectedKeywordArgument,
    /// Required parameters were left unbound.
    MissingArguments,

    // --- call dispatch ---
    /// The call depth limit of the execution context was reached.
    RecursionTooDeep,
    /// The callee of a call expression is not a callable value.
    NotCallable,

    // --- environment ---
    /// A global name is bound neither in the module nor in the builtin table.
    VariableNotFound,
    /// A function-local name was read before any assignment to it ran.
    LocalVariableReferencedBeforeAssignment,
    /// Assignment to a global of a frozen module.
    FrozenEnvironment,
    /// In-place mutation of a frozen list or dict.
    FrozenValue,

    // --- value operations ---
    TypeError,
    IndexError,
    KeyError,
    AttributeError,
    ZeroDivisionError,
    OverflowError,

    // --- host boundary ---
    /// A syntax tree the prepare pass rejects (duplicate parameters, misplaced `return`, ...).
    SyntaxError,
    /// An allocation, memory, operation or time limit was exceeded.
    ResourceExhausted,
    /// A host `Object` that cannot be turned into a value.
    InvalidInput,
}

impl ExcType {
    /// Stable short code for the error kind.
    ///
    /// `CM` codes cover the module environment, `CF` codes function calls and
    /// `CV` codes value operations.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::FrozenEnvironment => "CM00",
            Self::VariableNotFound => "CM01",
            Self::LocalVariableReferencedBeforeAssignment => "CM03",
            Self::TooManyArguments => "CF00",
            Self::MultipleValuesForArgument => "CF01",
            Self::UnexpectedKeywordArgument => "CF02",
            Self::MissingArguments => "CF03",
            Self::RecursionTooDeep => "CF04",
            Self::NotCallable => "CF05",
            Self::FrozenValue => "CV00",
            Self::TypeError => "CV01",
            Self::IndexError => "CV02",
            Self::KeyError => "CV03",
            Self::AttributeError => "CV04",
            Self::ZeroDivisionError => "CV05",
            Self::OverflowError => "CV06",
            Self::SyntaxError => "CS00",
            Self::ResourceExhausted => "CR00",
            Self::InvalidInput => "CR01",
        }
    }

    /// Creates an error for surplus positional arguments.
    ///
    /// Format: `{name}() takes {max} positional argument(s) but {actual} were given`
    #[must_use]
    pub(crate) fn too_many_arguments(name: &str, max: usize, actual: usize) -> Exception {
        let takes_word = if max == 1 { "argument" } else { "arguments" };
        let given_word = if actual == 1 { "was" } else { "were" };
        Exception::new(
            Self::TooManyArguments,
            format!("{name}() takes {max} positional {takes_word} but {actual} {given_word} given"),
        )
    }

    /// Creates an error for a parameter bound twice.
    #[must_use]
    pub(crate) fn duplicate_arg(name: &str, param: &str) -> Exception {
        Exception::new(
            Self::MultipleValuesForArgument,
            format!("{name}() got multiple values for argument '{param}'"),
        )
        .with_arguments(vec![param.to_owned()])
    }

    /// Creates an error for a keyword argument that matches no parameter.
    #[must_use]
    pub(crate) fn unexpected_keyword(name: &str, key: &str) -> Exception {
        Exception::new(
            Self::UnexpectedKeywordArgument,
            format!("{name}() got an unexpected keyword argument '{key}'"),
        )
        .with_arguments(vec![key.to_owned()])
    }

    /// Creates an error listing every required parameter left unbound.
    ///
    /// Format: `{name}() missing 2 required arguments: 'a' and 'b'`
    #[must_use]
    pub(crate) fn missing_arguments(name: &str, missing_names: &[&str]) -> Exception {
        let count = missing_names.len();
        let names_str = format_param_names(missing_names);
        let plural = if count == 1 { "" } else { "s" };
        Exception::new(
            Self::MissingArguments,
            format!("{name}() missing {count} required argument{plural}: {names_str}"),
        )
        .with_arguments(missing_names.iter().map(|&n| n.to_owned()).collect())
    }

    #[must_use]
    pub(crate) fn not_callable(type_name: &str) -> Exception {
        Exception::new(Self::NotCallable, format!("'{type_name}' object is not callable"))
    }

    #[must_use]
    pub(crate) fn variable_not_found(name: &str) -> Exception {
        Exception::new(Self::VariableNotFound, format!("Variable '{name}' not found"))
            .with_arguments(vec![name.to_owned()])
    }

    #[must_use]
    pub(crate) fn local_before_assignment(name: &str) -> Exception {
        Exception::new(
            Self::LocalVariableReferencedBeforeAssignment,
            format!("Local variable '{name}' referenced before assignment"),
        )
        .with_arguments(vec![name.to_owned()])
    }

    #[must_use]
    pub(crate) fn frozen_environment(name: &str) -> Exception {
        Exception::new(
            Self::FrozenEnvironment,
            format!("Cannot assign '{name}': the module environment is frozen"),
        )
    }

    #[must_use]
    pub(crate) fn frozen_value(type_name: &str) -> Exception {
        Exception::new(Self::FrozenValue, format!("Cannot mutate a frozen {type_name}"))
    }

    #[must_use]
    pub(crate) fn unsupported_operand(op: &str, left: &str, right: &str) -> Exception {
        Exception::new(
            Self::TypeError,
            format!("unsupported operand type(s) for {op}: '{left}' and '{right}'"),
        )
    }

    #[must_use]
    pub(crate) fn not_iterable(type_name: &str) -> Exception {
        Exception::new(Self::TypeError, format!("'{type_name}' object is not iterable"))
    }

    #[must_use]
    pub(crate) fn unhashable(type_name: &str) -> Exception {
        Exception::new(Self::TypeError, format!("unhashable type: '{type_name}'"))
    }

    #[must_use]
    pub(crate) fn no_attribute(type_name: &str, attr: &str) -> Exception {
        Exception::new(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
        .with_arguments(vec![attr.to_owned()])
    }

    #[must_use]
    pub(crate) fn syntax_error(msg: impl Into<String>) -> Exception {
        Exception::new(Self::SyntaxError, msg)
    }
}

/// Formats parameter names as `'a'`, `'a' and 'b'` or `'a', 'b', and 'c'`.
fn format_param_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => format!("'{only}'"),
        [first, second] => format!("'{first}' and '{second}'"),
        [init @ .., last] => {
            let head: Vec<String> = init.iter().map(|n| format!("'{n}'")).collect();
            format!("{}, and '{last}'", head.join(", "))
        }
    }
}

/// An error raised while preparing or evaluating code.
///
/// The payload is boxed so that `RunResult<Value>` stays two words wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception(Box<ExceptionInner>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExceptionInner {
    exc_type: ExcType,
    message: String,
    arguments: Vec<String>,
    traceback: Vec<String>,
}

impl Exception {
    /// Creates an exception with no traceback.
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self(Box::new(ExceptionInner {
            exc_type,
            message: message.into(),
            arguments: Vec::new(),
            traceback: Vec::new(),
        }))
    }

    #[must_use]
    pub(crate) fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.0.arguments = arguments;
        self
    }

    /// Records that the error unwound through a call of `function_name`.
    pub(crate) fn push_frame(&mut self, function_name: &str) {
        self.0.traceback.push(function_name.to_owned());
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.0.exc_type
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// Parameter or variable names the error refers to.
    ///
    /// `MissingArguments` lists every unbound required parameter in declaration
    /// order; the other binding errors and name errors carry a single name.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.0.arguments
    }

    /// Names of the functions the error propagated through, innermost first.
    #[must_use]
    pub fn traceback(&self) -> &[String] {
        &self.0.traceback
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.0.exc_type, self.0.exc_type.code(), self.0.message)?;
        for name in &self.0.traceback {
            write!(f, "\n  in {name}()")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}
