//! Container types stored in the heap, and the type tags used for type values.
//!
//! Each container keeps its own frozen flag; mutation entry points check it and
//! raise `FrozenValue` so the evaluator and natives share one rule.

pub(crate) mod dict;
pub(crate) mod list;
pub(crate) mod structure;
mod r#type;

pub(crate) use dict::{Dict, HashKey};
pub(crate) use list::List;
pub(crate) use structure::Struct;
pub use r#type::Type;
