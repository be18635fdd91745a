use strum::{Display, EnumString, IntoStaticStr};

/// Runtime type of a value, as seen by `type_name` and by type values.
///
/// The string form is the language-level type name: `Type::from_str("list")`
/// parses, and `Type::List.to_string()` is `"list"`. Hosts use it to attach
/// methods with `Module::add_type_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    String,
    List,
    Tuple,
    Dict,
    Struct,
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    BuiltinFunction,
}
