//! Function signature representation and argument binding.
//!
//! This module handles signatures with every parameter kind the language has:
//! positional-or-keyword, `*args`, keyword-only, and `**kwargs`. It also handles
//! default values and the argument binding algorithm.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapAccess, HeapData},
    intern::{Interns, StringId},
    types::{Dict, HashKey},
    value::Value,
};

/// A function signature.
///
/// A complete signature can include:
/// - Positional-or-keyword parameters (regular parameters)
/// - Variable positional parameter (`*args`)
/// - Keyword-only parameters (after `*` or `*args`)
/// - Variable keyword parameter (`**kwargs`)
///
/// # Default Values
///
/// Positional defaults are tracked by count: if `args = [a, b, c]` and
/// `arg_defaults_count = 2`, then `b` and `c` have defaults. Keyword-only
/// parameters may have defaults in any position, so they use a per-parameter map.
///
/// The actual default values are evaluated when the `def` runs and stored in the
/// closure, laid out as `[arg defaults][kw-only defaults]`. This struct only
/// tracks the structure, not the values themselves.
///
/// # Binding Layout
///
/// Bound values come out in this order:
/// ```text
/// [args][*args_slot?][kwargs][**kwargs_slot?]
/// ```
#[derive(Debug, Clone, Default)]
pub(crate) struct Signature {
    /// Positional-or-keyword parameters, e.g. `a, b` in `def f(a, b): ...`
    args: Vec<StringId>,

    /// Number of positional-or-keyword parameters with defaults (from the end).
    arg_defaults_count: usize,

    /// Variable positional parameter name, e.g. `args` in `def f(*args): ...`
    var_args: Option<StringId>,

    /// Keyword-only parameters, e.g. `c` in `def f(*, c): ...` or `def f(*args, c): ...`
    kwargs: Vec<StringId>,

    /// For each keyword-only parameter, `Some(i)` points into the kw-only section
    /// of the defaults, `None` means the parameter is required.
    kwarg_default_map: Vec<Option<usize>>,

    /// Variable keyword parameter name, e.g. `kwargs` in `def f(**kwargs): ...`
    var_kwargs: Option<StringId>,

    /// How simple the signature is, used for fast path when binding
    bind_mode: BindMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BindMode {
    /// Only positional-or-keyword parameters, no defaults.
    #[default]
    Simple,
    /// Only positional-or-keyword parameters, some with defaults: `def f(a, b=1, c=2)`.
    SimpleWithDefaults,
    Complex,
}

impl Signature {
    /// Creates a signature.
    ///
    /// # Arguments
    /// * `args` - Positional-or-keyword parameter names
    /// * `arg_defaults_count` - Number of args with defaults (from end)
    /// * `var_args` - Variable positional parameter name (`*args`)
    /// * `kwargs` - Keyword-only parameter names
    /// * `kwarg_default_map` - Mapping of kw-only parameters to default indices
    /// * `var_kwargs` - Variable keyword parameter name (`**kwargs`)
    pub fn new(
        args: Vec<StringId>,
        arg_defaults_count: usize,
        var_args: Option<StringId>,
        kwargs: Vec<StringId>,
        kwarg_default_map: Vec<Option<usize>>,
        var_kwargs: Option<StringId>,
    ) -> Self {
        debug_assert_eq!(kwargs.len(), kwarg_default_map.len());
        let only_positional = var_args.is_none() && kwargs.is_empty() && var_kwargs.is_none();
        let bind_mode = match (only_positional, arg_defaults_count) {
            (true, 0) => BindMode::Simple,
            (true, _) => BindMode::SimpleWithDefaults,
            (false, _) => BindMode::Complex,
        };
        Self {
            args,
            arg_defaults_count,
            var_args,
            kwargs,
            kwarg_default_map,
            var_kwargs,
            bind_mode,
        }
    }

    /// Number of default values the closure must carry.
    pub fn defaults_count(&self) -> usize {
        self.arg_defaults_count + self.kwarg_default_map.iter().flatten().count()
    }

    /// Number of bound slots, collectors included.
    pub fn param_count(&self) -> usize {
        self.args.len() + usize::from(self.var_args.is_some()) + self.kwargs.len() + usize::from(self.var_kwargs.is_some())
    }

    fn required_positional_count(&self) -> usize {
        self.args.len() - self.arg_defaults_count
    }

    /// Binds call arguments to parameters.
    ///
    /// 1. Positional args fill `args` left to right; the rest go to `*args` or are an error
    /// 2. Keyword args bind by name to `args` and `kwargs`; unknown names go to `**kwargs`
    /// 3. Unfilled parameters with defaults receive the shared default value
    /// 4. Every still unfilled required parameter is reported at once
    ///
    /// Returns `(name, value)` pairs in the binding layout. Nothing is allocated before
    /// all checks have passed, so a failed bind leaves no partial frame or collector
    /// behind.
    ///
    /// # Arguments
    /// * `args` - The arguments from the call site
    /// * `defaults` - Default values stored in the closure
    /// * `heap` - The heap for allocating the `*args` tuple and `**kwargs` dict
    /// * `interns` - For looking up parameter names in error messages
    /// * `func_name` - Function name for error messages
    pub fn bind(
        &self,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut (impl HeapAccess + ?Sized),
        interns: &Interns,
        func_name: &str,
    ) -> RunResult<Vec<(StringId, Value)>> {
        if self.bind_mode != BindMode::Complex && args.keywords.is_empty() {
            return self.bind_positional_only(args, defaults, interns, func_name);
        }

        let ArgValues { positional, keywords } = args;
        let positional_count = positional.len();
        if self.var_args.is_none() && positional_count > self.args.len() {
            return Err(ExcType::too_many_arguments(func_name, self.args.len(), positional_count));
        }

        // One slot per named parameter: `args` first, then `kwargs`. The `Option`
        // doubles as the "already bound" flag, so any number of parameters works.
        let mut slots: Vec<Option<Value>> = vec![None; self.args.len() + self.kwargs.len()];
        let mut positional = positional.into_iter();
        for (slot, value) in slots.iter_mut().zip(positional.by_ref().take(self.args.len())) {
            *slot = Some(value);
        }
        let excess_positional: Vec<Value> = positional.collect();

        let mut excess_keywords: Vec<(StringId, Value)> = Vec::new();
        for (key, value) in keywords {
            let index = self
                .args
                .iter()
                .chain(&self.kwargs)
                .position(|&param| param == key);
            match index {
                Some(index) => {
                    if slots[index].is_some() {
                        return Err(ExcType::duplicate_arg(func_name, interns.get_str(key)));
                    }
                    slots[index] = Some(value);
                }
                None if self.var_kwargs.is_some() => {
                    if excess_keywords.iter().any(|&(seen, _)| seen == key) {
                        return Err(ExcType::duplicate_arg(func_name, interns.get_str(key)));
                    }
                    excess_keywords.push((key, value));
                }
                None => return Err(ExcType::unexpected_keyword(func_name, interns.get_str(key))),
            }
        }

        let mut missing: Vec<&str> = Vec::new();
        let first_defaulted = self.required_positional_count();
        for (i, slot) in slots.iter_mut().enumerate().take(self.args.len()) {
            if slot.is_none() {
                if i >= first_defaulted {
                    *slot = Some(defaults[i - first_defaulted]);
                } else {
                    missing.push(interns.get_str(self.args[i]));
                }
            }
        }
        for (j, default_index) in self.kwarg_default_map.iter().enumerate() {
            let slot = &mut slots[self.args.len() + j];
            if slot.is_none() {
                match default_index {
                    Some(d) => *slot = Some(defaults[self.arg_defaults_count + d]),
                    None => missing.push(interns.get_str(self.kwargs[j])),
                }
            }
        }
        if !missing.is_empty() {
            return Err(ExcType::missing_arguments(func_name, &missing));
        }

        // every check passed; only now allocate the collectors
        let mut bound = Vec::with_capacity(self.param_count());
        let mut filled = slots.into_iter().flatten();
        bound.extend(self.args.iter().copied().zip(filled.by_ref()));
        if let Some(var_args) = self.var_args {
            let tuple = heap.allocate(HeapData::Tuple(excess_positional))?;
            bound.push((var_args, Value::Ref(tuple)));
        }
        bound.extend(self.kwargs.iter().copied().zip(filled));
        if let Some(var_kwargs) = self.var_kwargs {
            let mut dict = Dict::new();
            for (key, value) in excess_keywords {
                let hash_key = HashKey::Str(interns.get_str(key).to_owned());
                dict.insert(hash_key, Value::InternString(key), value)?;
            }
            let dict = heap.allocate(HeapData::Dict(dict))?;
            bound.push((var_kwargs, Value::Ref(dict)));
        }
        Ok(bound)
    }

    /// Fast path: only positional-or-keyword parameters and no keywords at the call site.
    fn bind_positional_only(
        &self,
        args: ArgValues,
        defaults: &[Value],
        interns: &Interns,
        func_name: &str,
    ) -> RunResult<Vec<(StringId, Value)>> {
        let given = args.positional.len();
        let param_count = self.args.len();
        if given > param_count {
            return Err(ExcType::too_many_arguments(func_name, param_count, given));
        }
        let required = self.required_positional_count();
        if given < required {
            let missing: Vec<&str> = self.args[given..required]
                .iter()
                .map(|&param| interns.get_str(param))
                .collect();
            return Err(ExcType::missing_arguments(func_name, &missing));
        }

        let mut bound: Vec<(StringId, Value)> = self.args.iter().copied().zip(args.positional).collect();
        // defaults are stored for the last `arg_defaults_count` parameters
        let defaults_start = given - required;
        bound.extend(
            self.args[given..]
                .iter()
                .copied()
                .zip(defaults[defaults_start..self.arg_defaults_count].iter().copied()),
        );
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    fn names(interns: &mut Interns, prefix: &str, count: usize) -> Vec<StringId> {
        (0..count).map(|i| interns.intern(&format!("{prefix}{i}"))).collect()
    }

    fn ints(bound: &[(StringId, Value)]) -> Vec<i64> {
        bound
            .iter()
            .map(|(_, value)| match value {
                Value::Int(i) => *i,
                other => panic!("expected int, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn wide_signature_binds_every_parameter() {
        let mut interns = Interns::new();
        let params = names(&mut interns, "a", 70);
        let sig = Signature::new(params.clone(), 0, None, vec![], vec![], None);
        let mut heap = Heap::new(NoLimitTracker::new());

        // positional fast path
        let args = ArgValues::new((0..70).map(Value::Int), vec![]);
        let bound = sig.bind(args, &[], &mut heap, &interns, "f").unwrap();
        assert_eq!(ints(&bound), (0..70).collect::<Vec<_>>());

        // keyword path with the last three parameters passed by name
        let keywords = vec![
            (params[69], Value::Int(69)),
            (params[67], Value::Int(67)),
            (params[68], Value::Int(68)),
        ];
        let args = ArgValues::new((0..67).map(Value::Int), keywords);
        let bound = sig.bind(args, &[], &mut heap, &interns, "f").unwrap();
        assert_eq!(ints(&bound), (0..70).collect::<Vec<_>>());

        // a keyword naming a parameter above index 64 that was filled positionally
        let args = ArgValues::new((0..70).map(Value::Int), vec![(params[66], Value::Int(0))]);
        let err = sig.bind(args, &[], &mut heap, &interns, "f").unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MultipleValuesForArgument);
        assert_eq!(err.arguments(), ["a66"]);
    }

    #[test]
    fn missing_arguments_lists_positional_and_keyword_only() {
        let mut interns = Interns::new();
        let args = names(&mut interns, "p", 3);
        let kwargs = names(&mut interns, "k", 2);
        let sig = Signature::new(args, 1, None, kwargs, vec![None, Some(0)], None);
        assert_eq!(sig.defaults_count(), 2);
        let mut heap = Heap::new(NoLimitTracker::new());

        let call = ArgValues::new([Value::Int(0)], vec![]);
        let err = sig
            .bind(call, &[Value::Int(10), Value::Int(20)], &mut heap, &interns, "g")
            .unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MissingArguments);
        assert_eq!(err.arguments(), ["p1", "k0"]);
    }

    #[test]
    fn defaults_fill_the_tail_in_the_fast_path() {
        let mut interns = Interns::new();
        let sig = Signature::new(names(&mut interns, "x", 3), 2, None, vec![], vec![], None);
        let mut heap = Heap::new(NoLimitTracker::new());
        let defaults = [Value::Int(1), Value::Int(2)];

        let bound = sig
            .bind(ArgValues::new([Value::Int(0)], vec![]), &defaults, &mut heap, &interns, "h")
            .unwrap();
        assert_eq!(ints(&bound), [0, 1, 2]);

        let bound = sig
            .bind(ArgValues::new([Value::Int(0), Value::Int(5)], vec![]), &defaults, &mut heap, &interns, "h")
            .unwrap();
        assert_eq!(ints(&bound), [0, 5, 2]);

        let err = sig
            .bind(ArgValues::default(), &defaults, &mut heap, &interns, "h")
            .unwrap_err();
        assert_eq!(err.arguments(), ["x0"]);
    }

    #[test]
    fn collectors_gather_the_excess() {
        let mut interns = Interns::new();
        let a = interns.intern("a");
        let rest = interns.intern("rest");
        let opts = interns.intern("opts");
        let extra = interns.intern("extra");
        let sig = Signature::new(vec![a], 0, Some(rest), vec![], vec![], Some(opts));
        let mut heap = Heap::new(NoLimitTracker::new());

        let call = ArgValues::new([Value::Int(1), Value::Int(2), Value::Int(3)], vec![(extra, Value::None)]);
        let bound = sig.bind(call, &[], &mut heap, &interns, "f").unwrap();
        let bound_names: Vec<StringId> = bound.iter().map(|&(name, _)| name).collect();
        assert_eq!(bound_names, [a, rest, opts]);
        match bound[1].1 {
            Value::Ref(id) => assert!(matches!(heap.get(id), HeapData::Tuple(items) if items.len() == 2)),
            other => panic!("expected tuple, got {other:?}"),
        }
        match bound[2].1 {
            Value::Ref(id) => assert!(
                matches!(heap.get(id), HeapData::Dict(dict) if dict.contains_key(&HashKey::Str("extra".to_owned())))
            ),
            other => panic!("expected dict, got {other:?}"),
        }

        // a repeated unknown keyword is a duplicate, not a silent overwrite
        let call = ArgValues::new([Value::Int(1)], vec![(extra, Value::None), (extra, Value::None)]);
        let err = sig.bind(call, &[], &mut heap, &interns, "f").unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MultipleValuesForArgument);
    }

    #[test]
    fn unexpected_keyword_is_reported_by_name() {
        let mut interns = Interns::new();
        let sig = Signature::new(names(&mut interns, "a", 65), 0, None, vec![], vec![], None);
        let bogus = interns.intern("bogus");
        let mut heap = Heap::new(NoLimitTracker::new());
        let call = ArgValues::new((0..65).map(Value::Int), vec![(bogus, Value::None)]);
        let err = sig.bind(call, &[], &mut heap, &interns, "f").unwrap_err();
        assert_eq!(err.exc_type(), ExcType::UnexpectedKeywordArgument);
        assert_eq!(err.arguments(), ["bogus"]);
    }
}
