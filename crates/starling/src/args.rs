use smallvec::SmallVec;

use crate::{
    exception::{Exception, ExcType, RunResult},
    intern::StringId,
    value::Value,
};

/// Arguments of one call, after `*iterable` and `**mapping` spreading.
///
/// Most calls pass at most four positional arguments, so they are kept inline to
/// avoid a heap allocation per call. Keywords keep call-site order, which is the
/// order `**kwargs` collection and duplicate detection observe.
#[derive(Debug, Default)]
pub(crate) struct ArgValues {
    pub positional: SmallVec<[Value; 4]>,
    pub keywords: Vec<(StringId, Value)>,
}

impl ArgValues {
    pub fn new(positional: impl IntoIterator<Item = Value>, keywords: Vec<(StringId, Value)>) -> Self {
        Self {
            positional: positional.into_iter().collect(),
            keywords,
        }
    }

    /// Checks that no keyword arguments were passed, for natives that take none.
    pub fn check_no_keywords(&self, name: &str, key_text: impl Fn(StringId) -> String) -> RunResult<()> {
        match self.keywords.first() {
            None => Ok(()),
            Some(&(key, _)) => Err(ExcType::unexpected_keyword(name, &key_text(key))),
        }
    }

    /// Checks that exactly `expected` positional arguments were passed.
    pub fn check_positional_count(&self, name: &str, expected: usize) -> RunResult<()> {
        let actual = self.positional.len();
        if actual > expected {
            Err(ExcType::too_many_arguments(name, expected, actual))
        } else if actual < expected {
            let plural = if expected == 1 { "" } else { "s" };
            Err(Exception::new(
                ExcType::MissingArguments,
                format!("{name}() takes exactly {expected} argument{plural} ({actual} given)"),
            ))
        } else {
            Ok(())
        }
    }
}
