use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// A mutable list.
///
/// Lists are shared by reference: every `Value::Ref` to the same heap slot sees
/// in-place mutation, which is what makes default values observably shared
/// between calls. Once frozen, every mutation fails with `FrozenValue`.
#[derive(Debug, Default)]
pub(crate) struct List {
    items: Vec<Value>,
    frozen: bool,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items, frozen: false }
    }

    #[inline]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_mutable(&self) -> RunResult<()> {
        if self.frozen {
            Err(ExcType::frozen_value("list"))
        } else {
            Ok(())
        }
    }

    pub fn push(&mut self, value: Value) -> RunResult<()> {
        self.check_mutable()?;
        self.items.push(value);
        Ok(())
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) -> RunResult<()> {
        self.check_mutable()?;
        self.items.extend(values);
        Ok(())
    }

    pub fn clear(&mut self) -> RunResult<()> {
        self.check_mutable()?;
        self.items.clear();
        Ok(())
    }

    /// Replaces the item at a normalized index.
    pub fn set(&mut self, index: usize, value: Value) -> RunResult<()> {
        self.check_mutable()?;
        self.items[index] = value;
        Ok(())
    }
}

/// Resolves a possibly negative index against a sequence length.
pub(crate) fn normalize_index(index: i64, len: usize, type_name: &str) -> RunResult<usize> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        // in range, so it fits
        Ok(usize::try_from(resolved).unwrap_or_default())
    } else {
        Err(crate::exception::Exception::new(
            ExcType::IndexError,
            format!("{type_name} index {index} out of range [0:{len}]"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_list_rejects_mutation() {
        let mut list = List::new(vec![Value::Int(0)]);
        list.push(Value::Int(1)).unwrap();
        list.freeze();
        let err = list.push(Value::Int(2)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::FrozenValue);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(normalize_index(-1, 3, "list").unwrap(), 2);
        assert_eq!(normalize_index(0, 3, "list").unwrap(), 0);
        assert_eq!(normalize_index(3, 3, "list").unwrap_err().exc_type(), ExcType::IndexError);
        assert_eq!(normalize_index(-4, 3, "list").unwrap_err().exc_type(), ExcType::IndexError);
    }
}
