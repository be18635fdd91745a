//! Interning of identifiers and string literals.
//!
//! Every name that appears in a prepared program (variables, parameters, attribute
//! names, keyword arguments) and every string literal is stored once in [`Interns`]
//! and referred to by a [`StringId`]. The evaluator compares and hashes ids instead
//! of strings; the text is only needed for error messages and host conversion.

use ahash::AHashMap;

/// Index into the string interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 bytes for `usize`). This limits us to
/// ~4 billion unique interns, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage for interned strings.
///
/// Populated by the prepare pass and by host entry points (keyword names passed to
/// `Module::call`, native registrations). Interned strings are never removed.
#[derive(Debug, Default)]
pub(crate) struct Interns {
    strings: Vec<String>,
    lookup: AHashMap<String, StringId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning the existing id if it was seen before.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner overflow"));
        self.strings.push(s.to_owned());
        self.lookup.insert(s.to_owned(), id);
        id
    }

    /// Returns the id for `s` without interning it.
    pub fn get_id(&self, s: &str) -> Option<StringId> {
        self.lookup.get(s).copied()
    }

    /// Returns the text of an interned string.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    #[inline]
    pub fn get_str(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }
}
