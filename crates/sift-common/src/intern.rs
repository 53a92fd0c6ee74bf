//! String interning for identifier deduplication.
//!
//! All names flowing through the analyzer (identifiers, attribute names,
//! class names) are interned once and handled as `Atom` values afterwards,
//! so symbol table lookups and structural type comparison reduce to `u32`
//! comparison.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Handle to an interned string.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Atom(pub u32);

impl Atom {
    pub const NONE: Atom = Atom(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Atom::NONE
    }
}

#[derive(Default)]
struct InternerInner {
    map: FxHashMap<Arc<str>, Atom>,
    strings: Vec<Arc<str>>,
}

/// Thread-safe string interner.
///
/// One interner is shared between the syntax arena and the type interner of
/// a pipeline so that atoms produced by either side compare directly.
pub struct Interner {
    inner: RwLock<InternerInner>,
}

impl Interner {
    pub fn new() -> Self {
        Interner {
            inner: RwLock::new(InternerInner::default()),
        }
    }

    pub fn intern(&self, text: &str) -> Atom {
        {
            let inner = self.inner.read().unwrap();
            if let Some(&atom) = inner.map.get(text) {
                return atom;
            }
        }
        let mut inner = self.inner.write().unwrap();
        // Another writer may have interned it between the two locks.
        if let Some(&atom) = inner.map.get(text) {
            return atom;
        }
        let arc: Arc<str> = Arc::from(text);
        let atom = Atom(inner.strings.len() as u32);
        inner.strings.push(arc.clone());
        inner.map.insert(arc, atom);
        atom
    }

    /// Resolve an atom back to its text. Panics on a foreign atom; atoms are
    /// only valid for the interner that produced them.
    pub fn resolve(&self, atom: Atom) -> Arc<str> {
        let inner = self.inner.read().unwrap();
        inner.strings[atom.0 as usize].clone()
    }

    pub fn try_resolve(&self, atom: Atom) -> Option<Arc<str>> {
        if atom.is_none() {
            return None;
        }
        let inner = self.inner.read().unwrap();
        inner.strings.get(atom.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Self {
        Interner::new()
    }
}
