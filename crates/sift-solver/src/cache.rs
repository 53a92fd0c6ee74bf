//! Memoization cache with dependency tracking.
//!
//! Every resolved entry records the `(file, symbol)` pairs consulted while
//! computing it, so an edit invalidates exactly the entries that depended on
//! what changed — a lookup over recorded dependencies, not a re-walk of
//! unrelated files. Entries survive across passes until invalidated;
//! a cancelled pass discards its in-progress entries so it can never poison
//! a later one.

use crate::types::TypeId;
use rustc_hash::{FxHashMap, FxHashSet};
use sift_binder::{FlowNodeId, SymbolId};
use sift_common::FileId;
use sift_syntax::NodeId;

/// Cache key: one expression at one flow position. Annotation evaluation
/// uses `FlowNodeId::NONE`, since annotations are flow-insensitive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EvalKey {
    pub node: NodeId,
    pub flow: FlowNodeId,
}

/// One `(file, symbol)` consulted during evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub file: FileId,
    pub symbol: SymbolId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum EntryState {
    Evaluating,
    Resolved(TypeId),
}

#[derive(Clone, Debug)]
struct CacheEntry {
    state: EntryState,
    dependencies: FxHashSet<Dependency>,
}

#[derive(Default)]
pub struct TypeCache {
    entries: FxHashMap<EvalKey, CacheEntry>,
    /// Underlying computations performed; cache hits do not bump it. Tests
    /// use this to verify idempotence.
    computations: u64,
}

impl TypeCache {
    pub fn new() -> Self {
        TypeCache::default()
    }

    /// Resolved type and recorded dependencies, or `None` for unvisited and
    /// in-progress entries (in-progress re-entry is the evaluator's pending
    /// set's business, not the cache's).
    pub fn lookup(&self, key: EvalKey) -> Option<(TypeId, Vec<Dependency>)> {
        let entry = self.entries.get(&key)?;
        match entry.state {
            EntryState::Resolved(ty) => {
                Some((ty, entry.dependencies.iter().copied().collect()))
            }
            EntryState::Evaluating => None,
        }
    }

    pub fn mark_evaluating(&mut self, key: EvalKey) {
        self.entries.insert(
            key,
            CacheEntry {
                state: EntryState::Evaluating,
                dependencies: FxHashSet::default(),
            },
        );
    }

    pub fn resolve(&mut self, key: EvalKey, ty: TypeId, dependencies: FxHashSet<Dependency>) {
        self.computations += 1;
        self.entries.insert(
            key,
            CacheEntry {
                state: EntryState::Resolved(ty),
                dependencies,
            },
        );
    }

    pub fn is_evaluating(&self, key: EvalKey) -> bool {
        matches!(
            self.entries.get(&key),
            Some(CacheEntry {
                state: EntryState::Evaluating,
                ..
            })
        )
    }

    /// Drop every in-progress entry. Called when a pass is cancelled.
    pub fn discard_evaluating(&mut self) {
        self.entries
            .retain(|_, entry| entry.state != EntryState::Evaluating);
    }

    /// Invalidate entries that consulted anything in `file`.
    pub fn invalidate_file(&mut self, file: FileId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.dependencies.iter().any(|d| d.file == file));
        before - self.entries.len()
    }

    /// Invalidate entries that consulted one specific symbol.
    pub fn invalidate_symbol(&mut self, dependency: Dependency) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.dependencies.contains(&dependency));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn computations(&self) -> u64 {
        self.computations
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(node: u32, flow: u32) -> EvalKey {
        EvalKey {
            node: NodeId(node),
            flow: FlowNodeId(flow),
        }
    }

    fn dep(file: u32, symbol: u32) -> Dependency {
        Dependency {
            file: FileId(file),
            symbol: SymbolId(symbol),
        }
    }

    #[test]
    fn test_resolve_and_lookup() {
        let mut cache = TypeCache::new();
        let mut deps = FxHashSet::default();
        deps.insert(dep(0, 1));
        cache.resolve(key(1, 2), TypeId::NONE, deps);
        let (ty, deps) = cache.lookup(key(1, 2)).unwrap();
        assert_eq!(ty, TypeId::NONE);
        assert_eq!(deps, vec![dep(0, 1)]);
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_evaluating_entries_are_not_resolved() {
        let mut cache = TypeCache::new();
        cache.mark_evaluating(key(1, 1));
        assert!(cache.lookup(key(1, 1)).is_none());
        assert!(cache.is_evaluating(key(1, 1)));
        cache.discard_evaluating();
        assert!(!cache.is_evaluating(key(1, 1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_is_dependency_scoped() {
        let mut cache = TypeCache::new();
        let mut deps_a = FxHashSet::default();
        deps_a.insert(dep(0, 1));
        cache.resolve(key(1, 1), TypeId::NONE, deps_a);
        let mut deps_b = FxHashSet::default();
        deps_b.insert(dep(1, 7));
        cache.resolve(key(2, 1), TypeId::UNKNOWN, deps_b);

        assert_eq!(cache.invalidate_file(FileId(0)), 1);
        assert!(cache.lookup(key(1, 1)).is_none());
        assert!(cache.lookup(key(2, 1)).is_some());

        assert_eq!(cache.invalidate_symbol(dep(1, 7)), 1);
        assert!(cache.is_empty());
    }
}
