//! Unified recursion guard for cycle detection, depth limiting, and
//! iteration bounding in recursive type computations.
//!
//! One guard combines three safety mechanisms:
//! 1. cycle detection via a visiting set
//! 2. depth limiting against stack overflow
//! 3. iteration bounding against runaway loops
//!
//! [`RecursionProfile`] gives each guard a named limit preset so call sites
//! say what kind of computation they bound instead of quoting numbers.

use rustc_hash::FxHashSet;
use sift_common::limits;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionProfile {
    /// Lazy type evaluation: aliases, class bodies, inferred returns.
    TypeEvaluation,
    /// Structural assignability comparison of possibly recursive types.
    Assignability,
    /// Call and overload resolution, including generic instantiation.
    CallResolution,
    /// Rendering a type for a diagnostic message.
    Display,
}

impl RecursionProfile {
    pub const fn max_depth(self) -> u32 {
        match self {
            RecursionProfile::TypeEvaluation => limits::MAX_EVALUATE_DEPTH,
            RecursionProfile::Assignability => limits::MAX_RELATE_DEPTH,
            RecursionProfile::CallResolution => limits::MAX_EVALUATE_DEPTH,
            RecursionProfile::Display => limits::MAX_DISPLAY_DEPTH,
        }
    }

    pub const fn max_iterations(self) -> u32 {
        limits::MAX_GUARD_ITERATIONS
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecursionResult {
    /// The key was entered; call `leave` when done.
    Entered,
    /// The key is already being visited.
    Cycle,
    /// Depth or iteration budget exhausted.
    Exceeded,
}

impl RecursionResult {
    pub fn is_entered(self) -> bool {
        self == RecursionResult::Entered
    }

    pub fn is_cycle(self) -> bool {
        self == RecursionResult::Cycle
    }

    pub fn is_exceeded(self) -> bool {
        self == RecursionResult::Exceeded
    }
}

pub struct RecursionGuard<K: Hash + Eq + Copy> {
    visiting: FxHashSet<K>,
    depth: u32,
    max_depth: u32,
    iterations: u32,
    max_iterations: u32,
    exceeded: bool,
}

impl<K: Hash + Eq + Copy> RecursionGuard<K> {
    pub fn new(max_depth: u32, max_iterations: u32) -> Self {
        RecursionGuard {
            visiting: FxHashSet::default(),
            depth: 0,
            max_depth,
            iterations: 0,
            max_iterations,
            exceeded: false,
        }
    }

    pub fn with_profile(profile: RecursionProfile) -> Self {
        Self::new(profile.max_depth(), profile.max_iterations())
    }

    /// Try to enter `key`. Only `Entered` requires a matching `leave`.
    pub fn enter(&mut self, key: K) -> RecursionResult {
        self.iterations = self.iterations.saturating_add(1);
        if self.depth >= self.max_depth || self.iterations > self.max_iterations {
            self.exceeded = true;
            return RecursionResult::Exceeded;
        }
        if !self.visiting.insert(key) {
            return RecursionResult::Cycle;
        }
        self.depth += 1;
        RecursionResult::Entered
    }

    pub fn leave(&mut self, key: K) {
        let removed = self.visiting.remove(&key);
        debug_assert!(removed, "leave() without matching enter()");
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn is_visiting(&self, key: &K) -> bool {
        self.visiting.contains(key)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether any enter() was refused for budget reasons. Sticky until
    /// `reset`; callers use it to report one recursion-limit diagnostic
    /// instead of one per refused entry.
    pub fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn reset(&mut self) {
        self.visiting.clear();
        self.depth = 0;
        self.iterations = 0;
        self.exceeded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detection() {
        let mut guard: RecursionGuard<u32> = RecursionGuard::new(10, 100);
        assert!(guard.enter(1).is_entered());
        assert!(guard.enter(2).is_entered());
        assert!(guard.enter(1).is_cycle());
        guard.leave(2);
        guard.leave(1);
        assert!(guard.enter(1).is_entered());
        guard.leave(1);
    }

    #[test]
    fn test_depth_limit() {
        let mut guard: RecursionGuard<u32> = RecursionGuard::new(3, 1000);
        assert!(guard.enter(1).is_entered());
        assert!(guard.enter(2).is_entered());
        assert!(guard.enter(3).is_entered());
        assert!(guard.enter(4).is_exceeded());
        assert!(guard.is_exceeded());
        guard.reset();
        assert!(!guard.is_exceeded());
        assert!(guard.enter(4).is_entered());
    }

    #[test]
    fn test_iteration_limit() {
        let mut guard: RecursionGuard<u32> = RecursionGuard::new(10, 5);
        for i in 0..5u32 {
            assert!(guard.enter(i).is_entered());
            guard.leave(i);
        }
        assert!(guard.enter(99).is_exceeded());
    }
}
