//! Source positions and file identities.

use serde::{Deserialize, Serialize};

/// Identifies one source file for the duration of an analysis session.
///
/// File ids are assigned by the external driver that materializes syntax
/// trees; the core only compares them and records them in cache dependency
/// sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const NONE: FileId = FileId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == FileId::NONE
    }
}

/// A half-open byte range into one file's source text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: u32,
    pub len: u32,
}

impl TextRange {
    pub fn new(start: u32, len: u32) -> Self {
        TextRange { start, len }
    }

    pub fn empty() -> Self {
        TextRange { start: 0, len: 0 }
    }

    pub fn end(self) -> u32 {
        self.start + self.len
    }

    pub fn contains(self, offset: u32) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// True when `self` is fully inside `other`.
    pub fn contained_in(self, other: TextRange) -> bool {
        self.start >= other.start && self.end() <= other.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_containment() {
        let outer = TextRange::new(10, 20);
        let inner = TextRange::new(12, 4);
        assert!(inner.contained_in(outer));
        assert!(!outer.contained_in(inner));
        assert!(outer.contains(10));
        assert!(outer.contains(29));
        assert!(!outer.contains(30));
    }
}
