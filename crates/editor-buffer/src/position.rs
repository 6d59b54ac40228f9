//! Document coordinates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A position in the document: absolute line number and column.
///
/// `ch` counts Unicode scalar values (`char`s) from the start of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pos {
    /// Absolute line number (document-relative, includes the document's `first` offset).
    pub line: usize,
    /// Column in characters within the line.
    pub ch: usize,
}

impl Pos {
    /// Create a new position.
    pub const fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }

    /// Same line, different column.
    pub fn with_ch(self, ch: usize) -> Self {
        Self { line: self.line, ch }
    }
}

impl Ord for Pos {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.ch.cmp(&other.ch))
    }
}

impl PartialOrd for Pos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<(usize, usize)> for Pos {
    fn from((line, ch): (usize, usize)) -> Self {
        Self::new(line, ch)
    }
}

/// Shift a line number by a signed delta, saturating at zero.
pub(crate) fn offset_line(line: usize, delta: isize) -> usize {
    line.saturating_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Pos::new(0, 5) < Pos::new(1, 0));
        assert!(Pos::new(2, 1) < Pos::new(2, 3));
        assert_eq!(Pos::new(3, 3).cmp(&Pos::new(3, 3)), Ordering::Equal);
        assert_eq!(
            std::cmp::max(Pos::new(1, 9), Pos::new(2, 0)),
            Pos::new(2, 0)
        );
    }

    #[test]
    fn test_offset_line_saturates() {
        assert_eq!(offset_line(3, -5), 0);
        assert_eq!(offset_line(3, 2), 5);
    }
}
