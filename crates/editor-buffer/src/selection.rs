//! Selection ranges and multi-range selections.
//!
//! A [`Selection`] is an immutable, normalized set of ranges: sorted by start, pairwise
//! non-overlapping, and (unless `selections_may_touch` is set) non-touching. Every
//! mutation of a document's selection builds a new value.

use crate::change::{Change, change_end};
use crate::error::DocError;
use crate::history::Origin;
use crate::position::Pos;
use serde::{Deserialize, Serialize};

/// One selection range. `anchor` stays put while extending, `head` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionRange {
    /// Fixed end.
    pub anchor: Pos,
    /// Moving end (the caret).
    pub head: Pos,
}

impl SelectionRange {
    /// Create a range.
    pub fn new(anchor: Pos, head: Pos) -> Self {
        Self { anchor, head }
    }

    /// An empty range (caret) at `pos`.
    pub fn cursor(pos: Pos) -> Self {
        Self::new(pos, pos)
    }

    /// Smaller endpoint.
    pub fn from(&self) -> Pos {
        self.anchor.min(self.head)
    }

    /// Larger endpoint.
    pub fn to(&self) -> Pos {
        self.anchor.max(self.head)
    }

    /// Whether anchor and head coincide.
    pub fn empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// A normalized set of selection ranges with a primary range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<SelectionRange>,
    primary: usize,
}

impl Selection {
    /// Normalize `ranges` into a selection.
    ///
    /// Fails with [`DocError::InvalidSelection`] when `ranges` is empty or `primary` does
    /// not index into it.
    pub fn new(
        ranges: Vec<SelectionRange>,
        primary: usize,
        may_touch: bool,
    ) -> Result<Self, DocError> {
        if ranges.is_empty() {
            return Err(DocError::InvalidSelection("selection has no ranges"));
        }
        if primary >= ranges.len() {
            return Err(DocError::InvalidSelection("primary index out of range"));
        }
        Ok(normalize_selection(ranges, primary, may_touch))
    }

    /// A single-range selection. `head` defaults to `anchor`.
    pub fn simple(anchor: Pos, head: Option<Pos>) -> Self {
        Self {
            ranges: vec![SelectionRange::new(anchor, head.unwrap_or(anchor))],
            primary: 0,
        }
    }

    /// A single caret.
    pub fn cursor(pos: Pos) -> Self {
        Self::simple(pos, None)
    }

    /// Build without normalizing. Callers guarantee the invariants.
    pub(crate) fn from_normalized(ranges: Vec<SelectionRange>, primary: usize) -> Self {
        debug_assert!(primary < ranges.len());
        Self { ranges, primary }
    }

    /// The ranges, sorted by start.
    pub fn ranges(&self) -> &[SelectionRange] {
        &self.ranges
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always false; a selection has at least one range.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Index of the primary range.
    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// The primary range.
    pub fn primary(&self) -> SelectionRange {
        self.ranges[self.primary]
    }

    /// Whether any range is non-empty.
    pub fn something_selected(&self) -> bool {
        self.ranges.iter().any(|r| !r.empty())
    }

    /// Index of the range containing `[pos, end]` (`end` defaults to `pos`).
    pub fn contains(&self, pos: Pos, end: Option<Pos>) -> Option<usize> {
        let end = end.unwrap_or(pos);
        self.ranges
            .iter()
            .position(|r| end >= r.from() && pos <= r.to())
    }

    pub(crate) fn map_positions(&self, mut f: impl FnMut(Pos) -> Pos) -> Vec<SelectionRange> {
        self.ranges
            .iter()
            .map(|r| SelectionRange::new(f(r.anchor), f(r.head)))
            .collect()
    }
}

/// Sort ranges and merge overlapping (or touching) neighbours.
///
/// When two ranges merge, the orientation of the non-empty one wins (the later one when
/// both are carets), and the primary index follows its range into the merged result.
pub fn normalize_selection(
    ranges: Vec<SelectionRange>,
    primary: usize,
    may_touch: bool,
) -> Selection {
    let mut indexed: Vec<(usize, SelectionRange)> = ranges.into_iter().enumerate().collect();
    indexed.sort_by(|a, b| a.1.from().cmp(&b.1.from()));
    let mut primary = indexed
        .iter()
        .position(|(orig, _)| *orig == primary)
        .unwrap_or(0);
    let mut ranges: Vec<SelectionRange> = indexed.into_iter().map(|(_, r)| r).collect();

    let mut i = 1;
    while i < ranges.len() {
        let cur = ranges[i];
        let prev = ranges[i - 1];
        let overlaps = if may_touch && !cur.empty() {
            prev.to() > cur.from()
        } else {
            prev.to() >= cur.from()
        };
        if overlaps {
            let from = prev.from().min(cur.from());
            let to = prev.to().max(cur.to());
            let inverted = if prev.empty() {
                cur.from() == cur.head
            } else {
                prev.from() == prev.head
            };
            if i <= primary {
                primary -= 1;
            }
            let merged = if inverted {
                SelectionRange::new(to, from)
            } else {
                SelectionRange::new(from, to)
            };
            ranges.splice(i - 1..=i, [merged]);
        } else {
            i += 1;
        }
    }
    Selection::from_normalized(ranges, primary)
}

/// Move or extend `range` so its head lands on `head`.
///
/// Without `extend` the result is a fresh range from `other` (or `head`) to `head`. When
/// extending with an `other` endpoint, the anchor flips if the new range crosses the old
/// anchor.
pub fn extend_range(
    range: SelectionRange,
    head: Pos,
    other: Option<Pos>,
    extend: bool,
) -> SelectionRange {
    if !extend {
        return SelectionRange::new(other.unwrap_or(head), head);
    }
    let mut anchor = range.anchor;
    let mut head = head;
    if let Some(other) = other {
        let pos_before = head < anchor;
        if pos_before != (other < anchor) {
            anchor = head;
            head = other;
        } else if pos_before != (head < other) {
            head = other;
        }
    }
    SelectionRange::new(anchor, head)
}

/// Map a position through a change: untouched before it, collapsed to the end of the
/// inserted text inside it, shifted after it.
pub(crate) fn adjust_for_change(pos: Pos, change: &Change) -> Pos {
    if pos < change.from {
        return pos;
    }
    if pos <= change.to {
        return change_end(change);
    }
    let line = pos.line + change.text.len() - 1 - (change.to.line - change.from.line);
    let mut ch = pos.ch;
    if pos.line == change.to.line {
        ch = (ch + change_end(change).ch).saturating_sub(change.to.ch);
    }
    Pos::new(line, ch)
}

/// Selection after `change` is applied, following every endpoint through it.
pub(crate) fn compute_sel_after_change(sel: &Selection, change: &Change, may_touch: bool) -> Selection {
    let ranges = sel.map_positions(|pos| adjust_for_change(pos, change));
    normalize_selection(ranges, sel.primary_index(), may_touch)
}

/// Where the selection lands after `replace_selections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collapse {
    /// Carets after the inserted text.
    #[default]
    End,
    /// Each range selects its inserted text (keeping the old orientation).
    Around,
    /// Carets before the inserted text.
    Start,
}

fn offset_pos(pos: Pos, old: Pos, new: Pos) -> Pos {
    if pos.line == old.line {
        Pos::new(new.line, (pos.ch + new.ch).saturating_sub(old.ch))
    } else {
        Pos::new(new.line + (pos.line - old.line), pos.ch)
    }
}

/// Selection after replacing each range of `sel` by the matching change of `changes`
/// (sorted, one per range).
pub(crate) fn compute_replaced_sel(
    sel: &Selection,
    changes: &[Change],
    collapse: Collapse,
    first: usize,
) -> Selection {
    let mut out = Vec::with_capacity(changes.len());
    let mut old_prev = Pos::new(first, 0);
    let mut new_prev = old_prev;
    for (i, change) in changes.iter().enumerate() {
        let from = offset_pos(change.from, old_prev, new_prev);
        let to = offset_pos(change_end(change), old_prev, new_prev);
        old_prev = change.to;
        new_prev = to;
        let range = match collapse {
            Collapse::Around => {
                let inverted = sel.ranges()[i].head < sel.ranges()[i].anchor;
                if inverted {
                    SelectionRange::new(to, from)
                } else {
                    SelectionRange::new(from, to)
                }
            }
            Collapse::End | Collapse::Start => SelectionRange::cursor(from),
        };
        out.push(range);
    }
    Selection::from_normalized(out, sel.primary_index().min(changes.len().saturating_sub(1)))
}

/// Options accepted by the selection setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Ask the rendering layer to scroll the primary head into view.
    pub scroll: bool,
    /// Origin of the selection change (used for history merging).
    pub origin: Option<Origin>,
    /// Preferred direction when skipping atomic markers (`-1`, `0` or `1`).
    pub bias: i8,
    /// Drop selection-only events from the redo stack.
    pub clear_redo: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            scroll: true,
            origin: None,
            bias: 0,
            clear_redo: true,
        }
    }
}

impl SelectionOptions {
    /// Options that do not request scrolling.
    pub fn no_scroll() -> Self {
        Self {
            scroll: false,
            ..Self::default()
        }
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Set the bias.
    pub fn with_bias(mut self, bias: i8) -> Self {
        self.bias = bias.signum();
        self
    }
}

/// A pending selection offered to `before_selection_change` filters.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    ranges: Vec<SelectionRange>,
    origin: Option<Origin>,
    updated: bool,
}

impl SelectionRequest {
    pub(crate) fn new(sel: &Selection, origin: Option<Origin>) -> Self {
        Self {
            ranges: sel.ranges().to_vec(),
            origin,
            updated: false,
        }
    }

    /// The ranges about to be committed.
    pub fn ranges(&self) -> &[SelectionRange] {
        &self.ranges
    }

    /// Origin of the selection change.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Replace the pending ranges. They are clipped to the document and renormalized
    /// with the last range as primary.
    pub fn update(&mut self, ranges: Vec<SelectionRange>) {
        if ranges.is_empty() {
            return;
        }
        self.ranges = ranges;
        self.updated = true;
    }

    pub(crate) fn into_update(self) -> Option<Vec<SelectionRange>> {
        self.updated.then_some(self.ranges)
    }
}
