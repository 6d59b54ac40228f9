//! Text markers and the per-line spans that attach them to text.
//!
//! A [`TextMarker`] is a range annotation that survives edits. It is stored once per
//! document; each line it touches holds a [`MarkedSpan`] recording where on that line
//! the marker starts and ends (`None` when the marker continues from the previous line
//! or into the next one). The marker keeps the reverse list of lines it is attached to.

use crate::line::{LineHandle, Payload};
use crate::position::Pos;
use std::collections::HashMap;

/// Identifier of a text marker, unique within a [`Workspace`](crate::Workspace).
///
/// Ids increase with creation order; collapsed-marker precedence uses this order to break
/// ties deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub(crate) u64);

impl MarkerId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// What kind of marker this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// A range marker created by `mark_text`.
    Range,
    /// A zero-width marker created by `set_bookmark`.
    Bookmark,
}

/// Recognized marker options.
#[derive(Debug, Clone)]
pub struct MarkOptions {
    /// Class name for the rendering layer.
    pub class_name: Option<String>,
    /// Hide the covered text (folding). Collapsed markers are always atomic.
    pub collapsed: bool,
    /// Cursors cannot be placed strictly inside the range.
    pub atomic: bool,
    /// Edits inside the range are rejected.
    pub read_only: bool,
    /// Text inserted at the start boundary becomes part of the marker.
    pub inclusive_left: bool,
    /// Text inserted at the end boundary becomes part of the marker.
    pub inclusive_right: bool,
    /// Override: may the cursor sit at the left boundary of an atomic marker.
    pub select_left: Option<bool>,
    /// Override: may the cursor sit at the right boundary of an atomic marker.
    pub select_right: Option<bool>,
    /// Clear the marker when a cursor enters it.
    pub clear_on_enter: bool,
    /// Remove the marker once its range becomes empty.
    pub clear_when_empty: bool,
    /// Replacement content for the covered text. Implies `collapsed`.
    pub replaced_with: Option<Payload>,
    /// For bookmarks: text inserted exactly at the bookmark goes after it.
    pub insert_left: bool,
    /// Record the marking as an undoable history event.
    pub add_to_history: bool,
    /// Mirror the marker into every linked document.
    pub shared: bool,
    /// Opaque extra data for the rendering layer.
    pub data: Option<Payload>,
}

impl Default for MarkOptions {
    fn default() -> Self {
        Self {
            class_name: None,
            collapsed: false,
            atomic: false,
            read_only: false,
            inclusive_left: false,
            inclusive_right: false,
            select_left: None,
            select_right: None,
            clear_on_enter: false,
            clear_when_empty: true,
            replaced_with: None,
            insert_left: false,
            add_to_history: false,
            shared: false,
            data: None,
        }
    }
}

impl MarkOptions {
    /// A collapsed (folding) marker.
    pub fn collapsed() -> Self {
        Self {
            collapsed: true,
            ..Self::default()
        }
    }

    /// An atomic marker.
    pub fn atomic() -> Self {
        Self {
            atomic: true,
            ..Self::default()
        }
    }

    /// A read-only marker.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// A marker carrying only a class name.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            class_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set both boundary inclusivity flags.
    pub fn inclusive(mut self, left: bool, right: bool) -> Self {
        self.inclusive_left = left;
        self.inclusive_right = right;
        self
    }

    /// Set `clear_when_empty`.
    pub fn clear_when_empty(mut self, clear: bool) -> Self {
        self.clear_when_empty = clear;
        self
    }

    /// Set `shared`.
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }
}

/// Options for [`Workspace::set_bookmark`](crate::Workspace::set_bookmark).
#[derive(Debug, Clone, Default)]
pub struct BookmarkOptions {
    /// Widget shown at the bookmark position.
    pub widget: Option<Payload>,
    /// Text inserted exactly at the bookmark goes after it.
    pub insert_left: bool,
    /// Mirror the bookmark into every linked document.
    pub shared: bool,
}

/// A marker's presence on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedSpan {
    /// The marker this span belongs to.
    pub marker: MarkerId,
    /// Start column on this line, `None` if the marker starts on an earlier line.
    pub from: Option<usize>,
    /// End column on this line, `None` if the marker continues onto a later line.
    pub to: Option<usize>,
}

impl MarkedSpan {
    pub(crate) fn new(marker: MarkerId, from: Option<usize>, to: Option<usize>) -> Self {
        Self { marker, from, to }
    }
}

/// Resolved location of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerRange {
    /// Start position.
    pub from: Pos,
    /// End position (equal to `from` for bookmarks).
    pub to: Pos,
}

/// A text marker.
#[derive(Debug, Clone)]
pub struct TextMarker {
    pub(crate) id: MarkerId,
    pub(crate) kind: MarkerKind,
    pub(crate) options: MarkOptions,
    pub(crate) lines: Vec<LineHandle>,
    pub(crate) shared_group: Option<MarkerId>,
}

impl TextMarker {
    pub(crate) fn new(id: MarkerId, kind: MarkerKind, mut options: MarkOptions) -> Self {
        if options.replaced_with.is_some() {
            options.collapsed = true;
        }
        if options.collapsed {
            options.atomic = true;
        }
        Self {
            id,
            kind,
            options,
            lines: Vec::new(),
            shared_group: None,
        }
    }

    /// Marker id.
    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Range or bookmark.
    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    /// The options this marker was created with (after normalization).
    pub fn options(&self) -> &MarkOptions {
        &self.options
    }

    /// Whether the marker hides its text.
    pub fn is_collapsed(&self) -> bool {
        self.options.collapsed
    }

    /// Whether cursors skip over the marker.
    pub fn is_atomic(&self) -> bool {
        self.options.atomic
    }

    /// Whether edits inside the marker are rejected.
    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Whether the marker renders replacement content.
    pub fn has_widget(&self) -> bool {
        self.options.replaced_with.is_some()
    }

    /// Whether the marker is still attached to at least one line.
    pub fn is_attached(&self) -> bool {
        !self.lines.is_empty()
    }

    /// The id of the shared marker group this marker belongs to, if any.
    pub fn shared_group(&self) -> Option<MarkerId> {
        self.shared_group
    }

    pub(crate) fn is_bookmark(&self) -> bool {
        self.kind == MarkerKind::Bookmark
    }

    pub(crate) fn inclusive_left(&self) -> bool {
        self.options.inclusive_left
    }

    pub(crate) fn inclusive_right(&self) -> bool {
        self.options.inclusive_right
    }

    pub(crate) fn prevents_cursor_left(&self) -> bool {
        self.options
            .select_left
            .map_or(self.options.inclusive_left, |select| !select)
    }

    pub(crate) fn prevents_cursor_right(&self) -> bool {
        self.options
            .select_right
            .map_or(self.options.inclusive_right, |select| !select)
    }

    pub(crate) fn attach_line(&mut self, line: LineHandle) {
        self.lines.push(line);
    }

    pub(crate) fn detach_line(&mut self, line: LineHandle) {
        if let Some(idx) = self.lines.iter().position(|l| *l == line) {
            self.lines.remove(idx);
        }
    }
}

/// All markers of one document.
pub(crate) type MarkerTable = HashMap<MarkerId, TextMarker>;

pub(crate) fn span_for(spans: &[MarkedSpan], marker: MarkerId) -> Option<&MarkedSpan> {
    spans.iter().find(|span| span.marker == marker)
}

pub(crate) fn span_for_mut(spans: &mut [MarkedSpan], marker: MarkerId) -> Option<&mut MarkedSpan> {
    spans.iter_mut().find(|span| span.marker == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapsed_implies_atomic() {
        let marker = TextMarker::new(MarkerId(1), MarkerKind::Range, MarkOptions::collapsed());
        assert!(marker.is_collapsed());
        assert!(marker.is_atomic());
    }

    #[test]
    fn test_replaced_with_implies_collapsed() {
        let opts = MarkOptions {
            replaced_with: Some(Payload::new("widget")),
            ..MarkOptions::default()
        };
        let marker = TextMarker::new(MarkerId(1), MarkerKind::Range, opts);
        assert!(marker.is_collapsed());
        assert!(marker.has_widget());
    }

    #[test]
    fn test_select_overrides_inclusive() {
        let mut opts = MarkOptions::atomic().inclusive(true, false);
        opts.select_left = Some(true);
        opts.select_right = Some(false);
        let marker = TextMarker::new(MarkerId(1), MarkerKind::Range, opts);
        assert!(!marker.prevents_cursor_left());
        assert!(marker.prevents_cursor_right());
    }
}
