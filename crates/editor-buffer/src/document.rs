//! Documents: a line tree plus selection, markers and bookkeeping.
//!
//! A [`Document`] is owned by the [`Workspace`](crate::Workspace) and read through
//! `Workspace::doc`. Everything that mutates it goes through workspace methods so that
//! history, linked documents and notifications stay consistent.

use crate::config::DocOptions;
use crate::error::DocError;
use crate::line::{HeightEstimator, Line, LineHandle, WidgetId};
use crate::line_tree::LineTree;
use crate::marker::{MarkedSpan, MarkerId, MarkerTable, TextMarker};
use crate::position::{Pos, offset_line};
use crate::selection::{Selection, SelectionRange};
use crate::text::{char_len, slice_chars, split_lines};
use crate::workspace::{DocId, HistoryId};
use std::collections::HashMap;

/// Link from one document to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocLink {
    /// The linked document.
    pub doc: DocId,
    /// Whether both documents share one history.
    pub shared_hist: bool,
    /// Whether the linked document is this document's parent.
    pub is_parent: bool,
}

/// Which end of the primary selection range [`Document::get_cursor`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorSide {
    /// The moving end.
    #[default]
    Head,
    /// The fixed end.
    Anchor,
    /// The earlier end.
    From,
    /// The later end.
    To,
}

/// A text document.
#[derive(Debug)]
pub struct Document {
    pub(crate) id: DocId,
    pub(crate) tree: LineTree,
    pub(crate) sel: Selection,
    pub(crate) history: HistoryId,
    pub(crate) clean_generation: u64,
    pub(crate) frontier: usize,
    pub(crate) markers: MarkerTable,
    pub(crate) widgets: HashMap<WidgetId, LineHandle>,
    pub(crate) cant_edit: bool,
    pub(crate) extending: bool,
    pub(crate) options: DocOptions,
    pub(crate) estimator: HeightEstimator,
    pub(crate) links: Vec<DocLink>,
}

impl Document {
    pub(crate) fn new(
        id: DocId,
        lines: Vec<String>,
        first: usize,
        options: DocOptions,
        history: HistoryId,
    ) -> Self {
        let estimator = HeightEstimator::from_options(&options);
        let lines = if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        };
        let lines: Vec<Line> = lines
            .into_iter()
            .map(|text| {
                let height = estimator.estimate(&text, &[], false);
                Line::new(text, height)
            })
            .collect();
        Self {
            id,
            tree: LineTree::new(first, lines),
            sel: Selection::cursor(Pos::new(first, 0)),
            history,
            clean_generation: 1,
            frontier: first,
            markers: HashMap::new(),
            widgets: HashMap::new(),
            cant_edit: false,
            extending: false,
            options,
            estimator,
            links: Vec::new(),
        }
    }

    /// Document id.
    pub fn id(&self) -> DocId {
        self.id
    }

    /// Document options.
    pub fn options(&self) -> &DocOptions {
        &self.options
    }

    /// The underlying line tree.
    pub fn tree(&self) -> &LineTree {
        &self.tree
    }

    /// Id of the history this document records into.
    pub fn history_id(&self) -> HistoryId {
        self.history
    }

    /// Documents linked to this one.
    pub fn links(&self) -> &[DocLink] {
        &self.links
    }

    /// Number of the first line.
    pub fn first_line(&self) -> usize {
        self.tree.first()
    }

    /// Number of the last line.
    pub fn last_line(&self) -> usize {
        self.tree.last()
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.tree.len()
    }

    /// Text of line `n`.
    pub fn get_line(&self, n: usize) -> Result<&str, DocError> {
        Ok(self.tree.get_line(n)?.text())
    }

    /// Line `n`.
    pub fn line(&self, n: usize) -> Result<&Line, DocError> {
        self.tree.get_line(n)
    }

    /// Stable handle of line `n`.
    pub fn get_line_handle(&self, n: usize) -> Result<LineHandle, DocError> {
        self.tree.handle_at(n)
    }

    /// Current number of the line behind `handle`, `None` once the line is gone.
    pub fn get_line_number(&self, handle: LineHandle) -> Option<usize> {
        self.tree.line_number(handle)
    }

    /// The line behind `handle`.
    pub fn line_by_handle(&self, handle: LineHandle) -> Option<&Line> {
        self.tree.line(handle)
    }

    /// Iterate lines `[from, to)` with their numbers.
    pub fn iter_lines(
        &self,
        from: usize,
        to: usize,
    ) -> impl Iterator<Item = (usize, &Line)> + '_ {
        self.tree.iter_range(from, to).map(|(n, _, line)| (n, line))
    }

    /// Separator used to join lines.
    pub fn line_separator(&self) -> &str {
        self.options.separator().unwrap_or("\n")
    }

    /// Split text into lines using this document's separator rules.
    pub fn split_lines(&self, text: &str) -> Vec<String> {
        split_lines(text, self.options.separator())
    }

    /// Clamp a line number into the document.
    pub fn clip_line(&self, n: usize) -> usize {
        n.clamp(self.first_line(), self.last_line())
    }

    /// Clamp a position into the document.
    pub fn clip_pos(&self, pos: Pos) -> Pos {
        let first = self.first_line();
        if pos.line < first {
            return Pos::new(first, 0);
        }
        let last = self.last_line();
        if pos.line > last {
            return Pos::new(last, self.line_len(last));
        }
        let len = self.line_len(pos.line);
        if pos.ch > len {
            Pos::new(pos.line, len)
        } else {
            pos
        }
    }

    /// Text between two positions, joined with `sep` (or the document separator).
    pub fn get_range(&self, from: Pos, to: Pos, sep: Option<&str>) -> String {
        let (from, to) = (self.clip_pos(from), self.clip_pos(to));
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        self.get_between(from, to)
            .join(sep.unwrap_or(self.line_separator()))
    }

    /// Whole document text.
    pub fn get_value(&self, sep: Option<&str>) -> String {
        self.tree
            .get_lines(self.first_line(), self.first_line() + self.line_count())
            .join(sep.unwrap_or(self.line_separator()))
    }

    /// Position of the character at `index` (counting separators).
    pub fn pos_from_index(&self, index: usize) -> Pos {
        let sep = char_len(self.line_separator());
        let mut rest = index;
        for (n, line) in self.iter_lines(self.first_line(), self.first_line() + self.line_count()) {
            let size = line.len_chars() + sep;
            if size > rest {
                return self.clip_pos(Pos::new(n, rest));
            }
            rest -= size;
        }
        self.clip_pos(Pos::new(self.last_line(), usize::MAX))
    }

    /// Character index of `pos` (counting separators).
    pub fn index_from_pos(&self, pos: Pos) -> usize {
        let pos = self.clip_pos(pos);
        let sep = char_len(self.line_separator());
        pos.ch
            + self
                .iter_lines(self.first_line(), pos.line)
                .map(|(_, line)| line.len_chars() + sep)
                .sum::<usize>()
    }

    /// Total height of all lines.
    pub fn height(&self) -> f64 {
        self.tree.height()
    }

    /// Line at vertical offset `h` (clamped to the document).
    pub fn line_at_height(&self, h: f64) -> usize {
        self.tree.line_at_height(h)
    }

    /// Vertical offset of the top of line `n`.
    pub fn height_at_line(&self, n: usize) -> Result<f64, DocError> {
        let handle = self.tree.handle_at(n)?;
        Ok(self.tree.height_at_line(handle).unwrap_or(0.0))
    }

    /// First line whose highlighting state may be stale.
    pub fn frontier(&self) -> usize {
        self.frontier
    }

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.sel
    }

    /// Current selection ranges.
    pub fn list_selections(&self) -> &[SelectionRange] {
        self.sel.ranges()
    }

    /// Whether any range is non-empty.
    pub fn something_selected(&self) -> bool {
        self.sel.something_selected()
    }

    /// One end of the primary range.
    pub fn get_cursor(&self, side: CursorSide) -> Pos {
        let range = self.sel.primary();
        match side {
            CursorSide::Head => range.head,
            CursorSide::Anchor => range.anchor,
            CursorSide::From => range.from(),
            CursorSide::To => range.to(),
        }
    }

    /// Selected text of all ranges, joined with `sep` (or the document separator).
    pub fn get_selection(&self, sep: Option<&str>) -> String {
        let lines: Vec<String> = self
            .sel
            .ranges()
            .iter()
            .flat_map(|r| self.get_between(r.from(), r.to()))
            .collect();
        lines.join(sep.unwrap_or(self.line_separator()))
    }

    /// Selected text per range.
    pub fn get_selections(&self, sep: Option<&str>) -> Vec<String> {
        let sep = sep.unwrap_or(self.line_separator());
        self.sel
            .ranges()
            .iter()
            .map(|r| self.get_between(r.from(), r.to()).join(sep))
            .collect()
    }

    /// Set when no cursor position outside atomic markers exists. Edits are ignored
    /// until a marker is cleared.
    pub fn cant_edit(&self) -> bool {
        self.cant_edit
    }

    /// Whether edits are currently rejected.
    pub fn is_read_only(&self) -> bool {
        self.options.read_only || self.cant_edit
    }

    /// Whether cursor motion extends the selection.
    pub fn extending(&self) -> bool {
        self.extending
    }

    /// Generation recorded by the last `mark_clean`.
    pub fn clean_generation(&self) -> u64 {
        self.clean_generation
    }

    /// A marker of this document.
    pub fn marker(&self, id: MarkerId) -> Option<&TextMarker> {
        self.markers.get(&id)
    }

    /// Line a widget is attached to.
    pub fn widget_line(&self, id: WidgetId) -> Option<LineHandle> {
        self.widgets.get(&id).copied()
    }

    pub(crate) fn line_len(&self, n: usize) -> usize {
        self.tree.get_line(n).map_or(0, Line::len_chars)
    }

    pub(crate) fn line_text(&self, handle: LineHandle) -> &str {
        self.tree.line(handle).map_or("", Line::text)
    }

    /// Lines between two ordered, clipped positions.
    pub(crate) fn get_between(&self, from: Pos, to: Pos) -> Vec<String> {
        self.tree
            .iter_range(from.line, to.line + 1)
            .map(|(n, _, line)| {
                let start = if n == from.line { from.ch } else { 0 };
                let end = if n == to.line { to.ch } else { line.len_chars() };
                slice_chars(line.text(), start, end).to_string()
            })
            .collect()
    }

    /// Move the whole document by `distance` lines.
    pub(crate) fn shift(&mut self, distance: isize) {
        self.tree
            .set_first(offset_line(self.tree.first(), distance));
        let ranges = self.sel.map_positions(|p| Pos::new(offset_line(p.line, distance), p.ch));
        self.sel = Selection::from_normalized(ranges, self.sel.primary_index());
        self.frontier = offset_line(self.frontier, distance);
    }

    pub(crate) fn insert_lines(&mut self, at: usize, lines: Vec<(String, Vec<MarkedSpan>)>) {
        let (lines, spans): (Vec<Line>, Vec<Vec<MarkedSpan>>) = lines
            .into_iter()
            .map(|(text, spans)| (Line::new(text, 0.0), spans))
            .unzip();
        let handles = self.tree.insert(at, lines);
        for (handle, spans) in handles.into_iter().zip(spans) {
            self.attach_spans(handle, spans);
        }
    }

    pub(crate) fn remove_lines(&mut self, at: usize, count: usize) {
        for (handle, line) in self.tree.remove(at, count) {
            for span in &line.marked_spans {
                if let Some(marker) = self.markers.get_mut(&span.marker) {
                    marker.detach_line(handle);
                }
            }
            for widget in &line.widgets {
                self.widgets.remove(&widget.id);
            }
        }
    }

    pub(crate) fn update_line(&mut self, handle: LineHandle, text: String, spans: Vec<MarkedSpan>) {
        let old = match self.tree.line_mut(handle) {
            Some(line) => {
                line.set_text(text);
                std::mem::take(&mut line.marked_spans)
            }
            None => return,
        };
        for span in old {
            if let Some(marker) = self.markers.get_mut(&span.marker) {
                marker.detach_line(handle);
            }
        }
        self.attach_spans(handle, spans);
    }

    /// Replace the spans of a line, dropping those whose marker no longer exists.
    fn attach_spans(&mut self, handle: LineHandle, spans: Vec<MarkedSpan>) {
        let mut kept = Vec::with_capacity(spans.len());
        for span in spans {
            if let Some(marker) = self.markers.get_mut(&span.marker) {
                marker.attach_line(handle);
                kept.push(span);
            }
        }
        if let Some(line) = self.tree.line_mut(handle) {
            line.marked_spans = kept;
        }
    }

    pub(crate) fn add_marked_span(&mut self, handle: LineHandle, span: MarkedSpan) {
        if let Some(marker) = self.markers.get_mut(&span.marker) {
            marker.attach_line(handle);
        }
        if let Some(line) = self.tree.line_mut(handle) {
            line.marked_spans.push(span);
        }
    }

    /// Recompute the estimated height of one line.
    pub(crate) fn reestimate_height(&mut self, handle: LineHandle) {
        let hidden = self.line_is_hidden(handle);
        let Some(line) = self.tree.line(handle) else {
            return;
        };
        let height = self.estimator.estimate(line.text(), line.widgets(), hidden);
        self.tree.update_line_height(handle, height);
    }

    pub(crate) fn reestimate_heights(&mut self, from: usize, to: usize) {
        for handle in self.tree.handles(from, to) {
            self.reestimate_height(handle);
        }
    }
}
