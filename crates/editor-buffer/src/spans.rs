//! Marker span algorithms.
//!
//! - Re-cutting spans when a change replaces part of a line (`stretch_spans_over_change`).
//! - Splitting an edit around read-only markers.
//! - Ordering nested collapsed markers and rejecting partial overlaps.
//! - Visual lines: runs of logical lines merged by folds.
//! - Moving cursors out of atomic markers.

use crate::change::Change;
use crate::document::Document;
use crate::error::DocError;
use crate::history::{History, HistoryChange, Origin};
use crate::line::{Line, LineHandle};
use crate::marker::{
    MarkOptions, MarkedSpan, MarkerId, MarkerKind, MarkerRange, MarkerTable, TextMarker,
    span_for,
};
use crate::operation::{DocEvent, TransactionContext};
use crate::position::Pos;
use crate::selection::{Selection, SelectionRange, normalize_selection};
use crate::text::char_len;
use crate::workspace::{DocId, Workspace};
use std::cmp::Ordering;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Start,
    End,
}

fn marked_spans_before(
    old: &[MarkedSpan],
    markers: &MarkerTable,
    start_ch: usize,
    is_insert: bool,
) -> Vec<MarkedSpan> {
    old.iter()
        .filter_map(|span| {
            let marker = markers.get(&span.marker)?;
            let starts_before = span.from.is_none_or(|from| {
                if marker.inclusive_left() {
                    from <= start_ch
                } else {
                    from < start_ch
                }
            });
            let stays_bookmark = span.from == Some(start_ch)
                && marker.is_bookmark()
                && (!is_insert || !marker.options.insert_left);
            if !starts_before && !stays_bookmark {
                return None;
            }
            let ends_after = span.to.is_none_or(|to| {
                if marker.inclusive_right() {
                    to >= start_ch
                } else {
                    to > start_ch
                }
            });
            Some(MarkedSpan::new(
                span.marker,
                span.from,
                if ends_after { None } else { span.to },
            ))
        })
        .collect()
}

fn marked_spans_after(
    old: &[MarkedSpan],
    markers: &MarkerTable,
    end_ch: usize,
    is_insert: bool,
) -> Vec<MarkedSpan> {
    old.iter()
        .filter_map(|span| {
            let marker = markers.get(&span.marker)?;
            let ends_after = span.to.is_none_or(|to| {
                if marker.inclusive_right() {
                    to >= end_ch
                } else {
                    to > end_ch
                }
            });
            let stays_bookmark = span.from == Some(end_ch)
                && marker.is_bookmark()
                && (!is_insert || marker.options.insert_left);
            if !ends_after && !stays_bookmark {
                return None;
            }
            let starts_before = span.from.is_none_or(|from| {
                if marker.inclusive_left() {
                    from <= end_ch
                } else {
                    from < end_ch
                }
            });
            Some(MarkedSpan::new(
                span.marker,
                if starts_before {
                    None
                } else {
                    span.from.map(|from| from.saturating_sub(end_ch))
                },
                span.to.map(|to| to.saturating_sub(end_ch)),
            ))
        })
        .collect()
}

fn clear_empty_spans(spans: &mut Vec<MarkedSpan>, markers: &MarkerTable) {
    spans.retain(|span| {
        let empty = span.from.is_some() && span.from == span.to;
        !(empty
            && markers
                .get(&span.marker)
                .is_none_or(|m| m.options.clear_when_empty))
    });
}

fn extra_left(marker: &TextMarker) -> i8 {
    if marker.inclusive_left() { -1 } else { 0 }
}

fn extra_right(marker: &TextMarker) -> i8 {
    if marker.inclusive_right() { 1 } else { 0 }
}

impl Document {
    /// Spans for each line of the change's replacement text: the parts of existing spans
    /// sticking out on either side of the replaced range, merged across the new text.
    pub(crate) fn stretch_spans_over_change(&self, change: &Change) -> Option<Vec<Vec<MarkedSpan>>> {
        if change.full {
            return None;
        }
        let spans_at = |n: usize| {
            self.tree
                .get_line(n)
                .ok()
                .map(|line| line.marked_spans.as_slice())
                .filter(|spans| !spans.is_empty())
        };
        let old_first = spans_at(change.from.line);
        let old_last = spans_at(change.to.line);
        if old_first.is_none() && old_last.is_none() {
            return None;
        }

        let start_ch = change.from.ch;
        let is_insert = change.from == change.to;
        let mut first = old_first
            .map(|old| marked_spans_before(old, &self.markers, start_ch, is_insert))
            .unwrap_or_default();
        let mut last = old_last
            .map(|old| marked_spans_after(old, &self.markers, change.to.ch, is_insert))
            .unwrap_or_default();

        let same_line = change.text.len() == 1;
        let offset = change.text.last().map_or(0, |t| char_len(t)) + if same_line { start_ch } else { 0 };
        for span in first.iter_mut().filter(|span| span.to.is_none()) {
            match span_for(&last, span.marker) {
                None => span.to = Some(start_ch),
                Some(found) if same_line => span.to = found.to.map(|to| to + offset),
                Some(_) => {}
            }
        }
        let mut moved = Vec::new();
        for span in last.iter_mut() {
            if let Some(to) = span.to {
                span.to = Some(to + offset);
            }
            match span.from {
                None => {
                    if span_for(&first, span.marker).is_none() {
                        span.from = Some(offset);
                        if same_line {
                            moved.push(*span);
                        }
                    }
                }
                Some(from) => {
                    span.from = Some(from + offset);
                    if same_line {
                        moved.push(*span);
                    }
                }
            }
        }
        first.extend(moved);
        clear_empty_spans(&mut first, &self.markers);
        clear_empty_spans(&mut last, &self.markers);

        let mut out = Vec::with_capacity(change.text.len());
        if same_line {
            out.push(first);
            return Some(out);
        }
        let gap = change.text.len() - 2;
        let gap_spans: Vec<MarkedSpan> = first
            .iter()
            .filter(|span| span.to.is_none())
            .map(|span| MarkedSpan::new(span.marker, None, None))
            .collect();
        out.push(first);
        out.extend(std::iter::repeat_n(gap_spans, gap));
        out.push(last);
        Some(out)
    }

    /// Split `[from, to)` into the parts not covered by read-only markers. `None` when no
    /// read-only marker touches the range.
    pub(crate) fn remove_read_only_ranges(&self, from: Pos, to: Pos) -> Option<Vec<(Pos, Pos)>> {
        let mut read_only: Vec<MarkerId> = Vec::new();
        for (_, _, line) in self.tree.iter_range(from.line, to.line + 1) {
            for span in &line.marked_spans {
                let is_read_only = self
                    .markers
                    .get(&span.marker)
                    .is_some_and(TextMarker::is_read_only);
                if is_read_only && !read_only.contains(&span.marker) {
                    read_only.push(span.marker);
                }
            }
        }
        if read_only.is_empty() {
            return None;
        }

        let mut parts = vec![(from, to)];
        for id in read_only {
            let (Some(marker), Some(range)) = (self.markers.get(&id), self.find_marker(id)) else {
                continue;
            };
            let mut j = 0;
            while j < parts.len() {
                let (p_from, p_to) = parts[j];
                if p_to < range.from || p_from > range.to {
                    j += 1;
                    continue;
                }
                let mut kept = Vec::with_capacity(2);
                let dfrom = p_from.cmp(&range.from);
                let dto = p_to.cmp(&range.to);
                if dfrom == Ordering::Less || (!marker.inclusive_left() && dfrom == Ordering::Equal) {
                    kept.push((p_from, range.from));
                }
                if dto == Ordering::Greater || (!marker.inclusive_right() && dto == Ordering::Equal) {
                    kept.push((range.to, p_to));
                }
                let added = kept.len();
                parts.splice(j..=j, kept);
                j += added;
            }
        }
        Some(parts)
    }

    /// Line and position where a marker starts or ends.
    pub(crate) fn marker_edge(&self, id: MarkerId, side: Side) -> Option<(LineHandle, Pos)> {
        let marker = self.markers.get(&id)?;
        marker.lines.iter().find_map(|&handle| {
            let line = self.tree.line(handle)?;
            let span = span_for(&line.marked_spans, id)?;
            let ch = match side {
                Side::Start => span.from?,
                Side::End => span.to?,
            };
            Some((handle, Pos::new(self.tree.line_number(handle)?, ch)))
        })
    }

    /// Current range of a marker, `None` when it is not attached to any line.
    pub fn find_marker(&self, id: MarkerId) -> Option<MarkerRange> {
        let (_, from) = self.marker_edge(id, Side::Start)?;
        let (_, to) = self.marker_edge(id, Side::End)?;
        Some(MarkerRange { from, to })
    }

    /// Markers whose range contains `pos` (boundaries included).
    pub fn find_marks_at(&self, pos: Pos) -> Vec<MarkerId> {
        let pos = self.clip_pos(pos);
        let Ok(line) = self.tree.get_line(pos.line) else {
            return Vec::new();
        };
        line.marked_spans
            .iter()
            .filter(|span| {
                span.from.is_none_or(|from| from <= pos.ch) && span.to.is_none_or(|to| to >= pos.ch)
            })
            .map(|span| span.marker)
            .collect()
    }

    /// Markers overlapping `[from, to)` that pass `filter`.
    pub fn find_marks(
        &self,
        from: Pos,
        to: Pos,
        mut filter: impl FnMut(&TextMarker) -> bool,
    ) -> Vec<MarkerId> {
        let (from, to) = (self.clip_pos(from), self.clip_pos(to));
        let mut found = Vec::new();
        for (n, _, line) in self.tree.iter_range(from.line, to.line + 1) {
            for span in &line.marked_spans {
                let before = span.to.is_some_and(|t| n == from.line && from.ch >= t);
                let continued = span.from.is_none() && n != from.line;
                let after = span.from.is_some_and(|f| n == to.line && f >= to.ch);
                if before || continued || after {
                    continue;
                }
                if self.markers.get(&span.marker).is_some_and(&mut filter) {
                    found.push(span.marker);
                }
            }
        }
        found
    }

    /// Every attached marker, in document order of its start.
    pub fn get_all_marks(&self) -> Vec<MarkerId> {
        self.tree
            .iter_range(self.first_line(), self.first_line() + self.line_count())
            .flat_map(|(_, _, line)| line.marked_spans.iter())
            .filter(|span| span.from.is_some())
            .map(|span| span.marker)
            .collect()
    }

    /// Total order on collapsed markers used to decide which one owns a shared boundary.
    /// The greater marker wins.
    pub(crate) fn compare_collapsed_markers(&self, a: &TextMarker, b: &TextMarker) -> Ordering {
        let lines = a.lines.len().cmp(&b.lines.len());
        if lines != Ordering::Equal {
            return lines;
        }
        if let (Some(ap), Some(bp)) = (self.find_marker(a.id), self.find_marker(b.id)) {
            let from = ap.from.cmp(&bp.from).then(extra_left(a).cmp(&extra_left(b)));
            if from != Ordering::Equal {
                return from.reverse();
            }
            let to = ap.to.cmp(&bp.to).then(extra_right(a).cmp(&extra_right(b)));
            if to != Ordering::Equal {
                return to;
            }
        }
        b.id.cmp(&a.id)
    }

    fn collapsed_span_at_side(&self, line: &Line, side: Side) -> Option<MarkerId> {
        let mut found: Option<&TextMarker> = None;
        for span in &line.marked_spans {
            let Some(marker) = self.markers.get(&span.marker) else {
                continue;
            };
            let open = match side {
                Side::Start => span.from.is_none(),
                Side::End => span.to.is_none(),
            };
            if marker.is_collapsed()
                && open
                && found.is_none_or(|f| self.compare_collapsed_markers(f, marker) == Ordering::Less)
            {
                found = Some(marker);
            }
        }
        found.map(TextMarker::id)
    }

    /// Winning collapsed marker that continues into this line from the previous one.
    pub fn collapsed_span_at_start(&self, handle: LineHandle) -> Option<MarkerId> {
        self.collapsed_span_at_side(self.tree.line(handle)?, Side::Start)
    }

    /// Winning collapsed marker that continues from this line into the next one.
    pub fn collapsed_span_at_end(&self, handle: LineHandle) -> Option<MarkerId> {
        self.collapsed_span_at_side(self.tree.line(handle)?, Side::End)
    }

    /// Winning collapsed marker strictly around `pos`.
    pub fn collapsed_span_around(&self, pos: Pos) -> Option<MarkerId> {
        let line = self.tree.get_line(pos.line).ok()?;
        let mut found: Option<&TextMarker> = None;
        for span in &line.marked_spans {
            let Some(marker) = self.markers.get(&span.marker) else {
                continue;
            };
            if marker.is_collapsed()
                && span.from.is_none_or(|f| f < pos.ch)
                && span.to.is_none_or(|t| t > pos.ch)
                && found.is_none_or(|f| self.compare_collapsed_markers(f, marker) == Ordering::Less)
            {
                found = Some(marker);
            }
        }
        found.map(TextMarker::id)
    }

    /// Whether a collapsed `marker` over `[from, to)` would partially overlap a collapsed
    /// marker on line `line_no`.
    pub(crate) fn conflicting_collapsed_range(
        &self,
        line_no: usize,
        from: Pos,
        to: Pos,
        marker: &TextMarker,
    ) -> bool {
        let Ok(line) = self.tree.get_line(line_no) else {
            return false;
        };
        line.marked_spans.iter().any(|span| {
            let Some(existing) = self.markers.get(&span.marker) else {
                return false;
            };
            if !existing.is_collapsed() {
                return false;
            }
            let Some(found) = self.find_marker(existing.id) else {
                return false;
            };
            let from_cmp = found
                .from
                .cmp(&from)
                .then(extra_left(existing).cmp(&extra_left(marker)));
            let to_cmp = found
                .to
                .cmp(&to)
                .then(extra_right(existing).cmp(&extra_right(marker)));
            let nested = (from_cmp.is_ge() && to_cmp.is_le()) || (from_cmp.is_le() && to_cmp.is_ge());
            if nested {
                return false;
            }
            let overlaps_start = from_cmp.is_le()
                && if existing.inclusive_right() && marker.inclusive_left() {
                    found.to >= from
                } else {
                    found.to > from
                };
            let overlaps_end = from_cmp.is_ge()
                && if existing.inclusive_left() && marker.inclusive_right() {
                    found.from <= to
                } else {
                    found.from < to
                };
            overlaps_start || overlaps_end
        })
    }

    fn follow_collapsed(&self, n: usize, side: Side) -> Option<LineHandle> {
        let mut handle = self.tree.handle_at(n).ok()?;
        for _ in 0..self.markers.len() {
            let merged = match side {
                Side::Start => self.collapsed_span_at_start(handle),
                Side::End => self.collapsed_span_at_end(handle),
            };
            let Some(next) = merged.and_then(|m| self.marker_edge(m, side)) else {
                break;
            };
            handle = next.0;
        }
        Some(handle)
    }

    /// First line of the visual line containing `handle`.
    pub fn visual_line(&self, handle: LineHandle) -> LineHandle {
        self.tree
            .line_number(handle)
            .and_then(|n| self.follow_collapsed(n, Side::Start))
            .unwrap_or(handle)
    }

    /// Last line of the visual line containing `handle`.
    pub fn visual_line_end(&self, handle: LineHandle) -> LineHandle {
        self.tree
            .line_number(handle)
            .and_then(|n| self.follow_collapsed(n, Side::End))
            .unwrap_or(handle)
    }

    /// First logical line of the visual line containing line `n`.
    pub fn visual_line_no(&self, n: usize) -> usize {
        self.follow_collapsed(n, Side::Start)
            .and_then(|h| self.tree.line_number(h))
            .unwrap_or(n)
    }

    /// Line after the end of the visual line containing the (hidden) line `n`; `n` itself
    /// when it is visible.
    pub fn visual_line_end_no(&self, n: usize) -> usize {
        if n > self.last_line() {
            return n;
        }
        match self.tree.handle_at(n) {
            Ok(handle) if self.line_is_hidden(handle) => self
                .follow_collapsed(n, Side::End)
                .and_then(|h| self.tree.line_number(h))
                .map_or(n, |end| end + 1),
            _ => n,
        }
    }

    /// Lines merged into the visual line that starts at line `n`, in order.
    pub fn visual_line_continued(&self, n: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let Ok(mut handle) = self.tree.handle_at(n) else {
            return out;
        };
        for _ in 0..self.markers.len() {
            let Some((next, _)) = self
                .collapsed_span_at_end(handle)
                .and_then(|m| self.marker_edge(m, Side::End))
            else {
                break;
            };
            handle = next;
            if let Some(no) = self.tree.line_number(handle) {
                out.push(no);
            }
        }
        out
    }

    /// Whether line `n` is fully hidden by a fold.
    pub fn is_line_hidden(&self, n: usize) -> bool {
        self.tree
            .handle_at(n)
            .is_ok_and(|handle| self.line_is_hidden(handle))
    }

    pub(crate) fn line_is_hidden(&self, handle: LineHandle) -> bool {
        let Some(line) = self.tree.line(handle) else {
            return false;
        };
        line.marked_spans.iter().any(|span| {
            let Some(marker) = self.markers.get(&span.marker) else {
                return false;
            };
            if !marker.is_collapsed() {
                return false;
            }
            if span.from.is_none() {
                return true;
            }
            !marker.has_widget()
                && span.from == Some(0)
                && marker.inclusive_left()
                && self.line_is_hidden_inner(handle, span)
        })
    }

    fn line_is_hidden_inner(&self, handle: LineHandle, span: &MarkedSpan) -> bool {
        let Some(marker) = self.markers.get(&span.marker) else {
            return false;
        };
        let Some(to) = span.to else {
            let Some((end, _)) = self.marker_edge(span.marker, Side::End) else {
                return false;
            };
            return match self.tree.line(end).and_then(|l| span_for(&l.marked_spans, span.marker)) {
                Some(end_span) if end_span.to.is_some() => self.line_is_hidden_inner(end, end_span),
                _ => false,
            };
        };
        let Some(line) = self.tree.line(handle) else {
            return false;
        };
        if marker.inclusive_right() && to == line.len_chars() {
            return true;
        }
        line.marked_spans.iter().any(|sp| {
            self.markers.get(&sp.marker).is_some_and(|m| {
                m.is_collapsed()
                    && !m.has_widget()
                    && sp.from == Some(to)
                    && (sp.to.is_none() || sp.to != span.from)
                    && (m.inclusive_left() || marker.inclusive_right())
                    && self.line_is_hidden_inner(handle, sp)
            })
        })
    }

    /// Snapshot the spans of lines `[from, to)` into a history record.
    pub(crate) fn attach_local_spans(&self, record: &mut HistoryChange, from: usize, to: usize) {
        let snapshot: Vec<Vec<MarkedSpan>> = self
            .tree
            .iter_range(from, to)
            .map(|(_, _, line)| line.marked_spans.clone())
            .collect();
        if snapshot.iter().any(|spans| !spans.is_empty()) {
            record.spans.insert(self.id, snapshot);
        }
    }

    fn old_spans(&self, record: &HistoryChange, lines: usize) -> Option<Vec<Vec<MarkedSpan>>> {
        let found = record.spans.get(&self.id)?;
        Some(
            (0..lines)
                .map(|i| {
                    found
                        .get(i)
                        .map(|spans| {
                            spans
                                .iter()
                                .filter(|s| self.markers.contains_key(&s.marker))
                                .copied()
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect(),
        )
    }

    /// Spans to apply when replaying `change` from history: the recorded snapshot (minus
    /// cleared markers) completed with spans stretched over the change.
    pub(crate) fn merge_old_spans(
        &self,
        change: &Change,
        record: &HistoryChange,
    ) -> Option<Vec<Vec<MarkedSpan>>> {
        let old = self.old_spans(record, change.text.len());
        let stretched = self.stretch_spans_over_change(change);
        match (old, stretched) {
            (None, stretched) => stretched,
            (old, None) => old,
            (Some(mut old), Some(stretched)) => {
                for (cur, stretch) in old.iter_mut().zip(stretched) {
                    if cur.is_empty() {
                        *cur = stretch;
                    } else {
                        for span in stretch {
                            if span_for(cur, span.marker).is_none() {
                                cur.push(span);
                            }
                        }
                    }
                }
                Some(old)
            }
        }
    }

    /// Step one character from `pos` in direction `dir`, crossing line boundaries.
    pub(crate) fn move_pos(&self, pos: Pos, dir: i8) -> Option<Pos> {
        if dir < 0 && pos.ch == 0 {
            (pos.line > self.first_line()).then(|| self.clip_pos(Pos::new(pos.line - 1, usize::MAX)))
        } else if dir > 0 && pos.ch >= self.line_len(pos.line) {
            (pos.line < self.last_line()).then(|| Pos::new(pos.line + 1, 0))
        } else if dir < 0 {
            Some(Pos::new(pos.line, pos.ch - 1))
        } else {
            Some(Pos::new(pos.line, pos.ch + 1))
        }
    }
}

impl Workspace {
    pub(crate) fn mark_text_inner(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        from: Pos,
        to: Pos,
        options: MarkOptions,
        kind: MarkerKind,
    ) -> Result<MarkerId, DocError> {
        if options.shared && !self.linked_docs(doc, false).is_empty() {
            return self.mark_text_shared(tx, doc, from, to, options, kind);
        }
        let id = self.alloc_marker_id();
        let marker = TextMarker::new(id, kind, options);
        let d = self.doc(doc)?;
        let (from, to) = (d.clip_pos(from), d.clip_pos(to));

        if from > to || (from == to && marker.options.clear_when_empty) {
            self.doc_mut(doc)?.markers.insert(id, marker);
            self.marker_owner.insert(id, doc);
            return Ok(id);
        }
        if marker.is_collapsed()
            && (d.conflicting_collapsed_range(from.line, from, to, &marker)
                || (from.line != to.line && d.conflicting_collapsed_range(to.line, from, to, &marker)))
        {
            return Err(DocError::CollapsedOverlap);
        }
        if marker.options.add_to_history {
            let text = d.get_between(from, to);
            let sel = d.sel.clone();
            let change = Change::new(from, to, text, Some(Origin::mark_text()));
            self.add_change_to_history(tx, doc, &change, sel, None)?;
        }

        let collapsed = marker.is_collapsed();
        let read_only = marker.is_read_only();
        self.marker_owner.insert(id, doc);
        let d = self.doc_mut(doc)?;
        d.markers.insert(id, marker);
        for line_no in from.line..=to.line {
            let handle = d.tree.handle_at(line_no)?;
            if collapsed && line_no != from.line {
                d.tree.update_line_height(handle, 0.0);
            }
            let span = MarkedSpan::new(
                id,
                (line_no == from.line).then_some(from.ch),
                (line_no == to.line).then_some(to.ch),
            );
            d.add_marked_span(handle, span);
        }
        if collapsed {
            for handle in d.tree.handles(from.line, to.line + 1) {
                if d.line_is_hidden(handle) {
                    d.tree.update_line_height(handle, 0.0);
                }
            }
        }
        debug!(doc = doc.get(), marker = id.get(), ?from, ?to, collapsed, "marked text");

        if read_only {
            let hist_id = d.history;
            let hist = self.history_mut(hist_id)?;
            if !hist.done.is_empty() || !hist.undone.is_empty() {
                *hist = History::new(hist.max_generation, hist.undo_depth);
            }
        }
        Ok(id)
    }

    fn mark_text_shared(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        from: Pos,
        to: Pos,
        mut options: MarkOptions,
        kind: MarkerKind,
    ) -> Result<MarkerId, DocError> {
        options.shared = false;
        let primary = self.mark_text_inner(tx, doc, from, to, options.clone(), kind)?;
        let mut members = vec![(doc, primary)];
        for (other, _) in self.linked_docs(doc, false) {
            match self.mark_text_inner(tx, other, from, to, options.clone(), kind) {
                Ok(id) => members.push((other, id)),
                Err(err) => {
                    for (_, id) in members {
                        self.discard_marker(id);
                    }
                    return Err(err);
                }
            }
        }
        self.join_shared_group(primary, &members);
        Ok(primary)
    }

    pub(crate) fn join_shared_group(&mut self, group: MarkerId, members: &[(DocId, MarkerId)]) {
        for &(doc, id) in members {
            if let Some(marker) = self.docs.get_mut(&doc).and_then(|d| d.markers.get_mut(&id)) {
                marker.shared_group = Some(group);
            }
        }
        self.shared_groups
            .entry(group)
            .or_default()
            .extend(members.iter().map(|(_, id)| *id));
    }

    /// Mirror the shared markers of `from_doc` into `to_doc` (a new linked document).
    pub(crate) fn copy_shared_markers(
        &mut self,
        tx: &mut TransactionContext,
        from_doc: DocId,
        to_doc: DocId,
    ) -> Result<(), DocError> {
        let shared: Vec<(MarkerId, MarkerRange, MarkOptions, MarkerKind)> = {
            let d = self.doc(from_doc)?;
            d.markers
                .values()
                .filter_map(|m| {
                    let group = m.shared_group?;
                    Some((group, d.find_marker(m.id)?, m.options.clone(), m.kind))
                })
                .collect()
        };
        for (group, range, options, kind) in shared {
            let target = self.doc(to_doc)?;
            let (from, to) = (target.clip_pos(range.from), target.clip_pos(range.to));
            if from == to {
                continue;
            }
            let id = self.mark_text_inner(tx, to_doc, from, to, options, kind)?;
            self.join_shared_group(group, &[(to_doc, id)]);
        }
        Ok(())
    }

    /// Detach markers of `doc` from shared groups whose primary document is no longer
    /// reachable through links.
    pub(crate) fn detach_shared_markers(&mut self, doc: DocId) -> Result<(), DocError> {
        let groups: Vec<MarkerId> = self
            .doc(doc)?
            .markers
            .values()
            .filter_map(|m| m.shared_group)
            .collect();
        for group in groups {
            let Some(members) = self.shared_groups.get(&group).cloned() else {
                continue;
            };
            let Some(primary_doc) = self
                .marker_owner
                .get(&group)
                .or_else(|| members.first().and_then(|m| self.marker_owner.get(m)))
                .copied()
            else {
                continue;
            };
            let mut connected: Vec<DocId> = vec![primary_doc];
            connected.extend(self.linked_docs(primary_doc, false).into_iter().map(|(d, _)| d));
            let mut kept = Vec::with_capacity(members.len());
            for id in members {
                match self.marker_owner.get(&id).copied() {
                    Some(owner) if connected.contains(&owner) => kept.push(id),
                    Some(owner) => {
                        if let Some(marker) = self.docs.get_mut(&owner).and_then(|d| d.markers.get_mut(&id)) {
                            marker.shared_group = None;
                        }
                    }
                    None => {}
                }
            }
            self.shared_groups.insert(group, kept);
        }
        Ok(())
    }

    /// Clear a marker and every member of its shared group.
    pub(crate) fn clear_marker_inner(
        &mut self,
        tx: &mut TransactionContext,
        id: MarkerId,
    ) -> Result<(), DocError> {
        let owner = *self
            .marker_owner
            .get(&id)
            .ok_or(DocError::UnknownMarker(id))?;
        let group = self
            .doc(owner)?
            .markers
            .get(&id)
            .and_then(|m| m.shared_group);
        match group.and_then(|g| self.shared_groups.remove(&g)) {
            Some(members) => {
                for member in members {
                    self.clear_single_marker(tx, member)?;
                }
                self.clear_single_marker(tx, id)
            }
            None => self.clear_single_marker(tx, id),
        }
    }

    fn clear_single_marker(&mut self, tx: &mut TransactionContext, id: MarkerId) -> Result<(), DocError> {
        let Some(doc) = self.marker_owner.remove(&id) else {
            return Ok(());
        };
        let d = self.doc_mut(doc)?;
        let Some(marker) = d.markers.remove(&id) else {
            return Ok(());
        };
        let (mut from_line, mut to_line) = (None, None);
        for &handle in &marker.lines {
            let number = d.tree.line_number(handle);
            let Some(line) = d.tree.line_mut(handle) else {
                continue;
            };
            if let Some(span) = span_for(&line.marked_spans, id) {
                if span.to.is_some() {
                    to_line = number;
                }
                if span.from.is_some() {
                    from_line = number;
                }
            }
            line.marked_spans.retain(|span| span.marker != id);
            if marker.is_collapsed() {
                d.reestimate_height(handle);
            }
        }
        let recheck = marker.is_atomic() && d.cant_edit;
        if recheck {
            d.cant_edit = false;
        }
        debug!(doc = doc.get(), marker = id.get(), "cleared marker");
        tx.signal_later(DocEvent::MarkerCleared {
            doc,
            marker: id,
            from_line,
            to_line,
        });
        if recheck {
            let sel = self.doc(doc)?.sel.clone();
            let sel = self.skip_atomic_in_selection(tx, doc, sel, 0, false)?;
            self.set_selection_inner(tx, doc, sel)?;
        }
        Ok(())
    }

    /// Remove a freshly created marker without notifying anyone.
    fn discard_marker(&mut self, id: MarkerId) {
        let Some(doc) = self.marker_owner.remove(&id) else {
            return;
        };
        let Some(d) = self.docs.get_mut(&doc) else {
            return;
        };
        let Some(marker) = d.markers.remove(&id) else {
            return;
        };
        for &handle in &marker.lines {
            if let Some(line) = d.tree.line_mut(handle) {
                line.marked_spans.retain(|span| span.marker != id);
            }
            d.reestimate_height(handle);
        }
    }

    /// Move `pos` out of atomic markers, preferring direction `bias`. Falls back to the
    /// document start and suspends editing when no valid position exists.
    pub(crate) fn skip_atomic(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        pos: Pos,
        old_pos: Option<Pos>,
        bias: i8,
        may_clear: bool,
    ) -> Result<Pos, DocError> {
        if let Some(found) = self.skip_atomic_checked(tx, doc, pos, old_pos, bias, may_clear)? {
            return Ok(found);
        }
        let d = self.doc_mut(doc)?;
        d.cant_edit = true;
        warn!(
            doc = doc.get(),
            ?pos,
            "no cursor position outside atomic markers; editing suspended"
        );
        Ok(Pos::new(d.first_line(), 0))
    }

    /// Like [`skip_atomic`](Self::skip_atomic) but reports a dead end as `None`.
    pub(crate) fn skip_atomic_checked(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        pos: Pos,
        old_pos: Option<Pos>,
        bias: i8,
        may_clear: bool,
    ) -> Result<Option<Pos>, DocError> {
        let dir = if bias == 0 { 1 } else { bias.signum() };
        let attempts = if may_clear {
            vec![(dir, true), (-dir, true)]
        } else {
            vec![(dir, false), (dir, true), (-dir, false), (-dir, true)]
        };
        for (dir, clear) in attempts {
            if let Some(found) = self.skip_atomic_inner(tx, doc, pos, old_pos, dir, clear)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn skip_atomic_inner(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        pos: Pos,
        old_pos: Option<Pos>,
        dir: i8,
        may_clear: bool,
    ) -> Result<Option<Pos>, DocError> {
        'scan: loop {
            let d = self.doc(doc)?;
            let Ok(line) = d.tree.get_line(pos.line) else {
                return Ok(Some(pos));
            };
            for span in &line.marked_spans {
                let Some(marker) = d.markers.get(&span.marker) else {
                    continue;
                };
                let prevent_left = marker.prevents_cursor_left();
                let prevent_right = marker.prevents_cursor_right();
                let inside = span
                    .from
                    .is_none_or(|f| if prevent_left { f <= pos.ch } else { f < pos.ch })
                    && span
                        .to
                        .is_none_or(|t| if prevent_right { t >= pos.ch } else { t > pos.ch });
                if !inside {
                    continue;
                }
                let id = marker.id;
                if may_clear && marker.options.clear_on_enter {
                    self.clear_marker_inner(tx, id)?;
                    continue 'scan;
                }
                if !marker.is_atomic() {
                    continue;
                }

                if let Some(old) = old_pos {
                    let near_side = if dir < 0 { Side::End } else { Side::Start };
                    let mut near = d.marker_edge(id, near_side).map(|(_, p)| p);
                    if (dir < 0 && prevent_right) || (dir > 0 && prevent_left) {
                        near = near.and_then(|n| d.move_pos(n, -dir));
                    }
                    if let Some(near) = near {
                        let diff = near.cmp(&old);
                        let moves_on = if dir < 0 { diff.is_lt() } else { diff.is_gt() };
                        if near.line == pos.line && moves_on {
                            return self.skip_atomic_inner(tx, doc, near, Some(pos), dir, may_clear);
                        }
                    }
                }

                let far_side = if dir < 0 { Side::Start } else { Side::End };
                let mut far = d.marker_edge(id, far_side).map(|(_, p)| p);
                if (dir < 0 && prevent_left) || (dir > 0 && prevent_right) {
                    far = far.and_then(|f| d.move_pos(f, dir));
                }
                return match far {
                    Some(far) => self.skip_atomic_inner(tx, doc, far, Some(pos), dir, may_clear),
                    None => Ok(None),
                };
            }
            return Ok(Some(pos));
        }
    }

    /// Move every endpoint of `sel` out of atomic markers. Endpoints are compared with the
    /// current selection to know which way the cursor was travelling.
    pub(crate) fn skip_atomic_in_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        sel: Selection,
        bias: i8,
        may_clear: bool,
    ) -> Result<Selection, DocError> {
        let (old, may_touch) = {
            let d = self.doc(doc)?;
            (d.sel.clone(), d.options.selections_may_touch)
        };
        let mut out: Option<Vec<SelectionRange>> = None;
        for (i, range) in sel.ranges().iter().enumerate() {
            let old_range = (sel.len() == old.len()).then(|| old.ranges()[i]);
            let anchor = self.skip_atomic(tx, doc, range.anchor, old_range.map(|r| r.anchor), bias, may_clear)?;
            let head = if range.head == range.anchor {
                anchor
            } else {
                self.skip_atomic(tx, doc, range.head, old_range.map(|r| r.head), bias, may_clear)?
            };
            if out.is_some() || anchor != range.anchor || head != range.head {
                out.get_or_insert_with(|| sel.ranges()[..i].to_vec())
                    .push(SelectionRange::new(anchor, head));
            }
        }
        Ok(match out {
            Some(ranges) => normalize_selection(ranges, sel.primary_index(), may_touch),
            None => sel,
        })
    }
}
