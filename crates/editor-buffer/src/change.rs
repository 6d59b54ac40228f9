//! Text changes and the change engine.
//!
//! Every edit, whether typed, pasted, replayed from history or mirrored from a linked
//! document, becomes a [`Change`] and flows through the same pipeline:
//!
//! 1. `before_change` filters may cancel or rewrite it;
//! 2. read-only markers split it into the editable parts;
//! 3. the change is recorded in history, with marker snapshots for undo;
//! 4. it is applied to the document and then to every linked document.

use crate::document::Document;
use crate::error::DocError;
use crate::history::{ChangeGroup, HistoryChange, HistoryEvent, Origin, Replay, push_selection};
use crate::marker::MarkedSpan;
use crate::operation::{DocEvent, TransactionContext};
use crate::position::{Pos, offset_line};
use crate::selection::{Selection, SelectionOptions, compute_sel_after_change};
use crate::text::{char_len, slice_from, slice_to};
use crate::workspace::{DocId, HistoryId, Workspace};
use serde::Serialize;
use tracing::debug;

/// Replace the text between `from` and `to` by `text` (one entry per line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Start of the replaced range.
    pub from: Pos,
    /// End of the replaced range.
    pub to: Pos,
    /// Inserted lines. Never empty; `[""]` is a pure deletion.
    pub text: Vec<String>,
    /// Where the change came from.
    pub origin: Option<Origin>,
    pub(crate) full: bool,
}

impl Change {
    /// Create a change. An empty `text` is treated as `[""]`.
    pub fn new(from: Pos, to: Pos, text: Vec<String>, origin: Option<Origin>) -> Self {
        let text = if text.is_empty() {
            vec![String::new()]
        } else {
            text
        };
        Self {
            from,
            to,
            text,
            origin,
            full: false,
        }
    }

    /// Whether the change replaces the whole document.
    pub fn is_full(&self) -> bool {
        self.full
    }
}

/// Position right after the inserted text of `change`.
pub fn change_end(change: &Change) -> Pos {
    let last = change.text.last().map_or(0, |t| char_len(t));
    match change.text.len() {
        0 | 1 => Pos::new(change.from.line, change.from.ch + last),
        n => Pos::new(change.from.line + n - 1, last),
    }
}

/// A pending change offered to `before_change` filters.
///
/// Filters may cancel the change, or (unless it is a history replay) rewrite its range,
/// text or origin. Rewritten positions are clipped to the document.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    from: Pos,
    to: Pos,
    text: Vec<String>,
    origin: Option<Origin>,
    can_update: bool,
    canceled: bool,
    updated: bool,
}

impl ChangeRequest {
    fn new(change: &Change, can_update: bool) -> Self {
        Self {
            from: change.from,
            to: change.to,
            text: change.text.clone(),
            origin: change.origin.clone(),
            can_update,
            canceled: false,
            updated: false,
        }
    }

    /// Start of the replaced range.
    pub fn from(&self) -> Pos {
        self.from
    }

    /// End of the replaced range.
    pub fn to(&self) -> Pos {
        self.to
    }

    /// Inserted lines.
    pub fn text(&self) -> &[String] {
        &self.text
    }

    /// Origin of the change.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Drop the change.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Whether a filter canceled the change.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Whether [`update`](Self::update) is allowed. History replays can only be canceled.
    pub fn can_update(&self) -> bool {
        self.can_update
    }

    /// Rewrite parts of the change. Returns `false` (and changes nothing) when the change
    /// cannot be updated.
    pub fn update(
        &mut self,
        from: Option<Pos>,
        to: Option<Pos>,
        text: Option<Vec<String>>,
        origin: Option<Origin>,
    ) -> bool {
        if !self.can_update {
            return false;
        }
        if let Some(from) = from {
            self.from = from;
        }
        if let Some(to) = to {
            self.to = to;
        }
        if let Some(text) = text {
            self.text = if text.is_empty() {
                vec![String::new()]
            } else {
                text
            };
        }
        if let Some(origin) = origin {
            self.origin = Some(origin);
        }
        self.updated = true;
        true
    }
}

/// A change as applied to one document, delivered with `change`/`changes` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    /// Start of the replaced range.
    pub from: Pos,
    /// End of the replaced range (before the change).
    pub to: Pos,
    /// Inserted lines.
    pub text: Vec<String>,
    /// Lines that were replaced.
    pub removed: Vec<String>,
    /// Origin of the change.
    pub origin: Option<Origin>,
}

impl Workspace {
    /// Run `before_change` filters. `None` means the change was canceled.
    pub(crate) fn filter_change(
        &mut self,
        doc: DocId,
        change: Change,
        can_update: bool,
    ) -> Result<Option<Change>, DocError> {
        let Some(filters) = self.change_filters.get_mut(&doc).filter(|f| !f.is_empty()) else {
            return Ok(Some(change));
        };
        let mut request = ChangeRequest::new(&change, can_update);
        for filter in filters.iter_mut() {
            filter(&mut request);
        }
        if request.canceled {
            debug!(doc = doc.get(), "change canceled by filter");
            return Ok(None);
        }
        if !request.updated {
            return Ok(Some(change));
        }
        let d = self.doc(doc)?;
        let from = d.clip_pos(request.from);
        let to = d.clip_pos(request.to);
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        Ok(Some(Change {
            from,
            to,
            text: request.text,
            origin: request.origin,
            full: change.full,
        }))
    }

    /// Apply a change coming from the public API.
    pub(crate) fn make_change(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        change: Change,
        ignore_read_only: bool,
    ) -> Result<(), DocError> {
        {
            let d = self.doc(doc)?;
            if d.options.read_only || (d.cant_edit && !change.full) {
                debug!(doc = doc.get(), "edit ignored: document is not editable");
                return Ok(());
            }
        }
        let Some(change) = self.filter_change(doc, change, true)? else {
            return Ok(());
        };
        let parts = if ignore_read_only {
            None
        } else {
            self.doc(doc)?
                .remove_read_only_ranges(change.from, change.to)
        };
        match parts {
            None => self.make_change_inner(tx, doc, change),
            Some(parts) => {
                if parts.is_empty() {
                    debug!(doc = doc.get(), "edit swallowed by read-only marker");
                }
                for (i, (from, to)) in parts.into_iter().enumerate().rev() {
                    let text = if i == 0 {
                        change.text.clone()
                    } else {
                        vec![String::new()]
                    };
                    let part = Change::new(from, to, text, change.origin.clone());
                    self.make_change_inner(tx, doc, part)?;
                }
                Ok(())
            }
        }
    }

    fn make_change_inner(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        change: Change,
    ) -> Result<(), DocError> {
        if change.text.len() == 1 && change.text[0].is_empty() && change.from == change.to {
            return Ok(());
        }
        let sel_after = {
            let d = self.doc(doc)?;
            compute_sel_after_change(&d.sel, &change, d.options.selections_may_touch)
        };
        self.add_change_to_history(tx, doc, &change, sel_after.clone(), tx.op_id())?;
        let spans = self.doc(doc)?.stretch_spans_over_change(&change);
        self.make_change_single_doc(tx, doc, change.clone(), Some(sel_after), spans)?;

        let mut rebased: Vec<HistoryId> = Vec::new();
        for (other, shared) in self.linked_docs(doc, false) {
            if !shared {
                self.rebase_once(other, &change, &mut rebased)?;
            }
            let spans = self.doc(other)?.stretch_spans_over_change(&change);
            self.make_change_single_doc(tx, other, change.clone(), None, spans)?;
        }
        Ok(())
    }

    fn rebase_once(
        &mut self,
        doc: DocId,
        change: &Change,
        rebased: &mut Vec<HistoryId>,
    ) -> Result<(), DocError> {
        let d = self.doc(doc)?;
        let (hist_id, may_touch) = (d.history, d.options.selections_may_touch);
        if !rebased.contains(&hist_id) {
            self.history_mut(hist_id)?.rebase(change, may_touch);
            rebased.push(hist_id);
        }
        Ok(())
    }

    /// Record `change` in the history of `doc`.
    pub(crate) fn add_change_to_history(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        change: &Change,
        sel_after: Selection,
        op: Option<u64>,
    ) -> Result<(), DocError> {
        let record = self.history_change_from_change(doc, change)?;
        let d = self.doc(doc)?;
        let hist_id = d.history;
        let sel_before = d.sel.clone();
        let delay = d.options.history_event_delay();
        let depth = d.options.undo_depth;
        let hist = self.history_mut(hist_id)?;
        hist.undo_depth = depth;
        if hist.add_change(change, record, &sel_before, sel_after, op, delay) {
            tx.signal_later(DocEvent::HistoryAdded { doc });
        }
        Ok(())
    }

    /// Build the history record undoing `change`, with marker snapshots of the lines it
    /// touches in `doc` and in every document sharing its history.
    pub(crate) fn history_change_from_change(
        &self,
        doc: DocId,
        change: &Change,
    ) -> Result<HistoryChange, DocError> {
        let d = self.doc(doc)?;
        let mut record = HistoryChange::new(
            change.from,
            change_end(change),
            d.get_between(change.from, change.to),
        );
        let (from, to) = (change.from.line, change.to.line + 1);
        d.attach_local_spans(&mut record, from, to);
        for (other, _) in self.linked_docs(doc, true) {
            self.doc(other)?.attach_local_spans(&mut record, from, to);
        }
        Ok(record)
    }

    /// Apply a change to a single document, clipping it to the document's line range.
    pub(crate) fn make_change_single_doc(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        change: Change,
        sel_after: Option<Selection>,
        spans: Option<Vec<Vec<MarkedSpan>>>,
    ) -> Result<(), DocError> {
        let d = self.doc_mut(doc)?;
        let added_lines = change.text.len() as isize - 1;
        if change.to.line < d.first_line() {
            d.shift(added_lines - (change.to.line - change.from.line) as isize);
            return Ok(());
        }
        if change.from.line > d.last_line() {
            return Ok(());
        }

        let mut change = change;
        let mut spans = spans;
        if change.from.line < d.first_line() {
            let shift = added_lines - (d.first_line() - change.from.line) as isize;
            d.shift(shift);
            let text = change.text.last().cloned().unwrap_or_default();
            change = Change {
                from: Pos::new(d.first_line(), 0),
                to: Pos::new(offset_line(change.to.line, shift), change.to.ch),
                text: vec![text],
                origin: change.origin,
                full: false,
            };
            spans = spans.and_then(|mut s| s.pop()).map(|last| vec![last]);
        }
        let last = d.last_line();
        if change.to.line > last {
            let text = change.text.first().cloned().unwrap_or_default();
            change = Change {
                from: change.from,
                to: Pos::new(last, d.line_len(last)),
                text: vec![text],
                origin: change.origin,
                full: false,
            };
            spans = spans.and_then(|s| s.into_iter().next()).map(|first| vec![first]);
        }

        let removed = d.get_between(change.from, change.to);
        let sel_after = sel_after.unwrap_or_else(|| {
            compute_sel_after_change(&d.sel, &change, d.options.selections_may_touch)
        });
        d.update_doc(&change, spans)?;
        tx.record_change(
            doc,
            AppliedChange {
                from: change.from,
                to: change.to,
                text: change.text.clone(),
                removed,
                origin: change.origin.clone(),
            },
            change.from.line,
        );

        self.set_selection_no_undo(tx, doc, sel_after, &SelectionOptions::no_scroll())?;
        if self.doc(doc)?.cant_edit {
            let first = self.doc(doc)?.first_line();
            if self
                .skip_atomic_checked(tx, doc, Pos::new(first, 0), None, 1, false)?
                .is_some()
            {
                self.doc_mut(doc)?.cant_edit = false;
            }
        }
        Ok(())
    }

    /// Undo or redo the most recent change group (or, with `allow_selection_only`, the
    /// most recent selection change).
    pub(crate) fn make_change_from_history(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        replay: Replay,
        allow_selection_only: bool,
    ) -> Result<(), DocError> {
        let d = self.doc(doc)?;
        let suppress = d.options.read_only || d.cant_edit;
        if suppress && !allow_selection_only {
            return Ok(());
        }
        let hist_id = d.history;
        let current = d.sel.clone();

        let hist = self.history_mut(hist_id)?;
        let usable = hist.stacks_mut(replay).0.iter().any(|event| match event {
            HistoryEvent::Selection(sel) => allow_selection_only && *sel != current,
            HistoryEvent::Changes(_) => !allow_selection_only,
        });
        if !usable {
            return Ok(());
        }
        hist.last_origin = None;
        hist.last_sel_origin = None;

        let mut sel_after = current.clone();
        let group = loop {
            let (source, dest) = hist.stacks_mut(replay);
            match source.pop() {
                Some(HistoryEvent::Selection(sel)) => {
                    push_selection(dest, sel.clone());
                    if allow_selection_only && sel != current {
                        let opts = SelectionOptions {
                            clear_redo: false,
                            ..SelectionOptions::default()
                        };
                        return self.apply_selection(tx, doc, sel, &opts);
                    }
                    sel_after = sel;
                }
                Some(HistoryEvent::Changes(group)) => {
                    if suppress {
                        source.push(HistoryEvent::Changes(group));
                        return Ok(());
                    }
                    break group;
                }
                None => return Ok(()),
            }
        };

        push_selection(hist.stacks_mut(replay).1, sel_after);
        let dest_generation = hist.generation;
        hist.generation = match group.generation {
            Some(generation) => generation,
            None => {
                hist.max_generation += 1;
                hist.max_generation
            }
        };
        debug!(
            doc = doc.get(),
            ?replay,
            changes = group.changes.len(),
            "replaying history event"
        );

        let origin = match replay {
            Replay::Undo => Origin::undo(),
            Replay::Redo => Origin::redo(),
        };
        let mut anti_changes = Vec::with_capacity(group.changes.len());
        let mut rebased: Vec<HistoryId> = Vec::new();
        for (i, recorded) in group.changes.iter().enumerate().rev() {
            let change = Change::new(
                recorded.from,
                recorded.to,
                recorded.text.clone(),
                Some(origin.clone()),
            );
            if self.filter_change(doc, change.clone(), false)?.is_none() {
                let hist = self.history_mut(hist_id)?;
                let (source, dest) = hist.stacks_mut(replay);
                source.clear();
                dest.push(HistoryEvent::Changes(ChangeGroup {
                    changes: anti_changes,
                    generation: Some(dest_generation),
                }));
                return Ok(());
            }
            anti_changes.push(self.history_change_from_change(doc, &change)?);

            let after = if i == 0 {
                match self.history_mut(hist_id)?.stacks_mut(replay).0.last() {
                    Some(HistoryEvent::Selection(sel)) => Some(sel.clone()),
                    _ => None,
                }
            } else {
                None
            };
            let spans = self.doc(doc)?.merge_old_spans(&change, recorded);
            self.make_change_single_doc(tx, doc, change.clone(), after, spans)?;
            if i == 0 {
                tx.request_scroll(doc);
            }
            for (other, shared) in self.linked_docs(doc, false) {
                if !shared {
                    self.rebase_once(other, &change, &mut rebased)?;
                }
                let spans = self.doc(other)?.merge_old_spans(&change, recorded);
                self.make_change_single_doc(tx, other, change.clone(), None, spans)?;
            }
        }

        self.history_mut(hist_id)?
            .stacks_mut(replay)
            .1
            .push(HistoryEvent::Changes(ChangeGroup {
                changes: anti_changes,
                generation: Some(dest_generation),
            }));
        Ok(())
    }
}

impl Document {
    /// Splice `change` into the line tree, attach the given per-line spans and
    /// re-estimate the heights of the touched lines.
    pub(crate) fn update_doc(
        &mut self,
        change: &Change,
        spans: Option<Vec<Vec<MarkedSpan>>>,
    ) -> Result<(), DocError> {
        let spans_for =
            |n: usize| -> Vec<MarkedSpan> { spans.as_ref().and_then(|s| s.get(n)).cloned().unwrap_or_default() };
        let text = &change.text;
        let lines_for = |range: std::ops::Range<usize>| -> Vec<(String, Vec<MarkedSpan>)> {
            range.map(|i| (text[i].clone(), spans_for(i))).collect()
        };
        let (from, to) = (change.from, change.to);
        let n = text.len();
        let last_text = text[n - 1].as_str();
        let last_spans = spans_for(n - 1);
        let nlines = to.line - from.line;

        if change.full {
            let first = self.first_line();
            let old = self.tree.len();
            self.insert_lines(first, lines_for(0..n));
            self.remove_lines(first + n, old);
            self.reestimate_heights(first, first + n);
            return Ok(());
        }

        if from.ch == 0 && to.ch == 0 && last_text.is_empty() {
            // Whole-line update: the line at `to` survives with its text intact.
            let last = self.tree.handle_at(to.line)?;
            let keep = self.line_text(last).to_string();
            self.update_line(last, keep, last_spans);
            if nlines > 0 {
                self.remove_lines(from.line, nlines);
            }
            let added = lines_for(0..n - 1);
            if !added.is_empty() {
                self.insert_lines(from.line, added);
            }
        } else if nlines == 0 {
            let first = self.tree.handle_at(from.line)?;
            let line = self.line_text(first).to_string();
            if n == 1 {
                let joined = format!(
                    "{}{}{}",
                    slice_to(&line, from.ch),
                    last_text,
                    slice_from(&line, to.ch)
                );
                self.update_line(first, joined, last_spans);
            } else {
                let mut added = lines_for(1..n - 1);
                added.push((format!("{}{}", last_text, slice_from(&line, to.ch)), last_spans));
                let head = format!("{}{}", slice_to(&line, from.ch), text[0]);
                self.update_line(first, head, spans_for(0));
                self.insert_lines(from.line + 1, added);
            }
        } else {
            let first = self.tree.handle_at(from.line)?;
            let last = self.tree.handle_at(to.line)?;
            let first_line = self.line_text(first).to_string();
            let last_line = self.line_text(last).to_string();
            if n == 1 {
                let joined = format!(
                    "{}{}{}",
                    slice_to(&first_line, from.ch),
                    text[0],
                    slice_from(&last_line, to.ch)
                );
                self.update_line(first, joined, spans_for(0));
                self.remove_lines(from.line + 1, nlines);
            } else {
                let head = format!("{}{}", slice_to(&first_line, from.ch), text[0]);
                self.update_line(first, head, spans_for(0));
                let tail = format!("{}{}", last_text, slice_from(&last_line, to.ch));
                self.update_line(last, tail, last_spans);
                if nlines > 1 {
                    self.remove_lines(from.line + 1, nlines - 1);
                }
                self.insert_lines(from.line + 1, lines_for(1..n - 1));
            }
        }
        self.reestimate_heights(from.line, from.line + n);
        Ok(())
    }
}
