//! Workspace: the arena owning documents, histories and listeners.
//!
//! Documents are addressed by [`DocId`] and histories by [`HistoryId`]. Linked documents
//! sharing a history point at the same history entry. Every mutation takes the
//! caller-owned [`TransactionContext`]; public mutators open an operation themselves, so
//! they can be called with or without an enclosing one.
//!
//! Reads go through [`Workspace::doc`], which returns the [`Document`] read API.

use crate::change::{Change, ChangeRequest};
use crate::config::{DocOptions, LinkOptions};
use crate::document::{DocLink, Document};
use crate::error::DocError;
use crate::history::{
    History, HistoryData, HistoryEvent, HistorySize, Origin, Replay, copy_history_array,
    push_selection,
};
use crate::line::{Line, LineWidget, Payload, WidgetId};
use crate::marker::{BookmarkOptions, MarkOptions, MarkerId, MarkerKind, MarkerRange};
use crate::operation::{DocEventCallback, DocEvent, TransactionContext};
use crate::position::Pos;
use crate::selection::{
    Collapse, Selection, SelectionOptions, SelectionRange, SelectionRequest, compute_replaced_sel,
    extend_range, normalize_selection,
};
use crate::text::split_lines;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Opaque identifier for a document in a [`Workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub(crate) u64);

impl DocId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Opaque identifier for a history shared by one or more documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryId(pub(crate) u64);

impl HistoryId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Filter run before a change is applied. It may cancel or rewrite the change.
pub type ChangeFilter = Box<dyn FnMut(&mut ChangeRequest) + Send>;

/// Filter run before a selection is committed. It may rewrite the ranges.
pub type SelectionFilter = Box<dyn FnMut(&mut SelectionRequest) + Send>;

/// A collection of documents, their histories and listeners.
#[derive(Default)]
pub struct Workspace {
    next_doc_id: u64,
    next_history_id: u64,
    next_marker_id: u64,
    next_widget_id: u64,
    pub(crate) docs: BTreeMap<DocId, Document>,
    pub(crate) histories: HashMap<HistoryId, History>,
    pub(crate) marker_owner: HashMap<MarkerId, DocId>,
    pub(crate) shared_groups: HashMap<MarkerId, Vec<MarkerId>>,
    pub(crate) listeners: HashMap<DocId, Vec<DocEventCallback>>,
    pub(crate) change_filters: HashMap<DocId, Vec<ChangeFilter>>,
    pub(crate) selection_filters: HashMap<DocId, Vec<SelectionFilter>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("doc_count", &self.docs.len())
            .field("history_count", &self.histories.len())
            .field("marker_count", &self.marker_owner.len())
            .finish()
    }
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns `true` if there are no open documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Ids of the open documents.
    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.keys().copied()
    }

    /// Open a document whose first line is numbered 0.
    pub fn open(&mut self, text: &str, options: DocOptions) -> DocId {
        self.open_at(text, 0, options)
    }

    /// Open a document whose first line is numbered `first_line`.
    pub fn open_at(&mut self, text: &str, first_line: usize, options: DocOptions) -> DocId {
        let lines = split_lines(text, options.separator());
        let history = self.alloc_history(History::new(1, options.undo_depth));
        let id = self.alloc_doc_id();
        let doc = Document::new(id, lines, first_line, options, history);
        if let Some(hist) = self.histories.get_mut(&history) {
            push_selection(&mut hist.done, doc.sel.clone());
        }
        debug!(doc = id.get(), lines = doc.line_count(), "opened document");
        self.docs.insert(id, doc);
        id
    }

    /// Close a document, unlinking it first.
    pub fn close_document(&mut self, doc: DocId) -> Result<(), DocError> {
        let links: Vec<DocId> = self.doc(doc)?.links.iter().map(|l| l.doc).collect();
        for other in links {
            self.unlink_doc(doc, other)?;
        }
        let closed = self.docs.remove(&doc).ok_or(DocError::UnknownDocument(doc))?;
        for id in closed.markers.keys() {
            self.marker_owner.remove(id);
        }
        for members in self.shared_groups.values_mut() {
            members.retain(|m| !closed.markers.contains_key(m));
        }
        if !self.docs.values().any(|d| d.history == closed.history) {
            self.histories.remove(&closed.history);
        }
        self.listeners.remove(&doc);
        self.change_filters.remove(&doc);
        self.selection_filters.remove(&doc);
        debug!(doc = doc.get(), "closed document");
        Ok(())
    }

    /// Read access to a document.
    pub fn doc(&self, doc: DocId) -> Result<&Document, DocError> {
        self.docs.get(&doc).ok_or(DocError::UnknownDocument(doc))
    }

    pub(crate) fn doc_mut(&mut self, doc: DocId) -> Result<&mut Document, DocError> {
        self.docs.get_mut(&doc).ok_or(DocError::UnknownDocument(doc))
    }

    /// The history used by a document.
    pub fn history(&self, doc: DocId) -> Result<&History, DocError> {
        let id = self.doc(doc)?.history;
        self.histories.get(&id).ok_or(DocError::UnknownHistory(id))
    }

    pub(crate) fn history_mut(&mut self, id: HistoryId) -> Result<&mut History, DocError> {
        self.histories
            .get_mut(&id)
            .ok_or(DocError::UnknownHistory(id))
    }

    fn alloc_doc_id(&mut self) -> DocId {
        let id = DocId(self.next_doc_id);
        self.next_doc_id = self.next_doc_id.saturating_add(1);
        id
    }

    fn alloc_history(&mut self, history: History) -> HistoryId {
        let id = HistoryId(self.next_history_id);
        self.next_history_id = self.next_history_id.saturating_add(1);
        self.histories.insert(id, history);
        id
    }

    pub(crate) fn alloc_marker_id(&mut self) -> MarkerId {
        let id = MarkerId(self.next_marker_id);
        self.next_marker_id = self.next_marker_id.saturating_add(1);
        id
    }

    /// Subscribe to the events of a document.
    pub fn on_event<F>(&mut self, doc: DocId, callback: F) -> Result<(), DocError>
    where
        F: FnMut(&DocEvent) + Send + 'static,
    {
        self.doc(doc)?;
        self.listeners
            .entry(doc)
            .or_default()
            .push(Box::new(callback));
        Ok(())
    }

    /// Register a `before_change` filter.
    pub fn on_before_change<F>(&mut self, doc: DocId, filter: F) -> Result<(), DocError>
    where
        F: FnMut(&mut ChangeRequest) + Send + 'static,
    {
        self.doc(doc)?;
        self.change_filters
            .entry(doc)
            .or_default()
            .push(Box::new(filter));
        Ok(())
    }

    /// Register a `before_selection_change` filter.
    pub fn on_before_selection_change<F>(&mut self, doc: DocId, filter: F) -> Result<(), DocError>
    where
        F: FnMut(&mut SelectionRequest) + Send + 'static,
    {
        self.doc(doc)?;
        self.selection_filters
            .entry(doc)
            .or_default()
            .push(Box::new(filter));
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Linked documents
    // ---------------------------------------------------------------------

    /// Documents reachable from `doc` through links, each with whether it shares `doc`'s
    /// history. With `shared_only`, the walk stops at links that do not share history.
    pub(crate) fn linked_docs(&self, doc: DocId, shared_only: bool) -> Vec<(DocId, bool)> {
        let mut out = Vec::new();
        self.propagate_links(doc, None, true, shared_only, &mut out);
        out
    }

    fn propagate_links(
        &self,
        doc: DocId,
        skip: Option<DocId>,
        shared_so_far: bool,
        shared_only: bool,
        out: &mut Vec<(DocId, bool)>,
    ) {
        let Some(d) = self.docs.get(&doc) else {
            return;
        };
        for link in &d.links {
            if Some(link.doc) == skip {
                continue;
            }
            let shared = shared_so_far && link.shared_hist;
            if shared_only && !shared {
                continue;
            }
            out.push((link.doc, shared));
            self.propagate_links(link.doc, Some(doc), shared, shared_only, out);
        }
    }

    /// Every document linked (directly or transitively) to `doc`, with whether it shares
    /// `doc`'s history.
    pub fn iter_linked_docs(&self, doc: DocId) -> Result<Vec<(DocId, bool)>, DocError> {
        self.doc(doc)?;
        Ok(self.linked_docs(doc, false))
    }

    /// Create a document linked to `doc`, covering `options.from..options.to` (clamped).
    /// Changes in either document are mirrored into the other.
    pub fn linked_doc(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        options: LinkOptions,
    ) -> Result<DocId, DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let first = d.first_line();
            let end = first + d.line_count();
            let from = options.from.filter(|&f| f > first).unwrap_or(first);
            let to = options.to.filter(|&t| t < end).unwrap_or(end);
            let lines = d.tree.get_lines(from, to.max(from));
            let doc_options = d.options.clone();
            let parent_history = d.history;

            let id = ws.alloc_doc_id();
            let history = if options.shared_hist {
                parent_history
            } else {
                ws.alloc_history(History::new(1, doc_options.undo_depth))
            };
            let copy = Document::new(id, lines, from, doc_options, history);
            if !options.shared_hist {
                push_selection(&mut ws.history_mut(history)?.done, copy.sel.clone());
            }
            ws.docs.insert(id, copy);
            ws.doc_mut(doc)?.links.push(DocLink {
                doc: id,
                shared_hist: options.shared_hist,
                is_parent: false,
            });
            ws.doc_mut(id)?.links.push(DocLink {
                doc,
                shared_hist: options.shared_hist,
                is_parent: true,
            });
            ws.copy_shared_markers(tx, doc, id)?;
            debug!(
                doc = doc.get(),
                linked = id.get(),
                from,
                to,
                shared_hist = options.shared_hist,
                "created linked document"
            );
            Ok(id)
        })
    }

    /// Break the link between `doc` and `other`. A shared history is split: `other`'s
    /// side gets a copy carrying its own marker snapshots.
    pub fn unlink_doc(&mut self, doc: DocId, other: DocId) -> Result<(), DocError> {
        let idx = self
            .doc(doc)?
            .links
            .iter()
            .position(|l| l.doc == other)
            .ok_or(DocError::NotLinked(doc, other))?;
        self.doc_mut(doc)?.links.remove(idx);
        self.doc_mut(other)?.links.retain(|l| l.doc != doc);
        self.detach_shared_markers(doc)?;
        self.detach_shared_markers(other)?;

        let history = self.doc(doc)?.history;
        if self.doc(other)?.history == history {
            let mut split_ids = vec![other];
            split_ids.extend(self.linked_docs(other, true).into_iter().map(|(d, _)| d));
            let shared = self.history_mut(history)?;
            let mut split = History::new(1, shared.undo_depth);
            split.done = copy_history_array(&mut shared.done, Some(&split_ids));
            split.undone = copy_history_array(&mut shared.undone, Some(&split_ids));
            let split_id = self.alloc_history(split);
            for id in &split_ids {
                self.doc_mut(*id)?.history = split_id;
            }
            debug!(doc = doc.get(), other = other.get(), "split shared history");
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    fn filter_selection_change(
        &mut self,
        doc: DocId,
        sel: Selection,
        origin: Option<&Origin>,
    ) -> Result<Selection, DocError> {
        let Some(filters) = self
            .selection_filters
            .get_mut(&doc)
            .filter(|f| !f.is_empty())
        else {
            return Ok(sel);
        };
        let mut request = SelectionRequest::new(&sel, origin.cloned());
        for filter in filters.iter_mut() {
            filter(&mut request);
        }
        let Some(ranges) = request.into_update() else {
            return Ok(sel);
        };
        let d = self.doc(doc)?;
        let ranges: Vec<SelectionRange> = ranges
            .into_iter()
            .map(|r| SelectionRange::new(d.clip_pos(r.anchor), d.clip_pos(r.head)))
            .collect();
        let primary = ranges.len().saturating_sub(1);
        Ok(normalize_selection(
            ranges,
            primary,
            d.options.selections_may_touch,
        ))
    }

    /// Set the selection without recording it in history.
    pub(crate) fn set_selection_no_undo(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        sel: Selection,
        opts: &SelectionOptions,
    ) -> Result<(), DocError> {
        let sel = self.filter_selection_change(doc, sel, opts.origin.as_ref())?;
        let bias = if opts.bias != 0 {
            opts.bias
        } else if sel.primary().head < self.doc(doc)?.sel.primary().head {
            -1
        } else {
            1
        };
        let sel = self.skip_atomic_in_selection(tx, doc, sel, bias, true)?;
        self.set_selection_inner(tx, doc, sel)?;
        if opts.scroll {
            tx.request_scroll(doc);
        }
        Ok(())
    }

    pub(crate) fn set_selection_inner(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        sel: Selection,
    ) -> Result<(), DocError> {
        let d = self.doc_mut(doc)?;
        if d.sel == sel {
            return Ok(());
        }
        d.sel = sel;
        tx.cursor_activity(doc);
        Ok(())
    }

    /// Set the selection and record it in history.
    pub(crate) fn apply_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        sel: Selection,
        opts: &SelectionOptions,
    ) -> Result<(), DocError> {
        self.set_selection_no_undo(tx, doc, sel, opts)?;
        let d = self.doc(doc)?;
        let (history, sel, delay) = (d.history, d.sel.clone(), d.options.history_event_delay());
        self.history_mut(history)?.add_selection(
            sel,
            tx.op_id(),
            opts.origin.as_ref(),
            opts.clear_redo,
            delay,
        );
        Ok(())
    }

    /// Set the selection, overwriting the last history entry when it is a selection.
    fn set_selection_replace_history(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        sel: Selection,
        opts: &SelectionOptions,
    ) -> Result<(), DocError> {
        let history = self.doc(doc)?.history;
        let replaced = match self.history_mut(history)?.done.last_mut() {
            Some(last @ HistoryEvent::Selection(_)) => {
                *last = HistoryEvent::Selection(sel.clone());
                true
            }
            _ => false,
        };
        if replaced {
            self.set_selection_no_undo(tx, doc, sel, opts)
        } else {
            self.apply_selection(tx, doc, sel, opts)
        }
    }

    /// Place a single caret.
    pub fn set_cursor(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        pos: Pos,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.set_selection(tx, doc, pos, None, opts)
    }

    /// Replace the selection by a single range.
    pub fn set_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        anchor: Pos,
        head: Option<Pos>,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let anchor = d.clip_pos(anchor);
            let head = d.clip_pos(head.unwrap_or(anchor));
            ws.apply_selection(tx, doc, Selection::simple(anchor, Some(head)), &opts)
        })
    }

    /// Replace the selection by `ranges`. `primary` defaults to the current primary index
    /// (clamped).
    pub fn set_selections(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        ranges: Vec<SelectionRange>,
        primary: Option<usize>,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let primary =
                primary.unwrap_or_else(|| d.sel.primary_index().min(ranges.len().saturating_sub(1)));
            let ranges = ranges
                .into_iter()
                .map(|r| SelectionRange::new(d.clip_pos(r.anchor), d.clip_pos(r.head)))
                .collect();
            let sel = Selection::new(ranges, primary, d.options.selections_may_touch)?;
            ws.apply_selection(tx, doc, sel, &opts)
        })
    }

    /// Add a range to the selection and make it primary.
    pub fn add_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        anchor: Pos,
        head: Option<Pos>,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let anchor = d.clip_pos(anchor);
            let head = d.clip_pos(head.unwrap_or(anchor));
            let mut ranges = d.sel.ranges().to_vec();
            ranges.push(SelectionRange::new(anchor, head));
            let primary = ranges.len() - 1;
            let sel = normalize_selection(ranges, primary, d.options.selections_may_touch);
            ws.apply_selection(tx, doc, sel, &opts)
        })
    }

    /// Replace range `index` of the selection.
    pub fn replace_one_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        index: usize,
        range: SelectionRange,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let mut ranges = d.sel.ranges().to_vec();
            let slot = ranges
                .get_mut(index)
                .ok_or(DocError::InvalidSelection("range index out of range"))?;
            *slot = SelectionRange::new(d.clip_pos(range.anchor), d.clip_pos(range.head));
            let sel = normalize_selection(
                ranges,
                d.sel.primary_index(),
                d.options.selections_may_touch,
            );
            ws.apply_selection(tx, doc, sel, &opts)
        })
    }

    /// Move the primary head to `head` (extending when the document is in extending mode)
    /// and drop the other ranges.
    pub fn extend_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        head: Pos,
        other: Option<Pos>,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let head = d.clip_pos(head);
            let other = other.map(|p| d.clip_pos(p));
            let range = extend_range(d.sel.primary(), head, other, d.extending);
            ws.apply_selection(tx, doc, Selection::simple(range.anchor, Some(range.head)), &opts)
        })
    }

    /// Move every head to the matching entry of `heads`.
    pub fn extend_selections(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        heads: Vec<Pos>,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            if heads.len() != d.sel.len() {
                return Err(DocError::InvalidSelection("one head per range required"));
            }
            let ranges = d
                .sel
                .ranges()
                .iter()
                .zip(heads)
                .map(|(range, head)| extend_range(*range, d.clip_pos(head), None, d.extending))
                .collect();
            let sel = normalize_selection(
                ranges,
                d.sel.primary_index(),
                d.options.selections_may_touch,
            );
            ws.apply_selection(tx, doc, sel, &opts)
        })
    }

    /// Move every head to `f(range)`.
    pub fn extend_selections_by(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        f: impl FnMut(&SelectionRange) -> Pos,
        opts: SelectionOptions,
    ) -> Result<(), DocError> {
        let heads = self.doc(doc)?.sel.ranges().iter().map(f).collect();
        self.extend_selections(tx, doc, heads, opts)
    }

    /// Turn extending mode on or off.
    pub fn set_extending(&mut self, doc: DocId, extending: bool) -> Result<(), DocError> {
        self.doc_mut(doc)?.extending = extending;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------------

    /// Replace `from..to` (`to` defaults to `from`) by `text`.
    pub fn replace_range(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        text: &str,
        from: Pos,
        to: Option<Pos>,
        origin: Option<Origin>,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let from = d.clip_pos(from);
            let to = to.map_or(from, |to| d.clip_pos(to));
            let (from, to) = if to < from { (to, from) } else { (from, to) };
            let change = Change::new(from, to, d.split_lines(text), origin);
            ws.make_change(tx, doc, change, false)
        })
    }

    /// Replace every selected range by `text`. `origin` defaults to typed input.
    pub fn replace_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        text: &str,
        collapse: Collapse,
        origin: Option<Origin>,
    ) -> Result<(), DocError> {
        let texts = vec![text; self.doc(doc)?.sel.len()];
        let origin = origin.unwrap_or_else(Origin::input);
        self.replace_selections(tx, doc, &texts, collapse, Some(origin))
    }

    /// Replace each selected range by the matching entry of `texts`.
    pub fn replace_selections<S: AsRef<str>>(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        texts: &[S],
        collapse: Collapse,
        origin: Option<Origin>,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            if texts.len() != d.sel.len() {
                return Err(DocError::InvalidSelection(
                    "one replacement per range required",
                ));
            }
            let changes: Vec<Change> = d
                .sel
                .ranges()
                .iter()
                .zip(texts)
                .map(|(range, text)| {
                    Change::new(
                        range.from(),
                        range.to(),
                        d.split_lines(text.as_ref()),
                        origin.clone(),
                    )
                })
                .collect();
            let new_sel = (collapse != Collapse::End)
                .then(|| compute_replaced_sel(&d.sel, &changes, collapse, d.first_line()));
            for change in changes.into_iter().rev() {
                ws.make_change(tx, doc, change, false)?;
            }
            match new_sel {
                Some(sel) => {
                    ws.set_selection_replace_history(tx, doc, sel, &SelectionOptions::default())
                }
                None => {
                    tx.request_scroll(doc);
                    Ok(())
                }
            }
        })
    }

    /// Replace the whole content. Read-only markers do not block this; the selection
    /// moves to the start of the document.
    pub fn set_value(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        text: &str,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let top = Pos::new(d.first_line(), 0);
            let last = d.last_line();
            let mut change = Change::new(
                top,
                Pos::new(last, d.line_len(last)),
                d.split_lines(text),
                Some(Origin::set_value()),
            );
            change.full = true;
            ws.make_change(tx, doc, change, true)?;
            ws.apply_selection(tx, doc, Selection::cursor(top), &SelectionOptions::no_scroll())
        })
    }

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    /// Undo the last change event.
    pub fn undo(&mut self, tx: &mut TransactionContext, doc: DocId) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            ws.make_change_from_history(tx, doc, Replay::Undo, false)
        })
    }

    /// Redo the last undone change event.
    pub fn redo(&mut self, tx: &mut TransactionContext, doc: DocId) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            ws.make_change_from_history(tx, doc, Replay::Redo, false)
        })
    }

    /// Step back to the previous selection (or change, when no selection differs).
    pub fn undo_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            ws.make_change_from_history(tx, doc, Replay::Undo, true)
        })
    }

    /// Step forward to the next selection.
    pub fn redo_selection(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            ws.make_change_from_history(tx, doc, Replay::Redo, true)
        })
    }

    /// Number of undoable and redoable change events.
    pub fn history_size(&self, doc: DocId) -> Result<HistorySize, DocError> {
        Ok(self.history(doc)?.size())
    }

    /// Drop both stacks. Documents sharing the history see the cleared history too.
    /// Generations keep counting up.
    pub fn clear_history(&mut self, doc: DocId) -> Result<(), DocError> {
        let id = self.doc(doc)?.history;
        let hist = self.history_mut(id)?;
        *hist = History::new(hist.max_generation, hist.undo_depth);
        debug!(doc = doc.get(), "cleared history");
        Ok(())
    }

    /// Current generation. With `force_split`, the next change starts a new event.
    pub fn change_generation(&mut self, doc: DocId, force_split: bool) -> Result<u64, DocError> {
        let id = self.doc(doc)?.history;
        let hist = self.history_mut(id)?;
        if force_split {
            hist.split_event();
        }
        Ok(hist.generation)
    }

    /// Remember the current generation as the clean state.
    pub fn mark_clean(&mut self, doc: DocId) -> Result<(), DocError> {
        let generation = self.change_generation(doc, true)?;
        self.doc_mut(doc)?.clean_generation = generation;
        Ok(())
    }

    /// Whether the history is at generation `generation` (default: the clean one).
    pub fn is_clean(&self, doc: DocId, generation: Option<u64>) -> Result<bool, DocError> {
        let target = generation.unwrap_or(self.doc(doc)?.clean_generation);
        Ok(self.history(doc)?.generation == target)
    }

    /// Plain-data copy of the history.
    pub fn get_history(&self, doc: DocId) -> Result<HistoryData, DocError> {
        let hist = self.history(doc)?;
        Ok(HistoryData::from_events(&hist.done, &hist.undone))
    }

    /// Replace the history with `data`. Marker snapshots are not part of the data.
    pub fn set_history(&mut self, doc: DocId, data: HistoryData) -> Result<(), DocError> {
        let d = self.doc(doc)?;
        let (id, may_touch) = (d.history, d.options.selections_may_touch);
        let (done, undone) = data.into_events(may_touch)?;
        let hist = self.history_mut(id)?;
        let mut fresh = History::new(hist.max_generation, hist.undo_depth);
        fresh.done = done;
        fresh.undone = undone;
        *hist = fresh;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Markers
    // ---------------------------------------------------------------------

    /// Mark `from..to`.
    pub fn mark_text(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        from: Pos,
        to: Pos,
        options: MarkOptions,
    ) -> Result<MarkerId, DocError> {
        self.operation(tx, |ws, tx| {
            ws.mark_text_inner(tx, doc, from, to, options, MarkerKind::Range)
        })
    }

    /// Put a zero-width bookmark at `pos`.
    pub fn set_bookmark(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        pos: Pos,
        options: BookmarkOptions,
    ) -> Result<MarkerId, DocError> {
        let options = MarkOptions {
            replaced_with: options.widget,
            insert_left: options.insert_left,
            clear_when_empty: false,
            shared: options.shared,
            ..MarkOptions::default()
        };
        self.operation(tx, |ws, tx| {
            let pos = ws.doc(doc)?.clip_pos(pos);
            ws.mark_text_inner(tx, doc, pos, pos, options, MarkerKind::Bookmark)
        })
    }

    /// Remove a marker (and every marker sharing it through linked documents).
    pub fn clear_marker(&mut self, tx: &mut TransactionContext, id: MarkerId) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| ws.clear_marker_inner(tx, id))
    }

    /// Document holding a marker.
    pub fn marker_doc(&self, id: MarkerId) -> Option<DocId> {
        self.marker_owner.get(&id).copied()
    }

    /// Current range of a marker, `None` when it is no longer attached to any line.
    pub fn find_marker(&self, id: MarkerId) -> Result<Option<MarkerRange>, DocError> {
        let doc = self.marker_doc(id).ok_or(DocError::UnknownMarker(id))?;
        Ok(self.doc(doc)?.find_marker(id))
    }

    /// Re-estimate the heights of the lines a marker covers, after its widget changed.
    pub fn marker_changed(&mut self, id: MarkerId) -> Result<(), DocError> {
        let doc = self.marker_doc(id).ok_or(DocError::UnknownMarker(id))?;
        let d = self.doc_mut(doc)?;
        let lines = d.markers.get(&id).map(|m| m.lines.clone()).unwrap_or_default();
        for handle in lines {
            d.reestimate_height(handle);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lines, widgets and the highlighting frontier
    // ---------------------------------------------------------------------

    /// Mutable access to a line, for the highlighting collaborator's styles and state.
    pub fn line_mut(&mut self, doc: DocId, n: usize) -> Result<&mut Line, DocError> {
        let d = self.doc_mut(doc)?;
        let handle = d.tree.handle_at(n)?;
        let missing = DocError::LineOutOfRange {
            line: n,
            first: d.tree.first(),
            size: d.tree.len(),
        };
        d.tree.line_mut(handle).ok_or(missing)
    }

    /// Attach a widget of `height` to line `n`.
    pub fn add_line_widget(
        &mut self,
        doc: DocId,
        n: usize,
        height: f64,
        above: bool,
        payload: Option<Payload>,
    ) -> Result<WidgetId, DocError> {
        let handle = self.doc(doc)?.tree.handle_at(n)?;
        let id = WidgetId(self.next_widget_id);
        self.next_widget_id = self.next_widget_id.saturating_add(1);
        let d = self.doc_mut(doc)?;
        let hidden = d.line_is_hidden(handle);
        let Some(line) = d.tree.line_mut(handle) else {
            return Err(DocError::LineOutOfRange {
                line: n,
                first: d.tree.first(),
                size: d.tree.len(),
            });
        };
        line.widgets.push(LineWidget {
            id,
            height,
            above,
            payload,
        });
        let new_height = line.height() + height;
        d.widgets.insert(id, handle);
        if !hidden {
            d.tree.update_line_height(handle, new_height);
        }
        Ok(id)
    }

    /// Remove a widget. Returns `false` when it no longer exists.
    pub fn remove_line_widget(&mut self, doc: DocId, id: WidgetId) -> Result<bool, DocError> {
        let d = self.doc_mut(doc)?;
        let Some(handle) = d.widgets.remove(&id) else {
            return Ok(false);
        };
        let Some(line) = d.tree.line_mut(handle) else {
            return Ok(false);
        };
        let Some(idx) = line.widgets.iter().position(|w| w.id == id) else {
            return Ok(false);
        };
        let widget = line.widgets.remove(idx);
        let new_height = (line.height() - widget.height).max(0.0);
        d.tree.update_line_height(handle, new_height);
        Ok(true)
    }

    /// Change the height of a widget.
    pub fn set_widget_height(
        &mut self,
        doc: DocId,
        id: WidgetId,
        height: f64,
    ) -> Result<bool, DocError> {
        let d = self.doc_mut(doc)?;
        let Some(handle) = d.widgets.get(&id).copied() else {
            return Ok(false);
        };
        let hidden = d.line_is_hidden(handle);
        let Some(line) = d.tree.line_mut(handle) else {
            return Ok(false);
        };
        let Some(widget) = line.widgets.iter_mut().find(|w| w.id == id) else {
            return Ok(false);
        };
        let diff = height - widget.height;
        widget.height = height;
        let new_height = line.height() + diff;
        if diff != 0.0 && !hidden {
            d.tree.update_line_height(handle, new_height);
        }
        Ok(true)
    }

    /// Move the highlighting frontier (first line whose state is stale).
    pub fn set_frontier(&mut self, doc: DocId, line: usize) -> Result<(), DocError> {
        let d = self.doc_mut(doc)?;
        d.frontier = line.clamp(d.first_line(), d.first_line() + d.line_count());
        Ok(())
    }
}
