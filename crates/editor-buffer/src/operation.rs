//! Operations and deferred notification.
//!
//! Every mutation runs inside an operation on a caller-owned [`TransactionContext`].
//! Operations nest; while one is open, change records, selection activity and delayed
//! events are buffered. When the outermost operation closes they are delivered in a
//! fixed order:
//!
//! 1. read phase: the buffered state is drained from the context;
//! 2. write phase: per-document bookkeeping (the highlighting frontier) is updated;
//! 3. callback phase: `changes`, then each `change`, then `cursor_activity` and
//!    `scroll_into_view` per document, then delayed events (`marker_cleared`,
//!    `history_added`) in the order they were raised, then closures queued with
//!    [`TransactionContext::run_later`].
//!
//! Listeners only see events. Anything that needs to mutate the workspace in response
//! goes through `run_later`, which runs after the callbacks with full access.

use crate::change::AppliedChange;
use crate::error::DocError;
use crate::marker::MarkerId;
use crate::workspace::{DocId, Workspace};
use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// Deferred work with full access to the workspace.
pub type Deferred = Box<dyn FnOnce(&mut Workspace, &mut TransactionContext) + Send>;

/// Listener for document events.
pub type DocEventCallback = Box<dyn FnMut(&DocEvent) + Send>;

/// Notification delivered when an operation closes.
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// All changes applied to a document during the operation, in order.
    Changes {
        /// Document.
        doc: DocId,
        /// Applied changes.
        changes: Vec<AppliedChange>,
    },
    /// One change applied to a document.
    Change {
        /// Document.
        doc: DocId,
        /// Applied change.
        change: AppliedChange,
    },
    /// The selection of a document changed.
    CursorActivity {
        /// Document.
        doc: DocId,
    },
    /// The rendering layer should bring the primary selection into view.
    ScrollIntoView {
        /// Document.
        doc: DocId,
    },
    /// A marker was cleared.
    MarkerCleared {
        /// Document that held the marker.
        doc: DocId,
        /// The cleared marker.
        marker: MarkerId,
        /// Line holding the marker start, if it was attached.
        from_line: Option<usize>,
        /// Line holding the marker end, if it was attached.
        to_line: Option<usize>,
    },
    /// A new undo event was started.
    HistoryAdded {
        /// Document.
        doc: DocId,
    },
}

impl DocEvent {
    /// Document the event belongs to.
    pub fn doc(&self) -> DocId {
        match self {
            DocEvent::Changes { doc, .. }
            | DocEvent::Change { doc, .. }
            | DocEvent::CursorActivity { doc }
            | DocEvent::ScrollIntoView { doc }
            | DocEvent::MarkerCleared { doc, .. }
            | DocEvent::HistoryAdded { doc } => *doc,
        }
    }
}

#[derive(Debug, Default)]
struct PendingDoc {
    changes: Vec<AppliedChange>,
    min_changed_line: Option<usize>,
    cursor_activity: bool,
    scroll: bool,
}

/// Caller-owned operation state.
///
/// ```rust
/// use editor_buffer::{DocOptions, Pos, TransactionContext, Workspace};
///
/// let mut ws = Workspace::new();
/// let doc = ws.open("abc", DocOptions::default());
/// let mut tx = TransactionContext::new();
///
/// ws.start_operation(&mut tx);
/// ws.replace_range(&mut tx, doc, "x", Pos::new(0, 0), None, None).unwrap();
/// ws.replace_range(&mut tx, doc, "y", Pos::new(0, 4), None, None).unwrap();
/// ws.end_operation(&mut tx);
///
/// assert_eq!(ws.doc(doc).unwrap().get_value(None), "xabcy");
/// // Both edits happened in one operation, so they undo together.
/// ws.undo(&mut tx, doc).unwrap();
/// assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc");
/// ```
#[derive(Default)]
pub struct TransactionContext {
    depth: usize,
    next_op: u64,
    current_op: Option<u64>,
    order: Vec<DocId>,
    pending: Vec<PendingDoc>,
    delayed: Vec<DocEvent>,
    after_close: Vec<Deferred>,
    next_tick: VecDeque<Deferred>,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("depth", &self.depth)
            .field("current_op", &self.current_op)
            .field("pending_docs", &self.order)
            .field("delayed", &self.delayed.len())
            .field("after_close", &self.after_close.len())
            .field("next_tick", &self.next_tick.len())
            .finish()
    }
}

impl TransactionContext {
    /// Create an idle context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is open.
    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Nesting depth of the open operation.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Id of the open operation. Changes sharing an id merge into one undo event.
    pub fn op_id(&self) -> Option<u64> {
        self.current_op
    }

    /// Number of closures waiting for [`Workspace::run_tick`].
    pub fn pending_ticks(&self) -> usize {
        self.next_tick.len()
    }

    /// Queue work for after the current operation's callbacks. Outside an operation the
    /// closure waits for the next [`Workspace::run_tick`].
    pub fn run_later<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Workspace, &mut TransactionContext) + Send + 'static,
    {
        if self.is_open() {
            self.after_close.push(Box::new(f));
        } else {
            self.next_tick.push_back(Box::new(f));
        }
    }

    fn enter(&mut self) {
        if self.depth == 0 {
            self.next_op += 1;
            self.current_op = Some(self.next_op);
            trace!(op = self.next_op, "operation started");
        }
        self.depth += 1;
    }

    /// Returns `true` when the outermost operation closed.
    fn leave(&mut self) -> bool {
        match self.depth {
            0 => false,
            1 => {
                self.depth = 0;
                self.current_op = None;
                true
            }
            _ => {
                self.depth -= 1;
                false
            }
        }
    }

    fn pending_mut(&mut self, doc: DocId) -> &mut PendingDoc {
        let idx = match self.order.iter().position(|d| *d == doc) {
            Some(idx) => idx,
            None => {
                self.order.push(doc);
                self.pending.push(PendingDoc::default());
                self.order.len() - 1
            }
        };
        &mut self.pending[idx]
    }

    pub(crate) fn record_change(&mut self, doc: DocId, change: AppliedChange, from_line: usize) {
        let pending = self.pending_mut(doc);
        pending.changes.push(change);
        pending.min_changed_line = Some(
            pending
                .min_changed_line
                .map_or(from_line, |line| line.min(from_line)),
        );
    }

    pub(crate) fn cursor_activity(&mut self, doc: DocId) {
        self.pending_mut(doc).cursor_activity = true;
    }

    pub(crate) fn request_scroll(&mut self, doc: DocId) {
        self.pending_mut(doc).scroll = true;
    }

    pub(crate) fn signal_later(&mut self, event: DocEvent) {
        self.delayed.push(event);
    }
}

impl Workspace {
    /// Open an operation (or a nested one).
    pub fn start_operation(&mut self, tx: &mut TransactionContext) {
        tx.enter();
    }

    /// Close an operation. Closing the outermost one flushes its notifications.
    pub fn end_operation(&mut self, tx: &mut TransactionContext) {
        if !tx.leave() {
            return;
        }
        // Read phase.
        let docs: Vec<(DocId, PendingDoc)> = std::mem::take(&mut tx.order)
            .into_iter()
            .zip(std::mem::take(&mut tx.pending))
            .collect();
        let delayed = std::mem::take(&mut tx.delayed);
        let after_close = std::mem::take(&mut tx.after_close);

        // Write phase.
        for (doc, pending) in &docs {
            if let (Some(line), Some(d)) = (pending.min_changed_line, self.docs.get_mut(doc)) {
                d.frontier = d.frontier.min(line);
            }
        }

        // Callback phase.
        for (doc, pending) in docs {
            if !pending.changes.is_empty() {
                self.emit(&DocEvent::Changes {
                    doc,
                    changes: pending.changes.clone(),
                });
                for change in pending.changes {
                    self.emit(&DocEvent::Change { doc, change });
                }
            }
            if pending.cursor_activity {
                self.emit(&DocEvent::CursorActivity { doc });
            }
            if pending.scroll {
                self.emit(&DocEvent::ScrollIntoView { doc });
            }
        }
        for event in &delayed {
            self.emit(event);
        }
        for f in after_close {
            f(self, tx);
        }
    }

    /// Run `f` inside an operation.
    pub fn operation<T>(
        &mut self,
        tx: &mut TransactionContext,
        f: impl FnOnce(&mut Workspace, &mut TransactionContext) -> Result<T, DocError>,
    ) -> Result<T, DocError> {
        self.start_operation(tx);
        let result = f(self, tx);
        self.end_operation(tx);
        result
    }

    /// Run closures queued with [`TransactionContext::run_later`] outside an operation.
    /// Closures queued while this runs wait for the next tick.
    pub fn run_tick(&mut self, tx: &mut TransactionContext) {
        let queued: Vec<Deferred> = tx.next_tick.drain(..).collect();
        for f in queued {
            f(self, tx);
        }
    }

    fn emit(&mut self, event: &DocEvent) {
        if let Some(listeners) = self.listeners.get_mut(&event.doc()) {
            for listener in listeners.iter_mut() {
                listener(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_operations_share_an_id() {
        let mut tx = TransactionContext::new();
        tx.enter();
        let id = tx.op_id();
        tx.enter();
        assert_eq!(tx.op_id(), id);
        assert!(!tx.leave());
        assert!(tx.leave());
        assert_eq!(tx.op_id(), None);
        tx.enter();
        assert_ne!(tx.op_id(), id);
    }

    #[test]
    fn test_leave_without_enter_is_harmless() {
        let mut tx = TransactionContext::new();
        assert!(!tx.leave());
        assert!(!tx.is_open());
    }

    #[test]
    fn test_run_later_outside_operation_waits_for_tick() {
        let mut tx = TransactionContext::new();
        tx.run_later(|_, _| {});
        assert_eq!(tx.pending_ticks(), 1);
        tx.enter();
        tx.run_later(|_, _| {});
        assert_eq!(tx.pending_ticks(), 1);
        assert_eq!(tx.after_close.len(), 1);
    }
}
