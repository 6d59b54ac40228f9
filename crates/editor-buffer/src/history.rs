//! Undo/redo history.
//!
//! A [`History`] keeps two stacks (`done` and `undone`) of [`HistoryEvent`]s. Change groups
//! are interleaved with selection snapshots so undo can restore the selection that was
//! active before an edit. Consecutive edits merge into one group when they happen in the
//! same operation, or when their [`Origin`]s allow it (see [`MergePolicy`]).
//!
//! `generation` identifies the history state for clean/dirty tracking: every recorded
//! change gets a fresh value from `max_generation`, and undo/redo restore the generation
//! stored with the group they replay.

use crate::change::{Change, change_end};
use crate::error::DocError;
use crate::marker::MarkedSpan;
use crate::position::Pos;
use crate::selection::{Selection, SelectionRange, normalize_selection};
use crate::workspace::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// How a change may merge into the previous history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Always starts a new event (unless it happens in the same operation).
    #[default]
    Never,
    /// Merges with the previous event of the same origin when it happened within the
    /// history event delay. Selection changes additionally need the same range count and
    /// the same "something selected" state.
    WhenRecentAndSimilar,
    /// Always merges with the previous event of the same origin.
    Always,
}

/// Where a change or selection change came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    label: String,
    policy: MergePolicy,
}

impl Origin {
    /// Create an origin with an explicit merge policy.
    pub fn new(label: impl Into<String>, policy: MergePolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    /// An origin that never merges.
    pub fn named(label: impl Into<String>) -> Self {
        Self::new(label, MergePolicy::Never)
    }

    /// Typed input. Rapid typing merges into one event.
    pub fn input() -> Self {
        Self::new("input", MergePolicy::WhenRecentAndSimilar)
    }

    /// Deletion by keyboard. Rapid deletes merge into one event.
    pub fn delete() -> Self {
        Self::new("delete", MergePolicy::WhenRecentAndSimilar)
    }

    /// Pasted text.
    pub fn paste() -> Self {
        Self::named("paste")
    }

    /// Whole-document replacement.
    pub fn set_value() -> Self {
        Self::named("setValue")
    }

    /// Replayed by undo.
    pub fn undo() -> Self {
        Self::named("undo")
    }

    /// Replayed by redo.
    pub fn redo() -> Self {
        Self::named("redo")
    }

    /// History entry recorded when a marker is created with `add_to_history`.
    pub fn mark_text() -> Self {
        Self::named("markText")
    }

    /// Label of the origin.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Merge policy of the origin.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }
}

/// One recorded change: replacing `[from, to)` by `text` turns the document back into the
/// state before the original edit.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryChange {
    /// Start of the range to replace.
    pub from: Pos,
    /// End of the range to replace.
    pub to: Pos,
    /// Text to put back.
    pub text: Vec<String>,
    /// Marker spans of the touched lines per document, captured before the edit.
    pub(crate) spans: HashMap<DocId, Vec<Vec<MarkedSpan>>>,
}

impl HistoryChange {
    pub(crate) fn new(from: Pos, to: Pos, text: Vec<String>) -> Self {
        Self {
            from,
            to,
            text,
            spans: HashMap::new(),
        }
    }
}

/// A group of changes undone and redone together.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeGroup {
    /// Changes in application order.
    pub changes: Vec<HistoryChange>,
    /// Generation to restore when this group is replayed.
    pub generation: Option<u64>,
}

/// Entry of the done/undone stacks.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    /// Selection snapshot.
    Selection(Selection),
    /// Change group.
    Changes(ChangeGroup),
}

impl HistoryEvent {
    fn is_selection(&self) -> bool {
        matches!(self, HistoryEvent::Selection(_))
    }
}

/// Number of undoable and redoable change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistorySize {
    /// Change events on the undo stack.
    pub undo: usize,
    /// Change events on the redo stack.
    pub redo: usize,
}

/// Direction of a history replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replay {
    Undo,
    Redo,
}

/// Undo/redo history of one document (or of a group of linked documents sharing it).
#[derive(Debug, Clone)]
pub struct History {
    pub(crate) done: Vec<HistoryEvent>,
    pub(crate) undone: Vec<HistoryEvent>,
    pub(crate) undo_depth: usize,
    last_mod_time: Option<Instant>,
    last_sel_time: Option<Instant>,
    last_op: Option<u64>,
    last_sel_op: Option<u64>,
    pub(crate) last_origin: Option<Origin>,
    pub(crate) last_sel_origin: Option<Origin>,
    pub(crate) generation: u64,
    pub(crate) max_generation: u64,
}

impl History {
    pub(crate) fn new(start_generation: u64, undo_depth: usize) -> Self {
        let start = start_generation.max(1);
        Self {
            done: Vec::new(),
            undone: Vec::new(),
            undo_depth,
            last_mod_time: None,
            last_sel_time: None,
            last_op: None,
            last_sel_op: None,
            last_origin: None,
            last_sel_origin: None,
            generation: start,
            max_generation: start,
        }
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Events on the undo stack, oldest first.
    pub fn done(&self) -> &[HistoryEvent] {
        &self.done
    }

    /// Events on the redo stack, oldest first.
    pub fn undone(&self) -> &[HistoryEvent] {
        &self.undone
    }

    /// Count change events on both stacks.
    pub fn size(&self) -> HistorySize {
        HistorySize {
            undo: self.done.iter().filter(|e| !e.is_selection()).count(),
            redo: self.undone.iter().filter(|e| !e.is_selection()).count(),
        }
    }

    /// Forget merge state so the next change starts a new event.
    pub(crate) fn split_event(&mut self) {
        self.last_op = None;
        self.last_sel_op = None;
        self.last_origin = None;
    }

    pub(crate) fn stacks_mut(
        &mut self,
        replay: Replay,
    ) -> (&mut Vec<HistoryEvent>, &mut Vec<HistoryEvent>) {
        match replay {
            Replay::Undo => (&mut self.done, &mut self.undone),
            Replay::Redo => (&mut self.undone, &mut self.done),
        }
    }

    /// Record a change. Returns `true` when a new event was started (as opposed to the
    /// change merging into the previous one).
    pub(crate) fn add_change(
        &mut self,
        change: &Change,
        record: HistoryChange,
        sel_before: &Selection,
        sel_after: Selection,
        op: Option<u64>,
        delay: Duration,
    ) -> bool {
        self.undone.clear();
        let now = Instant::now();
        let same_op = op.is_some() && self.last_op == op;
        let origin_merges = match &change.origin {
            Some(origin) if self.last_origin.as_ref() == Some(origin) => match origin.policy {
                MergePolicy::Always => true,
                MergePolicy::WhenRecentAndSimilar => self
                    .last_mod_time
                    .is_some_and(|t| now.duration_since(t) < delay),
                MergePolicy::Never => false,
            },
            _ => false,
        };

        let mut merged = false;
        if same_op || origin_merges {
            if let Some(group) = self.last_change_event(same_op) {
                match group.changes.last_mut() {
                    // Caret insertion right after the previous change: extend it in place.
                    Some(last) if change.from == change.to && change.from == last.to => {
                        last.to = change_end(change);
                    }
                    _ => group.changes.push(record.clone()),
                }
                merged = true;
                trace!(same_op, "merged change into previous history event");
            }
        }

        if !merged {
            if !self.done.last().is_some_and(HistoryEvent::is_selection) {
                push_selection(&mut self.done, sel_before.clone());
            }
            self.done.push(HistoryEvent::Changes(ChangeGroup {
                changes: vec![record],
                generation: Some(self.generation),
            }));
            while self.done.len() > self.undo_depth {
                self.done.remove(0);
                if self.done.first().is_some_and(|e| !e.is_selection()) {
                    self.done.remove(0);
                }
            }
        }
        self.done.push(HistoryEvent::Selection(sel_after));
        self.max_generation += 1;
        self.generation = self.max_generation;
        self.last_mod_time = Some(now);
        self.last_sel_time = Some(now);
        self.last_op = op;
        self.last_sel_op = op;
        self.last_origin = change.origin.clone();
        self.last_sel_origin = change.origin.clone();
        !merged
    }

    fn last_change_event(&mut self, force: bool) -> Option<&mut ChangeGroup> {
        if force {
            clear_selection_events(&mut self.done);
        } else if self.done.last().is_some_and(|e| !e.is_selection()) {
        } else if self.done.len() > 1 && !self.done[self.done.len() - 2].is_selection() {
            self.done.pop();
        } else {
            return None;
        }
        match self.done.last_mut() {
            Some(HistoryEvent::Changes(group)) => Some(group),
            _ => None,
        }
    }

    /// Record a selection change.
    pub(crate) fn add_selection(
        &mut self,
        sel: Selection,
        op: Option<u64>,
        origin: Option<&Origin>,
        clear_redo: bool,
        delay: Duration,
    ) {
        let now = Instant::now();
        let same_op = op.is_some() && op == self.last_sel_op;
        let origin_merges = origin.is_some_and(|origin| {
            self.last_sel_origin.as_ref() == Some(origin)
                && ((self.last_mod_time == self.last_sel_time
                    && self.last_origin.as_ref() == Some(origin))
                    || self.selection_event_can_be_merged(origin, &sel, now, delay))
        });
        match self.done.last_mut() {
            Some(last) if same_op || origin_merges => *last = HistoryEvent::Selection(sel),
            _ => push_selection(&mut self.done, sel),
        }
        self.last_sel_time = Some(now);
        self.last_sel_origin = origin.cloned();
        self.last_sel_op = op;
        if clear_redo {
            clear_selection_events(&mut self.undone);
        }
    }

    fn selection_event_can_be_merged(
        &self,
        origin: &Origin,
        sel: &Selection,
        now: Instant,
        delay: Duration,
    ) -> bool {
        match origin.policy {
            MergePolicy::Always => true,
            MergePolicy::Never => false,
            MergePolicy::WhenRecentAndSimilar => match self.done.last() {
                Some(HistoryEvent::Selection(prev)) => {
                    prev.len() == sel.len()
                        && prev.something_selected() == sel.something_selected()
                        && self
                            .last_sel_time
                            .is_some_and(|t| now.duration_since(t) <= delay)
                }
                _ => false,
            },
        }
    }

    /// Shift or drop history entries after a change applied by a linked document.
    ///
    /// Entries touching the changed lines can no longer be replayed. They are dropped
    /// together with everything older, so replaying stays consistent but those edits are
    /// lost to undo.
    pub(crate) fn rebase(&mut self, change: &Change, may_touch: bool) {
        let from = change.from.line;
        let to = change.to.line;
        let diff = change.text.len() as isize - (to - from) as isize - 1;
        rebase_hist_array(&mut self.done, from, to, diff, may_touch);
        rebase_hist_array(&mut self.undone, from, to, diff, may_touch);
    }
}

pub(crate) fn push_selection(dest: &mut Vec<HistoryEvent>, sel: Selection) {
    if let Some(HistoryEvent::Selection(top)) = dest.last() {
        if *top == sel {
            return;
        }
    }
    dest.push(HistoryEvent::Selection(sel));
}

fn clear_selection_events(events: &mut Vec<HistoryEvent>) {
    while events.last().is_some_and(HistoryEvent::is_selection) {
        events.pop();
    }
}

fn rebase_line(pos: Pos, from: usize, to: usize, diff: isize) -> Pos {
    if to < pos.line {
        Pos::new(crate::position::offset_line(pos.line, diff), pos.ch)
    } else if from < pos.line {
        Pos::new(from, 0)
    } else {
        pos
    }
}

fn rebase_hist_array(
    events: &mut Vec<HistoryEvent>,
    from: usize,
    to: usize,
    diff: isize,
    may_touch: bool,
) {
    let mut i = 0;
    while i < events.len() {
        let collided = match &mut events[i] {
            HistoryEvent::Selection(sel) => {
                let ranges = sel.map_positions(|p| rebase_line(p, from, to, diff));
                *sel = normalize_selection(ranges, sel.primary_index(), may_touch);
                false
            }
            HistoryEvent::Changes(group) => {
                let mut collided = false;
                for change in &mut group.changes {
                    if to < change.from.line {
                        change.from.line = crate::position::offset_line(change.from.line, diff);
                        change.to.line = crate::position::offset_line(change.to.line, diff);
                    } else if from <= change.to.line {
                        collided = true;
                        break;
                    }
                }
                collided
            }
        };
        if collided {
            trace!(dropped = i + 1, "history entries collide with a linked edit");
            events.drain(..=i);
            i = 0;
        } else {
            i += 1;
        }
    }
}

/// Copy a history stack. Marker snapshots belonging to `split` documents move into the
/// copy; without `split` the copy carries no marker snapshots. Generations are dropped.
pub(crate) fn copy_history_array(
    events: &mut [HistoryEvent],
    split: Option<&[DocId]>,
) -> Vec<HistoryEvent> {
    events
        .iter_mut()
        .map(|event| match event {
            HistoryEvent::Selection(sel) => HistoryEvent::Selection(sel.clone()),
            HistoryEvent::Changes(group) => HistoryEvent::Changes(ChangeGroup {
                changes: group
                    .changes
                    .iter_mut()
                    .map(|change| {
                        let mut copy =
                            HistoryChange::new(change.from, change.to, change.text.clone());
                        if let Some(split) = split {
                            for doc in split {
                                if let Some(spans) = change.spans.remove(doc) {
                                    copy.spans.insert(*doc, spans);
                                }
                            }
                        }
                        copy
                    })
                    .collect(),
                generation: None,
            }),
        })
        .collect()
}

/// Plain-data form of a history, for external persistence.
///
/// ```rust
/// use editor_buffer::{HistoryData, HistoryEntry};
///
/// let data = HistoryData::from_json(r#"{"done":[{"kind":"changes","changes":[
///     {"from":{"line":0,"ch":0},"to":{"line":0,"ch":1},"text":[""]}]}],"undone":[]}"#).unwrap();
/// assert!(matches!(data.done[0], HistoryEntry::Changes { .. }));
/// assert!(data.to_json().unwrap().contains("\"changes\""));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Undo stack, oldest first.
    pub done: Vec<HistoryEntry>,
    /// Redo stack, oldest first.
    pub undone: Vec<HistoryEntry>,
}

/// One serialized history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// Selection snapshot.
    Selection {
        /// Ranges in document order.
        ranges: Vec<SelectionRange>,
        /// Index of the primary range.
        primary: usize,
    },
    /// Change group.
    Changes {
        /// Changes in application order.
        changes: Vec<ChangeData>,
    },
}

/// One serialized change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeData {
    /// Start of the range to replace.
    pub from: Pos,
    /// End of the range to replace.
    pub to: Pos,
    /// Replacement lines.
    pub text: Vec<String>,
}

impl HistoryData {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, DocError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, DocError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn from_events(done: &[HistoryEvent], undone: &[HistoryEvent]) -> Self {
        Self {
            done: done.iter().map(HistoryEntry::from_event).collect(),
            undone: undone.iter().map(HistoryEntry::from_event).collect(),
        }
    }

    pub(crate) fn into_events(
        self,
        may_touch: bool,
    ) -> Result<(Vec<HistoryEvent>, Vec<HistoryEvent>), DocError> {
        let done = self
            .done
            .into_iter()
            .map(|e| e.into_event(may_touch))
            .collect::<Result<Vec<_>, _>>()?;
        let undone = self
            .undone
            .into_iter()
            .map(|e| e.into_event(may_touch))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((done, undone))
    }
}

impl HistoryEntry {
    fn from_event(event: &HistoryEvent) -> Self {
        match event {
            HistoryEvent::Selection(sel) => HistoryEntry::Selection {
                ranges: sel.ranges().to_vec(),
                primary: sel.primary_index(),
            },
            HistoryEvent::Changes(group) => HistoryEntry::Changes {
                changes: group
                    .changes
                    .iter()
                    .map(|c| ChangeData {
                        from: c.from,
                        to: c.to,
                        text: c.text.clone(),
                    })
                    .collect(),
            },
        }
    }

    fn into_event(self, may_touch: bool) -> Result<HistoryEvent, DocError> {
        Ok(match self {
            HistoryEntry::Selection { ranges, primary } => {
                HistoryEvent::Selection(Selection::new(ranges, primary, may_touch)?)
            }
            HistoryEntry::Changes { changes } => HistoryEvent::Changes(ChangeGroup {
                changes: changes
                    .into_iter()
                    .map(|c| {
                        let text = if c.text.is_empty() {
                            vec![String::new()]
                        } else {
                            c.text
                        };
                        HistoryChange::new(c.from, c.to, text)
                    })
                    .collect(),
                generation: None,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caret(line: usize, ch: usize) -> Selection {
        Selection::cursor(Pos::new(line, ch))
    }

    fn insert(at: Pos, text: &str, origin: Origin) -> (Change, HistoryChange) {
        let change = Change::new(at, at, vec![text.to_string()], Some(origin));
        let record = HistoryChange::new(at, change_end(&change), vec![String::new()]);
        (change, record)
    }

    #[test]
    fn test_typing_merges_into_one_group() {
        let mut hist = History::new(1, 200);
        let delay = Duration::from_millis(1250);
        for i in 0..5 {
            let (change, record) = insert(Pos::new(0, i), "x", Origin::input());
            hist.add_change(&change, record, &caret(0, i), caret(0, i + 1), None, delay);
        }
        assert_eq!(hist.size(), HistorySize { undo: 1, redo: 0 });
        let HistoryEvent::Changes(group) = &hist.done[1] else {
            panic!("expected change group");
        };
        assert_eq!(group.changes.len(), 1);
        assert_eq!(group.changes[0].to, Pos::new(0, 5));
    }

    #[test]
    fn test_never_policy_starts_new_events() {
        let mut hist = History::new(1, 200);
        let delay = Duration::from_millis(1250);
        for i in 0..3 {
            let (change, record) = insert(Pos::new(0, i), "x", Origin::paste());
            hist.add_change(&change, record, &caret(0, i), caret(0, i + 1), None, delay);
        }
        assert_eq!(hist.size().undo, 3);
        assert_eq!(hist.generation(), 4);
    }

    #[test]
    fn test_same_operation_merges() {
        let mut hist = History::new(1, 200);
        let delay = Duration::ZERO;
        let (a, ra) = insert(Pos::new(0, 0), "a", Origin::paste());
        let (b, rb) = insert(Pos::new(3, 0), "b", Origin::paste());
        hist.add_change(&a, ra, &caret(0, 0), caret(0, 1), Some(7), delay);
        hist.add_change(&b, rb, &caret(0, 1), caret(3, 1), Some(7), delay);
        assert_eq!(hist.size().undo, 1);
    }

    #[test]
    fn test_depth_trims_selection_change_pairs() {
        let mut hist = History::new(1, 4);
        let delay = Duration::ZERO;
        for i in 0..4 {
            let (change, record) = insert(Pos::new(i, 0), "x", Origin::paste());
            hist.add_change(&change, record, &caret(i, 0), caret(i, 1), None, delay);
        }
        assert!(hist.done.len() <= 5);
        assert!(hist.done[0].is_selection());
    }

    #[test]
    fn test_rebase_shifts_and_drops() {
        let mut hist = History::new(1, 200);
        let delay = Duration::ZERO;
        let (a, ra) = insert(Pos::new(2, 0), "a", Origin::paste());
        hist.add_change(&a, ra, &caret(2, 0), caret(2, 1), None, delay);
        let (b, rb) = insert(Pos::new(8, 0), "b", Origin::paste());
        hist.add_change(&b, rb, &caret(8, 0), caret(8, 1), None, delay);

        // Two new lines above line 5 shift the second entry and leave the first alone.
        let remote = Change::new(
            Pos::new(5, 0),
            Pos::new(5, 0),
            vec!["".into(), "".into(), "".into()],
            None,
        );
        hist.rebase(&remote, false);
        assert_eq!(hist.size().undo, 2);
        let HistoryEvent::Changes(group) = &hist.done[3] else {
            panic!("expected change group");
        };
        assert_eq!(group.changes[0].from.line, 10);

        // An edit on line 2 collides with the first entry: it and everything older go.
        let colliding = Change::new(Pos::new(2, 0), Pos::new(2, 1), vec!["".into()], None);
        hist.rebase(&colliding, false);
        assert_eq!(hist.size().undo, 1);
    }

    #[test]
    fn test_history_data_rejects_empty_selection() {
        let data = HistoryData {
            done: vec![HistoryEntry::Selection {
                ranges: vec![],
                primary: 0,
            }],
            undone: vec![],
        };
        assert!(matches!(
            data.into_events(false),
            Err(DocError::InvalidSelection(_))
        ));
    }
}
