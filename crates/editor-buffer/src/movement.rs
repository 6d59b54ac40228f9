//! Horizontal cursor motion by character, grapheme cluster or word. Every step skips
//! over atomic markers (clearing `clear_on_enter` markers it runs into).

use crate::document::Document;
use crate::error::DocError;
use crate::history::{MergePolicy, Origin};
use crate::operation::TransactionContext;
use crate::position::Pos;
use crate::selection::{Collapse, SelectionOptions, SelectionRange, extend_range, normalize_selection};
use crate::workspace::{DocId, Workspace};
use unicode_segmentation::UnicodeSegmentation;

/// Step size for [`Workspace::find_pos_h`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveUnit {
    /// One `char`.
    #[default]
    Char,
    /// One extended grapheme cluster.
    Grapheme,
    /// To the end (or start) of the next word.
    Word,
}

/// Outcome of [`Workspace::find_pos_h`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResult {
    /// Where the motion ended.
    pub pos: Pos,
    /// The motion stopped early at the start or end of the document.
    pub hit_side: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn grapheme_boundaries(text: &str) -> Vec<usize> {
    let mut out = vec![0];
    let mut ch = 0;
    for grapheme in text.graphemes(true) {
        ch += grapheme.chars().count();
        out.push(ch);
    }
    out
}

impl Document {
    fn step_in_line(&self, pos: Pos, dir: i8, unit: MoveUnit) -> Option<Pos> {
        let text = self.tree.get_line(pos.line).ok()?.text();
        if unit == MoveUnit::Grapheme {
            let bounds = grapheme_boundaries(text);
            let next = if dir < 0 {
                bounds.iter().rev().find(|&&b| b < pos.ch)
            } else {
                bounds.iter().find(|&&b| b > pos.ch)
            };
            return next.map(|&ch| Pos::new(pos.line, ch));
        }
        if dir < 0 {
            pos.ch.checked_sub(1).map(|ch| Pos::new(pos.line, ch))
        } else if pos.ch < self.line_len(pos.line) {
            Some(Pos::new(pos.line, pos.ch + 1))
        } else {
            None
        }
    }

    fn move_once(&self, pos: &mut Pos, dir: i8, unit: MoveUnit, bound_to_line: bool) -> bool {
        if let Some(next) = self.step_in_line(*pos, dir, unit) {
            *pos = next;
            return true;
        }
        if bound_to_line {
            return false;
        }
        if dir < 0 && pos.line > self.first_line() {
            let line = pos.line - 1;
            *pos = Pos::new(line, self.line_len(line));
            true
        } else if dir > 0 && pos.line < self.last_line() {
            *pos = Pos::new(pos.line + 1, 0);
            true
        } else {
            false
        }
    }

    fn char_at(&self, pos: Pos) -> Option<char> {
        self.tree
            .get_line(pos.line)
            .ok()
            .and_then(|line| line.text().chars().nth(pos.ch))
    }

    /// One `unit` away from `pos`, ignoring markers. Stays put at the document edges.
    fn step_pos(&self, pos: Pos, dir: i8, unit: MoveUnit) -> Pos {
        let mut pos = pos;
        match unit {
            MoveUnit::Char | MoveUnit::Grapheme => {
                self.move_once(&mut pos, dir, unit, false);
            }
            MoveUnit::Word => {
                let mut saw_word = false;
                let mut first = true;
                loop {
                    if dir < 0 && !self.move_once(&mut pos, dir, MoveUnit::Char, !first) {
                        break;
                    }
                    let is_word = self.char_at(pos).is_some_and(is_word_char);
                    if saw_word && !is_word {
                        if dir < 0 {
                            self.move_once(&mut pos, 1, MoveUnit::Char, false);
                        }
                        break;
                    }
                    saw_word |= is_word;
                    if dir > 0 && !self.move_once(&mut pos, dir, MoveUnit::Char, !first) {
                        break;
                    }
                    first = false;
                }
            }
        }
        pos
    }
}

impl Workspace {
    /// Move `amount` units from `from` (negative: backwards), skipping atomic markers.
    pub fn find_pos_h(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        from: Pos,
        amount: isize,
        unit: MoveUnit,
    ) -> Result<MoveResult, DocError> {
        let dir: i8 = if amount < 0 { -1 } else { 1 };
        let mut cur = self.doc(doc)?.clip_pos(from);
        let mut hit_side = false;
        for _ in 0..amount.unsigned_abs() {
            let old = cur;
            let stepped = self.doc(doc)?.step_pos(old, dir, unit);
            cur = self.skip_atomic(tx, doc, stepped, Some(old), dir, true)?;
            if cur == old {
                hit_side = true;
                break;
            }
        }
        Ok(MoveResult { pos: cur, hit_side })
    }

    /// Move every cursor `amount` units. Non-empty ranges collapse to their start or end
    /// unless the document is extending.
    pub fn move_h(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        amount: isize,
        unit: MoveUnit,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            let d = ws.doc(doc)?;
            let (extending, primary) = (d.extending, d.sel.primary_index());
            let ranges = d.sel.ranges().to_vec();
            let mut moved: Vec<SelectionRange> = Vec::with_capacity(ranges.len());
            for range in ranges {
                let head = if extending || range.empty() {
                    ws.find_pos_h(tx, doc, range.head, amount, unit)?.pos
                } else if amount < 0 {
                    range.from()
                } else {
                    range.to()
                };
                moved.push(extend_range(range, head, None, extending));
            }
            let sel = normalize_selection(moved, primary, ws.doc(doc)?.options.selections_may_touch);
            let opts = SelectionOptions::default()
                .with_origin(Origin::new("move", MergePolicy::WhenRecentAndSimilar));
            ws.apply_selection(tx, doc, sel, &opts)
        })
    }

    /// Delete the selection, or `amount` units next to each cursor when nothing is
    /// selected.
    pub fn delete_h(
        &mut self,
        tx: &mut TransactionContext,
        doc: DocId,
        amount: isize,
        unit: MoveUnit,
    ) -> Result<(), DocError> {
        self.operation(tx, |ws, tx| {
            if ws.doc(doc)?.something_selected() {
                return ws.replace_selection(tx, doc, "", Collapse::End, Some(Origin::delete()));
            }
            let heads: Vec<Pos> = ws.doc(doc)?.sel.ranges().iter().map(|r| r.head).collect();
            let mut kill: Vec<(Pos, Pos)> = Vec::with_capacity(heads.len());
            for head in heads {
                let other = ws.find_pos_h(tx, doc, head, amount, unit)?.pos;
                let (mut from, to) = if amount < 0 { (other, head) } else { (head, other) };
                while let Some(&(last_from, last_to)) = kill.last() {
                    if from > last_to {
                        break;
                    }
                    kill.pop();
                    if last_from < from {
                        from = last_from;
                        break;
                    }
                }
                kill.push((from, to));
            }
            for (from, to) in kill.into_iter().rev() {
                ws.replace_range(tx, doc, "", from, Some(to), Some(Origin::delete()))?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocOptions;
    use crate::marker::MarkOptions;

    fn setup(text: &str) -> (Workspace, TransactionContext, DocId) {
        let mut ws = Workspace::new();
        let doc = ws.open(text, DocOptions::default());
        (ws, TransactionContext::new(), doc)
    }

    #[test]
    fn test_char_and_grapheme_steps() {
        let (mut ws, mut tx, doc) = setup("ae\u{301}b\nx");
        let by_char = ws.find_pos_h(&mut tx, doc, Pos::new(0, 1), 1, MoveUnit::Char).unwrap();
        assert_eq!(by_char.pos, Pos::new(0, 2));
        let by_grapheme = ws
            .find_pos_h(&mut tx, doc, Pos::new(0, 1), 1, MoveUnit::Grapheme)
            .unwrap();
        assert_eq!(by_grapheme.pos, Pos::new(0, 3));
        let across = ws.find_pos_h(&mut tx, doc, Pos::new(0, 4), 1, MoveUnit::Char).unwrap();
        assert_eq!(across.pos, Pos::new(1, 0));
        let back = ws.find_pos_h(&mut tx, doc, Pos::new(1, 0), -1, MoveUnit::Char).unwrap();
        assert_eq!(back.pos, Pos::new(0, 4));
    }

    #[test]
    fn test_hit_side_at_document_edges() {
        let (mut ws, mut tx, doc) = setup("ab");
        let end = ws.find_pos_h(&mut tx, doc, Pos::new(0, 1), 5, MoveUnit::Char).unwrap();
        assert_eq!(end, MoveResult { pos: Pos::new(0, 2), hit_side: true });
        let start = ws.find_pos_h(&mut tx, doc, Pos::new(0, 0), -1, MoveUnit::Char).unwrap();
        assert!(start.hit_side);
    }

    #[test]
    fn test_word_steps() {
        let (mut ws, mut tx, doc) = setup("foo bar_baz qux");
        let step = |ws: &mut Workspace, tx: &mut TransactionContext, from: Pos, amount| {
            ws.find_pos_h(tx, doc, from, amount, MoveUnit::Word).unwrap().pos
        };
        assert_eq!(step(&mut ws, &mut tx, Pos::new(0, 0), 1), Pos::new(0, 3));
        assert_eq!(step(&mut ws, &mut tx, Pos::new(0, 3), 1), Pos::new(0, 11));
        assert_eq!(step(&mut ws, &mut tx, Pos::new(0, 11), -1), Pos::new(0, 4));
        assert_eq!(step(&mut ws, &mut tx, Pos::new(0, 0), 2), Pos::new(0, 11));
    }

    #[test]
    fn test_motion_jumps_over_atomic_marker() {
        let (mut ws, mut tx, doc) = setup("abcdef");
        ws.mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 4), MarkOptions::atomic())
            .unwrap();
        let right = ws.find_pos_h(&mut tx, doc, Pos::new(0, 2), 1, MoveUnit::Char).unwrap();
        assert_eq!(right.pos, Pos::new(0, 4));
        let left = ws.find_pos_h(&mut tx, doc, Pos::new(0, 4), -1, MoveUnit::Char).unwrap();
        assert_eq!(left.pos, Pos::new(0, 2));
    }

    #[test]
    fn test_delete_h_backspaces_each_cursor() {
        let (mut ws, mut tx, doc) = setup("abc\ndef");
        ws.set_selections(
            &mut tx,
            doc,
            vec![
                SelectionRange::cursor(Pos::new(0, 2)),
                SelectionRange::cursor(Pos::new(1, 3)),
            ],
            None,
            SelectionOptions::default(),
        )
        .unwrap();
        ws.delete_h(&mut tx, doc, -1, MoveUnit::Char).unwrap();
        assert_eq!(ws.doc(doc).unwrap().get_value(None), "ac\nde");
        assert_eq!(
            ws.doc(doc).unwrap().list_selections(),
            &[
                SelectionRange::cursor(Pos::new(0, 1)),
                SelectionRange::cursor(Pos::new(1, 2))
            ]
        );
    }

    #[test]
    fn test_move_h_collapses_ranges() {
        let (mut ws, mut tx, doc) = setup("abcdef");
        ws.set_selection(&mut tx, doc, Pos::new(0, 1), Some(Pos::new(0, 4)), SelectionOptions::default())
            .unwrap();
        ws.move_h(&mut tx, doc, -1, MoveUnit::Char).unwrap();
        assert_eq!(ws.doc(doc).unwrap().get_cursor(crate::document::CursorSide::Head), Pos::new(0, 1));
        ws.move_h(&mut tx, doc, 2, MoveUnit::Char).unwrap();
        assert_eq!(ws.doc(doc).unwrap().get_cursor(crate::document::CursorSide::Head), Pos::new(0, 3));
    }
}
