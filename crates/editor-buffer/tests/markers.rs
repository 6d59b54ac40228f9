use editor_buffer::{
    BookmarkOptions, CursorSide, DocError, DocEvent, DocId, DocOptions, MarkOptions, MarkerRange,
    Pos, SelectionOptions, TransactionContext, Workspace,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn setup(text: &str) -> (Workspace, TransactionContext, DocId) {
    let mut ws = Workspace::new();
    let doc = ws.open(text, DocOptions::default());
    (ws, TransactionContext::new(), doc)
}

fn range(from: (usize, usize), to: (usize, usize)) -> Option<MarkerRange> {
    Some(MarkerRange {
        from: Pos::new(from.0, from.1),
        to: Pos::new(to.0, to.1),
    })
}

#[test]
fn test_marker_follows_edits_around_it() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let id = ws
        .mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 4), MarkOptions::class("hl"))
        .unwrap();

    ws.replace_range(&mut tx, doc, "XY", Pos::new(0, 0), None, None).unwrap();
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 4), (0, 6)));

    // Typing at a non-inclusive boundary stays outside the marker.
    ws.replace_range(&mut tx, doc, "!", Pos::new(0, 6), None, None).unwrap();
    ws.replace_range(&mut tx, doc, "?", Pos::new(0, 4), None, None).unwrap();
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 5), (0, 7)));

    ws.replace_range(&mut tx, doc, "\n", Pos::new(0, 6), None, None).unwrap();
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 5), (1, 1)));
    assert_eq!(ws.doc(doc).unwrap().find_marks_at(Pos::new(1, 0)), vec![id]);
}

#[test]
fn test_inclusive_marker_grows_at_boundaries() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let id = ws
        .mark_text(
            &mut tx,
            doc,
            Pos::new(0, 2),
            Pos::new(0, 4),
            MarkOptions::default().inclusive(true, true),
        )
        .unwrap();
    ws.replace_range(&mut tx, doc, "<", Pos::new(0, 2), None, None).unwrap();
    ws.replace_range(&mut tx, doc, ">", Pos::new(0, 5), None, None).unwrap();
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 2), (0, 6)));
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "ab<cd>ef");
}

#[test]
fn test_deleted_marker_comes_back_on_undo() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let id = ws
        .mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 4), MarkOptions::class("x"))
        .unwrap();
    ws.replace_range(&mut tx, doc, "", Pos::new(0, 1), Some(Pos::new(0, 5)), None)
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "af");
    assert_eq!(ws.find_marker(id).unwrap(), None);

    ws.undo(&mut tx, doc).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abcdef");
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 2), (0, 4)));
}

#[test]
fn test_bookmark_insert_left() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let right = ws
        .set_bookmark(&mut tx, doc, Pos::new(0, 3), BookmarkOptions::default())
        .unwrap();
    let left = ws
        .set_bookmark(
            &mut tx,
            doc,
            Pos::new(0, 3),
            BookmarkOptions {
                insert_left: true,
                ..BookmarkOptions::default()
            },
        )
        .unwrap();
    ws.replace_range(&mut tx, doc, "XX", Pos::new(0, 3), None, None).unwrap();
    assert_eq!(ws.find_marker(right).unwrap(), range((0, 3), (0, 3)));
    assert_eq!(ws.find_marker(left).unwrap(), range((0, 5), (0, 5)));
}

#[test]
fn test_partially_overlapping_folds_are_rejected() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    ws.mark_text(&mut tx, doc, Pos::new(0, 1), Pos::new(0, 4), MarkOptions::collapsed())
        .unwrap();
    let overlap = ws.mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 5), MarkOptions::collapsed());
    assert!(matches!(overlap, Err(DocError::CollapsedOverlap)));
    let overlap = ws.mark_text(&mut tx, doc, Pos::new(0, 0), Pos::new(0, 2), MarkOptions::collapsed());
    assert!(matches!(overlap, Err(DocError::CollapsedOverlap)));

    // Nested and adjacent folds are fine.
    ws.mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 3), MarkOptions::collapsed())
        .unwrap();
    ws.mark_text(&mut tx, doc, Pos::new(0, 4), Pos::new(0, 6), MarkOptions::collapsed())
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_all_marks().len(), 3);
}

#[test]
fn test_fold_hides_lines_until_cleared() {
    let (mut ws, mut tx, doc) = setup("a {\nb\nc\n} d");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    ws.on_event(doc, move |event| sink.lock().unwrap().push(event.clone()))
        .unwrap();

    let fold = ws
        .mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(3, 1), MarkOptions::collapsed())
        .unwrap();
    {
        let d = ws.doc(doc).unwrap();
        assert!(d.is_line_hidden(1));
        assert!(d.is_line_hidden(2));
        assert_eq!(d.height(), 1.0);
        assert_eq!(d.visual_line_no(2), 0);
        assert_eq!(d.visual_line_end_no(2), 4);
        assert!(d.marker(fold).unwrap().is_atomic());
    }

    ws.clear_marker(&mut tx, fold).unwrap();
    let d = ws.doc(doc).unwrap();
    assert!(!d.is_line_hidden(1));
    assert_eq!(d.height(), 4.0);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&DocEvent::MarkerCleared {
            doc,
            marker: fold,
            from_line: Some(0),
            to_line: Some(3),
        })
    );
    assert!(matches!(
        ws.clear_marker(&mut tx, fold),
        Err(DocError::UnknownMarker(_))
    ));
}

#[test]
fn test_read_only_marker_splits_and_blocks_edits() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    ws.replace_range(&mut tx, doc, "", Pos::new(0, 6), None, None).unwrap();
    ws.replace_range(&mut tx, doc, "g", Pos::new(0, 6), None, None).unwrap();
    assert_eq!(ws.history_size(doc).unwrap().undo, 1);

    let id = ws
        .mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 4), MarkOptions::read_only())
        .unwrap();
    // Marking read-only text resets the history.
    assert_eq!(ws.history_size(doc).unwrap().undo, 0);

    ws.replace_range(&mut tx, doc, "X", Pos::new(0, 0), Some(Pos::new(0, 7)), None)
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "Xcd");
    assert_eq!(ws.find_marker(id).unwrap(), range((0, 1), (0, 3)));

    ws.replace_range(&mut tx, doc, "Z", Pos::new(0, 2), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "Xcd");

    // The boundaries are not part of a non-inclusive marker.
    ws.replace_range(&mut tx, doc, "[", Pos::new(0, 1), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "X[cd");

    // set_value ignores read-only markers.
    ws.set_value(&mut tx, doc, "fresh").unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "fresh");
}

#[test]
fn test_cursor_is_pushed_out_of_atomic_marker() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    ws.mark_text(&mut tx, doc, Pos::new(0, 2), Pos::new(0, 4), MarkOptions::atomic())
        .unwrap();

    // Coming from the left, a jump inside stops at the near edge.
    ws.set_cursor(&mut tx, doc, Pos::new(0, 3), SelectionOptions::default())
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_cursor(CursorSide::Head), Pos::new(0, 2));

    // From the edge, the same move crosses the marker.
    ws.set_cursor(&mut tx, doc, Pos::new(0, 3), SelectionOptions::default())
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_cursor(CursorSide::Head), Pos::new(0, 4));

    // Moving left from the far edge jumps back over it.
    ws.set_cursor(&mut tx, doc, Pos::new(0, 3), SelectionOptions::default())
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_cursor(CursorSide::Head), Pos::new(0, 2));
}

#[test]
fn test_clear_on_enter_marker_disappears_when_entered() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let options = MarkOptions {
        clear_on_enter: true,
        ..MarkOptions::default()
    };
    let id = ws
        .mark_text(&mut tx, doc, Pos::new(0, 1), Pos::new(0, 5), options)
        .unwrap();
    ws.set_cursor(&mut tx, doc, Pos::new(0, 3), SelectionOptions::default())
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_cursor(CursorSide::Head), Pos::new(0, 3));
    assert!(ws.marker_doc(id).is_none());
    assert!(ws.doc(doc).unwrap().get_all_marks().is_empty());
}

#[test]
fn test_document_fully_atomic_suspends_editing() {
    let (mut ws, mut tx, doc) = setup("abc");
    let wall = ws
        .mark_text(
            &mut tx,
            doc,
            Pos::new(0, 0),
            Pos::new(0, 3),
            MarkOptions::atomic().inclusive(true, true),
        )
        .unwrap();

    ws.set_cursor(&mut tx, doc, Pos::new(0, 1), SelectionOptions::default())
        .unwrap();
    assert!(ws.doc(doc).unwrap().cant_edit());
    assert_eq!(ws.doc(doc).unwrap().get_cursor(CursorSide::Head), Pos::new(0, 0));

    ws.replace_range(&mut tx, doc, "X", Pos::new(0, 0), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc");

    ws.clear_marker(&mut tx, wall).unwrap();
    assert!(!ws.doc(doc).unwrap().cant_edit());
    ws.replace_range(&mut tx, doc, "X", Pos::new(0, 0), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "Xabc");
}

#[test]
fn test_add_to_history_makes_marking_undoable() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let options = MarkOptions {
        add_to_history: true,
        ..MarkOptions::class("spell")
    };
    ws.mark_text(&mut tx, doc, Pos::new(0, 1), Pos::new(0, 3), options)
        .unwrap();
    assert_eq!(ws.history_size(doc).unwrap().undo, 1);
    ws.undo(&mut tx, doc).unwrap();
    assert_eq!(ws.history_size(doc).unwrap().redo, 1);
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abcdef");
}

#[test]
fn test_find_marks_filters_by_kind() {
    let (mut ws, mut tx, doc) = setup("one\ntwo\nthree");
    let a = ws
        .mark_text(&mut tx, doc, Pos::new(0, 1), Pos::new(1, 2), MarkOptions::class("a"))
        .unwrap();
    let b = ws
        .mark_text(&mut tx, doc, Pos::new(2, 0), Pos::new(2, 3), MarkOptions::read_only())
        .unwrap();
    let d = ws.doc(doc).unwrap();
    assert_eq!(d.find_marks(Pos::new(0, 0), Pos::new(2, 5), |_| true), vec![a, b]);
    assert_eq!(
        d.find_marks(Pos::new(0, 0), Pos::new(2, 5), |m| m.is_read_only()),
        vec![b]
    );
    assert_eq!(d.find_marks_at(Pos::new(1, 0)), vec![a]);
}
