use editor_buffer::{
    DocError, DocId, DocOptions, LinkOptions, MarkOptions, Origin, Pos, TransactionContext,
    Workspace,
};
use pretty_assertions::assert_eq;

fn value(ws: &Workspace, doc: DocId) -> String {
    ws.doc(doc).unwrap().get_value(None)
}

fn paste(ws: &mut Workspace, tx: &mut TransactionContext, doc: DocId, text: &str, at: Pos) {
    ws.replace_range(tx, doc, text, at, None, Some(Origin::paste()))
        .unwrap();
}

fn linked(text: &str, options: LinkOptions) -> (Workspace, TransactionContext, DocId, DocId) {
    let mut ws = Workspace::new();
    let mut tx = TransactionContext::new();
    let root = ws.open(text, DocOptions::default());
    let copy = ws.linked_doc(&mut tx, root, options).unwrap();
    (ws, tx, root, copy)
}

#[test]
fn test_edits_propagate_both_ways() {
    let (mut ws, mut tx, root, copy) = linked("one\ntwo", LinkOptions::default());
    assert_eq!(value(&ws, copy), "one\ntwo");

    paste(&mut ws, &mut tx, root, "1", Pos::new(0, 3));
    assert_eq!(value(&ws, copy), "one1\ntwo");
    paste(&mut ws, &mut tx, copy, "\nthree", Pos::new(1, 3));
    assert_eq!(value(&ws, root), "one1\ntwo\nthree");

    assert_eq!(ws.iter_linked_docs(root).unwrap(), vec![(copy, false)]);
}

#[test]
fn test_sub_range_follows_edits_above_it() {
    let options = LinkOptions {
        from: Some(2),
        to: Some(4),
        shared_hist: false,
    };
    let (mut ws, mut tx, root, copy) = linked("l0\nl1\nl2\nl3\nl4", options);
    {
        let d = ws.doc(copy).unwrap();
        assert_eq!(d.first_line(), 2);
        assert_eq!(d.get_value(None), "l2\nl3");
    }

    paste(&mut ws, &mut tx, root, "x\n", Pos::new(0, 0));
    assert_eq!(ws.doc(copy).unwrap().first_line(), 3);
    assert_eq!(ws.doc(copy).unwrap().get_line(3).unwrap(), "l2");

    paste(&mut ws, &mut tx, copy, "Y", Pos::new(3, 0));
    assert_eq!(ws.doc(root).unwrap().get_line(3).unwrap(), "Yl2");

    // Edits below the range leave the sub-document alone.
    paste(&mut ws, &mut tx, root, "z", Pos::new(5, 0));
    assert_eq!(value(&ws, copy), "Yl2\nl3");
}

#[test]
fn test_shared_history_undoes_edits_from_either_side() {
    let options = LinkOptions {
        shared_hist: true,
        ..LinkOptions::default()
    };
    let (mut ws, mut tx, root, copy) = linked("abc", options);
    paste(&mut ws, &mut tx, copy, "X", Pos::new(0, 0));
    assert_eq!(ws.history_size(root).unwrap().undo, 1);

    ws.undo(&mut tx, root).unwrap();
    assert_eq!(value(&ws, root), "abc");
    assert_eq!(value(&ws, copy), "abc");
    ws.redo(&mut tx, copy).unwrap();
    assert_eq!(value(&ws, root), "Xabc");
}

#[test]
fn test_separate_histories_shift_past_linked_edits() {
    let (mut ws, mut tx, root, copy) = linked("one\ntwo\nthree", LinkOptions::default());
    paste(&mut ws, &mut tx, root, "X", Pos::new(2, 0));
    paste(&mut ws, &mut tx, copy, "new\n", Pos::new(0, 0));
    assert_eq!(ws.history_size(root).unwrap().undo, 1);

    ws.undo(&mut tx, root).unwrap();
    assert_eq!(value(&ws, root), "new\none\ntwo\nthree");
    assert_eq!(value(&ws, copy), "new\none\ntwo\nthree");
}

#[test]
fn test_colliding_linked_edit_drops_history() {
    let (mut ws, mut tx, root, copy) = linked("one\ntwo", LinkOptions::default());
    paste(&mut ws, &mut tx, root, "A", Pos::new(0, 0));
    paste(&mut ws, &mut tx, copy, "B", Pos::new(0, 0));
    assert_eq!(value(&ws, root), "BAone\ntwo");

    // The root's own event touched the same line and is gone.
    assert_eq!(ws.history_size(root).unwrap().undo, 0);
    ws.undo(&mut tx, root).unwrap();
    assert_eq!(value(&ws, root), "BAone\ntwo");

    assert_eq!(ws.history_size(copy).unwrap().undo, 1);
    ws.undo(&mut tx, copy).unwrap();
    assert_eq!(value(&ws, root), "Aone\ntwo");
}

#[test]
fn test_unlink_stops_propagation_and_splits_history() {
    let options = LinkOptions {
        shared_hist: true,
        ..LinkOptions::default()
    };
    let (mut ws, mut tx, root, copy) = linked("abc", options);
    paste(&mut ws, &mut tx, root, "Z", Pos::new(0, 3));
    ws.unlink_doc(root, copy).unwrap();
    assert!(ws.iter_linked_docs(root).unwrap().is_empty());
    assert!(matches!(
        ws.unlink_doc(root, copy),
        Err(DocError::NotLinked(..))
    ));

    paste(&mut ws, &mut tx, root, "!", Pos::new(0, 0));
    assert_eq!(value(&ws, copy), "abcZ");

    assert_eq!(ws.history_size(copy).unwrap().undo, 1);
    ws.undo(&mut tx, copy).unwrap();
    assert_eq!(value(&ws, copy), "abc");
    assert_eq!(value(&ws, root), "!abcZ");
}

#[test]
fn test_shared_markers_mirror_into_linked_docs() {
    let (mut ws, mut tx, root, copy) = linked("abc\ndef", LinkOptions::default());
    let marker = ws
        .mark_text(
            &mut tx,
            root,
            Pos::new(0, 1),
            Pos::new(1, 1),
            MarkOptions::default().shared(true),
        )
        .unwrap();
    let mirrored = ws.doc(copy).unwrap().get_all_marks();
    assert_eq!(mirrored.len(), 1);
    let twin = ws.doc(copy).unwrap().marker(mirrored[0]).unwrap();
    assert_eq!(twin.shared_group(), Some(marker));

    // A document linked later picks up the shared marker as well.
    let late = ws.linked_doc(&mut tx, root, LinkOptions::default()).unwrap();
    assert_eq!(ws.doc(late).unwrap().get_all_marks().len(), 1);

    ws.clear_marker(&mut tx, mirrored[0]).unwrap();
    assert!(ws.doc(root).unwrap().get_all_marks().is_empty());
    assert!(ws.doc(copy).unwrap().get_all_marks().is_empty());
    assert!(ws.doc(late).unwrap().get_all_marks().is_empty());
}

#[test]
fn test_closing_a_linked_doc_unlinks_it() {
    let (mut ws, mut tx, root, copy) = linked("abc", LinkOptions::default());
    ws.close_document(copy).unwrap();
    assert!(ws.doc(copy).is_err());
    assert!(ws.iter_linked_docs(root).unwrap().is_empty());
    paste(&mut ws, &mut tx, root, "x", Pos::new(0, 0));
    assert_eq!(value(&ws, root), "xabc");
    assert_eq!(ws.len(), 1);
}
