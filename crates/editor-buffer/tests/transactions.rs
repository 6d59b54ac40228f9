use editor_buffer::{
    AppliedChange, Collapse, DocEvent, DocId, DocOptions, MarkOptions, Origin, Pos,
    TransactionContext, Workspace,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn kind(event: &DocEvent) -> &'static str {
    match event {
        DocEvent::Changes { .. } => "changes",
        DocEvent::Change { .. } => "change",
        DocEvent::CursorActivity { .. } => "cursor",
        DocEvent::ScrollIntoView { .. } => "scroll",
        DocEvent::MarkerCleared { .. } => "cleared",
        DocEvent::HistoryAdded { .. } => "history",
    }
}

fn record(ws: &mut Workspace, doc: DocId) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    ws.on_event(doc, move |event| {
        sink.lock().unwrap().push(kind(event).to_string());
    })
    .unwrap();
    log
}

fn setup(text: &str) -> (Workspace, TransactionContext, DocId) {
    init_tracing();
    let mut ws = Workspace::new();
    let doc = ws.open(text, DocOptions::default());
    (ws, TransactionContext::new(), doc)
}

#[test]
fn test_events_arrive_in_phase_order() {
    let (mut ws, mut tx, doc) = setup("");
    let log = record(&mut ws, doc);
    ws.operation(&mut tx, |ws, tx| {
        ws.replace_selection(tx, doc, "a", Collapse::End, None)?;
        ws.replace_selection(tx, doc, "b", Collapse::End, None)
    })
    .unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["changes", "change", "change", "cursor", "scroll", "history"]
    );
}

#[test]
fn test_nothing_is_delivered_while_open() {
    let (mut ws, mut tx, doc) = setup("abc");
    let log = record(&mut ws, doc);
    ws.start_operation(&mut tx);
    ws.replace_range(&mut tx, doc, "x", Pos::new(0, 0), None, None).unwrap();
    ws.start_operation(&mut tx);
    ws.replace_range(&mut tx, doc, "y", Pos::new(0, 4), None, None).unwrap();
    ws.end_operation(&mut tx);
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(tx.depth(), 1);

    ws.end_operation(&mut tx);
    assert!(!tx.is_open());
    let log = log.lock().unwrap();
    assert_eq!(log.iter().filter(|k| *k == "change").count(), 2);
    assert_eq!(log.iter().filter(|k| *k == "history").count(), 1);
}

#[test]
fn test_change_event_carries_removed_text() {
    let (mut ws, mut tx, doc) = setup("abc\nd");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ws.on_event(doc, move |event| {
        if let DocEvent::Change { change, .. } = event {
            sink.lock().unwrap().push(change.clone());
        }
    })
    .unwrap();
    ws.replace_range(
        &mut tx,
        doc,
        "x\ny",
        Pos::new(0, 1),
        Some(Pos::new(1, 0)),
        Some(Origin::paste()),
    )
    .unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![AppliedChange {
            from: Pos::new(0, 1),
            to: Pos::new(1, 0),
            text: vec!["x".to_string(), "y".to_string()],
            removed: vec!["bc".to_string(), String::new()],
            origin: Some(Origin::paste()),
        }]
    );
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "ax\nyd");
}

#[test]
fn test_delayed_events_follow_raise_order() {
    let (mut ws, mut tx, doc) = setup("abcdef");
    let log = record(&mut ws, doc);
    ws.operation(&mut tx, |ws, tx| {
        let marker = ws.mark_text(tx, doc, Pos::new(0, 1), Pos::new(0, 3), MarkOptions::default())?;
        ws.replace_range(tx, doc, "x", Pos::new(0, 5), None, None)?;
        ws.clear_marker(tx, marker)
    })
    .unwrap();
    let log = log.lock().unwrap();
    let delayed: Vec<&str> = log
        .iter()
        .map(String::as_str)
        .filter(|k| matches!(*k, "history" | "cleared"))
        .collect();
    assert_eq!(delayed, vec!["history", "cleared"]);
    assert_eq!(log.first().map(String::as_str), Some("changes"));
}

#[test]
fn test_run_later_runs_after_callbacks_with_full_access() {
    let (mut ws, mut tx, doc) = setup("abc");
    let log = record(&mut ws, doc);
    let sink = Arc::clone(&log);
    ws.operation(&mut tx, |ws, tx| {
        ws.replace_range(tx, doc, "1", Pos::new(0, 3), None, None)?;
        tx.run_later(move |ws, tx| {
            sink.lock().unwrap().push("later".to_string());
            ws.replace_range(tx, doc, "2", Pos::new(0, 4), None, None)
                .unwrap();
        });
        Ok(())
    })
    .unwrap();

    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc12");
    let log = log.lock().unwrap();
    let later = log.iter().position(|k| k == "later").unwrap();
    assert!(log[..later].iter().any(|k| k == "change"));
    // The deferred edit ran in its own operation.
    assert!(log[later + 1..].iter().any(|k| k == "change"));
}

#[test]
fn test_run_later_outside_operation_waits_for_tick() {
    let (mut ws, mut tx, doc) = setup("abc");
    tx.run_later(move |ws, tx| {
        ws.replace_range(tx, doc, "!", Pos::new(0, 0), None, None)
            .unwrap();
    });
    assert_eq!(tx.pending_ticks(), 1);
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc");

    ws.run_tick(&mut tx);
    assert_eq!(tx.pending_ticks(), 0);
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "!abc");
}

#[test]
fn test_before_change_filter_rewrites_and_cancels() {
    let (mut ws, mut tx, doc) = setup("");
    ws.on_before_change(doc, |request| {
        if request.origin().map(Origin::label) == Some("blocked") {
            request.cancel();
            return;
        }
        let upper = request.text().iter().map(|t| t.to_uppercase()).collect();
        request.update(None, None, Some(upper), None);
    })
    .unwrap();

    ws.replace_selection(&mut tx, doc, "abc", Collapse::End, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "ABC");
    ws.replace_range(
        &mut tx,
        doc,
        "nope",
        Pos::new(0, 0),
        None,
        Some(Origin::named("blocked")),
    )
    .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "ABC");
    assert_eq!(ws.history_size(doc).unwrap().undo, 1);
}

#[test]
fn test_history_replays_can_only_be_canceled() {
    let (mut ws, mut tx, doc) = setup("abc");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ws.on_before_change(doc, move |request| {
        let label = request.origin().map(|o| o.label().to_string());
        let updated = request.update(None, None, Some(vec!["?".to_string()]), None);
        sink.lock().unwrap().push((label, updated));
    })
    .unwrap();

    ws.replace_range(&mut tx, doc, "x", Pos::new(0, 3), None, Some(Origin::paste()))
        .unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc?");
    ws.undo(&mut tx, doc).unwrap();
    assert_eq!(ws.doc(doc).unwrap().get_value(None), "abc");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Some("paste".to_string()), true),
            (Some("undo".to_string()), false),
        ]
    );
}

#[test]
fn test_edits_pull_the_frontier_back() {
    let text = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
    let (mut ws, mut tx, doc) = setup(&text);
    ws.set_frontier(doc, 15).unwrap();
    ws.replace_range(&mut tx, doc, "x", Pos::new(17, 0), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().frontier(), 15);
    ws.replace_range(&mut tx, doc, "x", Pos::new(4, 2), None, None).unwrap();
    assert_eq!(ws.doc(doc).unwrap().frontier(), 4);
}
