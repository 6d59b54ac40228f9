use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_buffer::{DocOptions, MarkOptions, Pos, TransactionContext, Workspace};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (editor-buffer benchmark line)\n"
        ));
    }
    out.pop();
    out
}

fn bench_large_file_open(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("large_file_open/50k_lines", |b| {
        b.iter(|| {
            let mut ws = Workspace::new();
            let doc = ws.open(black_box(&text), DocOptions::default());
            black_box(ws.doc(doc).map(|d| d.line_count()).unwrap_or(0));
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || {
                let mut ws = Workspace::new();
                let doc = ws.open(&text, DocOptions::default());
                (ws, doc)
            },
            |(mut ws, doc)| {
                let mut tx = TransactionContext::new();
                let mut at = Pos::new(25_000, 10);
                for _ in 0..100 {
                    ws.replace_range(&mut tx, doc, "x", at, None, None).unwrap();
                    at.ch += 1;
                }
                black_box(ws.doc(doc).unwrap().line_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_line_lookup(c: &mut Criterion) {
    let text = large_text(50_000);
    let mut ws = Workspace::new();
    let doc = ws.open(&text, DocOptions::default());
    let d = ws.doc(doc).unwrap();

    c.bench_function("line_lookup/by_number_and_height", |b| {
        b.iter(|| {
            for n in (0..50_000).step_by(997) {
                black_box(d.get_line(n).unwrap());
                black_box(d.line_at_height(n as f64 + 0.5));
            }
        })
    });
}

fn bench_undo_redo(c: &mut Criterion) {
    let text = large_text(10_000);
    c.bench_function("undo_redo/50_events", |b| {
        b.iter_batched(
            || {
                let mut ws = Workspace::new();
                let doc = ws.open(&text, DocOptions::default());
                let mut tx = TransactionContext::new();
                for i in 0..50 {
                    ws.replace_range(&mut tx, doc, "edit\n", Pos::new(i * 100, 0), None, None)
                        .unwrap();
                }
                (ws, doc, tx)
            },
            |(mut ws, doc, mut tx)| {
                for _ in 0..50 {
                    ws.undo(&mut tx, doc).unwrap();
                }
                for _ in 0..50 {
                    ws.redo(&mut tx, doc).unwrap();
                }
                black_box(ws.doc(doc).unwrap().line_count());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_fold_many_regions(c: &mut Criterion) {
    let text = large_text(20_000);
    c.bench_function("folding/1k_collapsed_regions", |b| {
        b.iter_batched(
            || {
                let mut ws = Workspace::new();
                let doc = ws.open(&text, DocOptions::default());
                (ws, doc)
            },
            |(mut ws, doc)| {
                let mut tx = TransactionContext::new();
                for i in 0..1_000 {
                    let start = i * 20;
                    ws.mark_text(
                        &mut tx,
                        doc,
                        Pos::new(start, 6),
                        Pos::new(start + 10, 0),
                        MarkOptions::collapsed(),
                    )
                    .unwrap();
                }
                black_box(ws.doc(doc).unwrap().height());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_large_file_open,
    bench_typing_in_middle,
    bench_line_lookup,
    bench_undo_redo,
    bench_fold_many_regions
);
criterion_main!(benches);
