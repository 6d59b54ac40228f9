use editor_buffer::{Line, LineTree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn lines(prefix: &str, count: usize) -> Vec<Line> {
    (0..count)
        .map(|i| Line::new(format!("{prefix}{i}"), 1.0 + (i % 3) as f64))
        .collect()
}

fn texts(tree: &LineTree) -> Vec<String> {
    tree.get_lines(tree.first(), tree.first() + tree.len())
}

#[test]
fn test_random_edits_match_vec_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut tree = LineTree::new(0, lines("init", 40));
    let mut model: Vec<String> = texts(&tree);

    for round in 0..400 {
        if rng.gen_bool(0.55) || model.len() < 5 {
            let at = rng.gen_range(0..=model.len());
            let count = rng.gen_range(1..30);
            let added = lines(&format!("r{round}-"), count);
            let added_text: Vec<String> = added.iter().map(|l| l.text().to_string()).collect();
            tree.insert(at, added);
            model.splice(at..at, added_text);
        } else {
            let at = rng.gen_range(0..model.len());
            let count = rng.gen_range(1..=(model.len() - at).min(40));
            let removed = tree.remove(at, count);
            assert_eq!(removed.len(), count);
            model.drain(at..at + count);
        }
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), model.len());
    }

    assert_eq!(texts(&tree), model);
}

#[test]
fn test_handles_survive_unrelated_edits() {
    let mut tree = LineTree::new(0, lines("l", 100));
    let watched = tree.handle_at(70).unwrap();

    tree.insert(10, lines("new", 25));
    assert_eq!(tree.line_number(watched), Some(95));
    tree.remove(0, 50);
    assert_eq!(tree.line_number(watched), Some(45));
    assert_eq!(tree.line(watched).unwrap().text(), "l70");

    let removed = tree.remove(45, 1);
    assert_eq!(removed[0].0, watched);
    assert!(!removed[0].1.is_attached());
    assert_eq!(tree.line_number(watched), None);
    assert!(tree.line(watched).is_none());
    tree.check_invariants().unwrap();
}

#[test]
fn test_height_queries() {
    let mut tree = LineTree::new(5, (0..300).map(|i| Line::new(format!("{i}"), 2.0)).collect());
    assert_eq!(tree.height(), 600.0);
    assert_eq!(tree.line_at_height(0.0), 5);
    assert_eq!(tree.line_at_height(1.9), 5);
    assert_eq!(tree.line_at_height(2.0), 6);
    assert_eq!(tree.line_at_height(599.0), 304);
    assert_eq!(tree.line_at_height(10_000.0), 305);

    let handle = tree.handle_at(105).unwrap();
    assert_eq!(tree.height_at_line(handle), Some(200.0));
    tree.update_line_height(tree.handle_at(5).unwrap(), 12.0);
    assert_eq!(tree.height(), 610.0);
    assert_eq!(tree.height_at_line(handle), Some(210.0));
    assert_eq!(tree.line_at_height(11.0), 5);
    assert_eq!(tree.line_at_height(12.0), 6);
    tree.check_invariants().unwrap();
}

#[test]
fn test_tree_grows_and_shrinks() {
    let mut tree = LineTree::new(0, lines("x", 1));
    assert_eq!(tree.depth(), 2);
    tree.insert(1, lines("y", 5_000));
    assert!(tree.depth() > 2);
    tree.check_invariants().unwrap();
    tree.remove(0, 4_990);
    tree.check_invariants().unwrap();
    assert_eq!(tree.len(), 11);
    assert_eq!(texts(&tree)[0], "y4989");
}

#[test]
fn test_out_of_range_lookup_is_an_error() {
    let tree = LineTree::new(10, lines("a", 3));
    assert!(tree.handle_at(9).is_err());
    assert!(tree.handle_at(13).is_err());
    assert!(tree.get_line(12).is_ok());
    assert_eq!(tree.last(), 12);
    assert!(tree.contains_line(10));
    assert!(!tree.contains_line(13));
}
