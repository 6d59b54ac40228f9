//! Line storage tree.
//!
//! A shallow B-tree over [`Line`]s supporting O(log n) line-number ↔ line and
//! height ↔ line queries plus splicing of contiguous line runs.
//!
//! Nodes and lines live in arenas and refer to each other through handles: a node's
//! children are [`NodeId`]s, a line's `parent` is the `NodeId` of its leaf. Parent links
//! are used only to recover a line's number (and its height offset) by walking upward.
//!
//! Shape rules:
//! - the root is always a branch;
//! - a leaf holding more than 50 lines is cut into 25-line leaves;
//! - a branch with more than 10 children spills groups of 5 into new sibling branches,
//!   and the tree only grows a level when the root itself overflows;
//! - a branch whose size drops below 25 lines collapses into a single leaf.

use crate::error::DocError;
use crate::line::{Line, LineHandle};
use tracing::trace;

const MAX_LEAF_LINES: usize = 50;
const LEAF_CHUNK: usize = 25;
const MAX_BRANCH_CHILDREN: usize = 10;
const SPILL_COUNT: usize = 5;
const COLLAPSE_BELOW: usize = 25;
const HEIGHT_EPSILON: f64 = 1e-6;

/// Handle of a tree node (leaf or branch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug)]
enum NodeKind {
    Leaf(Vec<LineHandle>),
    Branch(Vec<NodeId>),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    size: usize,
    height: f64,
    kind: NodeKind,
}

#[derive(Debug)]
struct LineSlot {
    generation: u32,
    line: Option<Line>,
}

/// Line storage tree.
///
/// # Example
///
/// ```rust
/// use editor_buffer::{Line, LineTree};
///
/// let mut tree = LineTree::new(0, vec![Line::new("a", 1.0), Line::new("b", 1.0)]);
/// let extra: Vec<Line> = (0..60).map(|i| Line::new(format!("x{i}"), 1.0)).collect();
/// tree.insert(1, extra);
///
/// assert_eq!(tree.len(), 62);
/// let handle = tree.handle_at(61).unwrap();
/// assert_eq!(tree.line(handle).unwrap().text(), "b");
/// assert_eq!(tree.line_number(handle), Some(61));
/// ```
#[derive(Debug)]
pub struct LineTree {
    first: usize,
    root: NodeId,
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<u32>,
    lines: Vec<LineSlot>,
    free_lines: Vec<u32>,
}

impl LineTree {
    /// Build a tree whose first line has number `first`.
    pub fn new(first: usize, lines: Vec<Line>) -> Self {
        let mut tree = Self {
            first,
            root: NodeId(0),
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            lines: Vec::new(),
            free_lines: Vec::new(),
        };
        let leaf = tree.alloc_node(Node {
            parent: None,
            size: 0,
            height: 0.0,
            kind: NodeKind::Leaf(Vec::new()),
        });
        tree.root = tree.alloc_node(Node {
            parent: None,
            size: 0,
            height: 0.0,
            kind: NodeKind::Branch(vec![leaf]),
        });
        tree.node_mut(leaf).parent = Some(tree.root);
        if !lines.is_empty() {
            tree.insert(first, lines);
        }
        tree
    }

    /// Number of the first stored line.
    pub fn first(&self) -> usize {
        self.first
    }

    pub(crate) fn set_first(&mut self, first: usize) {
        self.first = first;
    }

    /// Number of stored lines.
    pub fn len(&self) -> usize {
        self.node(self.root).size
    }

    /// Whether the tree holds no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of the last stored line.
    pub fn last(&self) -> usize {
        (self.first + self.len()).saturating_sub(1)
    }

    /// Sum of all line heights.
    pub fn height(&self) -> f64 {
        self.node(self.root).height
    }

    /// Whether `n` is a valid line number.
    pub fn contains_line(&self, n: usize) -> bool {
        n >= self.first && n < self.first + self.len()
    }

    /// Borrow a line through its handle. Stale handles yield `None`.
    pub fn line(&self, handle: LineHandle) -> Option<&Line> {
        let slot = self.lines.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.line.as_ref()
    }

    /// Mutably borrow a line through its handle.
    pub fn line_mut(&mut self, handle: LineHandle) -> Option<&mut Line> {
        let slot = self.lines.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.line.as_mut()
    }

    /// Handle of line number `n`.
    pub fn handle_at(&self, n: usize) -> Result<LineHandle, DocError> {
        if !self.contains_line(n) {
            return Err(DocError::LineOutOfRange {
                line: n,
                first: self.first,
                size: self.len(),
            });
        }
        let mut n = n - self.first;
        let mut node = self.root;
        loop {
            match &self.node(node).kind {
                NodeKind::Leaf(lines) => return Ok(lines[n]),
                NodeKind::Branch(children) => {
                    let mut next = None;
                    for &child in children {
                        let size = self.node(child).size;
                        if n < size {
                            next = Some(child);
                            break;
                        }
                        n -= size;
                    }
                    match next {
                        Some(child) => node = child,
                        None => {
                            return Err(DocError::LineOutOfRange {
                                line: n + self.first,
                                first: self.first,
                                size: self.len(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Line number `n`.
    pub fn get_line(&self, n: usize) -> Result<&Line, DocError> {
        let handle = self.handle_at(n)?;
        self.line(handle).ok_or(DocError::LineOutOfRange {
            line: n,
            first: self.first,
            size: self.len(),
        })
    }

    /// Absolute number of a line, or `None` if the line has been removed.
    pub fn line_number(&self, handle: LineHandle) -> Option<usize> {
        let line = self.line(handle)?;
        let mut cur = line.parent?;
        let mut no = match &self.node(cur).kind {
            NodeKind::Leaf(lines) => lines.iter().position(|h| *h == handle)?,
            NodeKind::Branch(_) => return None,
        };
        while let Some(parent) = self.node(cur).parent {
            for &child in self.children(parent) {
                if child == cur {
                    break;
                }
                no += self.node(child).size;
            }
            cur = parent;
        }
        Some(no + self.first)
    }

    /// Number of the line covering vertical offset `h` (measured from the top of the
    /// first line). Offsets past the end return `first + len()`.
    pub fn line_at_height(&self, h: f64) -> usize {
        let mut h = h;
        let mut n = self.first;
        let mut node = self.root;
        'descend: loop {
            match &self.node(node).kind {
                NodeKind::Branch(children) => {
                    for &child in children {
                        let child_height = self.node(child).height;
                        if h < child_height {
                            node = child;
                            continue 'descend;
                        }
                        h -= child_height;
                        n += self.node(child).size;
                    }
                    return n;
                }
                NodeKind::Leaf(lines) => {
                    let mut i = 0;
                    for handle in lines {
                        let line_height = self.line(*handle).map_or(0.0, |l| l.height);
                        if h < line_height {
                            break;
                        }
                        h -= line_height;
                        i += 1;
                    }
                    return n + i;
                }
            }
        }
    }

    /// Vertical offset of the top of a line.
    pub fn height_at_line(&self, handle: LineHandle) -> Option<f64> {
        let line = self.line(handle)?;
        let mut chunk = line.parent?;
        let mut h = 0.0;
        if let NodeKind::Leaf(lines) = &self.node(chunk).kind {
            for other in lines {
                if *other == handle {
                    break;
                }
                h += self.line(*other).map_or(0.0, |l| l.height);
            }
        }
        while let Some(parent) = self.node(chunk).parent {
            for &child in self.children(parent) {
                if child == chunk {
                    break;
                }
                h += self.node(child).height;
            }
            chunk = parent;
        }
        Some(h)
    }

    /// Set a line's height and propagate the difference to every ancestor.
    pub fn update_line_height(&mut self, handle: LineHandle, height: f64) {
        let height = height.max(0.0);
        let Some(line) = self.line_mut(handle) else {
            return;
        };
        let diff = height - line.height;
        line.height = height;
        if diff == 0.0 {
            return;
        }
        let mut cur = line.parent;
        while let Some(node) = cur {
            let node = self.node_mut(node);
            node.height += diff;
            cur = node.parent;
        }
    }

    /// Insert `lines` so that the first of them gets number `at`.
    pub fn insert(&mut self, at: usize, lines: Vec<Line>) -> Vec<LineHandle> {
        let height: f64 = lines.iter().map(|l| l.height).sum();
        let handles: Vec<LineHandle> = lines.into_iter().map(|l| self.alloc_line(l)).collect();
        if handles.is_empty() {
            return handles;
        }
        let at = at.saturating_sub(self.first).min(self.len());
        self.insert_inner(self.root, at, &handles, height);
        handles
    }

    /// Remove `count` lines starting at line number `at`, returning them (detached) with
    /// their former handles.
    pub fn remove(&mut self, at: usize, count: usize) -> Vec<(LineHandle, Line)> {
        let at = at.saturating_sub(self.first);
        let count = count.min(self.len().saturating_sub(at));
        let mut removed = Vec::with_capacity(count);
        if count > 0 {
            self.remove_inner(self.root, at, count, &mut removed);
        }
        removed
    }

    /// Handles of lines `[from, to)` (clamped to the document).
    pub fn handles(&self, from: usize, to: usize) -> Vec<LineHandle> {
        let from = from.max(self.first);
        let to = to.min(self.first + self.len());
        let mut out = Vec::with_capacity(to.saturating_sub(from));
        if from < to {
            self.collect_range(self.root, from - self.first, to - from, &mut out);
        }
        out
    }

    /// Iterate lines `[from, to)` with their numbers.
    pub fn iter_range(
        &self,
        from: usize,
        to: usize,
    ) -> impl Iterator<Item = (usize, LineHandle, &Line)> + '_ {
        let start = from.max(self.first);
        self.handles(from, to)
            .into_iter()
            .enumerate()
            .filter_map(move |(i, h)| self.line(h).map(|line| (start + i, h, line)))
    }

    /// Text of lines `[from, to)`.
    pub fn get_lines(&self, from: usize, to: usize) -> Vec<String> {
        self.iter_range(from, to)
            .map(|(_, _, line)| line.text.clone())
            .collect()
    }

    /// Depth of the tree (a root with only leaf children has depth 2).
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self.root;
        while let NodeKind::Branch(children) = &self.node(node).kind {
            depth += 1;
            match children.first() {
                Some(child) => node = *child,
                None => break,
            }
        }
        depth
    }

    /// Number of children of the root branch.
    pub fn root_child_count(&self) -> usize {
        self.children(self.root).len()
    }

    /// Verify size/height aggregates, parent links and node capacities.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.node(self.root).parent.is_some() {
            return Err("root has a parent".to_string());
        }
        self.check_node(self.root).map(|_| ())
    }

    fn check_node(&self, id: NodeId) -> Result<(usize, f64), String> {
        let node = self.node(id);
        let (size, height) = match &node.kind {
            NodeKind::Leaf(lines) => {
                if lines.len() > MAX_LEAF_LINES {
                    return Err(format!("leaf {id:?} holds {} lines", lines.len()));
                }
                let mut height = 0.0;
                for handle in lines {
                    let line = self
                        .line(*handle)
                        .ok_or_else(|| format!("leaf {id:?} holds stale handle {handle:?}"))?;
                    if line.parent != Some(id) {
                        return Err(format!("line {handle:?} has wrong parent"));
                    }
                    if line.height < 0.0 {
                        return Err(format!("line {handle:?} has negative height"));
                    }
                    height += line.height;
                }
                (lines.len(), height)
            }
            NodeKind::Branch(children) => {
                if children.len() > MAX_BRANCH_CHILDREN {
                    return Err(format!("branch {id:?} has {} children", children.len()));
                }
                let mut size = 0;
                let mut height = 0.0;
                for &child in children {
                    if self.node(child).parent != Some(id) {
                        return Err(format!("node {child:?} has wrong parent"));
                    }
                    let (s, h) = self.check_node(child)?;
                    size += s;
                    height += h;
                }
                (size, height)
            }
        };
        if size != node.size {
            return Err(format!("node {id:?} caches size {} but holds {size}", node.size));
        }
        if (height - node.height).abs() > HEIGHT_EPSILON {
            return Err(format!(
                "node {id:?} caches height {} but holds {height}",
                node.height
            ));
        }
        Ok((size, height))
    }

    fn insert_inner(&mut self, node: NodeId, at: usize, lines: &[LineHandle], height: f64) {
        {
            let n = self.node_mut(node);
            n.size += lines.len();
            n.height += height;
        }
        let children = self.children(node).to_vec();
        let mut at = at;
        for (i, child) in children.into_iter().enumerate() {
            let size = self.node(child).size;
            if at <= size {
                if self.is_leaf(child) {
                    self.leaf_insert(child, at, lines, height);
                    if self.leaf_len(child) > MAX_LEAF_LINES {
                        self.split_leaf(node, i, child);
                        self.maybe_spill(node);
                    }
                } else {
                    self.insert_inner(child, at, lines, height);
                }
                break;
            }
            at -= size;
        }
    }

    fn leaf_insert(&mut self, leaf: NodeId, at: usize, lines: &[LineHandle], height: f64) {
        for handle in lines {
            if let Some(line) = self.line_mut(*handle) {
                line.parent = Some(leaf);
            }
        }
        let node = self.node_mut(leaf);
        node.size += lines.len();
        node.height += height;
        if let NodeKind::Leaf(existing) = &mut node.kind {
            existing.splice(at..at, lines.iter().copied());
        }
    }

    /// Cut an oversized leaf into 25-line chunks placed right after it.
    fn split_leaf(&mut self, parent: NodeId, index: usize, leaf: NodeId) {
        let lines = match &mut self.node_mut(leaf).kind {
            NodeKind::Leaf(lines) => std::mem::take(lines),
            NodeKind::Branch(_) => return,
        };
        let total = lines.len();
        let remaining = total % LEAF_CHUNK + LEAF_CHUNK;
        let mut insert_at = index + 1;
        let mut pos = remaining;
        while pos < total {
            let chunk = lines[pos..(pos + LEAF_CHUNK).min(total)].to_vec();
            let chunk_height: f64 = chunk
                .iter()
                .filter_map(|h| self.line(*h))
                .map(|l| l.height)
                .sum();
            let new_leaf = self.alloc_node(Node {
                parent: Some(parent),
                size: chunk.len(),
                height: chunk_height,
                kind: NodeKind::Leaf(Vec::new()),
            });
            for handle in &chunk {
                if let Some(line) = self.line_mut(*handle) {
                    line.parent = Some(new_leaf);
                }
            }
            pos += chunk.len();
            self.node_mut(new_leaf).kind = NodeKind::Leaf(chunk);
            {
                let old = self.node_mut(leaf);
                old.height -= chunk_height;
            }
            if let NodeKind::Branch(children) = &mut self.node_mut(parent).kind {
                children.insert(insert_at, new_leaf);
            }
            insert_at += 1;
        }
        let mut lines = lines;
        lines.truncate(remaining);
        let node = self.node_mut(leaf);
        node.size = lines.len();
        node.kind = NodeKind::Leaf(lines);
        trace!(total, kept = remaining, "split leaf");
    }

    /// Move groups of children into new sibling branches until `node` is within capacity.
    fn maybe_spill(&mut self, node: NodeId) {
        if self.children(node).len() <= MAX_BRANCH_CHILDREN {
            return;
        }
        let mut me = node;
        loop {
            let spilled = match &mut self.node_mut(me).kind {
                NodeKind::Branch(children) => children.split_off(children.len() - SPILL_COUNT),
                NodeKind::Leaf(_) => return,
            };
            let sibling = self.new_branch(spilled);
            match self.node(me).parent {
                None => {
                    // The root keeps its identity: its remaining children move into a copy.
                    let rest = match &mut self.node_mut(me).kind {
                        NodeKind::Branch(children) => std::mem::take(children),
                        NodeKind::Leaf(_) => Vec::new(),
                    };
                    let copy = self.new_branch(rest);
                    self.node_mut(copy).parent = Some(me);
                    self.node_mut(sibling).parent = Some(me);
                    self.node_mut(me).kind = NodeKind::Branch(vec![copy, sibling]);
                    trace!("root overflow, tree grows a level");
                    me = copy;
                }
                Some(parent) => {
                    let (size, height) = {
                        let s = self.node(sibling);
                        (s.size, s.height)
                    };
                    {
                        let m = self.node_mut(me);
                        m.size -= size;
                        m.height -= height;
                    }
                    if let NodeKind::Branch(children) = &mut self.node_mut(parent).kind {
                        let idx = children.iter().position(|c| *c == me).unwrap_or(0);
                        children.insert(idx + 1, sibling);
                    }
                    self.node_mut(sibling).parent = Some(parent);
                    trace!("spilled {SPILL_COUNT} children into a sibling branch");
                }
            }
            if self.children(me).len() <= MAX_BRANCH_CHILDREN {
                break;
            }
        }
        if let Some(parent) = self.node(me).parent {
            self.maybe_spill(parent);
        }
    }

    fn remove_inner(
        &mut self,
        node: NodeId,
        at: usize,
        n: usize,
        removed: &mut Vec<(LineHandle, Line)>,
    ) {
        self.node_mut(node).size -= n;
        let mut at = at;
        let mut n = n;
        let mut i = 0;
        while i < self.children(node).len() {
            let child = self.children(node)[i];
            let size = self.node(child).size;
            if at < size {
                let rm = n.min(size - at);
                let old_height = self.node(child).height;
                if self.is_leaf(child) {
                    self.leaf_remove(child, at, rm, removed);
                } else {
                    self.remove_inner(child, at, rm, removed);
                }
                let new_height = self.node(child).height;
                self.node_mut(node).height -= old_height - new_height;
                if size == rm {
                    if let NodeKind::Branch(children) = &mut self.node_mut(node).kind {
                        children.remove(i);
                    }
                    self.free_subtree(child);
                } else {
                    i += 1;
                }
                n -= rm;
                if n == 0 {
                    break;
                }
                at = 0;
            } else {
                at -= size;
                i += 1;
            }
        }
        let children = self.children(node);
        let needs_collapse = self.node(node).size < COLLAPSE_BELOW
            && (children.len() != 1 || !self.is_leaf(children[0]));
        if needs_collapse {
            self.collapse(node);
        }
    }

    fn leaf_remove(
        &mut self,
        leaf: NodeId,
        at: usize,
        n: usize,
        removed: &mut Vec<(LineHandle, Line)>,
    ) {
        let handles: Vec<LineHandle> = match &mut self.node_mut(leaf).kind {
            NodeKind::Leaf(lines) => lines.drain(at..at + n).collect(),
            NodeKind::Branch(_) => return,
        };
        let mut height = 0.0;
        for handle in handles {
            if let Some(mut line) = self.free_line(handle) {
                height += line.height;
                line.parent = None;
                removed.push((handle, line));
            }
        }
        let node = self.node_mut(leaf);
        node.size -= n;
        node.height -= height;
    }

    /// Replace a branch's subtree by a single leaf holding all its lines.
    fn collapse(&mut self, node: NodeId) {
        let mut lines = Vec::with_capacity(self.node(node).size);
        let children = match &mut self.node_mut(node).kind {
            NodeKind::Branch(children) => std::mem::take(children),
            NodeKind::Leaf(_) => return,
        };
        for child in children {
            self.collect_all(child, &mut lines);
            self.free_subtree(child);
        }
        let height = self.node(node).height;
        let leaf = self.alloc_node(Node {
            parent: Some(node),
            size: lines.len(),
            height,
            kind: NodeKind::Leaf(Vec::new()),
        });
        for handle in &lines {
            if let Some(line) = self.line_mut(*handle) {
                line.parent = Some(leaf);
            }
        }
        trace!(lines = lines.len(), "collapsed branch into a single leaf");
        self.node_mut(leaf).kind = NodeKind::Leaf(lines);
        self.node_mut(node).kind = NodeKind::Branch(vec![leaf]);
    }

    fn collect_all(&self, node: NodeId, out: &mut Vec<LineHandle>) {
        match &self.node(node).kind {
            NodeKind::Leaf(lines) => out.extend_from_slice(lines),
            NodeKind::Branch(children) => {
                for &child in children {
                    self.collect_all(child, out);
                }
            }
        }
    }

    fn collect_range(&self, node: NodeId, at: usize, n: usize, out: &mut Vec<LineHandle>) {
        match &self.node(node).kind {
            NodeKind::Leaf(lines) => {
                let end = (at + n).min(lines.len());
                out.extend_from_slice(&lines[at.min(end)..end]);
            }
            NodeKind::Branch(children) => {
                let mut at = at;
                let mut n = n;
                for &child in children {
                    let size = self.node(child).size;
                    if at < size {
                        let used = n.min(size - at);
                        self.collect_range(child, at, used, out);
                        n -= used;
                        if n == 0 {
                            break;
                        }
                        at = 0;
                    } else {
                        at -= size;
                    }
                }
            }
        }
    }

    fn new_branch(&mut self, children: Vec<NodeId>) -> NodeId {
        let mut size = 0;
        let mut height = 0.0;
        for &child in &children {
            let c = self.node(child);
            size += c.size;
            height += c.height;
        }
        let id = self.alloc_node(Node {
            parent: None,
            size,
            height,
            kind: NodeKind::Branch(Vec::new()),
        });
        for &child in &children {
            self.node_mut(child).parent = Some(id);
        }
        self.node_mut(id).kind = NodeKind::Branch(children);
        id
    }

    fn free_subtree(&mut self, node: NodeId) {
        if let Some(n) = self.nodes[node.0 as usize].take() {
            if let NodeKind::Branch(children) = n.kind {
                for child in children {
                    self.free_subtree(child);
                }
            }
            self.free_nodes.push(node.0);
        }
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        match self.free_nodes.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = Some(node);
                NodeId(idx)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn alloc_line(&mut self, line: Line) -> LineHandle {
        match self.free_lines.pop() {
            Some(idx) => {
                let slot = &mut self.lines[idx as usize];
                slot.line = Some(line);
                LineHandle {
                    index: idx,
                    generation: slot.generation,
                }
            }
            None => {
                self.lines.push(LineSlot {
                    generation: 0,
                    line: Some(line),
                });
                LineHandle {
                    index: (self.lines.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn free_line(&mut self, handle: LineHandle) -> Option<Line> {
        let slot = self.lines.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let line = slot.line.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_lines.push(handle.index);
        Some(line)
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize]
            .as_ref()
            .expect("node handles held by the tree are live")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize]
            .as_mut()
            .expect("node handles held by the tree are live")
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Branch(children) => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Leaf(_))
    }

    fn leaf_len(&self, id: NodeId) -> usize {
        match &self.node(id).kind {
            NodeKind::Leaf(lines) => lines.len(),
            NodeKind::Branch(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(prefix: &str, n: usize) -> Vec<Line> {
        (0..n).map(|i| Line::new(format!("{prefix}{i}"), 1.0)).collect()
    }

    #[test]
    fn test_new_tree_numbers_lines_from_first() {
        let tree = LineTree::new(5, lines("l", 3));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.first(), 5);
        assert_eq!(tree.last(), 7);
        assert_eq!(tree.get_line(6).unwrap().text(), "l1");
        assert!(matches!(
            tree.get_line(4),
            Err(DocError::LineOutOfRange { line: 4, .. })
        ));
        assert!(tree.get_line(8).is_err());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_sixty_into_ten_splits_root() {
        let mut tree = LineTree::new(0, lines("a", 10));
        assert_eq!(tree.root_child_count(), 1);
        tree.insert(5, lines("b", 60));
        assert_eq!(tree.len(), 70);
        assert!(tree.root_child_count() >= 2);
        tree.check_invariants().unwrap();
        for n in 0..70 {
            let handle = tree.handle_at(n).unwrap();
            assert_eq!(tree.line_number(handle), Some(n));
        }
        assert_eq!(tree.get_line(5).unwrap().text(), "b0");
        assert_eq!(tree.get_line(65).unwrap().text(), "a5");
    }

    #[test]
    fn test_large_insert_grows_tree_and_keeps_caps() {
        let mut tree = LineTree::new(0, lines("x", 1));
        tree.insert(1, lines("y", 5000));
        tree.check_invariants().unwrap();
        assert!(tree.depth() >= 3);
        assert_eq!(tree.len(), 5001);
        let handle = tree.handle_at(4321).unwrap();
        assert_eq!(tree.line_number(handle), Some(4321));
    }

    #[test]
    fn test_remove_collapses_small_tree() {
        let mut tree = LineTree::new(0, lines("x", 200));
        assert!(tree.root_child_count() > 1);
        let removed = tree.remove(10, 185);
        assert_eq!(removed.len(), 185);
        assert_eq!(tree.len(), 15);
        assert_eq!(tree.root_child_count(), 1);
        assert_eq!(tree.depth(), 2);
        tree.check_invariants().unwrap();
        assert_eq!(tree.get_line(10).unwrap().text(), "x195");
    }

    #[test]
    fn test_removed_handles_go_stale() {
        let mut tree = LineTree::new(0, lines("x", 4));
        let handle = tree.handle_at(2).unwrap();
        let removed = tree.remove(2, 1);
        assert_eq!(removed[0].0, handle);
        assert!(!removed[0].1.is_attached());
        assert!(tree.line(handle).is_none());
        assert_eq!(tree.line_number(handle), None);

        // Slot reuse must not resurrect the old handle.
        tree.insert(0, lines("new", 1));
        assert!(tree.line(handle).is_none());
    }

    #[test]
    fn test_heights() {
        let mut tree = LineTree::new(0, lines("x", 100));
        assert_eq!(tree.height(), 100.0);
        let h40 = tree.handle_at(40).unwrap();
        assert_eq!(tree.height_at_line(h40), Some(40.0));
        assert_eq!(tree.line_at_height(40.5), 40);

        tree.update_line_height(tree.handle_at(10).unwrap(), 5.0);
        assert_eq!(tree.height(), 104.0);
        assert_eq!(tree.height_at_line(h40), Some(44.0));
        assert_eq!(tree.line_at_height(12.0), 10);
        assert_eq!(tree.line_at_height(15.0), 11);
        assert_eq!(tree.line_at_height(1000.0), 100);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_iter_range_and_get_lines() {
        let tree = LineTree::new(3, lines("x", 80));
        let numbers: Vec<usize> = tree.iter_range(50, 54).map(|(n, _, _)| n).collect();
        assert_eq!(numbers, vec![50, 51, 52, 53]);
        assert_eq!(tree.get_lines(80, 100), vec!["x77", "x78", "x79"]);
        assert!(tree.get_lines(0, 3).is_empty());
    }
}
