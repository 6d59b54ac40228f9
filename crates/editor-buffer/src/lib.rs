#![warn(missing_docs)]
//! Editor Buffer - a headless text-buffer engine
//!
//! # Overview
//!
//! `editor-buffer` owns the document model of a code editor: text stored as lines in a
//! balanced tree, marked ranges that survive edits, multi-range selections, an undo
//! history, and documents linked to each other. It renders nothing; a display layer reads
//! line text, heights and markers and subscribes to [`DocEvent`]s.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Workspace API + TransactionContext         │  ← Public API, notifications
//! ├─────────────────────────────────────────────┤
//! │  Change Engine + History                    │  ← Edits, undo/redo, linked docs
//! ├─────────────────────────────────────────────┤
//! │  Selections + Marked Spans                  │  ← Cursors, markers, folds
//! ├─────────────────────────────────────────────┤
//! │  Line Storage Tree                          │  ← Lines, heights
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_buffer::{DocOptions, MarkOptions, Pos, TransactionContext, Workspace};
//!
//! let mut ws = Workspace::new();
//! let mut tx = TransactionContext::new();
//! let doc = ws.open("fn main() {\n    body();\n}", DocOptions::default());
//!
//! // Fold the body.
//! ws.mark_text(&mut tx, doc, Pos::new(0, 11), Pos::new(2, 0), MarkOptions::collapsed())
//!     .unwrap();
//! assert!(ws.doc(doc).unwrap().is_line_hidden(1));
//!
//! ws.replace_range(&mut tx, doc, "fn start", Pos::new(0, 0), Some(Pos::new(0, 7)), None)
//!     .unwrap();
//! assert_eq!(ws.doc(doc).unwrap().get_line(0).unwrap(), "fn start() {");
//!
//! ws.undo(&mut tx, doc).unwrap();
//! assert_eq!(ws.doc(doc).unwrap().get_line(0).unwrap(), "fn main() {");
//! ```
//!
//! # Module Description
//!
//! - [`line_tree`] - arena B-tree of lines with size and height aggregates
//! - [`marker`] - marker options and per-line spans
//! - [`selection`] - normalized multi-range selections
//! - [`change`] - change records and `before_change` requests
//! - [`history`] - undo/redo stacks, merge policy and persistence format
//! - [`operation`] - transactions and event delivery
//! - [`document`] - the per-document read API
//! - [`workspace`] - documents, histories and every mutation

pub mod change;
pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod line;
pub mod line_tree;
pub mod marker;
pub mod movement;
pub mod operation;
pub mod position;
pub mod selection;
mod spans;
mod text;
pub mod workspace;

pub use change::{AppliedChange, Change, ChangeRequest, change_end};
pub use config::{DocOptions, LinkOptions};
pub use document::{CursorSide, DocLink, Document};
pub use error::DocError;
pub use history::{
    ChangeData, ChangeGroup, History, HistoryChange, HistoryData, HistoryEntry, HistoryEvent,
    HistorySize, MergePolicy, Origin,
};
pub use line::{HeightEstimator, Line, LineHandle, LineWidget, Payload, WidgetId};
pub use line_tree::LineTree;
pub use marker::{
    BookmarkOptions, MarkOptions, MarkedSpan, MarkerId, MarkerKind, MarkerRange, TextMarker,
};
pub use movement::{MoveResult, MoveUnit};
pub use operation::{Deferred, DocEvent, DocEventCallback, TransactionContext};
pub use position::Pos;
pub use selection::{
    Collapse, Selection, SelectionOptions, SelectionRange, SelectionRequest, extend_range,
    normalize_selection,
};
pub use workspace::{ChangeFilter, DocId, HistoryId, SelectionFilter, Workspace};
