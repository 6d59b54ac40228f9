//! Error types.
//!
//! Only contract violations surface as [`DocError`]. Recoverable editing conflicts
//! (edits swallowed by read-only markers, cursors stuck between atomic markers) are
//! handled inside the change engine and never reach the caller as errors.

use crate::marker::MarkerId;
use crate::workspace::{DocId, HistoryId};
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the document engine.
pub enum DocError {
    #[error("line {line} is outside the document (first line {first}, {size} lines)")]
    /// A line number outside `[first, first + size)` was requested.
    LineOutOfRange {
        /// The requested line number.
        line: usize,
        /// First line number of the document.
        first: usize,
        /// Number of lines in the document.
        size: usize,
    },

    #[error("inserting collapsed marker partially overlapping an existing one")]
    /// A collapsed marker would partially overlap an existing collapsed marker.
    CollapsedOverlap,

    #[error("unknown document {0:?}")]
    /// The document id does not belong to this workspace.
    UnknownDocument(DocId),

    #[error("unknown history {0:?}")]
    /// A document refers to a history that no longer exists.
    UnknownHistory(HistoryId),

    #[error("unknown marker {0:?}")]
    /// The marker id does not exist (or was cleared) in the given document.
    UnknownMarker(MarkerId),

    #[error("invalid selection: {0}")]
    /// A selection with no ranges or an out-of-range primary index.
    InvalidSelection(&'static str),

    #[error("documents {0:?} and {1:?} are not linked")]
    /// `unlink_doc` was called on two documents that are not linked.
    NotLinked(DocId, DocId),

    #[error("history data error: {0}")]
    /// History data could not be (de)serialized.
    HistoryFormat(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    /// Document options could not be parsed.
    Config(String),
}
