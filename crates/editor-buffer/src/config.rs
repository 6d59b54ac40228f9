//! Document configuration.

use crate::error::DocError;
use serde::Deserialize;
use std::time::Duration;

/// Per-document options.
///
/// All fields have defaults; `DocOptions::from_json` accepts a partial JSON object.
///
/// ```rust
/// use editor_buffer::DocOptions;
///
/// let opts = DocOptions::from_json(r#"{ "undo_depth": 50, "wrap_columns": 80 }"#).unwrap();
/// assert_eq!(opts.undo_depth, 50);
/// assert_eq!(opts.wrap_columns, Some(80));
/// assert!(!opts.selections_may_touch);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocOptions {
    /// Maximum number of change events kept on the undo stack.
    pub undo_depth: usize,
    /// Edits with a [`MergePolicy::WhenRecentAndSimilar`](crate::MergePolicy) origin closer together
    /// than this (in milliseconds) merge into one history event.
    pub history_event_delay_ms: u64,
    /// When set, non-empty selection ranges that merely touch are kept apart.
    pub selections_may_touch: bool,
    /// Line separator used to split input and join output. `None` splits on
    /// `\r\n`, `\r` and `\n` and joins with `\n`.
    pub line_separator: Option<String>,
    /// Height of one unwrapped text row.
    pub line_height: f64,
    /// Wrap width in character cells used to estimate line heights. `None` disables wrapping.
    pub wrap_columns: Option<usize>,
    /// Tab width in character cells (for height estimation).
    pub tab_width: usize,
    /// Reject every edit and history replay. `set_value` is rejected as well.
    pub read_only: bool,
}

impl Default for DocOptions {
    fn default() -> Self {
        Self {
            undo_depth: 200,
            history_event_delay_ms: 1250,
            selections_may_touch: false,
            line_separator: None,
            line_height: 1.0,
            wrap_columns: None,
            tab_width: 4,
            read_only: false,
        }
    }
}

impl DocOptions {
    /// Parse options from a (possibly partial) JSON object.
    pub fn from_json(json: &str) -> Result<Self, DocError> {
        serde_json::from_str(json).map_err(|err| DocError::Config(err.to_string()))
    }

    /// Set the undo depth.
    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }

    /// Set the history merge window.
    pub fn with_history_event_delay(mut self, delay: Duration) -> Self {
        self.history_event_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Allow touching (non-overlapping) selection ranges.
    pub fn with_selections_may_touch(mut self, may_touch: bool) -> Self {
        self.selections_may_touch = may_touch;
        self
    }

    /// Use an explicit line separator.
    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = Some(separator.into());
        self
    }

    /// Enable wrapped height estimation.
    pub fn with_wrap_columns(mut self, columns: usize) -> Self {
        self.wrap_columns = Some(columns);
        self
    }

    /// Set the row height.
    pub fn with_line_height(mut self, height: f64) -> Self {
        self.line_height = height;
        self
    }

    /// Make the document read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// History merge window as a [`Duration`].
    pub fn history_event_delay(&self) -> Duration {
        Duration::from_millis(self.history_event_delay_ms)
    }

    pub(crate) fn separator(&self) -> Option<&str> {
        self.line_separator.as_deref()
    }
}

/// Options for [`Workspace::linked_doc`](crate::Workspace::linked_doc).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkOptions {
    /// First line (inclusive) of the sub-range covered by the new document.
    pub from: Option<usize>,
    /// End line (exclusive) of the sub-range covered by the new document.
    pub to: Option<usize>,
    /// Share the undo history with the parent document.
    pub shared_hist: bool,
}
