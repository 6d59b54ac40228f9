//! Logical lines and their attached state.

use crate::config::DocOptions;
use crate::line_tree::NodeId;
use crate::marker::MarkedSpan;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use unicode_width::UnicodeWidthChar;

/// Stable handle to a line stored in a [`LineTree`](crate::LineTree).
///
/// Handles stay valid while the line object lives, even when lines around it are
/// inserted or removed. Once the line is removed from the tree the handle is stale and
/// every lookup through it returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Opaque payload owned by an external collaborator (widget content, cached styles,
/// rendering data). The engine never looks inside.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    /// Wrap any value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// Identifier of a line widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetId(pub(crate) u64);

/// A block widget attached to a line. Only its height matters to the engine.
#[derive(Debug, Clone)]
pub struct LineWidget {
    /// Widget id.
    pub id: WidgetId,
    /// Height the widget adds to its line.
    pub height: f64,
    /// Render above the line instead of below.
    pub above: bool,
    /// Rendering-layer content.
    pub payload: Option<Payload>,
}

/// A single logical line of text.
#[derive(Debug, Clone)]
pub struct Line {
    pub(crate) text: String,
    pub(crate) char_len: usize,
    pub(crate) marked_spans: Vec<MarkedSpan>,
    pub(crate) styles: Option<Payload>,
    pub(crate) state_after: Option<Payload>,
    pub(crate) widgets: Vec<LineWidget>,
    pub(crate) height: f64,
    pub(crate) parent: Option<NodeId>,
}

impl Line {
    /// Create a detached line with the given text and height.
    pub fn new(text: impl Into<String>, height: f64) -> Self {
        let text = text.into();
        let char_len = crate::text::char_len(&text);
        Self {
            text,
            char_len,
            marked_spans: Vec::new(),
            styles: None,
            state_after: None,
            widgets: Vec::new(),
            height: height.max(0.0),
            parent: None,
        }
    }

    /// Line text (without the line separator).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the line in characters.
    pub fn len_chars(&self) -> usize {
        self.char_len
    }

    /// Marker spans attached to this line.
    pub fn marked_spans(&self) -> &[MarkedSpan] {
        &self.marked_spans
    }

    /// Widgets attached to this line.
    pub fn widgets(&self) -> &[LineWidget] {
        &self.widgets
    }

    /// Current (rendered or estimated) height.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Cached styling produced by the highlighting collaborator.
    pub fn styles(&self) -> Option<&Payload> {
        self.styles.as_ref()
    }

    /// Cache styling for this line. Cleared whenever the text changes.
    pub fn set_styles(&mut self, styles: Option<Payload>) {
        self.styles = styles;
    }

    /// Parser state after this line, owned by the background collaborator.
    pub fn state_after(&self) -> Option<&Payload> {
        self.state_after.as_ref()
    }

    /// Store parser state after this line. Cleared whenever the text changes.
    pub fn set_state_after(&mut self, state: Option<Payload>) {
        self.state_after = state;
    }

    /// Whether the line is still stored in a tree.
    pub fn is_attached(&self) -> bool {
        self.parent.is_some()
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.char_len = crate::text::char_len(&text);
        self.text = text;
        self.styles = None;
        self.state_after = None;
    }
}

/// Estimates line heights before the rendering layer measures them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightEstimator {
    line_height: f64,
    wrap_columns: Option<usize>,
    tab_width: usize,
}

impl HeightEstimator {
    /// Build an estimator from document options.
    pub fn from_options(options: &DocOptions) -> Self {
        Self {
            line_height: options.line_height.max(0.0),
            wrap_columns: options.wrap_columns.filter(|cols| *cols > 0),
            tab_width: options.tab_width.max(1),
        }
    }

    /// Height of one text row.
    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    /// Estimated height of a line with the given text and widgets.
    ///
    /// Hidden lines (fully covered by a fold) have zero height.
    pub fn estimate(&self, text: &str, widgets: &[LineWidget], hidden: bool) -> f64 {
        if hidden {
            return 0.0;
        }
        let widget_height: f64 = widgets.iter().map(|w| w.height).sum();
        let rows = match self.wrap_columns {
            Some(cols) => display_width(text, self.tab_width).div_ceil(cols).max(1),
            None => 1,
        };
        widget_height + rows as f64 * self.line_height
    }
}

/// Width of `text` in character cells, with tabs advancing to the next tab stop.
pub(crate) fn display_width(text: &str, tab_width: usize) -> usize {
    let mut x = 0usize;
    for ch in text.chars() {
        let w = if ch == '\t' {
            tab_width - x % tab_width
        } else {
            UnicodeWidthChar::width(ch).unwrap_or(1)
        };
        x = x.saturating_add(w);
    }
    x
}
