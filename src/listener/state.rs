//! Per-nesting-level parsing state (§3.9, §4.6, §9's "pushed parsing
//! state is a value" design note). A fresh [`ParsingState`] is pushed
//! whenever [`crate::listener::Listener`] starts a sub-document and
//! popped when it returns, mirroring `IMWAWContentListener::ParsingState`
//! without the C++ original's manual new/delete — here it's an owned
//! struct living on a `Vec` used as a stack.

use crate::types::{BorderMask, Color, Justification, LineSpacing, StyleFlags, TabStop};
use crate::list_engine::ListId;

/// The font/paragraph/etc. the Listener is accumulating for the *next*
/// span or paragraph boundary, separate from `types::Font`/`Paragraph`
/// (which are keyed by catalog id) since the Listener only ever sees
/// already-resolved attribute values from the per-format parser (§2's
/// data-flow note: parsers speak `FontRegistry`/style-resolved values to
/// the Listener, never raw catalog ids).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFont {
    pub name: Option<String>,
    pub size: f64,
    pub flags: StyleFlags,
    pub color: Color,
    pub language: Option<String>,
}

impl Default for PendingFont {
    fn default() -> Self {
        PendingFont {
            name: None,
            size: 12.0,
            flags: StyleFlags::empty(),
            color: Color::BLACK,
            language: None,
        }
    }
}

/// The three independent contributions to a paragraph's left/right
/// margin (§4.6.2): the page margin in effect when the paragraph opened,
/// an explicit per-paragraph style override, and a tab-driven adjustment
/// that resets at every paragraph close.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarginBucket {
    pub page: f64,
    pub style: f64,
    pub tab: f64,
}

impl MarginBucket {
    pub fn total(&self) -> f64 {
        self.page + self.style + self.tab
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingParagraph {
    pub justification: Option<Justification>,
    pub line_spacing: Option<LineSpacing>,
    pub left: MarginBucket,
    pub right: MarginBucket,
    pub space_before: f64,
    pub space_after: f64,
    pub first_line_indent: f64,
    pub tabs: Vec<TabStop>,
    pub border: Option<BorderMask>,
}

/// What kind of sub-document the current [`ParsingState`] belongs to,
/// `None` for the outermost (main-body) state. Drives §4.6's "no hard
/// page-break inside sub-documents; sets column-break only" rule and
/// §2.1's "open_section only in subdoc if subdoc-type = text-box" guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubDocumentKind {
    Header,
    Footer,
    Footnote,
    Endnote,
    Comment,
    TextBox,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableState {
    pub table_open: bool,
    pub row_open: bool,
    pub cell_open: bool,
    pub current_row: u32,
    pub current_col: u32,
}

/// One nesting level's worth of open/closed flags and pending attributes.
/// Pushed by `_handle_subdocument`, popped on return, per §3.9 and §5's
/// "at most one element per nesting level" rule.
#[derive(Debug, Clone)]
pub struct ParsingState {
    pub subdocument_kind: Option<SubDocumentKind>,

    pub section_open: bool,
    pub paragraph_open: bool,
    pub list_element_open: bool,
    pub span_open: bool,
    pub frame_open: bool,
    pub table: TableState,

    pub text_buffer: String,
    pub deferred_tabs: u32,

    pub pending_font: PendingFont,
    pub applied_font: Option<PendingFont>,

    pub pending_paragraph: PendingParagraph,

    pub current_list: Option<ListId>,
    /// The level the parser has asked for via `set_current_list_level`,
    /// not yet necessarily reflected in open sink calls.
    pub pending_list_level: u32,
    /// The deepest level actually `open_*_list_level`'d on the sink right
    /// now; mutated only by `_change_list`'s open/close loop (§4.6.4).
    pub open_list_level: u32,

    pub paragraph_language: Option<String>,

    pub footnote_number: u32,
    pub endnote_number: u32,
    pub nested_notes: u32,
    pub in_note: bool,
}

impl ParsingState {
    pub fn new_root() -> Self {
        ParsingState {
            subdocument_kind: None,
            section_open: false,
            paragraph_open: false,
            list_element_open: false,
            span_open: false,
            frame_open: false,
            table: TableState::default(),
            text_buffer: String::new(),
            deferred_tabs: 0,
            pending_font: PendingFont::default(),
            applied_font: None,
            pending_paragraph: PendingParagraph::default(),
            current_list: None,
            pending_list_level: 0,
            open_list_level: 0,
            paragraph_language: None,
            footnote_number: 0,
            endnote_number: 0,
            nested_notes: 0,
            in_note: false,
        }
    }

    /// A fresh sub-document state, copying only the cross-cutting
    /// counters the original keeps live across pushes (`m_numNestedNotes`
    /// in `IMWAWContentListener::_pushParsingState`) rather than the
    /// whole open/closed flag set, which always starts fresh per nesting
    /// level.
    pub fn new_child(&self, kind: SubDocumentKind) -> Self {
        ParsingState {
            subdocument_kind: Some(kind),
            nested_notes: self.nested_notes,
            footnote_number: self.footnote_number,
            endnote_number: self.endnote_number,
            in_note: matches!(kind, SubDocumentKind::Footnote | SubDocumentKind::Endnote),
            ..ParsingState::new_root()
        }
    }
}
