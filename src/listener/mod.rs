//! The document-event state machine (§4.6) — the most intricate
//! component (§2: 0.28 of the crate's budget). Single-threaded, fully
//! synchronous, driven entirely by calls from a [`crate::parser`]; it
//! owns a stack of [`state::ParsingState`] values (one per sub-document
//! nesting level, §3.9/§9) and is the only component that talks to the
//! external [`sink::DocumentSink`].
//!
//! Grounded on `examples/original_source/src/lib/IMWAWContentListener.{hxx,cxx}`
//! and `DMWAWContentListener.{hxx,cxx}`; the owning-handle-over-open-state
//! idiom follows `victor/src/document.rs`.

pub mod sink;
pub mod state;

use crate::error::{MwawError, Result};
use crate::font_registry::to_unicode_by_name;
use crate::list_engine::{ListEngine, ListId, NumberingKind};
use crate::types::{
    BorderMask, Cell, CellFormatHint, Color, HorizontalAlignment, Justification, LineSpacing,
    LineSpacingUnit, PageSpan, StyleFlags, SubDocumentId, TabAlignment, TabStop, Vec2,
};
use sink::{DocumentSink, PropertyList, PropertyUnit};
use state::{ParsingState, PendingFont, SubDocumentKind, TableState};
use std::collections::HashSet;

// ---------------------------------------------------------------------
// Operand types for the public contract (§4.6's table)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureUnit {
    Inch,
    Point,
    Twip,
}

fn to_inches(value: f64, unit: MeasureUnit) -> f64 {
    match unit {
        MeasureUnit::Inch => value,
        MeasureUnit::Point => value / 72.0,
        MeasureUnit::Twip => value / 1440.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginEdge {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Column,
    Page,
    SoftPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    PageNumber,
    Date,
    Time,
    Title,
    DatabaseLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAnchor {
    Page,
    Paragraph,
    CharBaseline,
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XAlign {
    Left,
    Center,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YAlign {
    Top,
    Middle,
    Bottom,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    None,
    Dynamic,
    RunThrough,
}

/// A frame's placement (§4.6.3). Sizes and the origin are in points;
/// `Full` on either axis is resolved against the current page span's
/// geometry at emission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub anchor: FrameAnchor,
    pub x_align: XAlign,
    pub y_align: YAlign,
    pub origin: Vec2<f64>,
    pub size: Vec2<f64>,
    pub wrap: WrapMode,
    pub page: Option<u32>,
}

// ---------------------------------------------------------------------
// Property-list builders (Listener-internal, not part of the public API)
// ---------------------------------------------------------------------

fn justification_str(j: Justification) -> &'static str {
    match j {
        Justification::Left => "left",
        Justification::Center => "center",
        Justification::Right => "end",
        Justification::Full => "justify",
        Justification::FullAllLines => "justify",
        Justification::Decimal => "left",
    }
}

fn paragraph_properties(p: &state::PendingParagraph) -> (PropertyList, Vec<TabStop>) {
    let mut props = PropertyList::new()
        .set_float("fo:margin-left", p.left.total(), PropertyUnit::Inch)
        .set_float("fo:margin-right", p.right.total(), PropertyUnit::Inch)
        .set_float("fo:text-indent", p.first_line_indent, PropertyUnit::Inch)
        .set_float("fo:margin-top", p.space_before, PropertyUnit::Point)
        .set_float("fo:margin-bottom", p.space_after, PropertyUnit::Point)
        .set_str(
            "fo:text-align",
            justification_str(p.justification.unwrap_or(Justification::Left)),
        );
    if let Some(spacing) = p.line_spacing {
        match spacing.unit {
            LineSpacingUnit::PercentOfLine => {
                props = props.set_float("fo:line-height", spacing.value, PropertyUnit::Percent);
            }
            LineSpacingUnit::Points => {
                props = props.set_float("fo:line-height", spacing.value, PropertyUnit::Point);
            }
        }
    }
    if let Some(border) = p.border {
        props = props
            .set_bool("fo:border-left", border.contains(BorderMask::LEFT))
            .set_bool("fo:border-right", border.contains(BorderMask::RIGHT))
            .set_bool("fo:border-top", border.contains(BorderMask::TOP))
            .set_bool("fo:border-bottom", border.contains(BorderMask::BOTTOM));
    }
    (props, p.tabs.clone())
}

fn span_properties(font: &PendingFont) -> PropertyList {
    let mut props = PropertyList::new()
        .set_float("fo:font-size", font.size, PropertyUnit::Point)
        .set_bool("fo:font-weight", font.flags.contains(StyleFlags::BOLD))
        .set_bool("fo:font-style", font.flags.contains(StyleFlags::ITALIC))
        .set_bool(
            "style:text-underline",
            font.flags
                .intersects(StyleFlags::UNDERLINE_SINGLE | StyleFlags::UNDERLINE_DOUBLE),
        )
        .set_bool(
            "style:text-line-through",
            font.flags.contains(StyleFlags::STRIKETHROUGH),
        )
        .set_bool(
            "fo:text-transform-caps",
            font.flags.contains(StyleFlags::ALL_CAPS),
        )
        .set_bool(
            "style:text-position-super",
            font.flags.contains(StyleFlags::SUPERSCRIPT),
        )
        .set_bool(
            "style:text-position-sub",
            font.flags.contains(StyleFlags::SUBSCRIPT),
        )
        .set_str(
            "fo:color",
            format!("#{:02x}{:02x}{:02x}", font.color.r, font.color.g, font.color.b),
        );
    if let Some(name) = &font.name {
        props = props.set_str("style:font-name", name.clone());
    }
    if let Some(lang) = &font.language {
        props = props.set_str("fo:language", lang.clone());
    }
    props
}

fn page_span_properties(span: &PageSpan) -> PropertyList {
    PropertyList::new()
        .set_float("fo:page-width", span.form_width, PropertyUnit::Point)
        .set_float("fo:page-height", span.form_length, PropertyUnit::Point)
        .set_float("fo:margin-left", span.margins.left, PropertyUnit::Point)
        .set_float("fo:margin-right", span.margins.right, PropertyUnit::Point)
        .set_float("fo:margin-top", span.margins.top, PropertyUnit::Point)
        .set_float("fo:margin-bottom", span.margins.bottom, PropertyUnit::Point)
}

fn anchor_str(a: FrameAnchor) -> &'static str {
    match a {
        FrameAnchor::Page => "page",
        FrameAnchor::Paragraph => "paragraph",
        FrameAnchor::CharBaseline => "as-char",
        FrameAnchor::Char => "char",
    }
}

fn wrap_str(w: WrapMode) -> &'static str {
    match w {
        WrapMode::None => "none",
        WrapMode::Dynamic => "dynamic",
        WrapMode::RunThrough => "run-through",
    }
}

fn frame_properties(position: &Position, page_size: Vec2<f64>) -> PropertyList {
    let width = if position.x_align == XAlign::Full {
        page_size.x
    } else {
        position.size.x
    };
    let height = if position.y_align == YAlign::Full {
        page_size.y
    } else {
        position.size.y
    };
    let mut props = PropertyList::new()
        .set_str("text:anchor-type", anchor_str(position.anchor))
        .set_float("svg:x", position.origin.x, PropertyUnit::Point)
        .set_float("svg:y", position.origin.y, PropertyUnit::Point)
        .set_float("svg:width", width, PropertyUnit::Point)
        .set_float("svg:height", height, PropertyUnit::Point)
        .set_str("style:wrap", wrap_str(position.wrap));
    if let Some(page) = position.page {
        props = props.set_int("text:anchor-page-number", page as i64);
    }
    props
}

fn cell_properties(cell: &Cell, extras: &PropertyList) -> PropertyList {
    let mut props = PropertyList::new()
        .set_int("libwpd:column", cell.col as i64)
        .set_int("libwpd:row", cell.row as i64)
        .set_int("table:number-columns-spanned", cell.colspan as i64)
        .set_int("table:number-rows-spanned", cell.rowspan as i64)
        .set_bool("style:cell-protect", cell.protected)
        .set_str(
            "fo:text-align",
            match cell.alignment {
                HorizontalAlignment::Left => "left",
                HorizontalAlignment::Center => "center",
                HorizontalAlignment::Right => "end",
                HorizontalAlignment::Full => "justify",
            },
        );
    if let Some(border) = cell.border {
        props = props
            .set_bool("fo:border-left", border.contains(BorderMask::LEFT))
            .set_bool("fo:border-right", border.contains(BorderMask::RIGHT))
            .set_bool("fo:border-top", border.contains(BorderMask::TOP))
            .set_bool("fo:border-bottom", border.contains(BorderMask::BOTTOM));
    }
    if let Some(hint) = cell.format_hint {
        props = props.set_str(
            "number:value-type",
            match hint {
                CellFormatHint::Numeric => "float",
                CellFormatHint::Date => "date",
                CellFormatHint::Time => "time",
            },
        );
    }
    for (key, value) in extras.iter() {
        props = props.set_raw(key, value.clone());
    }
    props
}

// ---------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------

/// The document-event state machine. `S` is the back-end sink this parse
/// run is wired to; callers construct one per document (§3.9).
pub struct Listener<S: DocumentSink> {
    sink: S,
    list_engine: ListEngine,
    states: Vec<ParsingState>,
    page_spans: Vec<PageSpan>,
    page_span_index: usize,
    page_span_open: bool,
    current_page_size: Vec2<f64>,
    active_subdocuments: HashSet<SubDocumentId>,
    document_started: bool,
}

impl<S: DocumentSink> Listener<S> {
    pub fn new(sink: S, page_spans: Vec<PageSpan>) -> Self {
        Listener {
            sink,
            list_engine: ListEngine::new(),
            states: vec![ParsingState::new_root()],
            page_spans,
            page_span_index: 0,
            page_span_open: false,
            current_page_size: Vec2::new(612.0, 792.0),
            active_subdocuments: HashSet::new(),
            document_started: false,
        }
    }

    pub fn list_engine_mut(&mut self) -> &mut ListEngine {
        &mut self.list_engine
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn top(&self) -> &ParsingState {
        self.states.last().expect("state stack is never empty")
    }

    fn top_mut(&mut self) -> &mut ParsingState {
        self.states.last_mut().expect("state stack is never empty")
    }

    // -- document / page-span / section -------------------------------

    /// Idempotent: a second call while already started is a no-op, per
    /// §4.6's "idempotent start".
    pub fn start_document(&mut self, metadata: PropertyList) -> Result<()> {
        if self.document_started {
            return Ok(());
        }
        self.document_started = true;
        self.sink.start_document(&metadata);
        Ok(())
    }

    /// Closes any open paragraph, list-element, section, and page span,
    /// in that order, before closing the document itself (§4.6).
    pub fn end_document(&mut self) -> Result<()> {
        if !self.document_started {
            return Ok(());
        }
        self._close_paragraph_or_list_element()?;
        self._close_all_list_levels()?;
        self.close_section()?;
        self.close_page_span()?;
        self.sink.end_document();
        self.document_started = false;
        Ok(())
    }

    fn _open_page_span(&mut self) -> Result<()> {
        let span = self
            .page_spans
            .get(self.page_span_index)
            .cloned()
            .ok_or_else(|| MwawError::state_violation("page span list exhausted"))?;
        let left_in = span.margins.left / 72.0;
        let right_in = span.margins.right / 72.0;
        if self.page_span_index == 0 {
            let root = &mut self.states[0];
            root.pending_paragraph.left.page = left_in;
            root.pending_paragraph.right.page = right_in;
        } else {
            self._retarget_page_margins(left_in, right_in);
        }
        self.current_page_size = Vec2::new(span.form_width, span.form_length);
        let props = page_span_properties(&span);
        self.sink.open_page_span(&props);
        self.page_span_open = true;
        Ok(())
    }

    fn _ensure_page_span_open(&mut self) -> Result<()> {
        if self.page_span_open {
            return Ok(());
        }
        self._open_page_span()
    }

    pub fn close_page_span(&mut self) -> Result<()> {
        if !self.page_span_open {
            return Ok(());
        }
        self.sink.close_page_span();
        self.page_span_open = false;
        self.page_span_index += 1;
        Ok(())
    }

    /// Re-normalizes the left/right margin buckets so a page-margin
    /// change leaves the *observable* paragraph margin unchanged (§4.6.2).
    /// Scoped to the root (main-body) state; headers/footers carry their
    /// own page geometry rather than inheriting the body's.
    fn _retarget_page_margins(&mut self, new_left: f64, new_right: f64) {
        let root = &mut self.states[0];
        let delta_left = root.pending_paragraph.left.page - new_left;
        root.pending_paragraph.left.style += delta_left;
        root.pending_paragraph.left.page = new_left;
        let delta_right = root.pending_paragraph.right.page - new_right;
        root.pending_paragraph.right.style += delta_right;
        root.pending_paragraph.right.page = new_right;
    }

    /// §4.6: not in a table; in a sub-document only if its type is
    /// text-box.
    pub fn open_section(&mut self, col_widths: Option<Vec<f64>>, unit: MeasureUnit) -> Result<()> {
        if self.top().table.table_open {
            log::warn!("open_section called while a table is open");
            return Ok(());
        }
        if let Some(kind) = self.top().subdocument_kind {
            if kind != SubDocumentKind::TextBox {
                log::warn!("open_section called inside a non-text-box sub-document");
                return Ok(());
            }
        }
        self._ensure_page_span_open()?;
        if self.top().section_open {
            log::warn!("open_section called while a section is already open");
            return Ok(());
        }
        let columns: Vec<f64> = match col_widths {
            Some(widths) => widths.into_iter().map(|w| to_inches(w, unit)).collect(),
            None => vec![1.0],
        };
        let props = PropertyList::new().set_int("libwpd:num-columns", columns.len() as i64);
        self.sink.open_section(&props, &columns);
        self.top_mut().section_open = true;
        Ok(())
    }

    pub fn close_section(&mut self) -> Result<()> {
        if !self.top().section_open {
            return Ok(());
        }
        self._close_all_list_levels()?;
        self.sink.close_section();
        self.top_mut().section_open = false;
        Ok(())
    }

    // -- paragraph / span attribute setters -----------------------------

    pub fn justification_change(&mut self, justification: Justification, force: bool) -> Result<()> {
        if force {
            self._close_paragraph_or_list_element()?;
            self._set_pending_list_level(0)?;
        }
        self.top_mut().pending_paragraph.justification = Some(justification);
        Ok(())
    }

    pub fn line_spacing_change(&mut self, value: f64, unit: LineSpacingUnit) {
        self.top_mut().pending_paragraph.line_spacing = Some(LineSpacing { value, unit });
    }

    pub fn set_paragraph_margin(&mut self, edge: MarginEdge, value: f64, unit: MeasureUnit) {
        let inches = to_inches(value, unit);
        let state = self.top_mut();
        match edge {
            MarginEdge::Left => state.pending_paragraph.left.style = inches,
            MarginEdge::Right => state.pending_paragraph.right.style = inches,
            MarginEdge::Top => state.pending_paragraph.space_before = inches * 72.0,
            MarginEdge::Bottom => state.pending_paragraph.space_after = inches * 72.0,
        }
    }

    pub fn set_paragraph_text_indent(&mut self, value: f64) {
        self.top_mut().pending_paragraph.first_line_indent = value;
    }

    pub fn set_paragraph_border(&mut self, border: Option<BorderMask>) {
        self.top_mut().pending_paragraph.border = border;
    }

    /// §4.6: right-aligned tabs beyond `max_width - 10pt` are clamped,
    /// when `max_width` (inches) is given.
    pub fn set_tabs(&mut self, mut tabs: Vec<TabStop>, max_width: Option<f64>) {
        if let Some(max_w) = max_width {
            let limit = max_w - 10.0 / 72.0;
            for tab in tabs.iter_mut() {
                if tab.alignment == TabAlignment::Right && tab.position > limit {
                    tab.position = limit;
                }
            }
        }
        self.top_mut().pending_paragraph.tabs = tabs;
    }

    pub fn set_text_attribute(&mut self, bits: StyleFlags) {
        self.top_mut().pending_font.flags = bits;
    }

    pub fn set_text_font(&mut self, name: impl Into<String>) {
        self.top_mut().pending_font.name = Some(name.into());
    }

    pub fn set_font_size(&mut self, size: f64) {
        self.top_mut().pending_font.size = size;
    }

    pub fn set_font_color(&mut self, color: Color) {
        self.top_mut().pending_font.color = color;
    }

    /// A language change closes the current span outright rather than
    /// waiting for the next attribute-driven boundary, per §4.6's note
    /// that the *next* span must carry the new locale.
    pub fn set_text_language(&mut self, locale: impl Into<String>) -> Result<()> {
        self._close_span_if_open()?;
        self.top_mut().pending_font.language = Some(locale.into());
        Ok(())
    }

    fn _close_span_if_open(&mut self) -> Result<()> {
        if self.top().span_open {
            self._flush_text();
            self.sink.close_span();
            let state = self.top_mut();
            state.span_open = false;
            state.applied_font = None;
        }
        Ok(())
    }

    // -- list state ------------------------------------------------------

    pub fn set_current_list(&mut self, list: Option<ListId>) {
        self.top_mut().current_list = list;
    }

    pub fn set_current_list_level(&mut self, n: u32) -> Result<()> {
        self._set_pending_list_level(n)
    }

    fn _set_pending_list_level(&mut self, n: u32) -> Result<()> {
        self.top_mut().pending_list_level = n;
        Ok(())
    }

    /// §4.6.4: closes levels above the target, re-declares the innermost
    /// level if its geometry changed, then opens levels up to the target.
    fn _change_list(&mut self) -> Result<()> {
        let target = self.top().pending_list_level;
        let list_id = self.top().current_list;

        while self.top().open_list_level > target {
            self._close_one_list_level()?;
        }

        if target > 0 {
            if let Some(list_id) = list_id {
                let (ref_pos, begin_pos) = self.list_engine.level_geometry(list_id, target);
                self.list_engine.set_level(list_id, target, ref_pos, begin_pos);
                let must_emit = self.list_engine.must_emit(list_id, target, ref_pos, begin_pos);
                if must_emit && self.top().open_list_level == target {
                    self._close_one_list_level()?;
                }
            }
        }

        while self.top().open_list_level < target {
            self._open_one_list_level()?;
        }
        Ok(())
    }

    fn _close_all_list_levels(&mut self) -> Result<()> {
        while self.top().open_list_level > 0 {
            self._close_one_list_level()?;
        }
        Ok(())
    }

    fn _close_one_list_level(&mut self) -> Result<()> {
        let level = self.top().open_list_level;
        if level == 0 {
            return Ok(());
        }
        let list_id = self.top().current_list;
        let kind = list_id.and_then(|id| self.list_engine.level_kind(id, level));
        match kind {
            Some(NumberingKind::Bullet) => self.sink.close_unordered_list_level(),
            _ => self.sink.close_ordered_list_level(),
        }
        if let Some(list_id) = list_id {
            self.list_engine.close_level(list_id, level);
        }
        self.top_mut().open_list_level = level - 1;
        Ok(())
    }

    fn _open_one_list_level(&mut self) -> Result<()> {
        let next = self.top().open_list_level + 1;
        let Some(list_id) = self.top().current_list else {
            log::warn!("list level increase requested with no current list set");
            return Ok(());
        };
        let kind = self
            .list_engine
            .level_kind(list_id, next)
            .unwrap_or(NumberingKind::Arabic);
        let props = PropertyList::new().set_int("libwpd:level", next as i64);
        match kind {
            NumberingKind::Bullet => self.sink.open_unordered_list_level(&props),
            _ => self.sink.open_ordered_list_level(&props),
        }
        self.list_engine.mark_declared(list_id, next);
        self.list_engine.open_level(list_id, next);
        self.top_mut().open_list_level = next;
        Ok(())
    }

    // -- paragraph / text flow -------------------------------------------

    fn _ensure_paragraph_open(&mut self) -> Result<()> {
        if self.top().paragraph_open || self.top().list_element_open {
            return Ok(());
        }
        self._change_list()?;
        let level = self.top().open_list_level;
        let (props, tabs) = paragraph_properties(&self.top().pending_paragraph);
        if level > 0 {
            self.sink.open_list_element(&props, &tabs);
            self.top_mut().list_element_open = true;
        } else {
            self.sink.open_paragraph(&props, &tabs);
            self.top_mut().paragraph_open = true;
        }
        Ok(())
    }

    fn _ensure_span_open(&mut self) -> Result<()> {
        let needs_new = match &self.top().applied_font {
            None => true,
            Some(applied) => *applied != self.top().pending_font,
        };
        if self.top().span_open && needs_new {
            self._flush_text();
            self.sink.close_span();
            self.top_mut().span_open = false;
        }
        if !self.top().span_open {
            let font = self.top().pending_font.clone();
            let props = span_properties(&font);
            self.sink.open_span(&props);
            let state = self.top_mut();
            state.span_open = true;
            state.applied_font = Some(font);
        }
        Ok(())
    }

    fn _flush_text(&mut self) {
        if self.top().text_buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.top_mut().text_buffer);
        self.sink.insert_text(&text);
    }

    fn _flush_deferred_tabs(&mut self) {
        let n = self.top().deferred_tabs;
        if n == 0 {
            return;
        }
        for _ in 0..n {
            self.sink.insert_tab();
        }
        self.top_mut().deferred_tabs = 0;
    }

    fn _current_font_name(&self) -> Option<&str> {
        self.top()
            .applied_font
            .as_ref()
            .or(Some(&self.top().pending_font))
            .and_then(|f| f.name.as_deref())
    }

    /// §4.6: buffers the decoded character, opening a span if none is
    /// open and flushing any deferred tabs first so they precede the
    /// text in emission order.
    pub fn insert_character(&mut self, c: u8) -> Result<()> {
        self._ensure_paragraph_open()?;
        self._ensure_span_open()?;
        self._flush_deferred_tabs();
        let ch = to_unicode_by_name(self._current_font_name(), c);
        if ch != '\u{FFFD}' {
            self.top_mut().text_buffer.push(ch);
        }
        Ok(())
    }

    /// §4.6: `U+FFFD` is the "no character" convention and is skipped
    /// silently.
    pub fn insert_unicode(&mut self, codepoint: u32) -> Result<()> {
        self._ensure_paragraph_open()?;
        self._ensure_span_open()?;
        self._flush_deferred_tabs();
        if codepoint == 0xFFFD {
            return Ok(());
        }
        if let Some(ch) = char::from_u32(codepoint) {
            self.top_mut().text_buffer.push(ch);
        }
        Ok(())
    }

    pub fn insert_tab(&mut self) -> Result<()> {
        if !self.top().paragraph_open && !self.top().list_element_open {
            self.top_mut().deferred_tabs += 1;
            return Ok(());
        }
        self._flush_text();
        self._ensure_span_open()?;
        self.sink.insert_tab();
        Ok(())
    }

    /// §4.6: flushes pending tabs, closes the paragraph or list element,
    /// and clears superscript/subscript so the next span starts neutral.
    pub fn insert_eol(&mut self) -> Result<()> {
        self._close_paragraph_or_list_element()?;
        let state = self.top_mut();
        state.pending_paragraph.left.tab = 0.0;
        state.pending_paragraph.right.tab = 0.0;
        state
            .pending_font
            .flags
            .remove(StyleFlags::SUPERSCRIPT | StyleFlags::SUBSCRIPT);
        Ok(())
    }

    fn _close_paragraph_or_list_element(&mut self) -> Result<()> {
        self._flush_deferred_tabs();
        self._flush_text();
        if self.top().span_open {
            self.sink.close_span();
            let state = self.top_mut();
            state.span_open = false;
            state.applied_font = None;
        }
        if self.top().list_element_open {
            self.sink.close_list_element();
            self.top_mut().list_element_open = false;
        } else if self.top().paragraph_open {
            self.sink.close_paragraph();
            self.top_mut().paragraph_open = false;
        }
        Ok(())
    }

    /// Fields render via the sink's `insert_field` rather than computing
    /// a wall-clock date/time inside the core: §6.6 rules out ambient
    /// environment/state reads, and a deterministic parse shouldn't
    /// depend on the clock the library happens to run under. Date/Time
    /// carry the format string spec §4.6 calls for so the back end can
    /// render it however it sees fit.
    pub fn insert_field(&mut self, kind: FieldKind) -> Result<()> {
        self._ensure_paragraph_open()?;
        self._ensure_span_open()?;
        self._flush_text();
        let (name, props) = match kind {
            FieldKind::PageNumber => (
                "text:page-number",
                PropertyList::new().set_int("libwpd:id", (self.page_span_index + 1) as i64),
            ),
            FieldKind::Date => (
                "text:date",
                PropertyList::new().set_str("libwpd:format", "%m/%d/%y"),
            ),
            FieldKind::Time => (
                "text:time",
                PropertyList::new().set_str("libwpd:format", "%I:%M:%S %p"),
            ),
            FieldKind::Title => ("text:title", PropertyList::new()),
            FieldKind::DatabaseLink => ("text:database-display", PropertyList::new()),
        };
        self.sink.insert_field(name, &props);
        Ok(())
    }

    /// §4.6: closes any open paragraph/list first; inside a sub-document,
    /// a hard page break degrades to a column break (no nested pages).
    pub fn insert_break(&mut self, kind: BreakKind) -> Result<()> {
        self._close_paragraph_or_list_element()?;
        let in_subdoc = self.top().subdocument_kind.is_some();
        let effective = if in_subdoc && matches!(kind, BreakKind::Page | BreakKind::SoftPage) {
            BreakKind::Column
        } else {
            kind
        };
        match effective {
            BreakKind::Column => self.sink.insert_column_break(),
            BreakKind::Page | BreakKind::SoftPage => {
                self._ensure_page_span_open()?;
                self.sink.insert_page_break();
            }
        }
        Ok(())
    }

    // -- frames / pictures / text boxes ----------------------------------

    pub fn open_frame(&mut self, position: Position) -> Result<()> {
        if self.top().frame_open {
            log::warn!("open_frame called while a frame is already open");
            return Ok(());
        }
        if self.top().table.table_open && !self.top().table.cell_open {
            log::warn!("open_frame called inside a table with no open cell");
            return Ok(());
        }
        let props = frame_properties(&position, self.current_page_size);
        self.sink.open_frame(&props);
        self.top_mut().frame_open = true;
        Ok(())
    }

    pub fn close_frame(&mut self) -> Result<()> {
        if !self.top().frame_open {
            log::warn!("close_frame called with no frame open");
            return Ok(());
        }
        self.sink.close_frame();
        self.top_mut().frame_open = false;
        Ok(())
    }

    pub fn insert_picture(&mut self, position: Position, bytes: &[u8], mime: &str) -> Result<()> {
        self.open_frame(position)?;
        let props = PropertyList::new().set_str("libwpd:mime-type", mime);
        self.sink.insert_binary_object(&props, bytes);
        self.close_frame()
    }

    pub fn insert_text_box(
        &mut self,
        id: SubDocumentId,
        position: Position,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.open_frame(position)?;
        self.sink.open_text_box(&PropertyList::new());
        self._handle_subdocument(id, SubDocumentKind::TextBox, body)?;
        self.sink.close_text_box();
        self.close_frame()
    }

    // -- notes / comments --------------------------------------------------

    pub fn insert_note(
        &mut self,
        kind: NoteKind,
        id: SubDocumentId,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if self.top().in_note {
            log::warn!("insert_note called while already inside a note; ignored");
            return Ok(());
        }
        let number = match kind {
            NoteKind::Footnote => {
                self.top_mut().footnote_number += 1;
                self.top().footnote_number
            }
            NoteKind::Endnote => {
                self.top_mut().endnote_number += 1;
                self.top().endnote_number
            }
        };
        let props = PropertyList::new().set_int("libwpd:id", number as i64);
        match kind {
            NoteKind::Footnote => self.sink.open_footnote(&props),
            NoteKind::Endnote => self.sink.open_endnote(&props),
        }
        let sub_kind = match kind {
            NoteKind::Footnote => SubDocumentKind::Footnote,
            NoteKind::Endnote => SubDocumentKind::Endnote,
        };
        self._handle_subdocument(id, sub_kind, body)?;
        match kind {
            NoteKind::Footnote => self.sink.close_footnote(),
            NoteKind::Endnote => self.sink.close_endnote(),
        }
        Ok(())
    }

    pub fn insert_comment(
        &mut self,
        id: SubDocumentId,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.sink.open_comment(&PropertyList::new());
        self._handle_subdocument(id, SubDocumentKind::Comment, body)?;
        self.sink.close_comment();
        Ok(())
    }

    pub fn insert_header(
        &mut self,
        id: SubDocumentId,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.sink.open_header(&PropertyList::new());
        self._handle_subdocument(id, SubDocumentKind::Header, body)?;
        self.sink.close_header();
        Ok(())
    }

    pub fn insert_footer(
        &mut self,
        id: SubDocumentId,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.sink.open_footer(&PropertyList::new());
        self._handle_subdocument(id, SubDocumentKind::Footer, body)?;
        self.sink.close_footer();
        Ok(())
    }

    /// §3.9/§5: pushes a fresh state, runs `body`, then pops it — the
    /// bounded-stack model of sub-document recursion. Re-entry with an
    /// identity already on the active set is a detected loop and is
    /// rejected without emitting anything (§4.6's loop guard).
    fn _handle_subdocument(
        &mut self,
        id: SubDocumentId,
        kind: SubDocumentKind,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if self.active_subdocuments.contains(&id) {
            log::warn!("re-entrant sub-document {id:?} detected; skipping");
            return Ok(());
        }
        self.active_subdocuments.insert(id);
        let child = self.top().new_child(kind);
        self.states.push(child);
        let result = body(self);
        let _ = self._close_paragraph_or_list_element();
        if self.top().section_open {
            let _ = self.close_section();
        }
        self.states.pop();
        self.active_subdocuments.remove(&id);
        result
    }

    // -- tables --------------------------------------------------------

    pub fn open_table(&mut self, col_widths: Vec<f64>, unit: MeasureUnit) -> Result<()> {
        if self.top().table.table_open {
            log::warn!("open_table called while a table is already open");
            return Ok(());
        }
        let widths: Vec<f64> = col_widths.into_iter().map(|w| to_inches(w, unit)).collect();
        self.sink.open_table(&PropertyList::new(), &widths);
        self.top_mut().table = TableState {
            table_open: true,
            ..TableState::default()
        };
        Ok(())
    }

    pub fn close_table(&mut self) -> Result<()> {
        if !self.top().table.table_open {
            log::warn!("close_table called with no table open");
            return Ok(());
        }
        if self.top().table.row_open {
            self.close_table_row()?;
        }
        self.sink.close_table();
        self.top_mut().table = TableState::default();
        Ok(())
    }

    pub fn open_table_row(&mut self, height: f64, unit: MeasureUnit, header: bool) -> Result<()> {
        if !self.top().table.table_open {
            log::warn!("open_table_row called with no table open");
            return Ok(());
        }
        if self.top().table.row_open {
            log::warn!("open_table_row called while a row is already open");
            return Ok(());
        }
        let props = PropertyList::new()
            .set_float("style:row-height", to_inches(height, unit), PropertyUnit::Inch)
            .set_bool("libwpd:is-header-row", header);
        self.sink.open_table_row(&props);
        self.top_mut().table.row_open = true;
        self.top_mut().table.current_col = 0;
        Ok(())
    }

    pub fn close_table_row(&mut self) -> Result<()> {
        if !self.top().table.row_open {
            log::warn!("close_table_row called with no row open");
            return Ok(());
        }
        if self.top().table.cell_open {
            self.close_table_cell()?;
        }
        self.sink.close_table_row();
        self.top_mut().table.row_open = false;
        self.top_mut().table.current_row += 1;
        Ok(())
    }

    /// §4.6: closes any previously-open cell before opening the new one.
    pub fn open_table_cell(&mut self, cell: Cell, extras: PropertyList) -> Result<()> {
        if !self.top().table.row_open {
            log::warn!("open_table_cell called with no row open");
            return Ok(());
        }
        if self.top().table.cell_open {
            self.close_table_cell()?;
        }
        let props = cell_properties(&cell, &extras);
        self.sink.open_table_cell(&props);
        self.top_mut().table.cell_open = true;
        Ok(())
    }

    pub fn close_table_cell(&mut self) -> Result<()> {
        if !self.top().table.cell_open {
            log::warn!("close_table_cell called with no cell open");
            return Ok(());
        }
        self._close_paragraph_or_list_element()?;
        self.sink.close_table_cell();
        self.top_mut().table.cell_open = false;
        self.top_mut().table.current_col += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_page_span() -> PageSpan {
        PageSpan::from_printer_defaults()
    }

    fn listener() -> Listener<sink::RecordingSink> {
        Listener::new(sink::RecordingSink::new(), vec![one_page_span(), one_page_span()])
    }

    #[test]
    fn empty_document_opens_and_closes_everything_in_order() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l._ensure_paragraph_open().unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert_eq!(
            sink.events,
            vec![
                "start_document",
                "open_page_span",
                "open_section",
                "open_paragraph",
                "close_paragraph",
                "close_section",
                "close_page_span",
                "end_document",
            ]
        );
    }

    #[test]
    fn hello_with_hard_return() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        for c in b"Hello" {
            l.insert_character(*c).unwrap();
        }
        l.insert_eol().unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert!(sink.events.contains(&"open_span".to_string()));
        assert!(sink.events.contains(&"insert_text(\"Hello\")".to_string()));
        let span_open = sink.events.iter().position(|e| e == "open_span").unwrap();
        let text = sink
            .events
            .iter()
            .position(|e| e == "insert_text(\"Hello\")")
            .unwrap();
        let span_close = sink.events.iter().position(|e| e == "close_span").unwrap();
        assert!(span_open < text && text < span_close);
    }

    #[test]
    fn deferred_tabs_flush_when_paragraph_opens() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l.insert_tab().unwrap();
        l.insert_tab().unwrap();
        l.insert_character(b'A').unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        let idx = |needle: &str| sink.events.iter().position(|e| e == needle).unwrap();
        assert!(idx("open_paragraph") < idx("open_span"));
        assert_eq!(sink.events.iter().filter(|e| *e == "insert_tab").count(), 2);
        let first_tab = sink.events.iter().position(|e| e == "insert_tab").unwrap();
        assert!(idx("open_span") < first_tab);
        assert!(first_tab < idx("insert_text(\"A\")"));
    }

    #[test]
    fn column_break_does_not_reopen_section() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(Some(vec![3.0, 3.0]), MeasureUnit::Inch)
            .unwrap();
        l.insert_character(b'a').unwrap();
        l.insert_break(BreakKind::Column).unwrap();
        l.insert_character(b'b').unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert_eq!(
            sink.events.iter().filter(|e| *e == "open_section").count(),
            1
        );
        assert!(sink.events.contains(&"insert_column_break".to_string()));
    }

    #[test]
    fn footnote_emits_nested_paragraph_and_span() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l.insert_note(NoteKind::Footnote, SubDocumentId(1), |inner| {
            inner.insert_character(b'a')?;
            inner.insert_character(b'b')?;
            inner.insert_character(b'c')?;
            Ok(())
        })
        .unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        let idx = |needle: &str| sink.events.iter().position(|e| e == needle).unwrap();
        assert!(idx("open_footnote") < idx("open_paragraph"));
        assert!(idx("insert_text(\"abc\")") < idx("close_footnote"));
    }

    #[test]
    fn reentrant_subdocument_is_rejected() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        let id = SubDocumentId(7);
        l.insert_note(NoteKind::Footnote, id, |inner| {
            inner.insert_note(NoteKind::Footnote, id, |_| Ok(()))
        })
        .unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert_eq!(
            sink.events.iter().filter(|e| *e == "open_footnote").count(),
            1
        );
    }

    #[test]
    fn identical_font_size_does_not_reopen_span() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l.set_font_size(12.0);
        l.insert_character(b'a').unwrap();
        l.set_font_size(12.0);
        l.insert_character(b'b').unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert_eq!(sink.events.iter().filter(|e| *e == "open_span").count(), 1);
    }

    #[test]
    fn table_two_by_two_emits_four_cells() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l.open_table(vec![100.0, 100.0], MeasureUnit::Point).unwrap();
        for row in 0..2u32 {
            l.open_table_row(100.0, MeasureUnit::Point, false).unwrap();
            for col in 0..2u32 {
                l.open_table_cell(Cell::new(col, row), PropertyList::new())
                    .unwrap();
                l.insert_character(b'x').unwrap();
                l.close_table_cell().unwrap();
            }
            l.close_table_row().unwrap();
        }
        l.close_table().unwrap();
        l.end_document().unwrap();
        let sink = l.into_sink();
        assert_eq!(
            sink.events.iter().filter(|e| *e == "open_table_cell").count(),
            4
        );
    }

    #[test]
    fn page_margin_change_preserves_observable_paragraph_margin() {
        let mut l = listener();
        l.start_document(PropertyList::new()).unwrap();
        l.open_section(None, MeasureUnit::Inch).unwrap();
        l.set_paragraph_margin(MarginEdge::Left, 0.5, MeasureUnit::Inch);
        let total_before = l.states[0].pending_paragraph.left.total();
        l._retarget_page_margins(2.0, 2.0);
        let total_after = l.states[0].pending_paragraph.left.total();
        assert!((total_before - total_after).abs() < 1e-9);
    }
}
