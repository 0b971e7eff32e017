//! The data model (§3): geometry, font/paragraph/cell descriptors, style
//! catalogs, and the page-span/block-tree types that round out a page's
//! layout description. These are plain value types — no behavior beyond
//! arithmetic and the invariant-preserving constructors spec.md calls for.

use bitflags::bitflags;
use crate::list_engine::NumberingKind;
use std::cmp::Ordering;
use std::ops::{Add, Sub};

// ---------------------------------------------------------------------
// §3.1 Geometry
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Vec2<T> {
    pub x: T,
    pub y: T,
}

impl<T> Vec2<T> {
    pub fn new(x: T, y: T) -> Self {
        Vec2 { x, y }
    }
}

/// Lexicographic comparison by the *last* coordinate first, per §3.1.
impl<T: PartialOrd> PartialOrd for Vec2<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.y.partial_cmp(&other.y) {
            Some(Ordering::Equal) => self.x.partial_cmp(&other.x),
            other => other,
        }
    }
}

impl<T: Ord> Ord for Vec2<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.y.cmp(&other.y).then_with(|| self.x.cmp(&other.x))
    }
}

impl<T: Add<Output = T>> Add for Vec2<T> {
    type Output = Vec2<T>;
    fn add(self, other: Self) -> Self {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl<T: Sub<Output = T>> Sub for Vec2<T> {
    type Output = Vec2<T>;
    fn sub(self, other: Self) -> Self {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Vec3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> Vec3<T> {
    pub fn new(x: T, y: T, z: T) -> Self {
        Vec3 { x, y, z }
    }
}

impl<T: PartialOrd> PartialOrd for Vec3<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.z.partial_cmp(&other.z) {
            Some(Ordering::Equal) => match self.y.partial_cmp(&other.y) {
                Some(Ordering::Equal) => self.x.partial_cmp(&other.x),
                other => other,
            },
            other => other,
        }
    }
}

impl<T: Ord> Ord for Vec3<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.z
            .cmp(&other.z)
            .then_with(|| self.y.cmp(&other.y))
            .then_with(|| self.x.cmp(&other.x))
    }
}

/// An axis-aligned box storing only its min/max corners. `min <= max`
/// componentwise is maintained by every constructor and mutator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2<T> {
    min: Vec2<T>,
    max: Vec2<T>,
}

impl<T: PartialOrd + Copy> Box2<T> {
    /// Normalizes `a`/`b` into min/max corners regardless of input order.
    pub fn new(a: Vec2<T>, b: Vec2<T>) -> Self {
        let min = Vec2::new(
            if a.x <= b.x { a.x } else { b.x },
            if a.y <= b.y { a.y } else { b.y },
        );
        let max = Vec2::new(
            if a.x >= b.x { a.x } else { b.x },
            if a.y >= b.y { a.y } else { b.y },
        );
        Box2 { min, max }
    }

    pub fn min(&self) -> Vec2<T> {
        self.min
    }

    pub fn max(&self) -> Vec2<T> {
        self.max
    }
}

impl Box2<f64> {
    /// Grows the box by `delta` centered on its current center: each edge
    /// moves out by `delta / 2`, per §3.1 and the line-width/arrow-extent
    /// bounding-box rule of §4.3.
    pub fn extend(&self, delta: Vec2<f64>) -> Box2<f64> {
        let half = Vec2::new(delta.x / 2.0, delta.y / 2.0);
        Box2 {
            min: self.min - half,
            max: self.max + half,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

// ---------------------------------------------------------------------
// §3.2 Font
// ---------------------------------------------------------------------

bitflags! {
    /// Style-flag bit-set (§3.2). Each constant is a distinct bit; several
    /// are mutually informative but not mutually exclusive (a font can be
    /// both `SMALL_CAPS` and `ALL_CAPS` simultaneously in source data,
    /// even if no renderer would honor both).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StyleFlags: u32 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINE_SINGLE = 1 << 2;
        const UNDERLINE_DOUBLE = 1 << 3;
        const STRIKETHROUGH = 1 << 4;
        const OUTLINE = 1 << 5;
        const SHADOW = 1 << 6;
        const EMBOSS = 1 << 7;
        const ENGRAVE = 1 << 8;
        const SUPERSCRIPT = 1 << 9;
        const SUBSCRIPT = 1 << 10;
        const HIDDEN = 1 << 11;
        const ALL_CAPS = 1 << 12;
        const SMALL_CAPS = 1 << 13;
        const REVERSE_VIDEO = 1 << 14;
        const BLINK = 1 << 15;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}

/// A font reference plus the attributes overlaid on it at a text position
/// (§3.2). `family_id < 0` means "unset": the span inherits the enclosing
/// scope's font entirely rather than overriding any field.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family_id: i32,
    pub size: f64,
    pub flags: StyleFlags,
    pub color: Color,
}

impl Font {
    pub fn unset() -> Self {
        Font {
            family_id: -1,
            size: 0.0,
            flags: StyleFlags::empty(),
            color: Color::BLACK,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.family_id < 0
    }

    /// Clamps to the `size >= 0` invariant rather than rejecting the
    /// value; parsers that read a negative size from a corrupt record
    /// recover by clamping and logging, per §7's recovery policy.
    pub fn set_size(&mut self, size: f64) {
        if size < 0.0 {
            log::warn!("negative font size {size} clamped to 0");
            self.size = 0.0;
        } else {
            self.size = size;
        }
    }
}

impl Default for Font {
    fn default() -> Self {
        Font::unset()
    }
}

// ---------------------------------------------------------------------
// §3.3 Paragraph (ruler)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSpacingUnit {
    PercentOfLine,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSpacing {
    pub value: f64,
    pub unit: LineSpacingUnit,
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing {
            value: 100.0,
            unit: LineSpacingUnit::PercentOfLine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justification {
    Left,
    Center,
    Right,
    Full,
    FullAllLines,
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAlignment {
    Left,
    Center,
    Right,
    Decimal,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabStop {
    /// Position in inches from the left margin.
    pub position: f64,
    pub alignment: TabAlignment,
    /// `0` means no leader character.
    pub leader: u8,
    pub decimal_char: u8,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BorderMask: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const TOP = 1 << 2;
        const BOTTOM = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub first_line_indent: f64,
    pub left_margin: f64,
    pub right_margin: f64,
    pub line_spacing: LineSpacing,
    pub space_before: f64,
    pub space_after: f64,
    pub justification: Justification,
    pub tabs: Vec<TabStop>,
    pub border: Option<BorderMask>,
    /// `0` means this paragraph is not a list item; `1..` is the nesting
    /// depth `Listener::set_current_list_level` (§4.6.4) should target.
    pub list_level: u8,
    /// Numbering style for `list_level`, `None` when `list_level == 0`.
    pub list_kind: Option<NumberingKind>,
}

impl Default for Paragraph {
    fn default() -> Self {
        Paragraph {
            first_line_indent: 0.0,
            left_margin: 0.0,
            right_margin: 0.0,
            line_spacing: LineSpacing::default(),
            space_before: 0.0,
            space_after: 0.0,
            justification: Justification::Left,
            tabs: Vec::new(),
            border: None,
            list_level: 0,
            list_kind: None,
        }
    }
}

impl Paragraph {
    /// Inserts `tab`, maintaining the "tab positions strictly increasing"
    /// invariant (§3.3) by rejecting (and logging) a non-increasing
    /// insert rather than panicking.
    pub fn push_tab(&mut self, tab: TabStop) {
        if let Some(last) = self.tabs.last() {
            if tab.position <= last.position {
                log::warn!(
                    "non-increasing tab position {} after {}, dropped",
                    tab.position,
                    last.position
                );
                return;
            }
        }
        self.tabs.push(tab);
    }
}

// ---------------------------------------------------------------------
// §3.4 Cell
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormatHint {
    Numeric,
    Date,
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub col: u32,
    pub row: u32,
    pub colspan: u32,
    pub rowspan: u32,
    pub border: Option<BorderMask>,
    pub alignment: HorizontalAlignment,
    pub format_hint: Option<CellFormatHint>,
    pub protected: bool,
}

impl Cell {
    pub fn new(col: u32, row: u32) -> Self {
        Cell {
            col,
            row,
            colspan: 1,
            rowspan: 1,
            border: None,
            alignment: HorizontalAlignment::Left,
            format_hint: None,
            protected: false,
        }
    }
}

// ---------------------------------------------------------------------
// §3.5 Style catalogs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NamedStyle {
    pub font_id: i32,
    pub paragraph_id: i32,
    /// `-1` means no parent; resolution walks parents until `-1` (§3.5).
    pub parent_id: i32,
}

// ---------------------------------------------------------------------
// §3.7 Page span
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrencePolicy {
    Odd,
    Even,
    All,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFooterKind {
    Header,
    Footer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubDocumentId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderFooterDescriptor {
    pub occurrence: OccurrencePolicy,
    pub kind: HeaderFooterKind,
    pub subdoc: SubDocumentId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// A run of identically-shaped pages (§3.7). `form_length`/`form_width`
/// are in points; per §9's open question they are treated as
/// *approximate* when headers/footers contribute to the printed area,
/// since the original tooling this crate is modeled on computes them the
/// same (documented-inaccurate) way.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpan {
    pub form_length: f64,
    pub form_width: f64,
    pub orientation: Orientation,
    pub margins: Margins,
    pub headers_footers: Vec<HeaderFooterDescriptor>,
    pub page_number_position: Option<HorizontalAlignment>,
    pub page_span_count: u32,
}

impl PageSpan {
    /// US Letter, portrait, 1in margins, no headers/footers — the
    /// convenience constructor §B of SPEC_FULL.md calls for.
    pub fn from_printer_defaults() -> Self {
        PageSpan {
            form_length: 792.0,
            form_width: 612.0,
            orientation: Orientation::Portrait,
            margins: Margins {
                top: 72.0,
                bottom: 72.0,
                left: 72.0,
                right: 72.0,
            },
            headers_footers: Vec::new(),
            page_number_position: None,
            page_span_count: 1,
        }
    }
}

// ---------------------------------------------------------------------
// §3.8 Block (frame) tree
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Graphic,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sides<T> {
    pub top: T,
    pub left: T,
    pub bottom: T,
    pub right: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub bbox: Box2<f64>,
    pub border_widths: Sides<f64>,
    pub file_block_id: u32,
    pub parent: Option<BlockId>,
    pub next: Option<BlockId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_orders_by_last_coordinate() {
        let a = Vec2::new(5.0, 1.0);
        let b = Vec2::new(0.0, 2.0);
        assert!(a.partial_cmp(&b) == Some(Ordering::Less));
    }

    #[test]
    fn box2_normalizes_corners() {
        let b = Box2::new(Vec2::new(5.0, 5.0), Vec2::new(0.0, 0.0));
        assert_eq!(b.min(), Vec2::new(0.0, 0.0));
        assert_eq!(b.max(), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn box2_extend_centers() {
        let b = Box2::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let grown = b.extend(Vec2::new(2.0, 2.0));
        assert_eq!(grown.min(), Vec2::new(-1.0, -1.0));
        assert_eq!(grown.max(), Vec2::new(11.0, 11.0));
    }

    #[test]
    fn paragraph_rejects_non_increasing_tabs() {
        let mut p = Paragraph::default();
        p.push_tab(TabStop { position: 1.0, alignment: TabAlignment::Left, leader: 0, decimal_char: 0 });
        p.push_tab(TabStop { position: 0.5, alignment: TabAlignment::Left, leader: 0, decimal_char: 0 });
        assert_eq!(p.tabs.len(), 1);
    }

    #[test]
    fn font_unset_has_negative_id() {
        assert!(Font::unset().is_unset());
    }
}
