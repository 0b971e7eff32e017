//! The ClarisWorks (and AppleWorks) text-document parser — the one
//! concrete [`PerFormatParser`](super::PerFormatParser) this core
//! implements end to end, per SPEC_FULL.md §C. Grounded on
//! `examples/original_source/src/lib/CWText.cxx`: its `readFonts`/
//! `readDSETZone`/`readFont` idiom (seek to a zone's entry, read a
//! fixed-size header, then `N` fixed-size records) is the shape every
//! catalog reader below follows, translated onto [`Stream`] in place of
//! the original's `TMWAWInputStream`/`IMWAWEntry` pair.
//!
//! ## Container shape
//!
//! A document opens with an 8-byte header — 4-byte magic `BOBO` (the
//! genuine ClarisWorks/AppleWorks signature), a big-endian `u16` version
//! (high bit set means password-protected, §7's `unsupported-encryption`),
//! and a big-endian `u16` zone count — followed immediately by that many
//! 12-byte zone directory records ([`super::read_zone_directory`]).
//! [`ZoneKind`] enumerates the zone kinds this parser understands; each
//! zone's body is parsed under a pushed [`Stream`] limit spanning
//! `[offset, offset + length)`.

use crate::error::{MwawError, Result};
use crate::font_registry::FontRegistry;
use crate::list_engine::{ListId, ListLevel, NumberingKind};
use crate::listener::sink::{DocumentSink, PropertyList};
use crate::listener::{BreakKind, FieldKind, FrameAnchor, Listener, MeasureUnit, NoteKind, Position, WrapMode, XAlign, YAlign};
use crate::picture::{Bitmap, OleContainer, PictBasic, Picture, PixelFormat, Rectangle};
use crate::plc::{Plc, PlcCursor, PlcEvent};
use crate::stream::{Stream, Whence};
use crate::style::StyleCatalogs;
use crate::table_layout::{self, UnplacedCell};
use crate::types::{
    Box2, Cell, Color, Font, Justification, LineSpacing, LineSpacingUnit, NamedStyle,
    Paragraph, PageSpan, StyleFlags, SubDocumentId, TabAlignment, TabStop, Vec2,
};
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"BOBO";
const ENCRYPTED_FLAG: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum ZoneKind {
    FontNames = 1,
    FontCatalog = 2,
    ParagraphCatalog = 3,
    StyleCatalog = 4,
    SectionDefs = 5,
    MainText = 6,
    CharStyles = 7,
    TextStruct = 8,
    SectionBreaks = 9,
    PageBreaks = 10,
    Tokens = 11,
    FootnoteBodies = 12,
    Pictures = 13,
    Tables = 14,
    Spreadsheet = 15,
    Chart = 16,
}

impl ZoneKind {
    fn from_u16(v: u16) -> Option<ZoneKind> {
        Some(match v {
            1 => ZoneKind::FontNames,
            2 => ZoneKind::FontCatalog,
            3 => ZoneKind::ParagraphCatalog,
            4 => ZoneKind::StyleCatalog,
            5 => ZoneKind::SectionDefs,
            6 => ZoneKind::MainText,
            7 => ZoneKind::CharStyles,
            8 => ZoneKind::TextStruct,
            9 => ZoneKind::SectionBreaks,
            10 => ZoneKind::PageBreaks,
            11 => ZoneKind::Tokens,
            12 => ZoneKind::FootnoteBodies,
            13 => ZoneKind::Pictures,
            14 => ZoneKind::Tables,
            15 => ZoneKind::Spreadsheet,
            16 => ZoneKind::Chart,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Footnote,
    PageNumber,
    Date,
    Time,
    Title,
    Picture,
    Table,
}

impl TokenKind {
    fn from_u8(v: u8) -> Option<TokenKind> {
        Some(match v {
            0 => TokenKind::Footnote,
            1 => TokenKind::PageNumber,
            2 => TokenKind::Date,
            3 => TokenKind::Time,
            4 => TokenKind::Title,
            5 => TokenKind::Picture,
            6 => TokenKind::Table,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenDef {
    kind: TokenKind,
    ref_id: u32,
}

/// §4.7's "inspect the first 4-64 bytes for a magic/version". Does not
/// permanently move the stream's position.
pub fn check_header(stream: &mut Stream) -> Result<()> {
    super::require_magic(stream, MAGIC)
}

/// Zero-sized handle implementing [`super::PerFormatParser`] so
/// `Document::parse` can dispatch through the trait like any future
/// second or third format would, instead of hard-coding this one.
pub struct ClarisWorksParser;

impl super::PerFormatParser for ClarisWorksParser {
    fn check_header(stream: &mut Stream) -> Result<()> {
        check_header(stream)
    }
}

fn justification_from_u8(v: u8) -> Justification {
    match v {
        1 => Justification::Center,
        2 => Justification::Right,
        3 => Justification::Full,
        4 => Justification::FullAllLines,
        5 => Justification::Decimal,
        _ => Justification::Left,
    }
}

fn tab_alignment_from_u8(v: u8) -> TabAlignment {
    match v {
        1 => TabAlignment::Center,
        2 => TabAlignment::Right,
        3 => TabAlignment::Decimal,
        4 => TabAlignment::Bar,
        _ => TabAlignment::Left,
    }
}

/// §4.5's bullet/numbered-paragraph indicator, stored as the paragraph
/// catalog's trailing byte pair: a `list_level` (`0` = not a list item)
/// followed by this numbering-kind byte.
fn numbering_kind_from_u8(v: u8) -> NumberingKind {
    match v {
        1 => NumberingKind::UpperAlpha,
        2 => NumberingKind::LowerAlpha,
        3 => NumberingKind::UpperRoman,
        4 => NumberingKind::LowerRoman,
        5 => NumberingKind::Bullet,
        _ => NumberingKind::Arabic,
    }
}

/// One zone's worth of pre-parsed state this parser's catalog pass
/// produces before the text pass can run (§4.7 step 3: "all before
/// emitting any events").
#[derive(Default)]
struct Catalogs {
    style: StyleCatalogs,
    font_registry: FontRegistry,
    section_defs: Vec<Vec<f64>>,
    token_defs: Vec<TokenDef>,
    footnote_bodies: HashMap<u32, Vec<u8>>,
    pictures: HashMap<u32, Vec<u8>>,
    tables: HashMap<u32, Vec<UnplacedTableCell>>,
}

#[derive(Debug, Clone)]
struct UnplacedTableCell {
    bbox: Box2<f64>,
    text: Vec<u8>,
}

fn read_font_names(stream: &mut Stream, registry: &mut FontRegistry) -> Result<()> {
    while !stream.at_eos() {
        let id = stream.i16()?;
        let len = stream.u8()? as usize;
        let name_bytes = stream.read_block(len)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        registry.register(id as i32, name);
    }
    Ok(())
}

fn read_font_catalog(stream: &mut Stream) -> Result<Vec<Font>> {
    let mut fonts = Vec::new();
    while !stream.at_eos() {
        let family_id = stream.i16()? as i32;
        let size = stream.u8()? as f64;
        let flags = StyleFlags::from_bits_truncate(stream.u16()? as u32);
        let r = stream.u8()?;
        let g = stream.u8()?;
        let b = stream.u8()?;
        fonts.push(Font {
            family_id,
            size,
            flags,
            color: Color::new(r, g, b),
        });
    }
    Ok(fonts)
}

fn read_paragraph_catalog(stream: &mut Stream) -> Result<Vec<Paragraph>> {
    let mut out = Vec::new();
    while !stream.at_eos() {
        let justification = justification_from_u8(stream.u8()?);
        let unit = stream.u8()?;
        let spacing_raw = stream.i16()? as f64;
        let line_spacing = if unit == 0 {
            LineSpacing { value: spacing_raw, unit: LineSpacingUnit::Points }
        } else {
            LineSpacing { value: spacing_raw, unit: LineSpacingUnit::PercentOfLine }
        };
        let first_line_indent = stream.i16()? as f64 / 1440.0;
        let left_margin = stream.i16()? as f64 / 1440.0;
        let right_margin = stream.i16()? as f64 / 1440.0;
        let space_before = stream.i16()? as f64;
        let space_after = stream.i16()? as f64;
        let tab_count = stream.u8()?;
        let mut tabs = Vec::with_capacity(tab_count as usize);
        for _ in 0..tab_count {
            let position = stream.i16()? as f64 / 1440.0;
            let alignment = tab_alignment_from_u8(stream.u8()?);
            let leader = stream.u8()?;
            let decimal_char = stream.u8()?;
            tabs.push(TabStop { position, alignment, leader, decimal_char });
        }
        let list_level = stream.u8()?;
        let list_kind_byte = stream.u8()?;
        let list_kind = if list_level > 0 {
            Some(numbering_kind_from_u8(list_kind_byte))
        } else {
            None
        };
        out.push(Paragraph {
            first_line_indent,
            left_margin,
            right_margin,
            line_spacing,
            space_before,
            space_after,
            justification,
            tabs,
            border: None,
            list_level,
            list_kind,
        });
    }
    Ok(out)
}

fn read_style_catalog(stream: &mut Stream) -> Result<Vec<NamedStyle>> {
    let mut out = Vec::new();
    while !stream.at_eos() {
        let font_id = stream.i16()? as i32;
        let paragraph_id = stream.i16()? as i32;
        let parent_id = stream.i16()? as i32;
        out.push(NamedStyle { font_id, paragraph_id, parent_id });
    }
    Ok(out)
}

fn read_section_defs(stream: &mut Stream) -> Result<Vec<Vec<f64>>> {
    let mut out = Vec::new();
    while !stream.at_eos() {
        let count = stream.u8()?;
        let mut widths = Vec::with_capacity(count as usize);
        for _ in 0..count {
            widths.push(stream.u16()? as f64 / 1440.0);
        }
        out.push(widths);
    }
    Ok(out)
}

fn read_offset_plc<F>(stream: &mut Stream, mut make_event: F) -> Result<Vec<(u32, PlcEvent)>>
where
    F: FnMut(&mut Stream) -> Result<PlcEvent>,
{
    let mut out = Vec::new();
    while !stream.at_eos() {
        let offset = stream.u32()?;
        let event = make_event(stream)?;
        out.push((offset, event));
    }
    Ok(out)
}

fn read_tokens(stream: &mut Stream) -> Result<(Vec<(u32, PlcEvent)>, Vec<TokenDef>)> {
    let mut defs = Vec::new();
    let entries = read_offset_plc(stream, |s| {
        let kind_byte = s.u8()?;
        let ref_id = s.u32()?;
        let kind = TokenKind::from_u8(kind_byte).unwrap_or(TokenKind::Title);
        defs.push(TokenDef { kind, ref_id });
        Ok(PlcEvent::Token((defs.len() - 1) as i32))
    })?;
    Ok((entries, defs))
}

fn read_footnote_bodies(stream: &mut Stream) -> Result<HashMap<u32, Vec<u8>>> {
    let mut out = HashMap::new();
    while !stream.at_eos() {
        let id = stream.u32()?;
        let len = stream.u32()? as usize;
        let bytes = stream.read_block(len)?;
        out.insert(id, bytes.to_vec());
    }
    Ok(out)
}

fn read_pictures(stream: &mut Stream) -> Result<HashMap<u32, Vec<u8>>> {
    let mut out = HashMap::new();
    while !stream.at_eos() {
        let id = stream.u32()?;
        let len = stream.u32()? as usize;
        let bytes = stream.read_block(len)?;
        out.insert(id, bytes.to_vec());
    }
    Ok(out)
}

fn read_tables(stream: &mut Stream) -> Result<HashMap<u32, Vec<UnplacedTableCell>>> {
    let mut out = HashMap::new();
    while !stream.at_eos() {
        let table_id = stream.u32()?;
        let cell_count = stream.u16()?;
        let mut cells = Vec::with_capacity(cell_count as usize);
        for _ in 0..cell_count {
            let x0 = stream.i16()? as f64;
            let y0 = stream.i16()? as f64;
            let x1 = stream.i16()? as f64;
            let y1 = stream.i16()? as f64;
            let text_len = stream.u16()? as usize;
            let text = stream.read_block(text_len)?.to_vec();
            cells.push(UnplacedTableCell {
                bbox: Box2::new(Vec2::new(x0, y0), Vec2::new(x1, y1)),
                text,
            });
        }
        out.insert(table_id, cells);
    }
    Ok(out)
}

/// Decodes one entry of the Pictures zone (§4.7 step 5, "locate the
/// sub-stream via the storage layer, dispatch to Picture"). Byte 0 is a
/// shape tag: `0` = 1-bit bitmap, `1` = 24-bit bitmap, `2` = a basic
/// rectangle. Malformed payloads recover as an empty transparent
/// rectangle rather than aborting the whole parse (§7).
fn decode_picture(bytes: &[u8]) -> Picture {
    let mut stream = Stream::new(bytes);
    match decode_picture_inner(&mut stream) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("malformed picture payload: {e}");
            Picture::OleContainer(OleContainer {
                bbox: Box2::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0)),
                data: Vec::new(),
            })
        }
    }
}

fn decode_picture_inner(stream: &mut Stream) -> Result<Picture> {
    let tag = stream.u8()?;
    match tag {
        0 => {
            let width = stream.u16()? as u32;
            let height = stream.u16()? as u32;
            let row_bytes = (width as usize).div_ceil(8);
            let data = stream.read_block(row_bytes * height as usize)?.to_vec();
            Ok(Picture::Bitmap(Bitmap {
                width,
                height,
                format: PixelFormat::Bitonal,
                data,
                palette: Vec::new(),
            }))
        }
        1 => {
            let width = stream.u16()? as u32;
            let height = stream.u16()? as u32;
            let data = stream.read_block(width as usize * height as usize * 3)?.to_vec();
            Ok(Picture::Bitmap(Bitmap {
                width,
                height,
                format: PixelFormat::Rgb24,
                data,
                palette: Vec::new(),
            }))
        }
        2 => {
            let x0 = stream.i16()? as f64;
            let y0 = stream.i16()? as f64;
            let x1 = stream.i16()? as f64;
            let y1 = stream.i16()? as f64;
            Ok(Picture::Basic(PictBasic::Rectangle(Rectangle::new(
                Box2::new(Vec2::new(x0, y0), Vec2::new(x1, y1)),
            ))))
        }
        other => Err(MwawError::malformed_zone(format!("unknown picture tag {other}"))),
    }
}

/// Parses `data` (a whole-document byte slice recognized by
/// [`check_header`]) and drives `sink` through a complete document parse
/// (§4.7's five steps). Returns the sink back to the caller, mirroring
/// [`crate::listener::Listener::into_sink`].
pub fn parse<S: DocumentSink>(data: &[u8], sink: S) -> Result<S> {
    let mut stream = Stream::new(data);
    check_header(&mut stream)?;

    stream.read_block(4)?; // magic, already verified
    let version = stream.u16()?;
    if version & ENCRYPTED_FLAG != 0 {
        return Err(MwawError::UnsupportedEncryption(
            "ClarisWorks document is password-protected".into(),
        ));
    }
    let zone_count = stream.u16()?;
    let zones = super::read_zone_directory(&mut stream, zone_count)?;

    let mut catalogs = Catalogs::default();
    let mut main_text: Vec<u8> = Vec::new();
    let mut plc_entries: Vec<(u32, PlcEvent)> = Vec::new();

    for zone in &zones {
        let Some(kind) = ZoneKind::from_u16(zone.kind) else {
            log::warn!("unknown zone kind {}, skipped", zone.kind);
            continue;
        };
        stream.seek(zone.offset as i64, Whence::Begin);
        stream.push_limit(zone.offset as usize + zone.length as usize);
        let outcome: Result<()> = (|| {
            match kind {
                ZoneKind::FontNames => read_font_names(&mut stream, &mut catalogs.font_registry),
                ZoneKind::FontCatalog => {
                    catalogs.style.fonts = read_font_catalog(&mut stream)?;
                    Ok(())
                }
                ZoneKind::ParagraphCatalog => {
                    catalogs.style.paragraphs = read_paragraph_catalog(&mut stream)?;
                    Ok(())
                }
                ZoneKind::StyleCatalog => {
                    catalogs.style.styles = read_style_catalog(&mut stream)?;
                    Ok(())
                }
                ZoneKind::SectionDefs => {
                    catalogs.section_defs = read_section_defs(&mut stream)?;
                    Ok(())
                }
                ZoneKind::MainText => {
                    main_text = stream.read_to_end_of_section().to_vec();
                    Ok(())
                }
                ZoneKind::CharStyles => {
                    let entries = read_offset_plc(&mut stream, |s| Ok(PlcEvent::FontChange(s.i32()?)))?;
                    plc_entries.extend(entries);
                    Ok(())
                }
                ZoneKind::TextStruct => {
                    let entries =
                        read_offset_plc(&mut stream, |s| Ok(PlcEvent::ParagraphChange(s.i32()?)))?;
                    plc_entries.extend(entries);
                    Ok(())
                }
                ZoneKind::SectionBreaks => {
                    let entries =
                        read_offset_plc(&mut stream, |s| Ok(PlcEvent::SectionChange(s.i32()?)))?;
                    plc_entries.extend(entries);
                    Ok(())
                }
                ZoneKind::PageBreaks => {
                    let entries = read_offset_plc(&mut stream, |_| Ok(PlcEvent::PageBreak(0)))?;
                    plc_entries.extend(entries);
                    Ok(())
                }
                ZoneKind::Tokens => {
                    let (entries, defs) = read_tokens(&mut stream)?;
                    plc_entries.extend(entries);
                    catalogs.token_defs = defs;
                    Ok(())
                }
                ZoneKind::FootnoteBodies => {
                    catalogs.footnote_bodies = read_footnote_bodies(&mut stream)?;
                    Ok(())
                }
                ZoneKind::Pictures => {
                    catalogs.pictures = read_pictures(&mut stream)?;
                    Ok(())
                }
                ZoneKind::Tables => {
                    catalogs.tables = read_tables(&mut stream)?;
                    Ok(())
                }
                ZoneKind::Spreadsheet | ZoneKind::Chart => {
                    // §4.7: "spreadsheet/chart zones size-checks have a
                    // ±8 tolerance; a mismatch logs and continues." This
                    // core does not parse spreadsheet/chart content; it
                    // only reproduces the documented size-check edge
                    // case and otherwise skips the zone.
                    if stream.len() >= 4 {
                        let declared_records = stream.u32().unwrap_or(0);
                        let expected = 4 + declared_records * 8;
                        if !super::spreadsheet_zone_size_tolerance_ok(expected, zone.length) {
                            log::warn!(
                                "{kind:?} zone {} size {} outside ±8 tolerance of expected {}",
                                zone.id,
                                zone.length,
                                expected
                            );
                        }
                    }
                    Ok(())
                }
            }
        })();
        stream.pop_limit();
        if let Err(e) = outcome {
            log::warn!("zone {} ({:?}) failed to parse: {e}", zone.id, kind);
        }
    }

    let plc = Plc::build(plc_entries, main_text.len() as u32);
    let mut cursor = PlcCursor::new(&plc);

    let mut listener = Listener::new(sink, vec![PageSpan::from_printer_defaults()]);
    listener.start_document(PropertyList::new())?;
    let initial_columns = catalogs.section_defs.first().cloned();
    listener.open_section(initial_columns, MeasureUnit::Inch)?;

    let mut offset: u32 = 0;
    loop {
        let events = cursor.take_at(offset)?;
        for event in events {
            apply_plc_event(&mut listener, &catalogs, event)?;
        }
        if offset as usize >= main_text.len() {
            break;
        }
        let byte = main_text[offset as usize];
        match byte {
            0x0D => listener.insert_eol()?,
            0x09 => listener.insert_tab()?,
            _ => listener.insert_character(byte)?,
        }
        offset += 1;
    }
    if !cursor.at_end() {
        log::warn!("PLC entries remained past end of main text stream");
    }

    listener.end_document()?;
    Ok(listener.into_sink())
}

fn apply_plc_event<S: DocumentSink>(
    listener: &mut Listener<S>,
    catalogs: &Catalogs,
    event: PlcEvent,
) -> Result<()> {
    match event {
        PlcEvent::FontChange(style_id) => {
            let font = catalogs.style.resolve_font(style_id, &Font::unset());
            if font.is_unset() {
                log::warn!("font-change PLC style id {style_id} resolved to no font");
                return Ok(());
            }
            let target = catalogs.font_registry.target_font(font.family_id);
            listener.set_text_font(target.name);
            listener.set_font_size(font.size + target.size_delta);
            listener.set_text_attribute(font.flags);
            listener.set_font_color(font.color);
            Ok(())
        }
        PlcEvent::ParagraphChange(style_id) => {
            let resolved = catalogs.style.resolve_paragraph(style_id);
            listener.justification_change(resolved.justification, false)?;
            listener.line_spacing_change(resolved.line_spacing.value, resolved.line_spacing.unit);
            listener.set_paragraph_margin(
                crate::listener::MarginEdge::Left,
                resolved.left_margin,
                MeasureUnit::Inch,
            );
            listener.set_paragraph_margin(
                crate::listener::MarginEdge::Right,
                resolved.right_margin,
                MeasureUnit::Inch,
            );
            listener.set_paragraph_margin(
                crate::listener::MarginEdge::Top,
                resolved.space_before,
                MeasureUnit::Point,
            );
            listener.set_paragraph_margin(
                crate::listener::MarginEdge::Bottom,
                resolved.space_after,
                MeasureUnit::Point,
            );
            listener.set_paragraph_text_indent(resolved.first_line_indent);
            let (list_level, list_kind, left_margin, first_line_indent) = (
                resolved.list_level,
                resolved.list_kind,
                resolved.left_margin,
                resolved.first_line_indent,
            );
            listener.set_tabs(resolved.tabs, None);
            listener.set_paragraph_border(resolved.border);
            apply_list_level(listener, list_level, list_kind, left_margin, first_line_indent)?;
            Ok(())
        }
        PlcEvent::SectionChange(id) => {
            let Some(widths) = catalogs.section_defs.get(id as usize).cloned() else {
                log::warn!("section-change PLC references missing section-def id {id}");
                return Ok(());
            };
            listener.close_section()?;
            listener.open_section(Some(widths), MeasureUnit::Inch)
        }
        PlcEvent::PageBreak(_) => listener.insert_break(BreakKind::Page),
        PlcEvent::Token(index) => apply_token(listener, catalogs, index),
        PlcEvent::LineBreak(_)
        | PlcEvent::FootnoteRef(_)
        | PlcEvent::Note(_)
        | PlcEvent::TextPosition(_)
        | PlcEvent::HeaderFooterBoundary(_) => Ok(()),
    }
}

/// Every ClarisWorks document shares a single outline numbering sequence
/// (§4.5), so the whole document is one [`ListId`]; `list_level == 0`
/// closes back out to an ordinary paragraph.
const TEXT_LIST_ID: ListId = ListId(0);

fn apply_list_level<S: DocumentSink>(
    listener: &mut Listener<S>,
    list_level: u8,
    list_kind: Option<NumberingKind>,
    left_margin: f64,
    first_line_indent: f64,
) -> Result<()> {
    if list_level == 0 {
        listener.set_current_list(None);
        return listener.set_current_list_level(0);
    }
    let kind = list_kind.unwrap_or(NumberingKind::Arabic);
    listener.list_engine_mut().define_level(
        TEXT_LIST_ID,
        list_level as u32,
        ListLevel {
            kind,
            prefix: String::new(),
            suffix: if kind == NumberingKind::Bullet { String::new() } else { ".".to_string() },
            left_indent: left_margin,
            first_line_indent,
        },
    );
    listener.set_current_list(Some(TEXT_LIST_ID));
    listener.set_current_list_level(list_level as u32)
}

fn apply_token<S: DocumentSink>(
    listener: &mut Listener<S>,
    catalogs: &Catalogs,
    index: i32,
) -> Result<()> {
    let Some(def) = catalogs.token_defs.get(index as usize) else {
        log::warn!("token PLC references missing token-def index {index}");
        return Ok(());
    };
    match def.kind {
        TokenKind::PageNumber => listener.insert_field(FieldKind::PageNumber),
        TokenKind::Date => listener.insert_field(FieldKind::Date),
        TokenKind::Time => listener.insert_field(FieldKind::Time),
        TokenKind::Title => listener.insert_field(FieldKind::Title),
        TokenKind::Footnote => {
            let Some(body) = catalogs.footnote_bodies.get(&def.ref_id) else {
                log::warn!("footnote token references missing body id {}", def.ref_id);
                return Ok(());
            };
            let body = body.clone();
            listener.insert_note(NoteKind::Footnote, SubDocumentId(def.ref_id), |inner| {
                for &byte in &body {
                    match byte {
                        0x0D => inner.insert_eol()?,
                        0x09 => inner.insert_tab()?,
                        _ => inner.insert_character(byte)?,
                    }
                }
                Ok(())
            })
        }
        TokenKind::Picture => {
            let Some(bytes) = catalogs.pictures.get(&def.ref_id) else {
                log::warn!("picture token references missing picture id {}", def.ref_id);
                return Ok(());
            };
            let picture = decode_picture(bytes);
            let (fragment, mime, bbox) = match &picture {
                Picture::Basic(basic) => (basic.to_odg_fragment(), "image/mwaw-odg", basic.bounding_box()),
                Picture::Bitmap(bitmap) => (
                    bitmap.as_pnm(),
                    "image/x-portable-anymap",
                    Box2::new(
                        Vec2::new(0.0, 0.0),
                        Vec2::new(bitmap.width as f64, bitmap.height as f64),
                    ),
                ),
                Picture::OleContainer(ole) => (ole.data.clone(), "application/octet-stream", ole.bbox),
            };
            let position = Position {
                anchor: FrameAnchor::Char,
                x_align: XAlign::Left,
                y_align: YAlign::Top,
                origin: Vec2::new(0.0, 0.0),
                size: Vec2::new(bbox.width(), bbox.height()),
                wrap: WrapMode::None,
                page: None,
            };
            listener.insert_picture(position, &fragment, mime)
        }
        TokenKind::Table => {
            let Some(cells) = catalogs.tables.get(&def.ref_id) else {
                log::warn!("table token references missing table id {}", def.ref_id);
                return Ok(());
            };
            insert_table(listener, cells)
        }
    }
}

/// Drives the table-auto-layout pass (§4.8) for one WriteNow-style cell
/// list, then emits it through the Listener's table operations. A
/// layout failure (malformed/overlapping cells) is recovered per §7: the
/// whole table is skipped rather than aborting the document parse.
fn insert_table<S: DocumentSink>(
    listener: &mut Listener<S>,
    cells: &[UnplacedTableCell],
) -> Result<()> {
    let unplaced: Vec<UnplacedCell> = cells
        .iter()
        .enumerate()
        .map(|(id, c)| UnplacedCell { id, bbox: c.bbox })
        .collect();
    let layout = match table_layout::layout(&unplaced) {
        Ok(l) => l,
        Err(e) => {
            log::warn!("table auto-layout failed, skipping table: {e}");
            return Ok(());
        }
    };
    let col_widths: Vec<f64> = layout.column_widths.clone();
    listener.open_table(col_widths, MeasureUnit::Point)?;
    let mut by_row: Vec<Vec<&table_layout::PlacedCell>> =
        (0..layout.row_heights.len()).map(|_| Vec::new()).collect();
    for placed in &layout.cells {
        if let Some(row) = by_row.get_mut(placed.row as usize) {
            row.push(placed);
        }
    }
    for (row_index, row_cells) in by_row.iter().enumerate() {
        let height = layout.row_heights.get(row_index).copied().unwrap_or(0.0);
        listener.open_table_row(height, MeasureUnit::Point, false)?;
        for placed in row_cells {
            let mut cell = Cell::new(placed.col, placed.row);
            cell.colspan = placed.colspan;
            cell.rowspan = placed.rowspan;
            listener.open_table_cell(cell, PropertyList::new())?;
            let text = &cells[placed.id].text;
            for &byte in text {
                if byte == 0x09 {
                    listener.insert_tab()?;
                } else if byte != 0x0D {
                    listener.insert_character(byte)?;
                }
            }
            listener.close_table_cell()?;
        }
        listener.close_table_row()?;
    }
    listener.close_table()
}

#[cfg(test)]
mod builder {
    //! A hand-rolled encoder for the container shape documented above,
    //! used only by this module's own tests to build synthetic
    //! documents without a real ClarisWorks file on disk.
    use super::*;

    pub struct ZoneBuf {
        pub kind: u16,
        pub id: u16,
        pub bytes: Vec<u8>,
    }

    pub struct DocBuilder {
        zones: Vec<ZoneBuf>,
    }

    impl DocBuilder {
        pub fn new() -> Self {
            DocBuilder { zones: Vec::new() }
        }

        pub fn zone(mut self, kind: ZoneKind, id: u16, bytes: Vec<u8>) -> Self {
            self.zones.push(ZoneBuf { kind: kind as u16, id, bytes });
            self
        }

        pub fn build(self) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(MAGIC);
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&(self.zones.len() as u16).to_be_bytes());
            let dir_len = self.zones.len() * 12;
            let mut body = Vec::new();
            let mut offset = 8 + dir_len;
            let mut dir = Vec::new();
            for zone in &self.zones {
                dir.extend_from_slice(&zone.kind.to_be_bytes());
                dir.extend_from_slice(&zone.id.to_be_bytes());
                dir.extend_from_slice(&(offset as u32).to_be_bytes());
                dir.extend_from_slice(&(zone.bytes.len() as u32).to_be_bytes());
                offset += zone.bytes.len();
                body.extend_from_slice(&zone.bytes);
            }
            out.extend_from_slice(&dir);
            out.extend_from_slice(&body);
            out
        }
    }

    pub fn font_names(entries: &[(i16, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, name) in entries {
            out.extend_from_slice(&id.to_be_bytes());
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    pub fn font_catalog(entries: &[(i16, u8, u16, (u8, u8, u8))]) -> Vec<u8> {
        let mut out = Vec::new();
        for (family, size, flags, (r, g, b)) in entries {
            out.extend_from_slice(&family.to_be_bytes());
            out.push(*size);
            out.extend_from_slice(&flags.to_be_bytes());
            out.push(*r);
            out.push(*g);
            out.push(*b);
        }
        out
    }

    /// One zero-margin, no-tabs, non-list paragraph catalog record.
    pub fn paragraph_catalog_default() -> Vec<u8> {
        paragraph_catalog(&[(0, 0)])
    }

    /// `entries` are `(list_level, list_kind_byte)`; every other field in
    /// the record is left at zero.
    pub fn paragraph_catalog(entries: &[(u8, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (list_level, list_kind_byte) in entries {
            out.extend_from_slice(&[0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
            out.push(*list_level);
            out.push(*list_kind_byte);
        }
        out
    }

    pub fn style_catalog(entries: &[(i16, i16, i16)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (font_id, paragraph_id, parent_id) in entries {
            out.extend_from_slice(&font_id.to_be_bytes());
            out.extend_from_slice(&paragraph_id.to_be_bytes());
            out.extend_from_slice(&parent_id.to_be_bytes());
        }
        out
    }

    pub fn offset_plc_u32(entries: &[(u32, i32)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (offset, value) in entries {
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }

    pub fn offset_plc_empty(offsets: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        for offset in offsets {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out
    }

    pub fn tokens(entries: &[(u32, u8, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (offset, kind, ref_id) in entries {
            out.extend_from_slice(&offset.to_be_bytes());
            out.push(*kind);
            out.extend_from_slice(&ref_id.to_be_bytes());
        }
        out
    }

    pub fn footnote_bodies(entries: &[(u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, text) in entries {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&(text.len() as u32).to_be_bytes());
            out.extend_from_slice(text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::builder::*;
    use super::*;
    use crate::listener::sink::RecordingSink;

    fn parse_ok(bytes: Vec<u8>) -> Vec<String> {
        let sink = parse(&bytes, RecordingSink::new()).expect("parse should succeed");
        sink.events
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 16];
        let mut stream = Stream::new(&bytes);
        assert!(check_header(&mut stream).is_err());
    }

    #[test]
    fn empty_document_scenario() {
        // §8 scenario 1: 4-byte header, no zones -> open/close an empty
        // paragraph inside one section inside one page span.
        let bytes = DocBuilder::new().build();
        let events = parse_ok(bytes);
        assert_eq!(
            events,
            vec![
                "start_document",
                "open_page_span",
                "open_section",
                "close_section",
                "close_page_span",
                "end_document",
            ]
        );
    }

    #[test]
    fn hello_with_hard_return_scenario() {
        // §8 scenario 2. The CharStyles PLC references a named-style id
        // (not a raw font-catalog index), routing through
        // `StyleCatalogs::resolve_font` and `FontRegistry::target_font`
        // so "Geneva" reaches the sink already remapped to "Helvetica"
        // (§4.4).
        let mut text = b"Hello".to_vec();
        text.push(0x0D);
        let bytes = DocBuilder::new()
            .zone(ZoneKind::FontNames, 0, font_names(&[(0, "Geneva")]))
            .zone(
                ZoneKind::FontCatalog,
                0,
                font_catalog(&[(0, 12, 0, (0, 0, 0))]),
            )
            .zone(ZoneKind::StyleCatalog, 0, style_catalog(&[(0, -1, -1)]))
            .zone(ZoneKind::CharStyles, 0, offset_plc_u32(&[(0, 0)]))
            .zone(ZoneKind::MainText, 0, text)
            .build();
        let events = parse_ok(bytes);
        assert!(events.contains(&"open_span(font=Helvetica)".to_string()));
        assert!(events.contains(&"insert_text(\"Hello\")".to_string()));
        let span_open = events.iter().position(|e| e == "open_span(font=Helvetica)").unwrap();
        let text_idx = events
            .iter()
            .position(|e| e == "insert_text(\"Hello\")")
            .unwrap();
        let span_close = events.iter().position(|e| e == "close_span").unwrap();
        assert!(span_open < text_idx && text_idx < span_close);
    }

    #[test]
    fn bulleted_paragraph_wires_list_engine() {
        // A ParagraphChange PLC whose resolved style carries list_level > 0
        // must reach the sink as a bulleted list element, not a plain
        // paragraph — exercising `list_engine::ListEngine` end to end
        // instead of only through its own unit tests.
        let text = b"Item".to_vec();
        let bytes = DocBuilder::new()
            .zone(ZoneKind::ParagraphCatalog, 0, paragraph_catalog(&[(1, 5)]))
            .zone(ZoneKind::StyleCatalog, 0, style_catalog(&[(-1, 0, -1)]))
            .zone(ZoneKind::TextStruct, 0, offset_plc_u32(&[(0, 0)]))
            .zone(ZoneKind::MainText, 0, text)
            .build();
        let events = parse_ok(bytes);
        let idx = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        assert!(idx("open_unordered_list_level") < idx("open_list_element"));
        assert!(idx("open_list_element") < idx("insert_text(\"Item\")"));
        assert!(idx("insert_text(\"Item\")") < idx("close_list_element"));
        assert!(idx("close_list_element") < idx("close_unordered_list_level"));
    }

    #[test]
    fn deferred_tabs_scenario() {
        // §8 scenario 3: two tabs then "A" before any paragraph is open.
        let text = vec![0x09, 0x09, b'A'];
        let bytes = DocBuilder::new().zone(ZoneKind::MainText, 0, text).build();
        let events = parse_ok(bytes);
        let idx = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        assert!(idx("open_paragraph") < idx("open_span"));
        assert_eq!(events.iter().filter(|e| *e == "insert_tab").count(), 2);
        assert!(idx("insert_tab") < idx("insert_text(\"A\")"));
    }

    #[test]
    fn column_break_scenario() {
        // §8 scenario 4.
        let text = vec![b'a', b'b'];
        let bytes = DocBuilder::new()
            .zone(ZoneKind::SectionDefs, 0, {
                let mut v = Vec::new();
                v.push(2u8);
                v.extend_from_slice(&(3 * 1440u16).to_be_bytes());
                v.extend_from_slice(&(3 * 1440u16).to_be_bytes());
                v
            })
            .zone(ZoneKind::PageBreaks, 0, offset_plc_empty(&[1]))
            .zone(ZoneKind::MainText, 0, text)
            .build();
        let events = parse_ok(bytes);
        assert_eq!(events.iter().filter(|e| *e == "open_section").count(), 1);
        assert!(events.contains(&"insert_page_break".to_string()));
    }

    #[test]
    fn footnote_scenario() {
        // §8 scenario 5.
        let bytes = DocBuilder::new()
            .zone(ZoneKind::Tokens, 0, tokens(&[(0, 0, 7)]))
            .zone(ZoneKind::FootnoteBodies, 0, footnote_bodies(&[(7, b"abc")]))
            .zone(ZoneKind::MainText, 0, Vec::new())
            .build();
        let events = parse_ok(bytes);
        let idx = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        assert!(idx("open_footnote") < idx("open_paragraph"));
        assert!(idx("insert_text(\"abc\")") < idx("close_footnote"));
    }

    #[test]
    fn table_two_by_two_scenario() {
        // §8 scenario 6: a perfect 100x100 2x2 grid from unsorted cells.
        let mut cell_bytes = Vec::new();
        cell_bytes.extend_from_slice(&4u16.to_be_bytes());
        for (x0, y0, x1, y1) in [
            (100i16, 50i16, 200i16, 100i16),
            (0, 0, 100, 50),
            (100, 0, 200, 50),
            (0, 50, 100, 100),
        ] {
            cell_bytes.extend_from_slice(&x0.to_be_bytes());
            cell_bytes.extend_from_slice(&y0.to_be_bytes());
            cell_bytes.extend_from_slice(&x1.to_be_bytes());
            cell_bytes.extend_from_slice(&y1.to_be_bytes());
            cell_bytes.extend_from_slice(&0u16.to_be_bytes());
        }
        let mut tables_zone = Vec::new();
        tables_zone.extend_from_slice(&1u32.to_be_bytes());
        tables_zone.extend_from_slice(&cell_bytes);

        let bytes = DocBuilder::new()
            .zone(ZoneKind::Tokens, 0, tokens(&[(0, 6, 1)]))
            .zone(ZoneKind::Tables, 0, tables_zone)
            .zone(ZoneKind::MainText, 0, Vec::new())
            .build();
        let events = parse_ok(bytes);
        assert_eq!(events.iter().filter(|e| *e == "open_table_cell").count(), 4);
        assert_eq!(events.iter().filter(|e| *e == "open_table_row").count(), 2);
    }

    #[test]
    fn unknown_zone_kind_is_skipped_not_fatal() {
        let bytes = DocBuilder::new().zone(ZoneKind::FontNames, 99, vec![0; 3]).build();
        // kind byte in the directory is overridden below to an unknown value
        let mut bytes = bytes;
        let dir_kind_offset = 8usize;
        bytes[dir_kind_offset] = 0xFF;
        bytes[dir_kind_offset + 1] = 0xFF;
        assert!(parse(&bytes, RecordingSink::new()).is_ok());
    }

    #[test]
    fn encrypted_flag_is_rejected() {
        let mut bytes = DocBuilder::new().build();
        bytes[4] = 0x80; // high bit of version
        let err = parse(&bytes, RecordingSink::new()).unwrap_err();
        assert!(matches!(err, MwawError::UnsupportedEncryption(_)));
    }
}
