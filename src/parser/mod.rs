//! The `PerFormatParser` pattern (§4.7): the five-step shape every
//! per-format parser follows (header check, zone discovery, catalog
//! pass, text pass, frame/picture pass), plus the per-format edge-case
//! helpers §4.7 calls out by name. [`claris_works`] is the one format
//! this core implements end to end; the version-dispatch, opcode, ruler
//! unit and tolerance helpers below exist so a second and third parser
//! (MS Word, MacWrite Pro, WriteNow) can reuse them without duplicating
//! the documented edge-case behavior, per SPEC_FULL.md §C.

pub mod claris_works;

use crate::error::{MwawError, Result};
use crate::stream::Stream;

/// A directory entry naming one named, byte-delimited region of a
/// document (§4.7 step 2, GLOSSARY "Zone"). `kind` is format-specific;
/// [`claris_works::ZoneKind`] is the concrete enum the ClarisWorks parser
/// dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRecord {
    pub kind: u16,
    pub id: u16,
    pub offset: u32,
    pub length: u32,
}

/// Reads a `count`-entry directory of `{kind: u16, id: u16, offset: u32,
/// length: u32}` records (12 bytes each) starting at the stream's current
/// position — the common shape §4.7 step 2 describes ("a sequence of
/// `{kind, id, offset, length}` records").
pub fn read_zone_directory(stream: &mut Stream, count: u16) -> Result<Vec<ZoneRecord>> {
    let mut zones = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = stream.u16()?;
        let id = stream.u16()?;
        let offset = stream.u32()?;
        let length = stream.u32()?;
        zones.push(ZoneRecord { kind, id, offset, length });
    }
    Ok(zones)
}

// ---------------------------------------------------------------------
// MS Word version-dispatch edge case (§4.7: "record sizes for font,
// paragraph and style zones differ by version ... must be dispatched
// correctly").
// ---------------------------------------------------------------------

/// Byte width of a single font-zone record for a given MSW `product_type`
/// minor version, per §4.7's "font records 10/12/18 bytes". `None` for an
/// unrecognized version, which per §7 is an `unsupported-version` error
/// at the top level rather than a guess.
pub fn msw_font_record_size(minor_version: u8) -> Option<usize> {
    match minor_version {
        0..=3 => Some(10),
        4..=5 => Some(12),
        6..=9 => Some(18),
        _ => None,
    }
}

/// Byte width of a single ruler (paragraph) record, per §4.7's "ruler
/// records 92/96/108 bytes".
pub fn msw_ruler_record_size(minor_version: u8) -> Option<usize> {
    match minor_version {
        0..=3 => Some(92),
        4..=5 => Some(96),
        6..=9 => Some(108),
        _ => None,
    }
}

/// A single MS Word paragraph-property opcode's effect, after applying
/// it to a margin/spacing/justification accumulator. §4.7: "a byte-keyed
/// single-byte-opcode sparse format; unknown opcodes terminate the
/// record parse." §9's open question: unknown opcodes (logged in the
/// original as `f#`) are preserved as [`ParagraphOpcode::Unknown`]
/// annotations rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParagraphOpcode {
    Justification(u8),
    LeftMargin(i16),
    RightMargin(i16),
    FirstLineIndent(i16),
    SpaceBefore(i16),
    SpaceAfter(i16),
    Unknown(u8),
}

/// Decodes one `{opcode, operand}` pair from the MSW sparse paragraph
/// property stream. Returns `Ok(None)` on the stream's terminator byte
/// (`0xFF`), matching §4.7's "unknown opcodes terminate the record
/// parse" — a genuinely unknown (not terminator) opcode still yields a
/// value (`Unknown`) so the caller can choose to stop or skip, rather
/// than this function silently eating bytes whose width it cannot know.
pub fn decode_msw_paragraph_opcode(opcode: u8, operand: i16) -> Option<ParagraphOpcode> {
    match opcode {
        0xFF => None,
        0x00 => Some(ParagraphOpcode::Justification(operand as u8)),
        0x01 => Some(ParagraphOpcode::LeftMargin(operand)),
        0x02 => Some(ParagraphOpcode::RightMargin(operand)),
        0x03 => Some(ParagraphOpcode::FirstLineIndent(operand)),
        0x04 => Some(ParagraphOpcode::SpaceBefore(operand)),
        0x05 => Some(ParagraphOpcode::SpaceAfter(operand)),
        other => Some(ParagraphOpcode::Unknown(other)),
    }
}

// ---------------------------------------------------------------------
// MacWrite Pro ruler line-spacing edge case (§4.7).
// ---------------------------------------------------------------------

/// Computes a MWPro ruler's line spacing from its raw value and unit
/// byte: `0` = points, `0xFF` = percent (any other byte is treated as
/// percent per the original's fallback). Values that would exceed 1.0
/// inch are clamped to 1.0 inch with a log message rather than rejected,
/// per §4.7's documented edge case.
pub fn mwpro_line_spacing(raw_value: f64, unit_byte: u8) -> crate::types::LineSpacing {
    use crate::types::{LineSpacing, LineSpacingUnit};
    let inches = match unit_byte {
        0 => raw_value / 72.0,
        _ => raw_value / 100.0 * (12.0 / 72.0),
    };
    if inches > 1.0 {
        log::warn!("MWPro line spacing {raw_value} (unit {unit_byte}) exceeds 1in, clamped");
        return match unit_byte {
            0 => LineSpacing { value: 72.0, unit: LineSpacingUnit::Points },
            _ => LineSpacing { value: 100.0, unit: LineSpacingUnit::PercentOfLine },
        };
    }
    match unit_byte {
        0 => LineSpacing { value: raw_value, unit: LineSpacingUnit::Points },
        _ => LineSpacing { value: raw_value, unit: LineSpacingUnit::PercentOfLine },
    }
}

// ---------------------------------------------------------------------
// ClarisWorks spreadsheet/chart zone size tolerance (§4.7).
// ---------------------------------------------------------------------

/// `true` if `actual` is within §4.7's documented ±8 byte tolerance of
/// `expected` for a spreadsheet/chart zone's declared size. A mismatch
/// beyond the tolerance is the caller's cue to log and skip the zone
/// (§7's malformed-zone recovery), not to abort the parse.
pub fn spreadsheet_zone_size_tolerance_ok(expected: u32, actual: u32) -> bool {
    (expected as i64 - actual as i64).unsigned_abs() <= 8
}

/// Per-format parsers share this shape (§4.7): check the header, walk
/// the zone directory, parse catalogs, walk the text stream firing
/// listener operations, then resolve any embedded frames/pictures. Kept
/// as a trait so a future second parser plugs into the same
/// `Document::parse` dispatch (`src/document.rs`) as
/// [`claris_works::check_header`] without it needing to know about
/// concrete parser types.
pub trait PerFormatParser {
    /// Inspects the first bytes of `stream` and returns `Ok(())` if this
    /// parser recognizes the format, `Err(MwawError::UnsupportedVersion)`
    /// otherwise. Must not consume `stream`'s position permanently:
    /// implementations seek back to the start before returning `Ok`.
    fn check_header(stream: &mut Stream) -> Result<()>;
}

pub(crate) fn require_magic(stream: &mut Stream, magic: &[u8]) -> Result<()> {
    let start = stream.tell();
    let read = stream.read_block(magic.len())?;
    let ok = read == magic;
    stream.seek(start as i64, crate::stream::Whence::Begin);
    if ok {
        Ok(())
    } else {
        Err(MwawError::UnsupportedVersion(format!(
            "expected magic {magic:02x?}, found {read:02x?}"
        )))
    }
}
