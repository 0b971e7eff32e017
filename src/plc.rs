//! Piecewise Locators (§3.6): a sorted `text-offset -> event` multimap
//! built once during a per-format parser's catalog pass and walked with a
//! cursor that advances monotonically with the text pass (§9's design
//! note — "a sorted array of `(offset, event)` built in one pass and
//! binary-searched by a cursor advancing with the text").

use crate::error::{MwawError, Result};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlcEvent {
    FontChange(i32),
    ParagraphChange(i32),
    SectionChange(i32),
    PageBreak(i32),
    LineBreak(i32),
    FootnoteRef(i32),
    Note(i32),
    Token(i32),
    TextPosition(i32),
    HeaderFooterBoundary(i32),
}

/// Canonical per-offset firing order, per §4.7 step 4 and §5's ordering
/// guarantee ("font before paragraph before token before character").
fn priority(event: &PlcEvent) -> u8 {
    match event {
        PlcEvent::FontChange(_) => 0,
        PlcEvent::ParagraphChange(_) => 1,
        PlcEvent::SectionChange(_) | PlcEvent::PageBreak(_) | PlcEvent::LineBreak(_) => 2,
        PlcEvent::FootnoteRef(_) | PlcEvent::Note(_) | PlcEvent::Token(_) => 3,
        PlcEvent::TextPosition(_) | PlcEvent::HeaderFooterBoundary(_) => 4,
    }
}

/// A single text stream's sorted locator table.
pub struct Plc {
    entries: Vec<(u32, PlcEvent)>,
}

impl Plc {
    /// Builds the table from an unordered list of `(offset, event)`
    /// pairs, sorting by `(offset, canonical priority)`. Validates that
    /// every key lies in `[0, stream_length]` (§3.6's invariant); a
    /// violating entry is dropped and logged rather than rejecting the
    /// whole table, matching §7's "malformed zone" recovery policy.
    pub fn build(mut entries: Vec<(u32, PlcEvent)>, stream_length: u32) -> Self {
        entries.retain(|(offset, event)| {
            let ok = *offset <= stream_length;
            if !ok {
                log::warn!("PLC entry {event:?} at offset {offset} exceeds stream length {stream_length}, dropped");
            }
            ok
        });
        entries.sort_by_key(|(offset, event)| (*offset, priority(event)));
        Plc { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Walks a [`Plc`] in step with a forward-only text-offset cursor.
pub struct PlcCursor<'a> {
    entries: &'a [(u32, PlcEvent)],
    next_index: usize,
}

impl<'a> PlcCursor<'a> {
    pub fn new(plc: &'a Plc) -> Self {
        PlcCursor {
            entries: &plc.entries,
            next_index: 0,
        }
    }

    /// Returns every event whose offset equals exactly `offset`, in
    /// canonical order, consuming them from the cursor. Must be called
    /// with non-decreasing `offset` across a single pass — returns
    /// [`MwawError::StateViolation`] otherwise.
    pub fn take_at(&mut self, offset: u32) -> Result<SmallVec<[PlcEvent; 4]>> {
        if let Some(&(last_offset, _)) = self.entries.get(self.next_index.wrapping_sub(1)) {
            if self.next_index > 0 && last_offset > offset {
                return Err(MwawError::state_violation(
                    "PlcCursor::take_at called with a decreasing offset",
                ));
            }
        }
        let mut out = SmallVec::new();
        while let Some(&(o, event)) = self.entries.get(self.next_index) {
            if o != offset {
                break;
            }
            out.push(event);
            self.next_index += 1;
        }
        Ok(out)
    }

    pub fn at_end(&self) -> bool {
        self.next_index >= self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_canonical_order_per_offset() {
        let plc = Plc::build(
            vec![
                (5, PlcEvent::Token(1)),
                (5, PlcEvent::FontChange(2)),
                (5, PlcEvent::ParagraphChange(3)),
            ],
            100,
        );
        let mut cursor = PlcCursor::new(&plc);
        let events = cursor.take_at(5).unwrap();
        assert_eq!(
            events.as_slice(),
            &[
                PlcEvent::FontChange(2),
                PlcEvent::ParagraphChange(3),
                PlcEvent::Token(1),
            ]
        );
    }

    #[test]
    fn cursor_advances_and_skips_empty_offsets() {
        let plc = Plc::build(vec![(0, PlcEvent::FontChange(1)), (10, PlcEvent::FontChange(2))], 20);
        let mut cursor = PlcCursor::new(&plc);
        assert_eq!(cursor.take_at(0).unwrap().len(), 1);
        assert_eq!(cursor.take_at(5).unwrap().len(), 0);
        assert_eq!(cursor.take_at(10).unwrap().len(), 1);
        assert!(cursor.at_end());
    }

    #[test]
    fn out_of_range_offsets_are_dropped() {
        let plc = Plc::build(vec![(5, PlcEvent::FontChange(1)), (999, PlcEvent::FontChange(2))], 10);
        assert_eq!(plc.len(), 1);
    }
}
