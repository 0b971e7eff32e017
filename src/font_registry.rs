//! Maps a document's internal (system) font IDs to names and to a
//! replacement "target" font, and resolves legacy-encoded codepoints to
//! Unicode (§4.4). Modeled as an owned value threaded through the parser
//! pipeline rather than `victor::fonts`'s original approach of loading
//! and caching whole font files — there is no glyph data here, only the
//! id/name bookkeeping a per-format parser needs while it walks a font
//! catalog zone.

use crate::encoding;
use std::collections::HashMap;

/// A target family name plus an additive point-size adjustment: some
/// legacy families render a nominal 12pt glyph at 10pt in the closest
/// available replacement family (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFont {
    pub name: String,
    pub size_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Symbol,
    ZapfDingbats,
    Other,
}

fn classify(name: &str) -> Family {
    let lower = name.to_ascii_lowercase();
    if lower == "symbol" {
        Family::Symbol
    } else if lower == "zapf dingbats" || lower == "zapfdingbats" || lower == "wingdings" {
        Family::ZapfDingbats
    } else {
        Family::Other
    }
}

/// Resolves a single legacy-encoded byte typed under the font named
/// `font_name` (Mac-Roman if `None` or unrecognized) to a Unicode
/// codepoint (§4.4, §6.4). Exposed as a free function, not just a
/// [`FontRegistry`] method, because [`crate::listener::Listener`] tracks
/// only the current span's font *name* (never a legacy id) and has no
/// need to carry a whole registry just to decode one byte.
pub fn to_unicode_by_name(font_name: Option<&str>, codepoint: u8) -> char {
    let family = font_name.map(classify).unwrap_or(Family::Other);
    match family {
        Family::Symbol => encoding::symbol_to_unicode(codepoint),
        Family::ZapfDingbats => encoding::zapf_dingbats_to_unicode(codepoint),
        Family::Other => encoding::mac_roman_to_unicode(codepoint),
    }
}

/// Well-known legacy-family-to-replacement-family remaps with their size
/// adjustment, applied by [`FontRegistry::target_font`] when a name isn't
/// otherwise registered.
const TARGET_REMAPS: &[(&str, &str, f64)] = &[
    ("Geneva", "Helvetica", 0.0),
    ("New York", "Times New Roman", 0.0),
    ("Monaco", "Courier New", 0.0),
    ("Chicago", "Arial", -2.0),
];

#[derive(Debug, Default)]
pub struct FontRegistry {
    names: HashMap<i32, String>,
}

impl FontRegistry {
    pub fn new() -> Self {
        FontRegistry::default()
    }

    /// Remembers `legacy_name` for `legacy_id`; a later call with the same
    /// id overwrites the previous mapping (§4.4).
    pub fn register(&mut self, legacy_id: i32, legacy_name: impl Into<String>) {
        self.names.insert(legacy_id, legacy_name.into());
    }

    pub fn lookup_name(&self, legacy_id: i32) -> Option<&str> {
        self.names.get(&legacy_id).map(String::as_str)
    }

    /// Resolves a single legacy-encoded byte typed under `font` to a
    /// Unicode codepoint. Consults the font's family table (Symbol,
    /// Zapf Dingbats) first, then falls back to Mac-Roman (§4.4, §6.4).
    pub fn to_unicode(&self, legacy_id: i32, codepoint: u8) -> char {
        to_unicode_by_name(self.lookup_name(legacy_id), codepoint)
    }

    /// The back-end-facing family name plus additive size delta for
    /// `legacy_id` (§4.4).
    pub fn target_font(&self, legacy_id: i32) -> TargetFont {
        let Some(name) = self.lookup_name(legacy_id) else {
            return TargetFont {
                name: "Helvetica".to_string(),
                size_delta: 0.0,
            };
        };
        for (legacy, target, delta) in TARGET_REMAPS {
            if name.eq_ignore_ascii_case(legacy) {
                return TargetFont {
                    name: (*target).to_string(),
                    size_delta: *delta,
                };
            }
        }
        TargetFont {
            name: name.to_string(),
            size_delta: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let mut reg = FontRegistry::new();
        reg.register(12, "Geneva");
        assert_eq!(reg.lookup_name(12), Some("Geneva"));
    }

    #[test]
    fn re_registering_overwrites() {
        let mut reg = FontRegistry::new();
        reg.register(12, "Geneva");
        reg.register(12, "Monaco");
        assert_eq!(reg.lookup_name(12), Some("Monaco"));
    }

    #[test]
    fn symbol_family_uses_symbol_table() {
        let mut reg = FontRegistry::new();
        reg.register(5, "Symbol");
        assert_eq!(reg.to_unicode(5, 0x61), '\u{03B1}');
    }

    #[test]
    fn unknown_family_falls_back_to_mac_roman() {
        let mut reg = FontRegistry::new();
        reg.register(5, "Times");
        assert_eq!(reg.to_unicode(5, 0x80), 'Ä');
    }

    #[test]
    fn legacy_family_remaps_with_size_delta() {
        let mut reg = FontRegistry::new();
        reg.register(3, "Chicago");
        let target = reg.target_font(3);
        assert_eq!(target.name, "Arial");
        assert_eq!(target.size_delta, -2.0);
    }
}
