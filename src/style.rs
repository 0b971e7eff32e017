//! The style resolver (§3.5): merges a document's font/paragraph catalogs
//! through a named-style DAG, and with a span's explicit overrides, into
//! the concrete [`Font`]/[`Paragraph`] a text position should render with.
//! Cell-level merging (table-wide default cell style vs. an individual
//! cell's explicit attributes) is simple enough that it happens directly
//! in [`crate::listener`]'s `open_table_cell`; everything here is the DAG
//! walk §3.5 actually calls out as non-trivial.

use crate::types::{Font, NamedStyle, Paragraph};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct StyleCatalogs {
    pub fonts: Vec<Font>,
    pub paragraphs: Vec<Paragraph>,
    pub styles: Vec<NamedStyle>,
    pub style_names: std::collections::HashMap<String, usize>,
}

impl StyleCatalogs {
    pub fn new() -> Self {
        StyleCatalogs::default()
    }

    pub fn style_id_by_name(&self, name: &str) -> Option<i32> {
        self.style_names.get(name).map(|&i| i as i32)
    }

    /// Walks `style_id`'s `parent_id` chain root-first. A cycle (which
    /// violates §3.5's invariant but can appear in corrupt input) stops
    /// the walk at the repeated id and logs, rather than looping forever
    /// — the §7 "malformed zone" recovery policy applied to catalog data.
    fn chain(&self, style_id: i32) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = style_id;
        while current >= 0 {
            let idx = current as usize;
            if !visited.insert(idx) {
                log::warn!("cycle detected in named style DAG at id {idx}; truncating resolution");
                break;
            }
            let Some(style) = self.styles.get(idx) else {
                log::warn!("named style id {idx} has no catalog entry");
                break;
            };
            chain.push(idx);
            current = style.parent_id;
        }
        chain.reverse();
        chain
    }

    /// Resolves the font implied by `style_id`'s chain, then lets
    /// `span_override` win outright if it isn't [`Font::is_unset`] — per
    /// §3.2's invariant, font inheritance is whole-value, not per-field.
    pub fn resolve_font(&self, style_id: i32, span_override: &Font) -> Font {
        let mut resolved = Font::unset();
        for idx in self.chain(style_id) {
            let style = &self.styles[idx];
            if style.font_id >= 0 {
                if let Some(f) = self.fonts.get(style.font_id as usize) {
                    resolved = f.clone();
                } else {
                    log::warn!("style {idx} references missing font id {}", style.font_id);
                }
            }
        }
        if span_override.is_unset() {
            resolved
        } else {
            span_override.clone()
        }
    }

    /// Resolves the paragraph ruler implied by `style_id`'s chain. Unlike
    /// fonts, a paragraph catalog entry is always fully specified, so the
    /// deepest ancestor that names one simply wins; explicit per-paragraph
    /// overrides (margins, tabs, justification) are layered on top by the
    /// Listener itself per §4.6.2, not here.
    pub fn resolve_paragraph(&self, style_id: i32) -> Paragraph {
        let mut resolved = Paragraph::default();
        for idx in self.chain(style_id) {
            let style = &self.styles[idx];
            if style.paragraph_id >= 0 {
                if let Some(p) = self.paragraphs.get(style.paragraph_id as usize) {
                    resolved = p.clone();
                } else {
                    log::warn!(
                        "style {idx} references missing paragraph id {}",
                        style.paragraph_id
                    );
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StyleFlags;

    fn font(family: i32, size: f64) -> Font {
        Font {
            family_id: family,
            size,
            flags: StyleFlags::empty(),
            color: crate::types::Color::BLACK,
        }
    }

    #[test]
    fn span_override_wins_outright() {
        let mut catalogs = StyleCatalogs::new();
        catalogs.fonts.push(font(1, 12.0));
        catalogs.styles.push(NamedStyle {
            font_id: 0,
            paragraph_id: -1,
            parent_id: -1,
        });
        let resolved = catalogs.resolve_font(0, &font(2, 18.0));
        assert_eq!(resolved.family_id, 2);
        assert_eq!(resolved.size, 18.0);
    }

    #[test]
    fn unset_span_falls_back_to_style_chain() {
        let mut catalogs = StyleCatalogs::new();
        catalogs.fonts.push(font(1, 12.0));
        catalogs.styles.push(NamedStyle {
            font_id: 0,
            paragraph_id: -1,
            parent_id: -1,
        });
        let resolved = catalogs.resolve_font(0, &Font::unset());
        assert_eq!(resolved.family_id, 1);
        assert_eq!(resolved.size, 12.0);
    }

    #[test]
    fn parent_chain_resolves_root_first() {
        let mut catalogs = StyleCatalogs::new();
        catalogs.paragraphs.push(Paragraph {
            left_margin: 1.0,
            ..Paragraph::default()
        });
        catalogs.paragraphs.push(Paragraph {
            left_margin: 2.0,
            ..Paragraph::default()
        });
        catalogs.styles.push(NamedStyle {
            font_id: -1,
            paragraph_id: 0,
            parent_id: -1,
        });
        catalogs.styles.push(NamedStyle {
            font_id: -1,
            paragraph_id: -1,
            parent_id: 0,
        });
        catalogs.styles.push(NamedStyle {
            font_id: -1,
            paragraph_id: 1,
            parent_id: 1,
        });
        let resolved = catalogs.resolve_paragraph(2);
        assert_eq!(resolved.left_margin, 2.0);
    }

    #[test]
    fn cyclic_chain_does_not_loop_forever() {
        let mut catalogs = StyleCatalogs::new();
        catalogs.styles.push(NamedStyle {
            font_id: -1,
            paragraph_id: -1,
            parent_id: 1,
        });
        catalogs.styles.push(NamedStyle {
            font_id: -1,
            paragraph_id: -1,
            parent_id: 0,
        });
        let _ = catalogs.resolve_paragraph(0);
    }
}
