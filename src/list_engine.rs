//! Builds nested list numbering state across paragraphs (§4.5).
//!
//! The [`Listener`](crate::listener::Listener) owns one [`ListEngine`] and
//! consults it at `_change_list` time (§4.6.4) to decide which levels to
//! close and reopen and what label text to emit for the next list
//! element.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingKind {
    Arabic,
    UpperAlpha,
    LowerAlpha,
    UpperRoman,
    LowerRoman,
    Bullet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListLevel {
    pub kind: NumberingKind,
    pub prefix: String,
    pub suffix: String,
    pub left_indent: f64,
    pub first_line_indent: f64,
}

impl Default for ListLevel {
    fn default() -> Self {
        ListLevel {
            kind: NumberingKind::Arabic,
            prefix: String::new(),
            suffix: ".".to_string(),
            left_indent: 0.0,
            first_line_indent: 0.0,
        }
    }
}

/// Positions beyond which a level-geometry change is considered
/// significant enough to force a re-declaration (§4.5's `must_emit`).
const POSITION_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Default)]
struct LevelRuntime {
    def: ListLevel,
    counter: u32,
    ref_position: f64,
    begin_position: f64,
    declared: bool,
}

#[derive(Debug, Default)]
struct ListState {
    levels: HashMap<u32, LevelRuntime>,
}

#[derive(Debug, Default)]
pub struct ListEngine {
    lists: HashMap<ListId, ListState>,
}

impl ListEngine {
    pub fn new() -> Self {
        ListEngine::default()
    }

    pub fn define_level(&mut self, list: ListId, n: u32, level: ListLevel) {
        let state = self.lists.entry(list).or_default();
        let runtime = state.levels.entry(n).or_default();
        runtime.def = level;
    }

    /// Signals that the parser has reached a paragraph whose list level
    /// `n` sits at `ref_position`/`begin_position` (inches). Called before
    /// every paragraph open per §4.5.
    pub fn set_level(&mut self, list: ListId, n: u32, ref_position: f64, begin_position: f64) {
        let state = self.lists.entry(list).or_default();
        let runtime = state.levels.entry(n).or_default();
        runtime.ref_position = ref_position;
        runtime.begin_position = begin_position;
    }

    /// True if the back-end should receive an updated list-level
    /// definition: either it has never been declared, or its geometry
    /// moved by more than [`POSITION_EPSILON`] since the last call.
    pub fn must_emit(&self, list: ListId, n: u32, ref_position: f64, begin_position: f64) -> bool {
        match self.lists.get(&list).and_then(|s| s.levels.get(&n)) {
            None => true,
            Some(runtime) => {
                !runtime.declared
                    || (runtime.ref_position - ref_position).abs() > POSITION_EPSILON
                    || (runtime.begin_position - begin_position).abs() > POSITION_EPSILON
            }
        }
    }

    pub fn mark_declared(&mut self, list: ListId, n: u32) {
        if let Some(runtime) = self.lists.get_mut(&list).and_then(|s| s.levels.get_mut(&n)) {
            runtime.declared = true;
        }
    }

    /// Produces the label text for the current item at level `n`,
    /// advancing that level's counter.
    pub fn format(&mut self, list: ListId, n: u32) -> String {
        let state = self.lists.entry(list).or_default();
        let runtime = state.levels.entry(n).or_default();
        runtime.counter += 1;
        let body = match runtime.def.kind {
            NumberingKind::Arabic => runtime.counter.to_string(),
            NumberingKind::UpperAlpha => to_alpha(runtime.counter, false),
            NumberingKind::LowerAlpha => to_alpha(runtime.counter, true),
            NumberingKind::UpperRoman => to_roman(runtime.counter),
            NumberingKind::LowerRoman => to_roman(runtime.counter).to_ascii_lowercase(),
            NumberingKind::Bullet => String::new(),
        };
        format!("{}{}{}", runtime.def.prefix, body, runtime.def.suffix)
    }

    /// Resets level `n`'s counter, called by the Listener when the
    /// current level decrements past it (§4.5, §4.6.4).
    pub fn close_level(&mut self, list: ListId, n: u32) {
        if let Some(runtime) = self.lists.get_mut(&list).and_then(|s| s.levels.get_mut(&n)) {
            runtime.counter = 0;
            runtime.declared = false;
        }
    }

    pub fn open_level(&mut self, _list: ListId, _n: u32) {
        // Opening doesn't itself reset or advance state; `format` handles
        // the first item's counter increment lazily.
    }

    pub fn level_kind(&self, list: ListId, n: u32) -> Option<NumberingKind> {
        self.lists
            .get(&list)
            .and_then(|s| s.levels.get(&n))
            .map(|r| r.def.kind)
    }

    /// `(ref_position, begin_position)` a level was last defined with, in
    /// inches; `(0.0, 0.0)` if the level has no definition yet. Used by
    /// [`crate::listener::Listener`]'s `_change_list` (§4.6.4) to drive
    /// [`ListEngine::set_level`]/[`ListEngine::must_emit`] from the
    /// level's own declared geometry rather than a separately threaded
    /// per-paragraph position.
    pub fn level_geometry(&self, list: ListId, n: u32) -> (f64, f64) {
        self.lists
            .get(&list)
            .and_then(|s| s.levels.get(&n))
            .map(|r| (r.def.left_indent, r.def.first_line_indent))
            .unwrap_or((0.0, 0.0))
    }
}

fn to_alpha(mut n: u32, lowercase: bool) -> String {
    if n == 0 {
        return String::new();
    }
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.reverse();
    let s: String = letters.into_iter().collect();
    if lowercase {
        s.to_ascii_lowercase()
    } else {
        s
    }
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"), (900, "CM"), (500, "D"), (400, "CD"),
        (100, "C"), (90, "XC"), (50, "L"), (40, "XL"),
        (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in TABLE {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_arabic_increments() {
        let mut e = ListEngine::new();
        let list = ListId(1);
        e.define_level(list, 1, ListLevel::default());
        assert_eq!(e.format(list, 1), "1.");
        assert_eq!(e.format(list, 1), "2.");
    }

    #[test]
    fn close_level_resets_counter() {
        let mut e = ListEngine::new();
        let list = ListId(1);
        e.define_level(list, 1, ListLevel::default());
        e.format(list, 1);
        e.format(list, 1);
        e.close_level(list, 1);
        assert_eq!(e.format(list, 1), "1.");
    }

    #[test]
    fn must_emit_true_until_declared() {
        let mut e = ListEngine::new();
        let list = ListId(1);
        assert!(e.must_emit(list, 1, 0.5, 0.5));
        e.set_level(list, 1, 0.5, 0.5);
        e.mark_declared(list, 1);
        assert!(!e.must_emit(list, 1, 0.5, 0.5));
        assert!(e.must_emit(list, 1, 1.0, 0.5));
    }

    #[test]
    fn roman_and_alpha_numerals() {
        assert_eq!(to_roman(1994), "MCMXCIV");
        assert_eq!(to_alpha(1, false), "A");
        assert_eq!(to_alpha(27, false), "AA");
    }
}
