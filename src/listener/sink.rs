//! The external back-end sink (§6.1): an opaque, out-of-scope collaborator
//! per §1, modeled here as a trait so the [`crate::listener::Listener`]
//! can be built and tested without a real rendering backend. Every method
//! corresponds 1:1 to a row of §6.1's table; the wire is method-dispatch,
//! not bytes, so there is no (de)serialization here at all.

use crate::types::TabStop;
use std::collections::BTreeMap;

/// The unit a floating-point property is expressed in (§6.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyUnit {
    Point,
    Inch,
    Twip,
    Percent,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64, PropertyUnit),
    Bool(bool),
}

/// A `properties` mapping (§6.1): string keys are the ODF-schema names
/// the spec calls out (`fo:margin-left`, `style:column-width`,
/// `libwpd:id`, …), kept as `&'static str` since every key this crate
/// emits is one of a fixed, known set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyList(BTreeMap<&'static str, PropertyValue>);

impl PropertyList {
    pub fn new() -> Self {
        PropertyList::default()
    }

    pub fn set_str(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(key, PropertyValue::Str(value.into()));
        self
    }

    pub fn set_int(mut self, key: &'static str, value: i64) -> Self {
        self.0.insert(key, PropertyValue::Int(value));
        self
    }

    pub fn set_float(mut self, key: &'static str, value: f64, unit: PropertyUnit) -> Self {
        self.0.insert(key, PropertyValue::Float(value, unit));
        self
    }

    pub fn set_bool(mut self, key: &'static str, value: bool) -> Self {
        self.0.insert(key, PropertyValue::Bool(value));
        self
    }

    /// Inserts an already-built [`PropertyValue`] directly; used when
    /// merging one property list's entries into another (e.g. a table
    /// cell's format-specific extras) without unpacking and rebuilding
    /// each variant.
    pub fn set_raw(mut self, key: &'static str, value: PropertyValue) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

/// The back-end collaborator (§6.1). Every `open_*` has a matching
/// `close_*`; §8's invariants require every opened element to be closed
/// in LIFO order before `end_document`, which [`crate::listener::Listener`]
/// enforces on the sink's behalf rather than trusting the sink to do so.
pub trait DocumentSink {
    fn start_document(&mut self, metadata: &PropertyList);
    fn end_document(&mut self);

    fn open_page_span(&mut self, properties: &PropertyList);
    fn close_page_span(&mut self);

    fn open_section(&mut self, properties: &PropertyList, columns: &[f64]);
    fn close_section(&mut self);

    fn open_paragraph(&mut self, properties: &PropertyList, tabs: &[TabStop]);
    fn close_paragraph(&mut self);
    fn open_list_element(&mut self, properties: &PropertyList, tabs: &[TabStop]);
    fn close_list_element(&mut self);

    fn open_ordered_list_level(&mut self, properties: &PropertyList);
    fn close_ordered_list_level(&mut self);
    fn open_unordered_list_level(&mut self, properties: &PropertyList);
    fn close_unordered_list_level(&mut self);

    fn open_span(&mut self, properties: &PropertyList);
    fn close_span(&mut self);

    fn insert_text(&mut self, text: &str);
    fn insert_space(&mut self);
    fn insert_tab(&mut self);
    fn insert_field(&mut self, name: &str, properties: &PropertyList);
    /// Not itself a §6.1 row: the spec's scenario 4 requires the sink to
    /// be able to tell an in-section column break from a full section
    /// re-open, so this and [`DocumentSink::insert_page_break`] make that
    /// distinction explicit rather than overloading `open_section`.
    fn insert_column_break(&mut self);
    fn insert_page_break(&mut self);

    fn open_table(&mut self, properties: &PropertyList, columns: &[f64]);
    fn close_table(&mut self);
    fn open_table_row(&mut self, properties: &PropertyList);
    fn close_table_row(&mut self);
    fn open_table_cell(&mut self, properties: &PropertyList);
    fn close_table_cell(&mut self);

    fn open_frame(&mut self, properties: &PropertyList);
    fn close_frame(&mut self);
    fn open_text_box(&mut self, properties: &PropertyList);
    fn close_text_box(&mut self);
    fn insert_binary_object(&mut self, properties: &PropertyList, bytes: &[u8]);

    fn open_header(&mut self, properties: &PropertyList);
    fn close_header(&mut self);
    fn open_footer(&mut self, properties: &PropertyList);
    fn close_footer(&mut self);
    fn open_footnote(&mut self, properties: &PropertyList);
    fn close_footnote(&mut self);
    fn open_endnote(&mut self, properties: &PropertyList);
    fn close_endnote(&mut self);
    fn open_comment(&mut self, properties: &PropertyList);
    fn close_comment(&mut self);
}

/// A recording sink used by the Listener's own test suite (and by parser
/// tests that exercise end-to-end scenarios against §8) in place of a
/// real rendering backend.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<String>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    fn record(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }
}

#[cfg(test)]
impl DocumentSink for RecordingSink {
    fn start_document(&mut self, _metadata: &PropertyList) {
        self.record("start_document");
    }
    fn end_document(&mut self) {
        self.record("end_document");
    }
    fn open_page_span(&mut self, _properties: &PropertyList) {
        self.record("open_page_span");
    }
    fn close_page_span(&mut self) {
        self.record("close_page_span");
    }
    fn open_section(&mut self, _properties: &PropertyList, _columns: &[f64]) {
        self.record("open_section");
    }
    fn close_section(&mut self) {
        self.record("close_section");
    }
    fn open_paragraph(&mut self, _properties: &PropertyList, _tabs: &[TabStop]) {
        self.record("open_paragraph");
    }
    fn close_paragraph(&mut self) {
        self.record("close_paragraph");
    }
    fn open_list_element(&mut self, _properties: &PropertyList, _tabs: &[TabStop]) {
        self.record("open_list_element");
    }
    fn close_list_element(&mut self) {
        self.record("close_list_element");
    }
    fn open_ordered_list_level(&mut self, _properties: &PropertyList) {
        self.record("open_ordered_list_level");
    }
    fn close_ordered_list_level(&mut self) {
        self.record("close_ordered_list_level");
    }
    fn open_unordered_list_level(&mut self, _properties: &PropertyList) {
        self.record("open_unordered_list_level");
    }
    fn close_unordered_list_level(&mut self) {
        self.record("close_unordered_list_level");
    }
    fn open_span(&mut self, properties: &PropertyList) {
        match properties.get("style:font-name") {
            Some(PropertyValue::Str(name)) => self.record(format!("open_span(font={name})")),
            _ => self.record("open_span"),
        }
    }
    fn close_span(&mut self) {
        self.record("close_span");
    }
    fn insert_text(&mut self, text: &str) {
        self.record(format!("insert_text({text:?})"));
    }
    fn insert_space(&mut self) {
        self.record("insert_space");
    }
    fn insert_tab(&mut self) {
        self.record("insert_tab");
    }
    fn insert_field(&mut self, name: &str, _properties: &PropertyList) {
        self.record(format!("insert_field({name})"));
    }
    fn insert_column_break(&mut self) {
        self.record("insert_column_break");
    }
    fn insert_page_break(&mut self) {
        self.record("insert_page_break");
    }
    fn open_table(&mut self, _properties: &PropertyList, _columns: &[f64]) {
        self.record("open_table");
    }
    fn close_table(&mut self) {
        self.record("close_table");
    }
    fn open_table_row(&mut self, _properties: &PropertyList) {
        self.record("open_table_row");
    }
    fn close_table_row(&mut self) {
        self.record("close_table_row");
    }
    fn open_table_cell(&mut self, _properties: &PropertyList) {
        self.record("open_table_cell");
    }
    fn close_table_cell(&mut self) {
        self.record("close_table_cell");
    }
    fn open_frame(&mut self, _properties: &PropertyList) {
        self.record("open_frame");
    }
    fn close_frame(&mut self) {
        self.record("close_frame");
    }
    fn open_text_box(&mut self, _properties: &PropertyList) {
        self.record("open_text_box");
    }
    fn close_text_box(&mut self) {
        self.record("close_text_box");
    }
    fn insert_binary_object(&mut self, _properties: &PropertyList, bytes: &[u8]) {
        self.record(format!("insert_binary_object({} bytes)", bytes.len()));
    }
    fn open_header(&mut self, _properties: &PropertyList) {
        self.record("open_header");
    }
    fn close_header(&mut self) {
        self.record("close_header");
    }
    fn open_footer(&mut self, _properties: &PropertyList) {
        self.record("open_footer");
    }
    fn close_footer(&mut self) {
        self.record("close_footer");
    }
    fn open_footnote(&mut self, _properties: &PropertyList) {
        self.record("open_footnote");
    }
    fn close_footnote(&mut self) {
        self.record("close_footnote");
    }
    fn open_endnote(&mut self, _properties: &PropertyList) {
        self.record("open_endnote");
    }
    fn close_endnote(&mut self) {
        self.record("close_endnote");
    }
    fn open_comment(&mut self, _properties: &PropertyList) {
        self.record("open_comment");
    }
    fn close_comment(&mut self) {
        self.record("close_comment");
    }
}
