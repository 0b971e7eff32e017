//! Decodes legacy Macintosh word-processor documents (ClarisWorks and
//! AppleWorks text documents today; the `parser` module's
//! `PerFormatParser` pattern is shaped to take a second and third format
//! without disturbing this crate's public surface) into a stream of
//! calls against a caller-supplied [`listener::sink::DocumentSink`].
//!
//! [`Document::parse`] is the one entry point most callers need; the
//! rest of the crate is exposed for callers who want to drive a
//! [`listener::Listener`] directly (tests, alternative front-ends) or
//! reuse a lower-level piece (`stream`, `storage`, `encoding`) on its
//! own.

mod document;
mod encoding;
mod error;
mod font_registry;
mod list_engine;
mod parser;
mod picture;
mod plc;
mod storage;
mod stream;
mod style;
mod table_layout;
mod types;

pub mod listener;

pub use document::{Document, ParseOptions};
pub use error::{MwawError, Result};
pub use listener::sink::DocumentSink;
pub use listener::Listener;
pub use types::PageSpan;
