//! The crate's single public entry point (§1, §4.7): `Document::parse`
//! takes a whole-file byte slice and a [`DocumentSink`], checks the
//! header against every format this core knows, and hands off to
//! whichever [`PerFormatParser`] recognizes it. Mirrors the way
//! `victor::document::Document` is the one type library consumers
//! construct and drive, rather than reaching into `crate::parser`
//! directly.

use crate::error::{MwawError, Result};
use crate::listener::sink::DocumentSink;
use crate::parser::claris_works::{self, ClarisWorksParser};
use crate::parser::PerFormatParser;
use crate::stream::Stream;

/// Per-call configuration (SPEC_FULL.md §A.3): there is no persisted or
/// environment-derived configuration, only what the caller passes here.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Decryption password. No format this core parses has decryption
    /// implemented yet, so an encrypted document is always rejected; a
    /// password-protected file still surfaces as `UnsupportedEncryption`
    /// when no password was given, but as `WrongPassword` once the
    /// caller has supplied one, since this core cannot verify it either
    /// way and the latter is the more honest answer to give back.
    pub password: Option<String>,

    /// Reserved for a future stricter propagation mode. Today every
    /// per-zone recovery already follows §7's "log and substitute a
    /// default" policy regardless of this flag.
    pub strict: bool,
}

/// The crate's top-level handle. Carries no state of its own; every
/// method is a thin dispatch into `crate::parser`/`crate::listener`.
pub struct Document;

impl Document {
    /// Parses `bytes` and drives `sink` through the whole document,
    /// returning the sink back to the caller on success (mirroring
    /// [`crate::listener::Listener::into_sink`]).
    ///
    /// `bytes` may be either a raw data fork or an OLE2 compound
    /// document; [`Stream::is_ole`] is consulted for diagnostic logging
    /// only today, since the one format implemented end to end
    /// (ClarisWorks/AppleWorks) never arrives wrapped in OLE2 — a
    /// future MS Word parser would open the `WordDocument` stream via
    /// [`Stream::open_ole`] here before dispatching.
    pub fn parse<S: DocumentSink>(bytes: &[u8], sink: S, options: &ParseOptions) -> Result<S> {
        let mut stream = Stream::new(bytes);
        if stream.is_ole() {
            log::debug!("input is an OLE2 compound document");
        }

        ClarisWorksParser::check_header(&mut stream)?;
        match claris_works::parse(bytes, sink) {
            Err(MwawError::UnsupportedEncryption(msg)) if options.password.is_some() => {
                log::warn!("encrypted document rejected despite supplied password: {msg}");
                Err(MwawError::WrongPassword)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::sink::RecordingSink;

    #[test]
    fn rejects_unrecognized_header() {
        let err = Document::parse(b"NOPE", RecordingSink::new(), &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, MwawError::UnsupportedVersion(_)));
    }
}
