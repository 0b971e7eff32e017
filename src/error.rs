//! The crate-wide error type and the propagation policy from spec §7.
//!
//! Most error kinds here are *recovered from* inside parsers (logged and
//! replaced by a default value) and never actually reach a caller; only
//! [`MwawError::UnsupportedVersion`], [`MwawError::UnsupportedEncryption`]
//! and [`MwawError::WrongPassword`] are expected to propagate out of
//! [`crate::Document::parse`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MwawError>;

#[derive(Debug, Error)]
pub enum MwawError {
    /// A read could not deliver the requested number of bytes before
    /// hitting the current section limit or the end of the stream.
    #[error("truncated: {0}")]
    Truncated(String),

    /// The header check rejected the file outright.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    /// A structured record's size or checksum did not match expectations.
    #[error("malformed zone: {0}")]
    MalformedZone(String),

    /// A PLC or catalog entry referenced an index that does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// A [`crate::listener::Listener`] operation was invoked in a state
    /// where it makes no sense. Per §4.6.5 this is logged and ignored by
    /// the Listener itself; this variant exists for the rare case
    /// (§4.6.5's "unrecoverable framing violation") where it must abort.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// The document is encrypted; this library only reads cleartext
    /// legacy files.
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// The document is encrypted and the supplied password did not match.
    #[error("wrong password")]
    WrongPassword,

    #[error("{0}")]
    Generic(String),
}

impl MwawError {
    pub fn truncated(context: impl Into<String>) -> Self {
        MwawError::Truncated(context.into())
    }

    pub fn malformed_zone(context: impl Into<String>) -> Self {
        MwawError::MalformedZone(context.into())
    }

    pub fn missing_reference(context: impl Into<String>) -> Self {
        MwawError::MissingReference(context.into())
    }

    pub fn state_violation(context: impl Into<String>) -> Self {
        MwawError::StateViolation(context.into())
    }
}
