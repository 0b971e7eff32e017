//! Endian-aware positioned reader over an in-memory byte slice (§4.1).
//!
//! A [`Stream`] borrows its bytes for its whole lifetime (construction
//! acquires the slice, drop releases it — there is no owned buffer here);
//! sub-streams created by [`Stream::open_ole`] own a freshly materialized
//! buffer instead, since OLE sectors are gathered from scattered positions
//! in the parent stream (§5 "Resources").

use std::borrow::Cow;

use crate::error::{MwawError, Result};
use crate::storage::ole;

/// Reference point for [`Stream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Begin,
    Current,
    End,
}

/// A byte-stream reader with a stack of nested section limits.
///
/// All Mac word-processor formats are big-endian; `big_endian` defaults to
/// `true` and is only ever set to `false` when reading a sub-stream that is
/// known to carry PC-endian data (e.g. an embedded OLE object written by a
/// Windows application).
pub struct Stream<'a> {
    data: Cow<'a, [u8]>,
    pos: usize,
    limit: usize,
    limit_stack: Vec<usize>,
    big_endian: bool,
}

impl<'a> Stream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Stream {
            data: Cow::Borrowed(data),
            pos: 0,
            limit: data.len(),
            limit_stack: Vec::new(),
            big_endian: true,
        }
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn at_eos(&self) -> bool {
        self.pos >= self.limit
    }

    /// Seeks relative to `whence`, clamping to `[0, current limit]`.
    ///
    /// Returns `true` if the requested offset had to be clamped.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> bool {
        let base = match whence {
            Whence::Begin => 0i64,
            Whence::Current => self.pos as i64,
            Whence::End => self.limit as i64,
        };
        let target = base.saturating_add(offset);
        let clamped = target.clamp(0, self.limit as i64);
        let did_clamp = clamped != target;
        self.pos = clamped as usize;
        did_clamp
    }

    /// Pushes a new section limit, given as an *absolute* offset from the
    /// start of the stream. Per §4.1's invariant the new limit can never
    /// exceed the currently active one; an oversized request is silently
    /// clamped down to it (a malformed-zone concession the parser layer is
    /// expected to have already guarded against).
    pub fn push_limit(&mut self, absolute_end: usize) {
        self.limit_stack.push(self.limit);
        self.limit = absolute_end.min(self.limit);
        if self.pos > self.limit {
            self.pos = self.limit;
        }
    }

    pub fn pop_limit(&mut self) {
        if let Some(previous) = self.limit_stack.pop() {
            self.limit = previous;
        } else {
            self.limit = self.data.len();
        }
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.pos.checked_add(n).map_or(true, |end| end > self.limit) {
            return Err(MwawError::truncated(format!(
                "need {n} bytes at offset {}, limit is {}",
                self.pos, self.limit
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.require(2)?;
        let bytes = [self.data[self.pos], self.data[self.pos + 1]];
        self.pos += 2;
        Ok(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.require(4)?;
        let bytes = [
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ];
        self.pos += 4;
        Ok(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn read_block(&mut self, n: usize) -> Result<&[u8]> {
        self.require(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_to_end_of_section(&mut self) -> &[u8] {
        let slice = &self.data[self.pos..self.limit];
        self.pos = self.limit;
        slice
    }

    /// True if the *whole* underlying document (not just the current
    /// section) begins with a compound-document (OLE2) signature.
    pub fn is_ole(&self) -> bool {
        ole::has_signature(&self.data)
    }

    /// Full paths of every stream in the compound document, directories
    /// suffixed with `/`.
    pub fn list_ole_entries(&self) -> Result<Vec<String>> {
        ole::list_entries(&self.data)
    }

    /// Opens a named sub-stream of the compound document as a fresh
    /// [`Stream`] over an owned, contiguously-gathered buffer (§5
    /// "Resources": "the compound-storage reader materializes named
    /// sub-streams into owned byte vectors").
    ///
    /// Per §4.1, a lookup in the root directory is allowed to succeed on an
    /// under-read if at least half the recorded stream size could be
    /// gathered (a repair concession for truncated legacy files); a
    /// shorter or non-root truncation fails.
    pub fn open_ole(&self, path: &str) -> Result<Stream<'static>> {
        let bytes = ole::extract_stream(&self.data, path)?;
        let len = bytes.len();
        Ok(Stream {
            data: Cow::Owned(bytes),
            pos: 0,
            limit: len,
            limit_stack: Vec::new(),
            big_endian: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_round_trip() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        let mut s = Stream::new(&bytes);
        assert_eq!(s.u16().unwrap(), 0x1234);
        assert_eq!(s.u16().unwrap(), 0x5678);
    }

    #[test]
    fn little_endian_selected_per_stream() {
        let bytes = [0x12, 0x34];
        let mut s = Stream::new(&bytes);
        s.set_big_endian(false);
        assert_eq!(s.u16().unwrap(), 0x3412);
    }

    #[test]
    fn truncated_read_past_limit() {
        let bytes = [0u8; 4];
        let mut s = Stream::new(&bytes);
        s.push_limit(2);
        assert!(s.u16().is_ok());
        assert!(s.u16().is_err());
    }

    #[test]
    fn push_pop_limit_restores_prior_state() {
        let bytes = [0u8; 16];
        let mut s = Stream::new(&bytes);
        s.seek(4, Whence::Begin);
        s.push_limit(8);
        assert_eq!(s.limit, 8);
        s.pop_limit();
        assert_eq!(s.limit, 16);
        assert_eq!(s.tell(), 4);
    }

    #[test]
    fn seek_clamps_negative_and_past_end() {
        let bytes = [0u8; 8];
        let mut s = Stream::new(&bytes);
        assert!(s.seek(-5, Whence::Begin));
        assert_eq!(s.tell(), 0);
        assert!(s.seek(100, Whence::Begin));
        assert_eq!(s.tell(), 8);
    }

    #[test]
    fn nested_limits_cannot_exceed_enclosing() {
        let bytes = [0u8; 16];
        let mut s = Stream::new(&bytes);
        s.push_limit(6);
        s.push_limit(100);
        assert_eq!(s.limit, 6);
    }
}
