//! Fixed-capacity text line
//!
//! A `Line` is an inline byte buffer bounded by [`LINE_MAX`]. It never
//! touches the heap, so workers can read, format and write lines without
//! calling the allocator (see `socketor-runtime::worker`). Anything written
//! past the capacity is dropped, the same way `snprintf` truncates.

use core::fmt;

use crate::constants::LINE_MAX;

/// Bytes of text a line can hold (one byte of `LINE_MAX` is the terminator)
pub const LINE_CAPACITY: usize = LINE_MAX - 1;

/// Inline, truncating line buffer
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Line {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl Line {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    /// Build a line from `bytes`, truncating at capacity
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut line = Self::new();
        line.push_bytes(bytes);
        line
    }

    /// Append as much of `bytes` as fits; returns how many were kept
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let room = LINE_CAPACITY - self.len;
        let n = bytes.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Append one byte; `false` once the line is full
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len == LINE_CAPACITY {
            return false;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        true
    }

    /// Remove a trailing `\r` left by CRLF peers
    pub fn trim_cr(&mut self) {
        if self.len > 0 && self.buf[self.len - 1] == b'\r' {
            self.len -= 1;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == LINE_CAPACITY
    }

    /// Lossy UTF-8 view for diagnostics (allocates on invalid input)
    pub fn to_string_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl Default for Line {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for Line {
    /// Truncates silently; never reports an error so `write!` keeps going
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
