//! Line transport traits
//!
//! The accept loop and the worker routine only ever see a connection
//! through these traits. Implementations live in `socketor-net`.
//!
//! A connection is driven from a raw `clone(2)` worker context, so its
//! methods must not allocate, log or panic. Build errors from an
//! `io::ErrorKind` (`ErrorKind::UnexpectedEof.into()`), never with
//! `io::Error::new`, which boxes its payload.

use std::io;
use std::time::Duration;

use crate::line::Line;

/// One accepted client
pub trait LineConnection: Send + 'static {
    /// Read the next `\n`-terminated line into `line`
    ///
    /// The terminator is consumed and not stored. Text beyond the line
    /// capacity is discarded up to the terminator. EOF before the first
    /// byte of a line is `ErrorKind::UnexpectedEof`.
    fn read_line(&mut self, line: &mut Line) -> io::Result<()>;

    /// Queue `text` followed by `\n`
    fn write_line(&mut self, text: &[u8]) -> io::Result<()>;

    /// Push queued output to the peer
    fn flush(&mut self) -> io::Result<()>;

    /// Close the underlying socket
    ///
    /// The handle's memory is released by whoever owns it, not here.
    fn close(&mut self) -> io::Result<()>;
}

/// Result of one timed accept
#[derive(Debug)]
pub enum Accepted<C> {
    Connection(C),
    TimedOut,
    Failed(io::Error),
}

/// A bound listening endpoint
pub trait LineListener {
    type Conn: LineConnection;

    /// Wait for one client; `None` waits forever
    fn accept(&self, timeout: Option<Duration>) -> Accepted<Self::Conn>;
}
