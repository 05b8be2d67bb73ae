//! Buffered line I/O over a raw TCP socket
//!
//! `TcpConnection` keeps its read and write buffers inline and talks to
//! the socket with plain `read`/`send` calls, so a worker context can
//! drive it without touching the allocator.
//!
//! errno lives in thread-local storage, which worker contexts share with
//! the accept loop. Error kinds reported from a worker are therefore
//! best-effort; success and failure are always exact.

use socketor_core::{Line, LineConnection};

use std::io;
use std::net::TcpStream;
use std::os::fd::{IntoRawFd, RawFd};

/// Per-direction buffer size
pub const BUF_SIZE: usize = 256;

/// One TCP peer with line-buffered reads and writes
pub struct TcpConnection {
    fd: RawFd,
    rbuf: [u8; BUF_SIZE],
    rpos: usize,
    rlen: usize,
    wbuf: [u8; BUF_SIZE],
    wlen: usize,
}

impl TcpConnection {
    /// Take ownership of a connected socket
    pub fn from_raw_fd(fd: RawFd) -> Self {
        Self {
            fd,
            rbuf: [0; BUF_SIZE],
            rpos: 0,
            rlen: 0,
            wbuf: [0; BUF_SIZE],
            wlen: 0,
        }
    }

    /// Resolve `host` and connect to `host:port`
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self::from_raw_fd(stream.into_raw_fd()))
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.fd >= 0
    }

    fn check_open(&self) -> io::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(io::ErrorKind::NotConnected.into())
        }
    }

    /// Refill the read buffer; returns bytes read, 0 at EOF
    fn fill(&mut self) -> io::Result<usize> {
        self.check_open()?;
        loop {
            let n = unsafe { libc::read(self.fd, self.rbuf.as_mut_ptr().cast(), BUF_SIZE) };
            if n >= 0 {
                self.rpos = 0;
                self.rlen = n as usize;
                return Ok(self.rlen);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl LineConnection for TcpConnection {
    fn read_line(&mut self, line: &mut Line) -> io::Result<()> {
        line.clear();
        let mut seen = false;

        loop {
            if self.rpos == self.rlen && self.fill()? == 0 {
                // EOF: a partial last line still counts
                return if seen {
                    line.trim_cr();
                    Ok(())
                } else {
                    Err(io::ErrorKind::UnexpectedEof.into())
                };
            }

            let byte = self.rbuf[self.rpos];
            self.rpos += 1;
            seen = true;

            if byte == b'\n' {
                line.trim_cr();
                return Ok(());
            }
            // Overflow is dropped until the terminator
            line.push(byte);
        }
    }

    fn write_line(&mut self, text: &[u8]) -> io::Result<()> {
        self.check_open()?;
        let text = &text[..text.len().min(BUF_SIZE - 1)];
        if BUF_SIZE - self.wlen < text.len() + 1 {
            self.flush()?;
        }

        self.wbuf[self.wlen..self.wlen + text.len()].copy_from_slice(text);
        self.wlen += text.len();
        self.wbuf[self.wlen] = b'\n';
        self.wlen += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()?;
        let mut off = 0;
        while off < self.wlen {
            let n = unsafe {
                libc::send(
                    self.fd,
                    self.wbuf[off..self.wlen].as_ptr().cast(),
                    self.wlen - off,
                    libc::MSG_NOSIGNAL,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            off += n as usize;
        }
        self.wlen = 0;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let fd = std::mem::replace(&mut self.fd, -1);
        if unsafe { libc::close(fd) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("fd", &self.fd)
            .field("buffered_in", &(self.rlen - self.rpos))
            .field("buffered_out", &self.wlen)
            .finish()
    }
}
