//! TCP listener with timed accept

use crate::conn::TcpConnection;

use socketor_core::{Accepted, LineListener};

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::RawFd;
use std::time::Duration;

/// Listen backlog
pub const BACKLOG: i32 = 128;

/// An IPv4 listening socket
pub struct TcpLineListener {
    fd: RawFd,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn set_flag(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<()> {
    let on: libc::c_int = 1;
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &on as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
    .map(|_| ())
}

impl TcpLineListener {
    /// Listen on `port` on all interfaces
    pub fn bind(port: u16) -> io::Result<Self> {
        Self::bind_addr(Ipv4Addr::UNSPECIFIED, port)
    }

    /// Listen on `ip:port`; port 0 picks a free one
    pub fn bind_addr(ip: Ipv4Addr, port: u16) -> io::Result<Self> {
        let fd = cvt(unsafe {
            libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0)
        })?;
        // Owned from here so error paths close it
        let listener = Self { fd };

        set_flag(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR)?;

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = u32::from(ip).to_be();
        addr.sin_port = port.to_be();

        cvt(unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of_val(&addr) as libc::socklen_t,
            )
        })?;
        cvt(unsafe { libc::listen(fd, BACKLOG) })?;

        Ok(listener)
    }

    /// Port actually bound
    pub fn local_port(&self) -> io::Result<u16> {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of_val(&addr) as libc::socklen_t;
        cvt(unsafe {
            libc::getsockname(
                self.fd,
                &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        })?;
        Ok(u16::from_be(addr.sin_port))
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Wait until a client is pending; `false` on timeout
    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().clamp(1, i32::MAX as u128) as libc::c_int,
        };
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let n = cvt(unsafe { libc::poll(&mut pfd, 1, timeout_ms) })?;
        Ok(n > 0)
    }
}

impl LineListener for TcpLineListener {
    type Conn = TcpConnection;

    fn accept(&self, timeout: Option<Duration>) -> Accepted<TcpConnection> {
        match self.wait_readable(timeout) {
            Ok(true) => {}
            Ok(false) => return Accepted::TimedOut,
            // A signal cut the wait short; the caller just loops again
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Accepted::TimedOut,
            Err(e) => return Accepted::Failed(e),
        }

        let fd = unsafe {
            libc::accept4(
                self.fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                libc::SOCK_CLOEXEC,
            )
        };
        // EMFILE/ENFILE leave the client queued, so the next poll is
        // immediately readable again; the accept loop counts these as
        // "no connection" and logs only the first of a run
        if fd < 0 {
            return Accepted::Failed(io::Error::last_os_error());
        }

        // Best effort; the exchange is correct without it
        let _ = set_flag(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY);
        Accepted::Connection(TcpConnection::from_raw_fd(fd))
    }
}

impl Drop for TcpLineListener {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

impl std::fmt::Debug for TcpLineListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLineListener")
            .field("fd", &self.fd)
            .field("port", &self.local_port().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socketor_core::{Line, LineConnection};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Instant;

    fn loopback() -> (TcpLineListener, u16) {
        let listener = TcpLineListener::bind_addr(Ipv4Addr::LOCALHOST, 0).unwrap();
        let port = listener.local_port().unwrap();
        (listener, port)
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let (_listener, port) = loopback();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_accept_times_out() {
        let (listener, _) = loopback();
        let start = Instant::now();
        assert!(matches!(
            listener.accept(Some(Duration::from_millis(50))),
            Accepted::TimedOut
        ));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_accept_connection() {
        let (listener, port) = loopback();
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(b"21\n").unwrap();

        let mut conn = match listener.accept(Some(Duration::from_secs(5))) {
            Accepted::Connection(conn) => conn,
            other => panic!("expected a connection, got {:?}", other),
        };

        let mut line = Line::new();
        conn.read_line(&mut line).unwrap();
        assert_eq!(line.as_bytes(), b"21");

        conn.write_line(b"ok").unwrap();
        conn.flush().unwrap();
        conn.close().unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "ok\n");
    }

    #[test]
    fn test_unbounded_accept_returns_on_connect() {
        let (listener, port) = loopback();
        let client = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            TcpStream::connect(("127.0.0.1", port)).unwrap()
        });

        assert!(matches!(listener.accept(None), Accepted::Connection(_)));
        client.join().unwrap();
    }

    #[test]
    fn test_port_in_use() {
        let (_listener, port) = loopback();
        let err = TcpLineListener::bind_addr(Ipv4Addr::LOCALHOST, port).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
