//! One-shot client for the arithmetic protocol

use crate::conn::TcpConnection;

use socketor_core::{Line, LineConnection};

use std::io;

/// Send operands `a` and `b` to `host:port` and return the response line
pub fn request(host: &str, port: u16, a: &str, b: &str) -> io::Result<String> {
    let mut conn = TcpConnection::connect(host, port)?;
    conn.write_line(a.as_bytes())?;
    conn.write_line(b.as_bytes())?;
    conn.flush()?;

    let mut response = Line::new();
    conn.read_line(&mut response)?;
    conn.close()?;
    Ok(response.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_request_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut a = String::new();
            let mut b = String::new();
            reader.read_line(&mut a).unwrap();
            reader.read_line(&mut b).unwrap();
            let mut stream = stream;
            writeln!(stream, "{} - {} = 4", a.trim(), b.trim()).unwrap();
        });

        let response = request("127.0.0.1", port, "9", "5").unwrap();
        assert_eq!(response, "9 - 5 = 4");
        server.join().unwrap();
    }

    #[test]
    fn test_server_closes_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            reader.read_line(&mut line).unwrap();
        });

        let err = request("127.0.0.1", port, "1", "0").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        server.join().unwrap();
    }

    #[test]
    fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(request("127.0.0.1", port, "1", "2").is_err());
    }
}
