//! Minimal blocking HTTP/1.1 client used by the tests to talk to a running
//! server over a real loopback socket.

use std::{
    io,
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

pub fn get(addr: SocketAddr, path: &str) -> io::Result<RawResponse> {
    request(addr, "GET", path, &[], "")
}

pub fn post(addr: SocketAddr, path: &str, content_type: &str, body: &str) -> io::Result<RawResponse> {
    request(addr, "POST", path, &[("Content-Type", content_type)], body)
}

pub fn request(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)], body: &str) -> io::Result<RawResponse> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let mut head = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", method, path, addr);
    for (k, v) in headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    if !body.is_empty() || method == "POST" || method == "PUT" {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    stream.flush()?;

    send_raw_response(stream)
}

/// Sends nothing more and parses whatever the server answers until it
/// closes the connection.
pub fn send_raw_response(mut stream: TcpStream) -> io::Result<RawResponse> {
    let mut raw = vec![];
    stream.read_to_end(&mut raw)?;
    parse_response(&raw)
}

pub fn raw_exchange(addr: SocketAddr, bytes: &[u8]) -> io::Result<RawResponse> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.write_all(bytes)?;
    stream.flush()?;
    send_raw_response(stream)
}

fn parse_response(raw: &[u8]) -> io::Result<RawResponse> {
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());
    let split = raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| invalid("response head not terminated"))?;
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let body = String::from_utf8_lossy(&raw[split + 4..]).into_owned();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or_else(|| invalid("missing status line"))?;
    let status = status_line.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| invalid("bad status line"))?;
    let headers = lines
        .filter_map(|line| line.find(':').map(|idx| (line[..idx].to_string(), line[idx + 1..].trim().to_string())))
        .collect();

    Ok(RawResponse { status, headers, body })
}
