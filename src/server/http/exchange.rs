use std::{
    fmt,
    io,
    io::{BufRead, Read, Write},
    net,
    time::Duration,
};

use super::{
    headers::*,
    req::{split_target, Request},
    res::reason_phrase,
};
use crate::server::error::DispatchError;

const RESPONSE_PROTOCOL: &str = "HTTP/1.1";
const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
const MAX_DRAIN_READS: usize = 64;

/// Request head of an exchange: what an authenticator gets to look at.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    method: String,
    uri: String,
    protocol: String,
    headers: Headers,
    peer: Option<net::SocketAddr>,
}

impl ExchangeContext {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        split_target(&self.uri).0
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.headers.get_first(name)
    }

    /// Remote address of the client, when the socket could report it.
    pub fn peer(&self) -> Option<net::SocketAddr> {
        self.peer
    }

    pub fn to_request(&self, body: &[u8]) -> Request {
        Request::new(&self.method, &self.uri, &self.protocol, self.headers.clone(), body)
    }
}

impl fmt::Display for ExchangeContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.uri, self.protocol)
    }
}

/// One accepted connection. The socket is shut down when this is dropped,
/// whichever way the exchange ended.
pub struct Connection {
    reader: io::BufReader<net::TcpStream>,
    peer: Option<net::SocketAddr>,
}

impl Connection {
    pub fn new(stream: net::TcpStream, io_timeout: Option<Duration>) -> io::Result<Self> {
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            reader: io::BufReader::new(stream),
            peer,
        })
    }

    /// Reads the request head. On failure the connection is handed back so
    /// the caller can still answer with an error status.
    pub fn read_exchange(mut self, max_line: usize) -> Result<Exchange, (Connection, DispatchError)> {
        match read_head(&mut self.reader, max_line) {
            Ok((method, uri, protocol, headers)) => {
                let context = ExchangeContext {
                    method,
                    uri,
                    protocol,
                    headers,
                    peer: self.peer,
                };
                Ok(Exchange { conn: self, context })
            }
            Err(e) => Err((self, e)),
        }
    }

    pub fn peer(&self) -> Option<net::SocketAddr> {
        self.peer
    }

    /// Writes a complete response with an explicit `Content-Length`.
    /// With `head_only` the body bytes are left out.
    pub fn send_response(&mut self, status_code: u16, headers: &Headers, body: &[u8], head_only: bool) -> io::Result<()> {
        let stream = self.reader.get_mut();
        write_response(stream, status_code, headers, body, head_only)
    }

    fn send_continue(&mut self) -> io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(CONTINUE_LINE)?;
        stream.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let stream = self.reader.get_mut();
        let _ = stream.flush();
        let _ = stream.shutdown(net::Shutdown::Write);
        // unread request bytes would turn the close into a reset that can
        // discard the response on the client side
        if stream.set_nonblocking(true).is_ok() {
            let mut sink = [0u8; 1024];
            for _ in 0..MAX_DRAIN_READS {
                match stream.read(&mut sink) {
                    Ok(n) if n > 0 => continue,
                    _ => break,
                }
            }
        }
    }
}

/// A connection whose request head has been parsed.
pub struct Exchange {
    conn: Connection,
    context: ExchangeContext,
}

impl Exchange {
    pub fn context(&self) -> &ExchangeContext {
        &self.context
    }

    /// Buffers the whole request body, sized by `Content-Length`. Answers
    /// `Expect: 100-continue` before reading.
    pub fn read_body(&mut self) -> Result<Vec<u8>, DispatchError> {
        if let Some(te) = self.context.first_header(HTTP_HEADER_TRANSFER_ENCODING) {
            if !te.eq_ignore_ascii_case("identity") {
                return Err(DispatchError::UnsupportedTransferEncoding(te.to_string()));
            }
        }
        let length = content_length(&self.context.headers)?;
        if length == 0 {
            return Ok(vec![]);
        }
        let expects_continue = self.context.protocol == RESPONSE_PROTOCOL
            && self.context.first_header(HTTP_HEADER_EXPECT)
                .map_or(false, |v| v.eq_ignore_ascii_case("100-continue"));
        if expects_continue {
            self.conn.send_continue()?;
        }
        read_body(&mut self.conn.reader, length)
    }

    /// Sends the final response. `HEAD` requests get the head only.
    pub fn send_response(&mut self, status_code: u16, headers: &Headers, body: &[u8]) -> io::Result<()> {
        let head_only = self.context.method == "HEAD";
        self.conn.send_response(status_code, headers, body, head_only)
    }
}

/// Request line and header block of an HTTP/1.x request.
pub(crate) fn read_head<R: BufRead>(reader: &mut R, max_line: usize) -> Result<(String, String, String, Headers), DispatchError> {
    let request_line = loop {
        match read_line(reader, max_line)? {
            None => return Err(DispatchError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before request line",
            ))),
            // stray CRLFs ahead of the request line are tolerated
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let mut parts = request_line.split_whitespace();
    let (method, uri, protocol) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(u), Some(p), None) => (m, u, p),
        _ => return Err(DispatchError::Malformed(format!("bad request line {:?}", request_line))),
    };
    if !method.bytes().all(is_token_byte) {
        return Err(DispatchError::Malformed(format!("bad method {:?}", method)));
    }
    if !protocol.starts_with("HTTP/1.") {
        return Err(DispatchError::Malformed(format!("unsupported protocol {:?}", protocol)));
    }

    let mut headers = Headers::new();
    loop {
        let line = match read_line(reader, max_line)? {
            Some(line) => line,
            None => return Err(DispatchError::Malformed("unexpected end of request head".to_string())),
        };
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            return Err(DispatchError::Malformed("folded header lines are not supported".to_string()));
        }
        let (name, value) = split_header_line(&line)?;
        headers.add(name, value);
    }

    Ok((method.to_string(), uri.to_string(), protocol.to_string(), headers))
}

fn read_body<R: Read>(reader: &mut R, length: u64) -> Result<Vec<u8>, DispatchError> {
    let mut body = Vec::with_capacity(length.min(64 * 1024) as usize);
    reader.take(length).read_to_end(&mut body)?;
    if (body.len() as u64) < length {
        return Err(DispatchError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("request body ended after {} of {} bytes", body.len(), length),
        )));
    }
    Ok(body)
}

fn content_length(headers: &Headers) -> Result<u64, DispatchError> {
    let values = match headers.get_all(HTTP_HEADER_CONTENT_LENGTH) {
        Some(values) => values,
        None => return Ok(0),
    };
    let mut length: Option<u64> = None;
    for v in values.iter().flat_map(|v| v.split(',')) {
        let parsed = v.trim().parse::<u64>()
            .map_err(|_| DispatchError::Malformed(format!("bad Content-Length {:?}", v)))?;
        match length {
            Some(l) if l != parsed => {
                return Err(DispatchError::Malformed("conflicting Content-Length values".to_string()));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}

/// Reads one CRLF (or bare LF) terminated line without the terminator.
/// `Ok(None)` means the peer closed before sending anything.
fn read_line<R: BufRead>(reader: &mut R, max_line: usize) -> Result<Option<String>, DispatchError> {
    let mut buf = Vec::with_capacity(256);
    let limit = max_line as u64 + 2;
    let n = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if n as u64 == limit {
            return Err(DispatchError::HeadTooLarge(max_line));
        }
        return Err(DispatchError::Malformed("unexpected end of request head".to_string()));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > max_line {
        return Err(DispatchError::HeadTooLarge(max_line));
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn split_header_line(line: &str) -> Result<(&str, &str), DispatchError> {
    let idx = line.find(':')
        .ok_or_else(|| DispatchError::Malformed(format!("header line without ':' {:?}", line)))?;
    let name = &line[..idx];
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(DispatchError::Malformed(format!("bad header name {:?}", name)));
    }
    Ok((name, line[idx + 1..].trim()))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Header names must be tokens and values must not contain CR or LF, so a
/// handler cannot add header lines of its own.
pub(crate) fn check_response_headers(headers: &Headers) -> Result<(), DispatchError> {
    for (name, values) in headers {
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(DispatchError::InvalidResponseHeader {
                name: name.to_string(),
                reason: "name is not a token",
            });
        }
        if values.iter().any(|v| v.bytes().any(|b| b == b'\r' || b == b'\n')) {
            return Err(DispatchError::InvalidResponseHeader {
                name: name.to_string(),
                reason: "value contains CR or LF",
            });
        }
    }
    Ok(())
}

pub(crate) fn write_response<W: Write>(writer: &mut W, status_code: u16, headers: &Headers, body: &[u8], head_only: bool) -> io::Result<()> {
    let mut head = format!("{} {} {}\r\n", RESPONSE_PROTOCOL, status_code, reason_phrase(status_code));
    for (name, values) in headers {
        // framing is ours: one exchange per connection, no chunking
        if name.eq_ignore_ascii_case(HTTP_HEADER_CONTENT_LENGTH)
            || name.eq_ignore_ascii_case(HTTP_HEADER_TRANSFER_ENCODING)
            || name.eq_ignore_ascii_case(HTTP_HEADER_CONNECTION) {
            continue;
        }
        for value in values {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
    }
    head.push_str(&format!("{}: {}\r\n", HTTP_HEADER_CONTENT_LENGTH, body.len()));
    head.push_str(&format!("{}: close\r\n\r\n", HTTP_HEADER_CONNECTION));

    writer.write_all(head.as_bytes())?;
    if !head_only {
        writer.write_all(body)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTP_REQ_STR: &str = "POST /post?x=1 HTTP/1.1\r\nHost: 127.0.0.1\r\nContent-Type: application/json\r\nX-Tag: a\r\nx-tag: b\r\nContent-Length: 5\r\n\r\nHello";

    #[test]
    fn parses_request_head() {
        let mut buf = io::BufReader::new(HTTP_REQ_STR.as_bytes());
        let (method, uri, protocol, headers) = read_head(&mut buf, 4096).unwrap();
        assert_eq!(method, "POST");
        assert_eq!(uri, "/post?x=1");
        assert_eq!(protocol, "HTTP/1.1");
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get_first("host"), Some("127.0.0.1"));
        assert_eq!(headers.get_all("X-Tag").unwrap(), &["a".to_string(), "b".to_string()]);

        assert_eq!(content_length(&headers).unwrap(), 5);
        let body = read_body(&mut buf, 5).unwrap();
        assert_eq!(body, b"Hello");
    }

    #[test]
    fn rejects_malformed_heads() {
        let cases: [&[u8]; 5] = [
            b"GET /\r\n\r\n",
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET / HTTP/2.0\r\n\r\n",
            b"GET / HTTP/1.1\r\nHost localhost\r\n\r\n",
            b"GET / HTTP/1.1\r\nHost: localhost\r\n",
        ];
        for case in cases.iter() {
            let mut buf = io::BufReader::new(*case);
            match read_head(&mut buf, 4096) {
                Err(DispatchError::Malformed(_)) => {},
                other => panic!("{:?} parsed as {:?}", String::from_utf8_lossy(case), other.map(|h| h.0)),
            }
        }
    }

    #[test]
    fn empty_connection_is_eof() {
        let mut buf = io::BufReader::new(&b""[..]);
        match read_head(&mut buf, 4096) {
            Err(DispatchError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other.map(|h| h.0)),
        }
    }

    #[test]
    fn overlong_line_is_rejected() {
        let req = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(64));
        let mut buf = io::BufReader::new(req.as_bytes());
        match read_head(&mut buf, 32) {
            Err(DispatchError::HeadTooLarge(32)) => {},
            other => panic!("unexpected {:?}", other.map(|h| h.0)),
        }
    }

    #[test]
    fn conflicting_content_lengths() {
        let mut headers = Headers::new();
        headers.add("Content-Length", "5");
        headers.add("Content-Length", "6");
        assert!(content_length(&headers).is_err());
    }

    #[test]
    fn short_body_is_eof() {
        let mut buf = io::BufReader::new(&b"abc"[..]);
        match read_body(&mut buf, 5) {
            Err(DispatchError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn writes_response_with_length() {
        let mut headers = Headers::new();
        headers.add("content-type", "text/plain");
        headers.add("Content-Length", "999");
        let mut out: Vec<u8> = vec![];
        write_response(&mut out, 200, &headers, "héllo".as_bytes(), false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\nContent-Length: 6\r\nConnection: close\r\n\r\nhéllo"
        );
    }

    #[test]
    fn response_header_checks() {
        let mut headers = Headers::new();
        headers.add("X-Trace", "a, b; q=0.5");
        assert!(check_response_headers(&headers).is_ok());

        let mut split = Headers::new();
        split.add("X-A", "v\r\nSet-Cookie: injected=1");
        match check_response_headers(&split) {
            Err(DispatchError::InvalidResponseHeader { name, .. }) => assert_eq!(name, "X-A"),
            other => panic!("unexpected {:?}", other),
        }

        let mut bad_name = Headers::new();
        bad_name.add("X A", "v");
        assert!(check_response_headers(&bad_name).is_err());

        let mut bare_lf = Headers::new();
        bare_lf.add("X-B", "v\nw");
        assert!(check_response_headers(&bare_lf).is_err());
    }

    #[test]
    fn head_only_skips_body() {
        let mut out: Vec<u8> = vec![];
        write_response(&mut out, 404, &Headers::new(), b"gone", true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\n"
        );
    }
}
