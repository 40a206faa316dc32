use std::fmt;

use super::headers::Headers;

/// Read-only view of one incoming request, handed to a handler.
pub struct Request {
    method: String,
    uri: String,
    protocol: String,
    headers: Headers,
    body: String,
}

impl Request {
    /// Builds a request from raw exchange data. The body is decoded as
    /// UTF-8; invalid sequences are replaced with `U+FFFD` instead of
    /// failing the request.
    pub fn new(method: &str, uri: &str, protocol: &str, headers: Headers, body: &[u8]) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            protocol: protocol.to_string(),
            headers,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request target exactly as received, query string included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        split_target(&self.uri).0
    }

    pub fn query(&self) -> Option<&str> {
        split_target(&self.uri).1
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

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("protocol", &self.protocol)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.uri, self.protocol)
    }
}

/// Splits a request target into its path and optional query.
pub(crate) fn split_target(target: &str) -> (&str, Option<&str>) {
    let target = target.split('#').next().unwrap_or(target);
    // absolute-form, e.g. from a client talking through a proxy
    let target = match target.find("://") {
        Some(scheme_end) if !target.starts_with('/') => {
            let rest = &target[scheme_end + 3..];
            match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => "/",
            }
        }
        _ => target,
    };
    match target.find('?') {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    }
}
