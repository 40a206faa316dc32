use std::{fmt, slice};

pub const HTTP_HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HTTP_HEADER_CONNECTION: &str = "Connection";
pub const HTTP_HEADER_EXPECT: &str = "Expect";
pub const HTTP_HEADER_TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const HTTP_HEADER_WWW_AUTHENTICATE: &str = "WWW-Authenticate";

/// Ordered header multimap.
///
/// Names compare case-insensitively; the spelling used by the first
/// insertion of a name is the one written to the wire. Values under one
/// name keep their insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the values of `name`.
    pub fn add(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(idx) => self.entries[idx].1.push(value.to_string()),
            None => self.entries.push((name.to_string(), vec![value.to_string()])),
        }
    }

    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get_all(name)
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter { inner: self.entries.iter() }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

pub struct Iter<'a> {
    inner: slice::Iter<'a, (String, Vec<String>)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a [String]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a [String]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.add("content-type", "text/plain");
        assert_eq!(h.get_first("Content-Type"), Some("text/plain"));
        assert_eq!(h.get_first("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(h.get_first("Accept"), None);
        assert!(h.get_all("Accept").is_none());
    }

    #[test]
    fn values_keep_insertion_order() {
        let mut h = Headers::new();
        h.add("Set-Person", "lane-loves-go");
        h.add("X-Other", "1");
        h.add("set-person", "prime-loves-zig");
        h.add("SET-PERSON", "tj-loves-ocaml");

        assert_eq!(h.len(), 2);
        let names: Vec<&str> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Set-Person", "X-Other"]);
        assert_eq!(
            h.get_all("Set-Person").unwrap(),
            &["lane-loves-go".to_string(), "prime-loves-zig".to_string(), "tj-loves-ocaml".to_string()]
        );
    }
}
