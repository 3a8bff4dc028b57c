//! Incremental request-line and header-block parsers.
//!
//! Both parsers are pure over their byte slice and report exact
//! consumed-byte counts so the connection buffer can be drained precisely.
//! `NeedsMore` means the terminating sequence has not arrived yet; callers
//! keep the buffer intact and retry after the next read.

use memchr::memchr;

/// Outcome of one incremental parse attempt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Status<T> {
    /// The input does not yet contain the terminating sequence.
    NeedsMore,
    /// The input can never become a valid request.
    Invalid,
    /// Parsed successfully; `consumed` bytes belong to this element.
    Done { consumed: usize, value: T },
}

/// Case-insensitive header name to value mapping.
///
/// Names keep the spelling of their first occurrence; lookups ignore ASCII
/// case. Duplicate names overwrite the stored value, so the last occurrence
/// wins. Lookup is a linear scan, which beats hashing for the handful of
/// headers a request head carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Stores `value` under `name`. A later insert under a case-variant of
    /// an existing name replaces the value but keeps the original spelling.
    pub fn insert(&mut self, name: String, value: String) {
        match self
            .entries
            .iter_mut()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(&name))
        {
            Some((_, stored)) => *stored = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Parses an HTTP/1.x request line: `METHOD target HTTP/x.y\r\n`.
///
/// Returns the method and target as owned strings. Lines with the wrong
/// token count, non-ASCII bytes, or a bare `\n` terminator are `Invalid`.
pub(crate) fn parse_request_line(bytes: &[u8]) -> Status<(String, String)> {
    let Some(end) = memchr(b'\n', bytes) else {
        return Status::NeedsMore;
    };

    if end == 0 || bytes[end - 1] != b'\r' {
        return Status::Invalid;
    }

    let Ok(line) = simdutf8::basic::from_utf8(&bytes[..end - 1]) else {
        return Status::Invalid;
    };
    if !line.is_ascii() {
        return Status::Invalid;
    }

    let mut tokens = line.split(' ');
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(target), Some(version), None)
            if !method.is_empty() && !target.is_empty() && !version.is_empty() =>
        {
            Status::Done {
                consumed: end + 1,
                value: (method.to_owned(), target.to_owned()),
            }
        }
        _ => Status::Invalid,
    }
}

/// Parses a header block terminated by a blank line.
///
/// Each line is `Name: Value` with surrounding whitespace trimmed from both
/// parts. The consumed count includes the terminating blank line.
pub(crate) fn parse_headers(bytes: &[u8]) -> Status<HeaderMap> {
    let mut map = HeaderMap::new();
    let mut pos = 0;

    loop {
        let Some(offset) = memchr(b'\n', &bytes[pos..]) else {
            return Status::NeedsMore;
        };
        let end = pos + offset;

        if end == pos || bytes[end - 1] != b'\r' {
            return Status::Invalid;
        }

        let Ok(line) = simdutf8::basic::from_utf8(&bytes[pos..end - 1]) else {
            return Status::Invalid;
        };

        if line.is_empty() {
            return Status::Done {
                consumed: end + 1,
                value: map,
            };
        }

        let Some(colon) = line.find(':') else {
            return Status::Invalid;
        };

        let name = line[..colon].trim();
        if name.is_empty() {
            return Status::Invalid;
        }
        let value = line[colon + 1..].trim();

        map.insert(name.to_owned(), value.to_owned());
        pos = end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done<T>(status: Status<T>) -> (usize, T) {
        match status {
            Status::Done { consumed, value } => (consumed, value),
            other => panic!("expected Done, got {:?}", std::mem::discriminant(&other)),
        }
    }

    #[test]
    fn request_line() {
        #[rustfmt::skip]
        let cases: &[(&[u8], Option<(&str, &str)>)] = &[
            (b"GET / HTTP/1.1\r\n",             Some(("GET", "/"))),
            (b"HEAD /index HTTP/1.0\r\nrest",   Some(("HEAD", "/index"))),
            (b"POST /x?a=1 HTTP/1.1\r\n",       Some(("POST", "/x?a=1"))),

            (b"GET /\r\n",                      None),
            (b"GET / HTTP/1.1 extra\r\n",       None),
            (b"GET  / HTTP/1.1\r\n",            None),
            (b"GET / HTTP/1.1\n",               None),
            (b"\r\n",                           None),
            (b"G\xc3\x89T / HTTP/1.1\r\n",      None),
        ];

        for (input, expected) in cases {
            match expected {
                Some((method, target)) => {
                    let (consumed, (m, t)) = done(parse_request_line(input));
                    assert_eq!(m, *method);
                    assert_eq!(t, *target);
                    assert_eq!(&input[consumed - 2..consumed], b"\r\n");
                }
                None => assert_eq!(parse_request_line(input), Status::Invalid),
            }
        }
    }

    #[test]
    fn request_line_needs_more() {
        assert_eq!(
            parse_request_line(b"GET / HTTP/1.1"),
            Status::NeedsMore::<(String, String)>
        );
        assert_eq!(parse_request_line(b""), Status::NeedsMore);
    }

    #[test]
    fn headers_basic() {
        let input = b"Host: example.com\r\nAccept: */*\r\n\r\ntrailing";
        let (consumed, map) = done(parse_headers(input));

        assert_eq!(consumed, input.len() - b"trailing".len());
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Host"), Some("example.com"));
        assert_eq!(map.get("host"), Some("example.com"));
        assert_eq!(map.get("ACCEPT"), Some("*/*"));
        assert_eq!(map.get("Cookie"), None);
    }

    #[test]
    fn headers_trim_and_last_wins() {
        let input = b"Name:   padded value  \r\nname: second\r\n\r\n";
        let (_, map) = done(parse_headers(input));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Name"), Some("second"));
        // First spelling is kept for iteration.
        assert_eq!(map.iter().next(), Some(("Name", "second")));
    }

    #[test]
    fn headers_empty_block() {
        let (consumed, map) = done(parse_headers(b"\r\nGET"));
        assert_eq!(consumed, 2);
        assert!(map.is_empty());
    }

    #[test]
    fn headers_incomplete_and_invalid() {
        assert_eq!(
            parse_headers(b"Host: example.com\r\n"),
            Status::NeedsMore::<HeaderMap>
        );
        assert_eq!(parse_headers(b"no colon here\r\n\r\n"), Status::Invalid);
        assert_eq!(parse_headers(b": empty name\r\n\r\n"), Status::Invalid);
        assert_eq!(parse_headers(b"Host: x\n\n"), Status::Invalid);
    }
}
