//! Named cookie extraction from a parsed header map.

use crate::http::parse::HeaderMap;
use log::debug;

/// Extracts the value of the cookie called `name` from the `Cookie` header.
///
/// A candidate only counts when the name sits at the start of the header or
/// directly after a `;` (ASCII whitespace in between is ignored), so
/// `session` never matches inside `xsession=...`. The value runs up to the
/// next `;` or the end of the header and is percent-decoded; a value with
/// broken percent-encoding yields `None`.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get("Cookie")?;
    if name.is_empty() {
        return None;
    }

    let mut search = 0;
    loop {
        let pos = search + header[search..].find(name)?;
        let after = pos + name.len();

        if at_cookie_start(header.as_bytes(), pos) && header[after..].starts_with('=') {
            let value = &header[after + 1..];
            let value = match value.find(';') {
                Some(end) => &value[..end],
                None => value,
            };

            return match percent_decode(value) {
                Some(decoded) => Some(decoded),
                None => {
                    debug!("invalid cookie encoding");
                    None
                }
            };
        }

        search = after;
    }
}

/// True when the byte before `pos` is `;` after skipping ASCII whitespace,
/// or when `pos` is the start of the header.
fn at_cookie_start(header: &[u8], pos: usize) -> bool {
    for &byte in header[..pos].iter().rev() {
        if byte.is_ascii_whitespace() {
            continue;
        }
        return byte == b';';
    }
    true
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if i + 2 >= bytes.len() {
                    return None;
                }
                let hi = from_hex(bytes[i + 1])?;
                let lo = from_hex(bytes[i + 2])?;
                out.push((hi << 4) | lo);
                i += 3;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8(out).ok()
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
