//! Quality-ordered parsing of `Accept-*` style header values.

use std::cmp::Ordering;

/// Parses an `Accept-Language`-shaped header value into an ordered
/// preference list.
///
/// Tokens are split on `,`; a `;q=<float>` suffix weighs the token, with
/// values outside `[0, 1]` (and unparseable ones) clamped to 0. When
/// `default` is given it joins the list at q=0.1. Entries are stably sorted
/// by descending weight, zero-weight entries are dropped, and every emitted
/// token is trimmed and lowercased. After the full tokens, every token
/// containing a `-` contributes its base language (the prefix before the
/// first `-`), in the same order. Duplicates are not removed.
///
/// ```
/// let list = webfront::parse_accept_list("en-US,en;q=0.8,de-DE;q=0.5", None);
/// assert_eq!(list, ["en-us", "en", "de-de", "en", "de"]);
/// ```
pub fn parse_accept_list(accept: &str, default: Option<&str>) -> Vec<String> {
    struct Entry<'a> {
        qvalue: f64,
        value: &'a str,
    }

    let mut entries = Vec::new();

    if let Some(value) = default {
        entries.push(Entry { qvalue: 0.1, value });
    }

    for token in accept.split(',') {
        let (value, qvalue) = match token.split_once(';') {
            Some((value, params)) => {
                // Only a leading q parameter weighs the token.
                let qvalue = params
                    .split(';')
                    .next()
                    .and_then(|param| param.strip_prefix("q="))
                    .map_or(1.0, |q| q.trim().parse().unwrap_or(0.0));
                (value, qvalue)
            }
            None => (token, 1.0),
        };

        let qvalue = if (0.0..=1.0).contains(&qvalue) {
            qvalue
        } else {
            0.0
        };
        entries.push(Entry { qvalue, value });
    }

    // Stable sort: equal weights keep header order.
    entries.sort_by(|a, b| b.qvalue.partial_cmp(&a.qvalue).unwrap_or(Ordering::Equal));

    let mut list = Vec::new();
    for entry in entries.iter().filter(|entry| entry.qvalue > 0.0) {
        list.push(entry.value.trim().to_ascii_lowercase());
    }

    // Base languages follow, in the same sorted order.
    for entry in entries.iter().filter(|entry| entry.qvalue > 0.0) {
        if let Some(dash) = entry.value.find('-') {
            list.push(entry.value[..dash].trim().to_ascii_lowercase());
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qvalue_ordering() {
        assert_eq!(
            parse_accept_list("en-US,en;q=0.8,de;q=0.5", None),
            ["en-us", "en", "de", "en"]
        );
    }

    #[test]
    fn full_tokens_before_base_languages() {
        assert_eq!(
            parse_accept_list("en-US,en;q=0.8,de-DE;q=0.5", None),
            ["en-us", "en", "de-de", "en", "de"]
        );
    }

    #[test]
    fn default_joins_at_low_weight() {
        assert_eq!(
            parse_accept_list("fr;q=0.05,en", Some("pt-BR")),
            ["en", "pt-br", "fr", "pt"]
        );
    }

    #[test]
    fn stable_for_equal_weights() {
        assert_eq!(
            parse_accept_list("aa;q=0.5,bb;q=0.5,cc;q=0.5", None),
            ["aa", "bb", "cc"]
        );
    }

    #[test]
    fn zero_and_out_of_range_dropped() {
        assert_eq!(parse_accept_list("aa;q=0,bb;q=-1,cc;q=1.5,dd", None), ["dd"]);
        assert_eq!(parse_accept_list("aa;q=junk,bb", None), ["bb"]);
    }

    #[test]
    fn whitespace_and_case_normalized() {
        assert_eq!(
            parse_accept_list(" en-US , DE ;q=0.7", None),
            ["en-us", "de", "en"]
        );
    }

    #[test]
    fn duplicates_kept() {
        assert_eq!(parse_accept_list("en,en", None), ["en", "en"]);
    }
}
