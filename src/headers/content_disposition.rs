use http::HeaderValue;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::options::DispositionType;

/// Everything outside RFC 8187 `attr-char` is percent-encoded in the
/// `filename*` parameter.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Build a `Content-Disposition` value per RFC 6266.
///
/// ASCII filenames go into a quoted string; anything else additionally gets
/// the UTF-8 `filename*` parameter with an ASCII-lossy fallback in
/// `filename` for legacy agents.
///
/// Returns `None` when the filename cannot form a valid header value.
/// Vetted storage names never hit this, but a per-request filename override
/// is an arbitrary caller string and may carry control bytes; the header is
/// dropped rather than the response failing.
pub fn content_disposition(kind: DispositionType, filename: Option<&str>) -> Option<HeaderValue> {
    let Some(filename) = filename else {
        return Some(HeaderValue::from_static(match kind {
            DispositionType::Inline => "inline",
            DispositionType::Attachment => "attachment",
        }));
    };

    let value = if filename.is_ascii() {
        format!("{}; filename=\"{}\"", kind.as_str(), quote(filename))
    } else {
        let fallback: String = filename.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect();

        format!(
            "{}; filename=\"{}\"; filename*=UTF-8''{}",
            kind.as_str(),
            quote(&fallback),
            utf8_percent_encode(filename, ATTR_CHAR),
        )
    };

    HeaderValue::from_str(&value).ok()
}

/// Quoted-string escaping: backslash before `"` and `\`.
fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for c in name.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_type() {
        assert_eq!(content_disposition(DispositionType::Inline, None).unwrap(), "inline");
        assert_eq!(
            content_disposition(DispositionType::Attachment, None).unwrap(),
            "attachment"
        );
    }

    #[test]
    fn plain_ascii() {
        assert_eq!(
            content_disposition(DispositionType::Inline, Some("hello.txt")).unwrap(),
            "inline; filename=\"hello.txt\""
        );
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(
            content_disposition(DispositionType::Attachment, Some("a\"b\\c.txt")).unwrap(),
            "attachment; filename=\"a\\\"b\\\\c.txt\""
        );
    }

    #[test]
    fn non_ascii_gets_extended_parameter() {
        let value = content_disposition(DispositionType::Inline, Some("naïve.txt")).unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "inline; filename=\"na?ve.txt\"; filename*=UTF-8''na%C3%AFve.txt"
        );
    }

    #[test]
    fn control_bytes_yield_no_header() {
        assert_eq!(content_disposition(DispositionType::Inline, Some("a\r\nb.txt")), None);
        assert_eq!(content_disposition(DispositionType::Attachment, Some("nul\u{0}")), None);
    }
}
