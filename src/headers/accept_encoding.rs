use core::fmt;

use http::header::ACCEPT_ENCODING;
use http::HeaderMap;
use smallvec::SmallVec;

/// The no-transformation coding label.
pub const IDENTITY: &str = "identity";

/// Parsed `Accept-Encoding` header: an ordered list of `(token, q)` pairs
/// plus the wildcard weight, if any.
///
/// Tokens are stored lowercased with the legacy aliases folded in
/// (`x-gzip` → `gzip`, `x-compress` → `compress`). A missing or empty header
/// parses to the empty list, under which only `identity` is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct AcceptEncoding {
    entries: SmallVec<[AcceptEntry; 4]>,
    wildcard: Option<QValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AcceptEntry {
    token: String,
    q: QValue,
}

fn canonical_token(token: &str) -> String {
    let token = token.to_ascii_lowercase();

    match token.as_str() {
        "x-gzip" => "gzip".to_owned(),
        "x-compress" => "compress".to_owned(),
        _ => token,
    }
}

impl AcceptEncoding {
    pub fn from_headers(headers: &HeaderMap) -> AcceptEncoding {
        let mut encodings = AcceptEncoding::default();

        let values = headers.get_all(ACCEPT_ENCODING).iter();

        for value in values.filter_map(|hval| hval.to_str().ok()).flat_map(|s| s.split(',')) {
            let mut v = value.splitn(2, ';');

            let token = match v.next().map(str::trim) {
                Some(token) if !token.is_empty() => token,
                _ => continue,
            };

            let q = match v.next() {
                Some(qval) => match QValue::parse(qval.trim()) {
                    Some(q) => q,
                    None => continue, // ignore unparseable member
                },
                None => QValue::one(),
            };

            if token == "*" {
                // first wildcard wins
                encodings.wildcard.get_or_insert(q);
            } else {
                encodings.entries.push(AcceptEntry {
                    token: canonical_token(token),
                    q,
                });
            }
        }

        encodings
    }

    /// The effective weight for a coding: its explicit entry if listed,
    /// the wildcard otherwise, and for `identity` a default of 1 when
    /// neither forbids it.
    pub fn qvalue(&self, name: &str) -> QValue {
        if let Some(entry) = self.entries.iter().find(|e| e.token == name) {
            return entry.q;
        }

        if let Some(q) = self.wildcard {
            return q;
        }

        if name == IDENTITY {
            QValue::one()
        } else {
            QValue::zero()
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.qvalue(name).is_acceptable()
    }
}

/// RFC 9110 quality value, stored in thousandths (0 ..= 1000).
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[must_use]
#[repr(transparent)]
pub struct QValue(u16);

impl QValue {
    pub const fn new(value: u16) -> Option<Self> {
        if value <= 1000 {
            Some(Self(value))
        } else {
            None
        }
    }

    #[inline]
    pub const fn one() -> Self {
        Self(1000)
    }

    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn is_acceptable(self) -> bool {
        self.0 > 0
    }

    /// Parse a `q=…` parameter per RFC 9110 §12.4.2: a leading `0` or `1`,
    /// an optional decimal point, and at most three fractional digits.
    pub fn parse(s: &str) -> Option<Self> {
        let mut c = s.chars();

        match c.next() {
            Some('q' | 'Q') => (),
            _ => return None,
        }
        match c.next() {
            Some('=') => (),
            _ => return None,
        }

        let mut value = match c.next() {
            Some('0') => 0,
            Some('1') => 1000,
            _ => return None,
        };

        match c.next() {
            Some('.') => (),
            None => return Some(Self(value)),
            _ => return None,
        }

        let mut factor = 100;
        loop {
            match c.next() {
                Some(n @ '0'..='9') => {
                    if factor < 1 {
                        return None; // more than 3 fractional digits
                    }
                    value += factor * (n as u16 - '0' as u16);
                }
                None => {
                    return if value <= 1000 { Some(Self(value)) } else { None };
                }
                _ => return None,
            }
            factor /= 10;
        }
    }
}

impl fmt::Display for QValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1000 {
            f.write_str("1")
        } else {
            write!(f, "0.{:03}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn ae(value: &str) -> AcceptEncoding {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
        AcceptEncoding::from_headers(&headers)
    }

    #[test]
    fn qvalue_grammar() {
        assert_eq!(QValue::parse("q=1"), Some(QValue(1000)));
        assert_eq!(QValue::parse("q=1.000"), Some(QValue(1000)));
        assert_eq!(QValue::parse("Q=0.5"), Some(QValue(500)));
        assert_eq!(QValue::parse("q=0.001"), Some(QValue(1)));
        assert_eq!(QValue::parse("q=0."), Some(QValue(0)));
        assert_eq!(QValue::parse("q=1.001"), None);
        assert_eq!(QValue::parse("q=2"), None);
        assert_eq!(QValue::parse("q=0.0001"), None);
        assert_eq!(QValue::parse("0.5"), None);
    }

    #[test]
    fn missing_header_is_identity_only() {
        let encodings = AcceptEncoding::from_headers(&HeaderMap::new());
        assert_eq!(encodings.qvalue(IDENTITY), QValue::one());
        assert_eq!(encodings.qvalue("gzip"), QValue::zero());
    }

    #[test]
    fn aliases_fold() {
        let encodings = ae("x-gzip;q=0.8, x-compress");
        assert_eq!(encodings.qvalue("gzip"), QValue(800));
        assert_eq!(encodings.qvalue("compress"), QValue::one());
    }

    #[test]
    fn wildcard_covers_unlisted() {
        let encodings = ae("gzip;q=0.1, *;q=0.5");
        assert_eq!(encodings.qvalue("gzip"), QValue(100));
        assert_eq!(encodings.qvalue("br"), QValue(500));
        assert_eq!(encodings.qvalue(IDENTITY), QValue(500));
    }

    #[test]
    fn identity_defaults_on_unless_forbidden() {
        assert!(ae("gzip").accepts(IDENTITY));
        assert!(!ae("identity;q=0").accepts(IDENTITY));
        assert!(!ae("*;q=0").accepts(IDENTITY));
        assert!(ae("identity;q=0.2, *;q=0").accepts(IDENTITY));
    }

    #[test]
    fn garbage_members_are_skipped() {
        let encodings = ae("gzip;q=banana, br");
        assert_eq!(encodings.qvalue("gzip"), QValue::zero());
        assert_eq!(encodings.qvalue("br"), QValue::one());
    }
}
