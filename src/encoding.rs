//! Precompressed-variant negotiation.
//!
//! A mapping pairs a path matcher with an ordered list of encodings and the
//! substitution that derives each variant's on-disk path, e.g.
//! `^(.*\.json)$` with `br → $1.br, gzip → $1.gz`. Negotiation filters the
//! list by the client's `Accept-Encoding` weights and yields candidates in
//! preference order; the storage probes them until one opens.

use regex::{Captures, Regex};
use smallvec::SmallVec;

use crate::headers::accept_encoding::{AcceptEncoding, IDENTITY};

/// One configured encoding with its variant-path substitution.
#[derive(Debug, Clone)]
pub struct EncodingPreference {
    pub name: String,
    pub replacement: String,
    order: usize,
}

impl EncodingPreference {
    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY
    }
}

/// A matcher-driven map from resolved paths to encoded variant paths.
#[derive(Debug, Clone)]
pub struct EncodingMapping {
    matcher: Regex,
    preferences: Vec<EncodingPreference>,
}

impl EncodingMapping {
    /// `encodings` is the declared preference order; lower index is
    /// preferred. If `identity` is absent it is appended as a last-resort
    /// candidate whose variant path is the resolved path itself.
    pub fn new(
        matcher: Regex,
        encodings: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut preferences: Vec<EncodingPreference> = encodings
            .into_iter()
            .enumerate()
            .map(|(order, (name, replacement))| EncodingPreference {
                name: name.into().to_ascii_lowercase(),
                replacement: replacement.into(),
                order,
            })
            .collect();

        if !preferences.iter().any(|p| p.is_identity()) {
            preferences.push(EncodingPreference {
                name: IDENTITY.to_owned(),
                replacement: "$&".to_owned(),
                order: preferences.len(),
            });
        }

        EncodingMapping { matcher, preferences }
    }

    pub fn matches(&self, resolved_path: &str) -> bool {
        self.matcher.is_match(resolved_path)
    }

    /// Candidates the client accepts, in declared order. The q-value gates
    /// acceptability (`q=0` and unlisted codings drop out); among what
    /// remains the configured order is the preference.
    pub fn candidates(&self, accepts: &AcceptEncoding) -> SmallVec<[&EncodingPreference; 4]> {
        self.preferences.iter().filter(|pref| accepts.accepts(&pref.name)).collect()
    }

    /// Derive the variant path for one candidate by applying its
    /// substitution to the first match of the matcher.
    pub fn encoded_path(&self, resolved_path: &str, pref: &EncodingPreference) -> String {
        let Some(caps) = self.matcher.captures(resolved_path) else {
            return resolved_path.to_owned();
        };

        let whole = caps.get(0).expect("capture group 0 always present");

        let mut out = String::with_capacity(resolved_path.len() + 8);
        out.push_str(&resolved_path[..whole.start()]);
        expand_replacement(&caps, &pref.replacement, &mut out);
        out.push_str(&resolved_path[whole.end()..]);
        out
    }
}

/// Expand a substitution pattern against a set of captures.
///
/// Supports `$N` (two digits preferred when that group exists), `${N}`,
/// `${name}`, `$&` for the whole match, and `$$` for a literal dollar.
/// Unknown groups expand to nothing; a trailing lone `$` stays literal.
pub(crate) fn expand_replacement(caps: &Captures, replacement: &str, out: &mut String) {
    let mut rest = replacement;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        rest = &rest[dollar + 1..];

        let mut chars = rest.chars();
        match chars.next() {
            Some('$') => {
                out.push('$');
                rest = &rest[1..];
            }
            Some('&') => {
                out.push_str(caps.get(0).map_or("", |m| m.as_str()));
                rest = &rest[1..];
            }
            Some('{') => match rest[1..].find('}') {
                Some(close) => {
                    let name = &rest[1..1 + close];
                    let group = match name.parse::<usize>() {
                        Ok(index) => caps.get(index),
                        Err(_) => caps.name(name),
                    };
                    out.push_str(group.map_or("", |m| m.as_str()));
                    rest = &rest[close + 2..];
                }
                None => out.push('$'),
            },
            Some(first @ '0'..='9') => {
                let second = chars.next().filter(char::is_ascii_digit);

                let one = first as usize - '0' as usize;
                let two = second.map(|d| one * 10 + (d as usize - '0' as usize));

                // prefer the two-digit group when it resolves
                if let Some(two) = two.filter(|&n| caps.get(n).is_some()) {
                    out.push_str(&caps[two]);
                    rest = &rest[2..];
                } else if caps.get(one).is_some() {
                    out.push_str(&caps[one]);
                    rest = &rest[1..];
                } else {
                    // no such group; keep the text literal
                    out.push('$');
                }
            }
            _ => out.push('$'),
        }
    }

    out.push_str(rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ACCEPT_ENCODING;
    use http::{HeaderMap, HeaderValue};

    fn json_mapping() -> EncodingMapping {
        EncodingMapping::new(
            Regex::new(r"^(.*\.json)$").unwrap(),
            [("br", "$1.br"), ("gzip", "$1.gz")],
        )
    }

    fn accepts(value: &str) -> AcceptEncoding {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
        AcceptEncoding::from_headers(&headers)
    }

    fn names(mapping: &EncodingMapping, accept: &AcceptEncoding) -> Vec<String> {
        mapping.candidates(accept).iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn identity_is_synthesized_last() {
        let mapping = json_mapping();
        assert_eq!(names(&mapping, &accepts("br, gzip, identity")), ["br", "gzip", "identity"]);
    }

    #[test]
    fn unacceptable_candidates_are_dropped() {
        let mapping = json_mapping();
        assert_eq!(names(&mapping, &accepts("gzip, deflate, identity")), ["gzip", "identity"]);
        assert_eq!(names(&mapping, &accepts("deflate, identity")), ["identity"]);
    }

    #[test]
    fn low_qvalues_still_rank_by_declared_order() {
        let mapping = json_mapping();
        assert_eq!(names(&mapping, &accepts("br;q=0.5, gzip;q=0.9")), ["br", "gzip", "identity"]);
    }

    #[test]
    fn forbidden_identity_leaves_variants_only() {
        let mapping = json_mapping();
        assert_eq!(names(&mapping, &accepts("gzip, identity;q=0")), ["gzip"]);
        assert!(names(&mapping, &accepts("identity;q=0, *;q=0")).is_empty());
    }

    #[test]
    fn variant_path_substitution() {
        let mapping = json_mapping();

        let candidates = mapping.candidates(&accepts("gzip"));
        assert_eq!(mapping.encoded_path("/srv/gzip.json", candidates[0]), "/srv/gzip.json.gz");

        let candidates = mapping.candidates(&accepts("deflate"));
        assert_eq!(mapping.encoded_path("/srv/gzip.json", candidates[0]), "/srv/gzip.json");
    }

    #[test]
    fn replacement_grammar() {
        let re = Regex::new(r"(a+)(b+)").unwrap();
        let caps = re.captures("xaabby").unwrap();

        let expand = |pattern: &str| {
            let mut out = String::new();
            expand_replacement(&caps, pattern, &mut out);
            out
        };

        assert_eq!(expand("$1-$2"), "aa-bb");
        assert_eq!(expand("${1}z"), "aaz");
        assert_eq!(expand("$&!"), "aabb!");
        assert_eq!(expand("$$1"), "$1");
        assert_eq!(expand("$9"), "$9");
        assert_eq!(expand("tail$"), "tail$");
    }
}
