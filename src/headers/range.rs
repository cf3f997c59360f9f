use http::header::RANGE;
use http::HeaderMap;
use smallvec::SmallVec;

/// One member of a `Range: bytes=…` set, as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `start-end`, both inclusive.
    FromTo(u64, u64),
    /// `start-`, to the end of the resource.
    From(u64),
    /// `-len`, the final `len` bytes.
    Suffix(u64),
}

pub type RangeSpecs = SmallVec<[RangeSpec; 2]>;

/// Parse the `Range` header into its raw members.
///
/// Returns `None` when the header is absent, uses a unit other than
/// `bytes`, or is syntactically broken anywhere: a bad set is ignored as a
/// whole and the request degrades to a full-content response.
pub fn parse_range(headers: &HeaderMap) -> Option<RangeSpecs> {
    let value = headers.get(RANGE)?.to_str().ok()?;

    let (unit, set) = value.split_once('=')?;

    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }

    let mut specs = RangeSpecs::new();

    for member in set.split(',') {
        specs.push(parse_member(member.trim())?);
    }

    if specs.is_empty() {
        return None;
    }

    Some(specs)
}

fn parse_member(member: &str) -> Option<RangeSpec> {
    if let Some(suffix) = member.strip_prefix('-') {
        return Some(RangeSpec::Suffix(parse_u64(suffix)?));
    }

    let (start, end) = member.split_once('-')?;
    let start = parse_u64(start)?;

    if end.is_empty() {
        return Some(RangeSpec::From(start));
    }

    Some(RangeSpec::FromTo(start, parse_u64(end)?))
}

fn parse_u64(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn parse(value: &str) -> Option<RangeSpecs> {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_str(value).unwrap());
        parse_range(&headers)
    }

    #[test]
    fn single_forms() {
        assert_eq!(parse("bytes=0-499").unwrap()[0], RangeSpec::FromTo(0, 499));
        assert_eq!(parse("bytes=500-").unwrap()[0], RangeSpec::From(500));
        assert_eq!(parse("bytes=-200").unwrap()[0], RangeSpec::Suffix(200));
    }

    #[test]
    fn multiple_members_keep_order() {
        let specs = parse("bytes=0-0, 2-2, -1").unwrap();
        assert_eq!(
            &specs[..],
            &[RangeSpec::FromTo(0, 0), RangeSpec::FromTo(2, 2), RangeSpec::Suffix(1)]
        );
    }

    #[test]
    fn other_units_are_ignored() {
        assert_eq!(parse("test=1-1"), None);
        assert_eq!(parse("items=0-4"), None);
    }

    #[test]
    fn syntax_errors_poison_the_whole_set() {
        assert_eq!(parse("bytes=0-1, x-2"), None);
        assert_eq!(parse("bytes=-"), None);
        assert_eq!(parse("bytes="), None);
        assert_eq!(parse("bytes=1-2-3"), None);
        assert_eq!(parse("bytes=1.5-2"), None);
        assert_eq!(parse("bytes"), None);
    }

    #[test]
    fn absent_header() {
        assert_eq!(parse_range(&HeaderMap::new()), None);
    }
}
