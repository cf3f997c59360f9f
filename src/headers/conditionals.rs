use std::time::SystemTime;

use headers::{HeaderMapExt, IfModifiedSince, IfUnmodifiedSince};
use http::{HeaderMap, Method, StatusCode};

use super::entity_tag::{EntityTag, IfMatch, IfNoneMatch, IfRange};
use super::truncate_to_secs;

/// The precondition headers of one request, parsed once.
#[derive(Debug, Default)]
pub struct Conditionals {
    if_match: Option<IfMatch>,
    if_none_match: Option<IfNoneMatch>,
    if_modified_since: Option<IfModifiedSince>,
    if_unmodified_since: Option<IfUnmodifiedSince>,
    if_range: Option<IfRange>,
}

/// Outcome of precondition evaluation.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Respond with this status and no body (304 or 412).
    NoBody(StatusCode),
    /// Serve content; `use_range` is false when `If-Range` invalidated the
    /// `Range` header.
    WithBody { use_range: bool },
}

impl Conditionals {
    pub fn new(headers: &HeaderMap) -> Conditionals {
        Conditionals {
            if_match: headers.typed_get(),
            if_none_match: headers.typed_get(),
            if_modified_since: headers.typed_get(),
            if_unmodified_since: headers.typed_get(),
            if_range: headers.typed_get(),
        }
    }

    /// Evaluate in RFC 9110 §13.2.2 order. A missing validator makes the
    /// preconditions that need it pass automatically.
    pub fn check(&self, method: &Method, etag: Option<&EntityTag>, mtime: Option<SystemTime>) -> Verdict {
        let mtime = mtime.map(truncate_to_secs);
        let get_or_head = method == Method::GET || method == Method::HEAD;

        if let (Some(if_match), Some(etag)) = (&self.if_match, etag) {
            log::trace!("if-match? {if_match:?} vs {etag}");

            if !if_match.precondition_passes(Some(etag)) {
                return Verdict::NoBody(StatusCode::PRECONDITION_FAILED);
            }
        }

        if let (Some(since), Some(mtime)) = (&self.if_unmodified_since, mtime) {
            log::trace!("if-unmodified-since? {since:?} vs {mtime:?}");

            if !since.precondition_passes(mtime) {
                return Verdict::NoBody(StatusCode::PRECONDITION_FAILED);
            }
        }

        if let Some(if_none_match) = &self.if_none_match {
            log::trace!("if-none-match? {if_none_match:?} vs {etag:?}");

            if if_none_match.matches(etag) {
                return Verdict::NoBody(if get_or_head {
                    StatusCode::NOT_MODIFIED
                } else {
                    StatusCode::PRECONDITION_FAILED
                });
            }
        } else if let (Some(since), Some(mtime)) = (&self.if_modified_since, mtime) {
            log::trace!("if-modified-since? {since:?} vs {mtime:?}");

            if get_or_head && !since.is_modified(mtime) {
                return Verdict::NoBody(StatusCode::NOT_MODIFIED);
            }
        }

        Verdict::WithBody {
            use_range: self.range_still_applies(etag, mtime),
        }
    }

    /// RFC 9110 §13.1.5: an `If-Range` that does not identify the current
    /// representation silently drops the `Range` header.
    fn range_still_applies(&self, etag: Option<&EntityTag>, mtime: Option<SystemTime>) -> bool {
        match &self.if_range {
            None => true,
            Some(IfRange::Tag(tag)) => match etag {
                Some(current) => tag.strong_eq(current),
                None => false,
            },
            Some(IfRange::Date(date)) => match mtime {
                Some(mtime) => truncate_to_secs(*date) == mtime,
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::*;
    use http::HeaderValue;
    use std::time::{Duration, UNIX_EPOCH};

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn etag() -> EntityTag {
        EntityTag::strong("5-1a2b3c-identity").unwrap()
    }

    const MTIME_SECS: u64 = 1_700_000_000;

    fn mtime() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(MTIME_SECS * 1000 + 123)
    }

    fn date(secs: u64) -> String {
        httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn no_preconditions_serve() {
        let cond = Conditionals::new(&HeaderMap::new());
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::WithBody { use_range: true }
        );
    }

    #[test]
    fn if_none_match_hit_is_304_for_get() {
        let cond = Conditionals::new(&headers(&[(IF_NONE_MATCH, "\"5-1a2b3c-identity\"")]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::NoBody(StatusCode::NOT_MODIFIED)
        );
    }

    #[test]
    fn if_none_match_hit_is_412_for_other_methods() {
        let cond = Conditionals::new(&headers(&[(IF_NONE_MATCH, "*")]));
        assert_eq!(
            cond.check(&Method::POST, Some(&etag()), Some(mtime())),
            Verdict::NoBody(StatusCode::PRECONDITION_FAILED)
        );
    }

    #[test]
    fn if_match_miss_is_412() {
        let cond = Conditionals::new(&headers(&[(IF_MATCH, "\"other\"")]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::NoBody(StatusCode::PRECONDITION_FAILED)
        );
    }

    #[test]
    fn missing_etag_passes_if_match() {
        let cond = Conditionals::new(&headers(&[(IF_MATCH, "\"other\"")]));
        assert_eq!(
            cond.check(&Method::GET, None, Some(mtime())),
            Verdict::WithBody { use_range: true }
        );
    }

    #[test]
    fn if_modified_since_equal_second_is_304() {
        let cond = Conditionals::new(&headers(&[(IF_MODIFIED_SINCE, &date(MTIME_SECS))]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::NoBody(StatusCode::NOT_MODIFIED)
        );
    }

    #[test]
    fn if_modified_since_older_header_serves() {
        let cond = Conditionals::new(&headers(&[(IF_MODIFIED_SINCE, &date(MTIME_SECS - 60))]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::WithBody { use_range: true }
        );
    }

    #[test]
    fn if_none_match_shadows_if_modified_since() {
        let cond = Conditionals::new(&headers(&[
            (IF_NONE_MATCH, "\"mismatch\""),
            (IF_MODIFIED_SINCE, &date(MTIME_SECS)),
        ]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::WithBody { use_range: true }
        );
    }

    #[test]
    fn if_unmodified_since_earlier_is_412() {
        let cond = Conditionals::new(&headers(&[(IF_UNMODIFIED_SINCE, &date(MTIME_SECS - 60))]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::NoBody(StatusCode::PRECONDITION_FAILED)
        );
    }

    #[test]
    fn if_range_tag_mismatch_drops_range() {
        let cond = Conditionals::new(&headers(&[(IF_RANGE, "\"stale\"")]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::WithBody { use_range: false }
        );
    }

    #[test]
    fn if_range_matching_date_keeps_range() {
        let cond = Conditionals::new(&headers(&[(IF_RANGE, &date(MTIME_SECS))]));
        assert_eq!(
            cond.check(&Method::GET, Some(&etag()), Some(mtime())),
            Verdict::WithBody { use_range: true }
        );
    }

    #[test]
    fn if_range_weak_tag_never_matches() {
        let weak = EntityTag::weak("5-1a2b3c-identity").unwrap();
        let cond = Conditionals::new(&headers(&[(IF_RANGE, "W/\"5-1a2b3c-identity\"")]));
        assert_eq!(
            cond.check(&Method::GET, Some(&weak), Some(mtime())),
            Verdict::WithBody { use_range: false }
        );
    }
}
