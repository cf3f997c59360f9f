use core::fmt::{self, Write};
use std::time::SystemTime;

use headers::Header;
use http::HeaderValue;

/// An HTTP entity tag, strong or weak.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct EntityTag {
    pub weak: bool,
    tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityTagError {
    InvalidFormat,
    NotAscii,
}

impl EntityTag {
    pub fn checked_new(weak: bool, tag: impl Into<String>) -> Result<Self, EntityTagError> {
        let tag = tag.into();

        if !tag.is_ascii() {
            return Err(EntityTagError::NotAscii);
        }

        // etagc (RFC 9110 §8.8.3) excludes DQUOTE and every control byte;
        // CR/LF in particular must never reach a header value
        if tag.bytes().any(|b| b == b'"' || b < 0x20 || b == 0x7f) {
            return Err(EntityTagError::InvalidFormat);
        }

        Ok(Self { weak, tag })
    }

    pub fn strong(tag: impl Into<String>) -> Result<Self, EntityTagError> {
        Self::checked_new(false, tag)
    }

    pub fn weak(tag: impl Into<String>) -> Result<Self, EntityTagError> {
        Self::checked_new(true, tag)
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Strong comparison per RFC 9110 §8.8.3.2: both tags strong and equal.
    #[must_use]
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: opacity only, weakness ignored.
    #[must_use]
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.tag == other.tag
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            f.write_str("W/")?;
        }

        f.write_char('"')?;
        f.write_str(&self.tag)?;
        f.write_char('"')
    }
}

impl core::str::FromStr for EntityTag {
    type Err = EntityTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let len = text.len();

        if !text.ends_with('"') || len < 2 {
            return Err(EntityTagError::InvalidFormat);
        }

        if text.starts_with('"') {
            EntityTag::strong(&text[1..len - 1])
        } else if len >= 4 && text.starts_with("W/\"") {
            EntityTag::weak(&text[3..len - 1])
        } else {
            Err(EntityTagError::InvalidFormat)
        }
    }
}

impl Header for EntityTag {
    fn name() -> &'static http::HeaderName {
        &http::header::ETAG
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::try_from(self.to_string()) {
            values.extend(Some(value));
        }
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .and_then(|hdr| hdr.to_str().ok())
            .and_then(|hdr| hdr.parse().ok())
            .ok_or_else(headers::Error::invalid)
    }
}

/// `If-Match` / `If-None-Match` value: either the wildcard or a tag list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagSet {
    Any,
    Tags(Vec<EntityTag>),
}

impl TagSet {
    fn parse<'i, I>(values: &mut I) -> Result<TagSet, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut tags = Vec::new();

        for value in values.filter_map(|hval| hval.to_str().ok()).flat_map(|s| s.split(',')) {
            let value = value.trim();

            if value == "*" {
                return Ok(TagSet::Any);
            }

            if value.is_empty() {
                continue;
            }

            tags.push(value.parse().map_err(|_| headers::Error::invalid())?);
        }

        Ok(TagSet::Tags(tags))
    }

    fn encode_into<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let text = match self {
            TagSet::Any => "*".to_owned(),
            TagSet::Tags(tags) => {
                let mut text = String::with_capacity(tags.len() * 16);
                for tag in tags {
                    if !text.is_empty() {
                        text.push_str(", ");
                    }
                    _ = write!(text, "{tag}");
                }
                text
            }
        };

        if let Ok(value) = HeaderValue::try_from(text) {
            values.extend(Some(value));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct IfMatch(pub TagSet);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct IfNoneMatch(pub TagSet);

impl IfMatch {
    /// Strong comparison against the current tag. A missing current tag
    /// passes vacuously; the caller decides whether the resource "exists".
    pub fn precondition_passes(&self, current: Option<&EntityTag>) -> bool {
        match (&self.0, current) {
            (TagSet::Any, _) => true,
            (TagSet::Tags(_), None) => true,
            (TagSet::Tags(tags), Some(current)) => tags.iter().any(|t| t.strong_eq(current)),
        }
    }
}

impl IfNoneMatch {
    /// Weak comparison against the current tag.
    pub fn matches(&self, current: Option<&EntityTag>) -> bool {
        match (&self.0, current) {
            (TagSet::Any, _) => true,
            (TagSet::Tags(_), None) => false,
            (TagSet::Tags(tags), Some(current)) => tags.iter().any(|t| t.weak_eq(current)),
        }
    }
}

impl Header for IfMatch {
    fn name() -> &'static http::HeaderName {
        &http::header::IF_MATCH
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        self.0.encode_into(values);
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        TagSet::parse(values).map(Self)
    }
}

impl Header for IfNoneMatch {
    fn name() -> &'static http::HeaderName {
        &http::header::IF_NONE_MATCH
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        self.0.encode_into(values);
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        TagSet::parse(values).map(Self)
    }
}

/// `If-Range` is either a single entity tag or an HTTP date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfRange {
    Tag(EntityTag),
    Date(SystemTime),
}

impl Header for IfRange {
    fn name() -> &'static http::HeaderName {
        &http::header::IF_RANGE
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = match self {
            IfRange::Tag(tag) => HeaderValue::try_from(tag.to_string()).ok(),
            IfRange::Date(date) => HeaderValue::try_from(httpdate::fmt_http_date(*date)).ok(),
        };

        values.extend(value);
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        let text = values
            .next()
            .and_then(|hdr| hdr.to_str().ok())
            .ok_or_else(headers::Error::invalid)?;

        let text = text.trim();

        if text.starts_with('"') || text.starts_with("W/\"") {
            return text.parse().map(IfRange::Tag).map_err(|_| headers::Error::invalid());
        }

        httpdate::parse_http_date(text).map(IfRange::Date).map_err(|_| headers::Error::invalid())
    }
}
