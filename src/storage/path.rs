//! Reference → vetted path segments.
//!
//! Decoding, canonical-form enforcement (the 301 signal), and the rules
//! that keep request paths from naming anything the storage should never
//! touch: dot segments, separator smuggling, control characters, ignored
//! files.

use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::error::StorageError;
use crate::options::OnDirectory;

use super::Reference;

/// Canonical percent-encoding for one path segment. Everything that would
/// change how the path re-parses, plus controls and space; non-ASCII is
/// always encoded.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'*')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Decoded, validated path segments with the leading sentinel stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub segments: Vec<String>,
    /// The reference named a directory to be listed.
    pub directory_intent: bool,
    /// Original reference rendering, carried for errors and logs.
    pub reference: String,
}

impl PathParts {
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Join onto `root` with OS-specific separators. Segments cannot
    /// contain separators or drive designators; vetting rejected those.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

/// Parsing configuration, borrowed from the storage options.
#[derive(Clone, Copy)]
pub struct PathPolicy<'a> {
    pub ignore: Option<&'a Regex>,
    pub on_directory: OnDirectory,
}

pub fn parse_reference(reference: &Reference, policy: &PathPolicy) -> Result<PathParts, StorageError> {
    let rendered = reference.display();

    let decoded = match reference {
        Reference::Path(raw) => decode_path(raw, &rendered)?,
        Reference::Parts(parts) => check_parts(parts, &rendered)?,
    };

    vet(decoded, rendered, policy)
}

/// Decode a percent-encoded absolute path and require it to already be in
/// canonical form: dot segments resolved and the minimal encoding used.
fn decode_path(raw: &str, rendered: &str) -> Result<Vec<String>, StorageError> {
    if !raw.starts_with('/') {
        return Err(StorageError::MalformedPath {
            reference: rendered.to_owned(),
            message: "path must be absolute".to_owned(),
        });
    }

    let mut decoded = Vec::new();

    for segment in raw[1..].split('/') {
        match percent_decode_str(segment).decode_utf8() {
            Ok(segment) => decoded.push(segment.into_owned()),
            Err(err) => {
                return Err(StorageError::MalformedPath {
                    reference: rendered.to_owned(),
                    message: format!("invalid percent-encoding: {err}"),
                })
            }
        }
    }

    // resolve dot segments, clamped at the root
    let mut resolved: Vec<&str> = Vec::with_capacity(decoded.len());
    for segment in &decoded {
        match segment.as_str() {
            "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    let mut canonical = String::with_capacity(raw.len());
    for segment in &resolved {
        canonical.push('/');
        canonical.extend(utf8_percent_encode(segment, SEGMENT));
    }
    if canonical.is_empty() {
        canonical.push('/');
    }

    if canonical != raw {
        log::trace!("non-canonical reference {rendered:?}, canonical form is {canonical:?}");
        return Err(StorageError::NotNormalized {
            reference: rendered.to_owned(),
            normalized: canonical,
        });
    }

    Ok(decoded)
}

/// Structural checks for the pre-decoded array form.
fn check_parts(parts: &[String], rendered: &str) -> Result<Vec<String>, StorageError> {
    let invalid = || StorageError::InvalidPath {
        reference: rendered.to_owned(),
        parts: parts.to_vec(),
    };

    match parts.first() {
        Some(first) if first.is_empty() => {}
        _ => return Err(invalid()),
    }

    if parts[1..].iter().any(|p| p == "." || p == "..") {
        return Err(invalid());
    }

    Ok(parts[1..].to_vec())
}

/// Shared validation over decoded segments.
fn vet(mut decoded: Vec<String>, reference: String, policy: &PathPolicy) -> Result<PathParts, StorageError> {
    let trailing = decoded.last().is_some_and(String::is_empty);
    let body_len = decoded.len() - trailing as usize;

    if decoded[..body_len].iter().any(String::is_empty) {
        return Err(StorageError::ConsecutiveSlashes {
            reference,
            parts: decoded,
        });
    }

    let forbidden = decoded[..body_len].iter().find(|s| s.chars().any(forbidden_char)).cloned();
    if let Some(segment) = forbidden {
        log::warn!("rejecting path segment {segment:?} with forbidden character");
        return Err(StorageError::ForbiddenCharacter {
            reference,
            segment,
            parts: decoded,
        });
    }

    if let Some(ignore) = policy.ignore {
        let ignored = decoded[..body_len].iter().find(|s| ignore.is_match(s)).cloned();
        if let Some(segment) = ignored {
            log::trace!("rejecting ignored path segment {segment:?}");
            return Err(StorageError::IgnoredFile {
                reference,
                segment,
                parts: decoded,
            });
        }
    }

    if trailing {
        decoded.pop();
    }

    let mut directory_intent = false;

    if trailing {
        match policy.on_directory {
            OnDirectory::Reject => {
                return Err(StorageError::TrailingSlash {
                    reference,
                    untrailed_parts: decoded,
                })
            }
            OnDirectory::ListFiles => directory_intent = true,
            OnDirectory::ServeIndex => decoded.push("index.html".to_owned()),
        }
    }

    Ok(PathParts {
        segments: decoded,
        directory_intent,
        reference,
    })
}

/// The characters no segment may contain: separators and globbing
/// metacharacters for every supported platform, plus C0/C1 controls.
pub(crate) fn forbidden_char(c: char) -> bool {
    matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"')
        || ('\u{0000}'..='\u{001f}').contains(&c)
        || ('\u{0080}'..='\u{009f}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageErrorKind;
    use crate::options::default_ignore_pattern;

    fn policy(ignore: Option<&Regex>, on_directory: OnDirectory) -> PathPolicy<'_> {
        PathPolicy { ignore, on_directory }
    }

    fn parse(path: &str) -> Result<PathParts, StorageError> {
        let ignore = default_ignore_pattern();
        parse_reference(&Reference::from(path), &policy(Some(&ignore), OnDirectory::Reject))
    }

    fn kind(path: &str) -> StorageErrorKind {
        parse(path).unwrap_err().kind()
    }

    #[test]
    fn plain_paths() {
        assert_eq!(parse("/hello.txt").unwrap().segments, ["hello.txt"]);
        assert_eq!(parse("/a/b/c.json").unwrap().segments, ["a", "b", "c.json"]);
    }

    #[test]
    fn percent_decoding_roundtrip() {
        assert_eq!(parse("/with%20space.txt").unwrap().segments, ["with space.txt"]);
        assert_eq!(parse("/caf%C3%A9").unwrap().segments, ["café"]);
    }

    #[test]
    fn relative_references_are_malformed() {
        assert_eq!(kind("hello.txt"), StorageErrorKind::MalformedPath);
        assert_eq!(kind(""), StorageErrorKind::MalformedPath);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        assert_eq!(kind("/%ff"), StorageErrorKind::MalformedPath);
    }

    #[test]
    fn dot_segments_redirect_to_canonical() {
        match parse("/users/../../etc/passwd").unwrap_err() {
            StorageError::NotNormalized { normalized, .. } => assert_eq!(normalized, "/etc/passwd"),
            other => panic!("expected NotNormalized, got {other:?}"),
        }

        match parse("/a/./b").unwrap_err() {
            StorageError::NotNormalized { normalized, .. } => assert_eq!(normalized, "/a/b"),
            other => panic!("expected NotNormalized, got {other:?}"),
        }
    }

    #[test]
    fn overencoded_paths_redirect_to_canonical() {
        match parse("/todo%40txt").unwrap_err() {
            StorageError::NotNormalized { normalized, .. } => assert_eq!(normalized, "/todo@txt"),
            other => panic!("expected NotNormalized, got {other:?}"),
        }
    }

    #[test]
    fn consecutive_slashes() {
        assert_eq!(kind("//todo@txt"), StorageErrorKind::ConsecutiveSlashes);
        assert_eq!(kind("/a//b"), StorageErrorKind::ConsecutiveSlashes);
    }

    #[test]
    fn forbidden_characters() {
        assert_eq!(kind("/a%2Fb"), StorageErrorKind::ForbiddenCharacter);
        assert_eq!(kind("/c%3Adrive"), StorageErrorKind::ForbiddenCharacter);
        assert_eq!(kind("/nul%00"), StorageErrorKind::ForbiddenCharacter);
        assert_eq!(kind("/back%5Cslash"), StorageErrorKind::ForbiddenCharacter);
    }

    #[test]
    fn ignored_segments() {
        assert_eq!(kind("/.hidden"), StorageErrorKind::IgnoredFile);
        assert_eq!(kind("/a/.git/config"), StorageErrorKind::IgnoredFile);

        let parts = parse_reference(
            &Reference::from("/.hidden"),
            &policy(None, OnDirectory::Reject),
        );
        assert_eq!(parts.unwrap().segments, [".hidden"]);
    }

    #[test]
    fn trailing_slash_modes() {
        assert_eq!(kind("/dir/"), StorageErrorKind::TrailingSlash);

        let ignore = default_ignore_pattern();

        let listed = parse_reference(
            &Reference::from("/dir/"),
            &policy(Some(&ignore), OnDirectory::ListFiles),
        )
        .unwrap();
        assert_eq!(listed.segments, ["dir"]);
        assert!(listed.directory_intent);

        let indexed = parse_reference(
            &Reference::from("/dir/"),
            &policy(Some(&ignore), OnDirectory::ServeIndex),
        )
        .unwrap();
        assert_eq!(indexed.segments, ["dir", "index.html"]);
        assert!(!indexed.directory_intent);
    }

    #[test]
    fn root_reference() {
        let ignore = default_ignore_pattern();

        let listed = parse_reference(
            &Reference::from("/"),
            &policy(Some(&ignore), OnDirectory::ListFiles),
        )
        .unwrap();
        assert!(listed.segments.is_empty());
        assert!(listed.directory_intent);
    }

    #[test]
    fn parts_form() {
        let ok = parse_reference(
            &Reference::Parts(vec![String::new(), "a".into(), "b.txt".into()]),
            &policy(None, OnDirectory::Reject),
        )
        .unwrap();
        assert_eq!(ok.segments, ["a", "b.txt"]);

        let missing_sentinel = parse_reference(
            &Reference::Parts(vec!["a".into()]),
            &policy(None, OnDirectory::Reject),
        );
        assert_eq!(missing_sentinel.unwrap_err().kind(), StorageErrorKind::InvalidPath);

        let dotted = parse_reference(
            &Reference::Parts(vec![String::new(), "..".into(), "etc".into()]),
            &policy(None, OnDirectory::Reject),
        );
        assert_eq!(dotted.unwrap_err().kind(), StorageErrorKind::InvalidPath);
    }

    #[test]
    fn resolve_joins_under_root() {
        let parts = parse("/a/b.txt").unwrap();
        let resolved = parts.resolve(Path::new("/srv/www"));
        assert_eq!(resolved, Path::new("/srv/www").join("a").join("b.txt"));
    }
}
