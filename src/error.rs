use std::io;
use std::path::PathBuf;

/// Why a storage reference could not be resolved into a servable resource.
///
/// Every variant carries the original reference; path-shaped variants also
/// carry whatever decoded segments were recovered before the rejection, so
/// callers can log or surface them out-of-band.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The reference could not be decoded into path segments at all.
    #[error("malformed path {reference:?}: {message}")]
    MalformedPath { reference: String, message: String },

    /// The reference decodes fine but is not in canonical form; the caller
    /// should redirect to `normalized`.
    #[error("path {reference:?} is not normalized ({normalized:?} is)")]
    NotNormalized { reference: String, normalized: String },

    /// A path-parts reference broke the structural rules (missing leading
    /// empty segment, or a `.`/`..` segment).
    #[error("invalid path reference {reference:?}")]
    InvalidPath { reference: String, parts: Vec<String> },

    /// An empty segment appeared somewhere other than the trailing position.
    #[error("consecutive slashes in {reference:?}")]
    ConsecutiveSlashes { reference: String, parts: Vec<String> },

    /// A decoded segment contained a character the storage refuses to map
    /// onto any backing name.
    #[error("forbidden character in segment {segment:?} of {reference:?}")]
    ForbiddenCharacter {
        reference: String,
        parts: Vec<String>,
        segment: String,
    },

    /// A segment matched the configured ignore pattern.
    #[error("ignored segment {segment:?} in {reference:?}")]
    IgnoredFile {
        reference: String,
        parts: Vec<String>,
        segment: String,
    },

    /// The reference ends with a slash and directory handling is disabled.
    #[error("unexpected trailing slash in {reference:?}")]
    TrailingSlash {
        reference: String,
        untrailed_parts: Vec<String>,
    },

    /// The resolved entry is a directory and cannot be served as one.
    #[error("{reference:?} resolves to a directory")]
    IsDirectory {
        reference: String,
        resolved_path: Option<PathBuf>,
    },

    /// Nothing acceptable exists at the resolved location.
    #[error("{reference:?} does not exist")]
    DoesNotExist {
        reference: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Any other storage failure.
    #[error("storage failure for {reference:?}")]
    Unknown {
        reference: String,
        #[source]
        source: io::Error,
    },
}

/// Discriminant-only view of [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    MalformedPath,
    NotNormalized,
    InvalidPath,
    ConsecutiveSlashes,
    ForbiddenCharacter,
    IgnoredFile,
    TrailingSlash,
    IsDirectory,
    DoesNotExist,
    Unknown,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::MalformedPath { .. } => StorageErrorKind::MalformedPath,
            StorageError::NotNormalized { .. } => StorageErrorKind::NotNormalized,
            StorageError::InvalidPath { .. } => StorageErrorKind::InvalidPath,
            StorageError::ConsecutiveSlashes { .. } => StorageErrorKind::ConsecutiveSlashes,
            StorageError::ForbiddenCharacter { .. } => StorageErrorKind::ForbiddenCharacter,
            StorageError::IgnoredFile { .. } => StorageErrorKind::IgnoredFile,
            StorageError::TrailingSlash { .. } => StorageErrorKind::TrailingSlash,
            StorageError::IsDirectory { .. } => StorageErrorKind::IsDirectory,
            StorageError::DoesNotExist { .. } => StorageErrorKind::DoesNotExist,
            StorageError::Unknown { .. } => StorageErrorKind::Unknown,
        }
    }

    /// The reference that produced this error, as given by the caller.
    pub fn reference(&self) -> &str {
        match self {
            StorageError::MalformedPath { reference, .. }
            | StorageError::NotNormalized { reference, .. }
            | StorageError::InvalidPath { reference, .. }
            | StorageError::ConsecutiveSlashes { reference, .. }
            | StorageError::ForbiddenCharacter { reference, .. }
            | StorageError::IgnoredFile { reference, .. }
            | StorageError::TrailingSlash { reference, .. }
            | StorageError::IsDirectory { reference, .. }
            | StorageError::DoesNotExist { reference, .. }
            | StorageError::Unknown { reference, .. } => reference,
        }
    }

    /// True for rejections produced while parsing the reference itself,
    /// before any backing store was consulted.
    pub fn is_path_rejection(&self) -> bool {
        !matches!(
            self.kind(),
            StorageErrorKind::IsDirectory | StorageErrorKind::DoesNotExist | StorageErrorKind::Unknown
        )
    }
}
