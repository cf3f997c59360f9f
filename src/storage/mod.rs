//! The storage seam: anything that can open a reference, describe it, and
//! stream its bytes can back a [`Streamer`](crate::Streamer).

use std::future::Future;
use std::time::SystemTime;

use http::HeaderMap;
use mime::Mime;

use crate::body::Body;
use crate::error::StorageError;
use crate::headers::accept_encoding::IDENTITY;
use crate::range::RangePlan;

pub mod fs;
pub mod listing;
pub mod path;

pub use path::PathParts;

/// Opaque input to [`Storage::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Percent-encoded absolute path, starting with `/`.
    Path(String),
    /// Already-decoded segments whose first element is the empty string
    /// modeling the leading `/`.
    Parts(Vec<String>),
}

impl Reference {
    /// Human-readable rendering for errors and logs.
    pub fn display(&self) -> String {
        match self {
            Reference::Path(path) => path.clone(),
            Reference::Parts(parts) => parts.join("/"),
        }
    }
}

impl From<&str> for Reference {
    fn from(path: &str) -> Self {
        Reference::Path(path.to_owned())
    }
}

impl From<String> for Reference {
    fn from(path: String) -> Self {
        Reference::Path(path)
    }
}

impl From<Vec<String>> for Reference {
    fn from(parts: Vec<String>) -> Self {
        Reference::Parts(parts)
    }
}

/// Everything the response planner needs to know about an opened resource.
///
/// Exclusively owned by one response from `open` until `close`; the
/// `attached` payload carries whatever live handles the storage acquired.
#[derive(Debug)]
pub struct StorageInfo<A> {
    /// Storage-specific payload.
    pub attached: A,
    /// Basis for `Content-Disposition` and MIME lookup.
    pub file_name: Option<String>,
    /// Modification time, if the store tracks one.
    pub mtime: Option<SystemTime>,
    /// Total byte length; `None` forces a chunked response without a
    /// `Content-Length`.
    pub size: Option<u64>,
    /// Extra `Vary` member to advertise (e.g. `Accept-Encoding`).
    pub vary: Option<String>,
    /// Content coding of the bytes this resource will produce.
    pub content_encoding: String,
    /// Media type override; consulted before any resolver.
    pub mime_type: Option<Mime>,
    pub mime_type_charset: Option<String>,
    /// Entity-tag override for stores with precomputed validators.
    pub etag: Option<String>,
}

impl<A> StorageInfo<A> {
    pub fn new(attached: A) -> Self {
        StorageInfo {
            attached,
            file_name: None,
            mtime: None,
            size: None,
            vary: None,
            content_encoding: IDENTITY.to_owned(),
            mime_type: None,
            mime_type_charset: None,
            etag: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.content_encoding == IDENTITY
    }

    /// Modification time in whole milliseconds since the epoch.
    pub fn mtime_ms(&self) -> Option<u64> {
        let mtime = self.mtime?;
        let since_epoch = mtime.duration_since(std::time::UNIX_EPOCH).ok()?;
        Some(since_epoch.as_millis() as u64)
    }
}

/// Abstract open / stream / close over a backing store.
pub trait Storage: Send + Sync {
    /// Payload kept inside [`StorageInfo::attached`].
    type Attached: Send;

    /// Resolve a reference into an opened resource, or fail with a tagged
    /// error. Any handle acquired along a failure path must be released
    /// before the error propagates.
    fn open(
        &self,
        reference: &Reference,
        headers: &HeaderMap,
    ) -> impl Future<Output = Result<StorageInfo<Self::Attached>, StorageError>> + Send;

    /// Build the response body for `plan`, transferring the backing handle
    /// out of `info` and into the returned stream. At most one stream may
    /// be created per opened info; the stream releases the handle when it
    /// ends, errors, or is dropped.
    fn read_stream(&self, info: &mut StorageInfo<Self::Attached>, plan: RangePlan) -> Body;

    /// Idempotent release of whatever `open` acquired and `read_stream`
    /// has not already consumed.
    fn close(&self, info: &mut StorageInfo<Self::Attached>) -> impl Future<Output = ()> + Send;

    /// Optional filename → media type capability.
    fn mime_type_lookup(&self, file_name: &str) -> Option<Mime> {
        let _ = file_name;
        None
    }
}
