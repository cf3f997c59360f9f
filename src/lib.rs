//! Streaming static-content response planning.
//!
//! Given an opaque reference (typically a percent-encoded request path) and
//! the incoming request headers, [`Streamer::prepare_response`] produces a
//! fully-formed response descriptor: status code, headers, and a lazy byte
//! stream, ready to hand to any HTTP/1.1, HTTP/2, or HTTP/3 sink.
//!
//! The crate is split along three seams:
//!
//! *   **Path parsing & safety** — references are decoded, normalized and
//!     vetted before they ever touch a file system ([`storage`]).
//! *   **Precompression negotiation** — `Accept-Encoding` is matched against
//!     configured on-disk variants such as `foo.js.br` ([`encoding`]).
//! *   **Response planning** — conditional-GET evaluation, `Range` parsing,
//!     multipart/byteranges framing, and header assembly ([`serve`]).
//!
//! Storage is pluggable: the [`storage::Storage`] trait abstracts
//! open/stream/close over any backing store, and [`storage::fs::FsStorage`]
//! is the file-system implementation.

#![allow(clippy::manual_async_fn)]

extern crate tracing as log;

pub mod body;
pub mod encoding;
pub mod error;
pub mod headers;
pub mod options;
pub mod range;
pub mod response;
pub mod serve;
pub mod storage;

pub use crate::body::Body;
pub use crate::encoding::EncodingMapping;
pub use crate::error::{StorageError, StorageErrorKind};
pub use crate::options::{
    CharsetRule, DispositionType, FsOptions, GuessResolver, MimeResolver, OnDirectory, ResponseOptions,
    ServeOptions, Setting,
};
pub use crate::response::StreamResponse;
pub use crate::serve::Streamer;
pub use crate::storage::{fs::FsStorage, Reference, Storage, StorageInfo};
