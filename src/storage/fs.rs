//! File-system storage: path vetting, precompressed-variant probing,
//! directory handling, and handle lifecycle.

use std::io;
use std::path::{Path, PathBuf};

use http::HeaderMap;
use mime::Mime;
use tokio::fs::{File as TkFile, ReadDir};

use crate::body::file::{FileRangeBody, DEFAULT_READ_BUF_SIZE};
use crate::body::multipart::MultipartBody;
use crate::body::Body;
use crate::error::StorageError;
use crate::headers::accept_encoding::{AcceptEncoding, IDENTITY};
use crate::options::FsOptions;
use crate::range::RangePlan;

use super::listing::ListingBody;
use super::path::{parse_reference, PathParts, PathPolicy};
use super::{Reference, Storage, StorageInfo};

/// Serves files rooted at one directory.
pub struct FsStorage {
    root: PathBuf,
    opts: FsOptions,
}

/// Per-resource payload of the FS storage.
#[derive(Debug)]
pub struct FsAttached {
    pub resolved_path: PathBuf,
    pub parts: PathParts,
    file: Option<TkFile>,
    dir: Option<ReadDir>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, FsOptions::default())
    }

    pub fn with_options(root: impl Into<PathBuf>, opts: FsOptions) -> Self {
        FsStorage {
            root: root.into(),
            opts,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn policy(&self) -> PathPolicy<'_> {
        PathPolicy {
            ignore: self.opts.ignore_pattern.as_ref(),
            on_directory: self.opts.on_directory,
        }
    }

    /// Directory-with-trailing-slash resolution for the list-files mode.
    /// No descriptor is held open for the directory itself; the listing
    /// stream is driven by the `ReadDir` acquired here.
    async fn open_listing(
        &self,
        parts: PathParts,
        resolved: PathBuf,
    ) -> Result<StorageInfo<FsAttached>, StorageError> {
        let reference = &parts.reference;

        let meta = tokio::fs::metadata(&resolved).await.map_err(|err| open_error(err, reference))?;

        if !meta.is_dir() {
            // a trailing slash cannot name a regular file
            return Err(StorageError::DoesNotExist {
                reference: reference.clone(),
                source: None,
            });
        }

        let dir = tokio::fs::read_dir(&resolved).await.map_err(|err| open_error(err, reference))?;

        let file_name = format!("{}.html", parts.file_name().unwrap_or("_"));
        let mtime = meta.modified().ok();

        let mut info = StorageInfo::new(FsAttached {
            resolved_path: resolved,
            parts,
            file: None,
            dir: Some(dir),
        });

        info.file_name = Some(file_name);
        info.mtime = mtime;
        info.mime_type = Some(mime::TEXT_HTML);
        info.mime_type_charset = Some("UTF-8".to_owned());

        Ok(info)
    }

    /// Probe the variant paths derived by `mapping`, best candidate first.
    async fn negotiate_variant(
        &self,
        mapping: &crate::encoding::EncodingMapping,
        resolved_str: &str,
        headers: &HeaderMap,
        reference: &str,
    ) -> Result<(TkFile, std::fs::Metadata, String), StorageError> {
        let accepts = AcceptEncoding::from_headers(headers);

        for pref in mapping.candidates(&accepts) {
            let candidate = mapping.encoded_path(resolved_str, pref);

            let file = match TkFile::open(&candidate).await {
                Ok(file) => file,
                Err(err) => {
                    log::trace!("variant {candidate:?} not usable: {err}");
                    continue;
                }
            };

            let meta = file.metadata().await.map_err(|err| StorageError::Unknown {
                reference: reference.to_owned(),
                source: err,
            })?;

            if meta.is_dir() {
                if pref.is_identity() {
                    drop(file);
                    return Err(StorageError::IsDirectory {
                        reference: reference.to_owned(),
                        resolved_path: Some(candidate.into()),
                    });
                }

                drop(file);
                continue;
            }

            log::debug!("serving {} variant from {candidate:?}", pref.name);
            return Ok((file, meta, pref.name.clone()));
        }

        Err(StorageError::DoesNotExist {
            reference: reference.to_owned(),
            source: None,
        })
    }
}

fn open_error(err: io::Error, reference: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => StorageError::DoesNotExist {
            reference: reference.to_owned(),
            source: Some(err),
        },
        _ => StorageError::Unknown {
            reference: reference.to_owned(),
            source: err,
        },
    }
}

impl Storage for FsStorage {
    type Attached = FsAttached;

    async fn open(&self, reference: &Reference, headers: &HeaderMap) -> Result<StorageInfo<FsAttached>, StorageError> {
        let parts = parse_reference(reference, &self.policy())?;
        let resolved = parts.resolve(&self.root);

        if parts.directory_intent {
            return self.open_listing(parts, resolved).await;
        }

        let reference_str = parts.reference.clone();
        let resolved_str = resolved.to_string_lossy().into_owned();

        let mapping = self.opts.encoding_mappings.iter().find(|m| m.matches(&resolved_str));

        let (file, meta, encoding) = match mapping {
            Some(mapping) => self.negotiate_variant(mapping, &resolved_str, headers, &reference_str).await?,
            None => {
                let file = TkFile::open(&resolved).await.map_err(|err| open_error(err, &reference_str))?;

                let meta = file.metadata().await.map_err(|err| StorageError::Unknown {
                    reference: reference_str.clone(),
                    source: err,
                })?;

                (file, meta, IDENTITY.to_owned())
            }
        };

        if meta.is_dir() {
            // handle is released before the error propagates
            drop(file);
            return Err(StorageError::IsDirectory {
                reference: reference_str,
                resolved_path: Some(resolved),
            });
        }

        let file_name = parts.file_name().map(str::to_owned);
        let mtime = meta.modified().ok();

        let mut info = StorageInfo::new(FsAttached {
            resolved_path: resolved,
            parts,
            file: Some(file),
            dir: None,
        });

        info.file_name = file_name;
        info.mtime = mtime;
        info.size = Some(meta.len());
        info.content_encoding = encoding;

        if mapping.is_some() {
            info.vary = Some("Accept-Encoding".to_owned());
        }

        Ok(info)
    }

    fn read_stream(&self, info: &mut StorageInfo<FsAttached>, plan: RangePlan) -> Body {
        if let Some(dir) = info.attached.dir.take() {
            let title = info.attached.parts.file_name().unwrap_or("/").to_owned();
            return Body::wrap(ListingBody::new(dir, title, self.opts.ignore_pattern.clone()));
        }

        let Some(file) = info.attached.file.take() else {
            return Body::empty();
        };

        match plan {
            RangePlan::Full => {
                let len = info.size.unwrap_or(u64::MAX);
                Body::wrap(FileRangeBody::new(file, None, len, DEFAULT_READ_BUF_SIZE))
            }
            RangePlan::Single(range) => {
                Body::wrap(FileRangeBody::new(file, Some(range.start), range.len(), DEFAULT_READ_BUF_SIZE))
            }
            RangePlan::Multipart(plan) => Body::wrap(MultipartBody::new(file, plan, DEFAULT_READ_BUF_SIZE)),
            RangePlan::Unsatisfiable => Body::empty(),
        }
    }

    async fn close(&self, info: &mut StorageInfo<FsAttached>) {
        // dropping the handles releases them; repeated calls are no-ops
        info.attached.file.take();
        info.attached.dir.take();
    }

    fn mime_type_lookup(&self, file_name: &str) -> Option<Mime> {
        self.opts.mime_resolver.resolve(file_name)
    }
}
