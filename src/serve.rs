//! The response orchestrator: drives path resolution, variant negotiation,
//! conditional evaluation, range planning, and header assembly from one
//! `prepare_response` call.

use headers::HeaderMapExt;
use http::header::{
    ACCEPT_RANGES, ALLOW, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, LAST_MODIFIED, LOCATION, VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::error::StorageError;
use crate::headers::accept_encoding::IDENTITY;
use crate::headers::conditionals::{Conditionals, Verdict};
use crate::headers::content_disposition::content_disposition;
use crate::headers::entity_tag::EntityTag;
use crate::headers::range::parse_range;
use crate::options::{DispositionType, ResponseOptions, ServeOptions, Setting};
use crate::range::{self, RangePlan};
use crate::response::StreamResponse;
use crate::storage::{Reference, Storage, StorageInfo};

/// Plans streaming responses over one storage backend.
///
/// The streamer and its configuration are immutable and shared freely;
/// every `prepare_response` call owns its resources independently.
pub struct Streamer<S> {
    storage: S,
    opts: ServeOptions,
}

impl<S: Storage> Streamer<S> {
    pub fn new(storage: S) -> Self {
        Self::with_options(storage, ServeOptions::default())
    }

    pub fn with_options(storage: S, opts: ServeOptions) -> Self {
        Streamer { storage, opts }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn options(&self) -> &ServeOptions {
        &self.opts
    }

    /// Convenience entry point taking the request head as-is.
    pub async fn prepare(&self, parts: &http::request::Parts) -> StreamResponse<S::Attached> {
        self.prepare_response(&parts.method, parts.uri.path(), &parts.headers, None).await
    }

    /// Resolve `reference` and plan the full response: status code, headers
    /// and body stream. Never fails; planning errors come back as 3xx/4xx/5xx
    /// responses with [`StreamResponse::error`] populated.
    pub async fn prepare_response(
        &self,
        method: &Method,
        reference: impl Into<Reference>,
        req_headers: &HeaderMap,
        overrides: Option<&ResponseOptions>,
    ) -> StreamResponse<S::Attached> {
        let reference = reference.into();

        let default_overrides = ResponseOptions::default();
        let overrides = overrides.unwrap_or(&default_overrides);

        if !self.opts.allowed_methods.contains(method) {
            return self.method_not_allowed();
        }

        let mut info = match self.storage.open(&reference, req_headers).await {
            Ok(info) => info,
            Err(err) => return self.error_response(err),
        };

        let etag = self.entity_tag(&info, overrides);
        let content_type = self.content_type(&info, overrides);

        let mut headers = HeaderMap::with_capacity(8);
        self.build_entity_headers(&mut headers, &info, overrides, etag.as_ref(), content_type.as_deref());

        let range_support = self.opts.max_ranges > 0 && info.size.is_some();
        let head = method == Method::HEAD;

        // a forced status short-circuits conditional and range handling
        if let Some(status) = overrides.status_code {
            return self.finish_full(status, headers, info, head).await;
        }

        let conditionals = Conditionals::new(req_headers);

        let use_range = match conditionals.check(method, etag.as_ref(), info.mtime) {
            Verdict::NoBody(status) => {
                self.storage.close(&mut info).await;
                return respond(status, headers, info);
            }
            Verdict::WithBody { use_range } => use_range,
        };

        if head {
            if let Some(size) = info.size {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
            }
            self.storage.close(&mut info).await;
            return respond(StatusCode::OK, headers, info);
        }

        let specs = if method == Method::GET && use_range && range_support {
            parse_range(req_headers)
        } else {
            None
        };

        let plan = range::plan(specs.as_deref(), info.size, self.opts.max_ranges, content_type.as_deref());

        match plan {
            RangePlan::Full => self.finish_full(StatusCode::OK, headers, info, false).await,

            RangePlan::Single(byte_range) => {
                let size = info.size.unwrap_or(0);

                headers.insert(
                    CONTENT_RANGE,
                    content_range_value(byte_range.start, byte_range.end, size),
                );
                headers.insert(CONTENT_LENGTH, HeaderValue::from(byte_range.len()));

                let body = self.storage.read_stream(&mut info, RangePlan::Single(byte_range));

                let mut resp = respond(StatusCode::PARTIAL_CONTENT, headers, info);
                resp.body = body;
                resp
            }

            RangePlan::Multipart(plan) => {
                let boundary_type = format!("multipart/byteranges; boundary={}", plan.boundary);

                if let Ok(value) = HeaderValue::from_str(&boundary_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
                headers.insert(CONTENT_LENGTH, HeaderValue::from(plan.total_len));

                let body = self.storage.read_stream(&mut info, RangePlan::Multipart(plan));

                let mut resp = respond(StatusCode::PARTIAL_CONTENT, headers, info);
                resp.body = body;
                resp
            }

            RangePlan::Unsatisfiable => {
                let size = info.size.unwrap_or(0);

                headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes */{size}")).unwrap_or(HeaderValue::from_static("bytes */0")),
                );

                self.storage.close(&mut info).await;
                respond(StatusCode::RANGE_NOT_SATISFIABLE, headers, info)
            }
        }
    }

    /// Serve the entire resource with the given status.
    async fn finish_full(
        &self,
        status: StatusCode,
        mut headers: HeaderMap,
        mut info: StorageInfo<S::Attached>,
        head: bool,
    ) -> StreamResponse<S::Attached> {
        if let Some(size) = info.size {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        }

        if head {
            self.storage.close(&mut info).await;
            return respond(status, headers, info);
        }

        let body = self.storage.read_stream(&mut info, RangePlan::Full);

        let mut resp = respond(status, headers, info);
        resp.body = body;
        resp
    }

    fn method_not_allowed(&self) -> StreamResponse<S::Attached> {
        let mut resp = StreamResponse::with_status(StatusCode::METHOD_NOT_ALLOWED);

        let allow = self
            .opts
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        if let Ok(value) = HeaderValue::from_str(&allow) {
            resp.headers.insert(ALLOW, value);
        }

        resp
    }

    /// Storage failures map onto 301 (go to the canonical form), 404
    /// (anything path-shaped), or 500; the error itself rides along
    /// out-of-band.
    fn error_response(&self, err: StorageError) -> StreamResponse<S::Attached> {
        let mut resp = match &err {
            StorageError::NotNormalized { normalized, .. } => {
                let mut resp = StreamResponse::with_status(StatusCode::MOVED_PERMANENTLY);
                match HeaderValue::from_str(normalized) {
                    Ok(location) => {
                        resp.headers.insert(LOCATION, location);
                    }
                    Err(_) => resp.status = StatusCode::NOT_FOUND,
                }
                resp
            }
            StorageError::Unknown { .. } => StreamResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR),
            _ => StreamResponse::with_status(StatusCode::NOT_FOUND),
        };

        log::trace!("storage rejected reference: {err}");
        resp.error = Some(err);
        resp
    }

    /// Derive the entity tag: per-request override, storage-provided tag,
    /// or `<size>-<mtime-ms-hex>-<encoding>`.
    fn entity_tag(&self, info: &StorageInfo<S::Attached>, overrides: &ResponseOptions) -> Option<EntityTag> {
        match &overrides.etag {
            Setting::Off => None,
            Setting::Value(text) => text
                .parse()
                .or_else(|_| EntityTag::checked_new(self.opts.weak_etags, text.clone()))
                .ok(),
            Setting::Auto => {
                if !self.opts.etag {
                    return None;
                }

                if let Some(tag) = &info.etag {
                    return EntityTag::checked_new(self.opts.weak_etags, tag.clone()).ok();
                }

                let size = info.size?;
                let mtime_ms = info.mtime_ms()?;

                EntityTag::checked_new(
                    self.opts.weak_etags,
                    format!("{size}-{mtime_ms:x}-{}", info.content_encoding),
                )
                .ok()
            }
        }
    }

    /// Resolve the `Content-Type` value, charset included.
    fn content_type(&self, info: &StorageInfo<S::Attached>, overrides: &ResponseOptions) -> Option<String> {
        match &overrides.content_type {
            Setting::Off => None,
            Setting::Value(text) => Some(text.clone()),
            Setting::Auto => {
                let mime = info
                    .mime_type
                    .clone()
                    .or_else(|| info.file_name.as_deref().and_then(|name| self.storage.mime_type_lookup(name)))
                    .or_else(|| self.opts.default_content_type.clone())?;

                let essence = mime.essence_str().to_owned();

                if let Some(charset) = &info.mime_type_charset {
                    return Some(format!("{essence}; charset={charset}"));
                }

                if mime.get_param(mime::CHARSET).is_some() {
                    return Some(mime.to_string());
                }

                let charset = self
                    .opts
                    .default_charsets
                    .as_ref()
                    .and_then(|rules| rules.iter().find(|rule| rule.matcher.is_match(&essence)))
                    .map(|rule| rule.charset.as_str());

                Some(match charset {
                    Some(charset) => format!("{essence}; charset={charset}"),
                    None => essence,
                })
            }
        }
    }

    /// The representation headers shared by every verdict.
    fn build_entity_headers(
        &self,
        headers: &mut HeaderMap,
        info: &StorageInfo<S::Attached>,
        overrides: &ResponseOptions,
        etag: Option<&EntityTag>,
        content_type: Option<&str>,
    ) {
        let cache_control = match &overrides.cache_control {
            Setting::Auto => &self.opts.cache_control,
            other => other,
        };
        match cache_control {
            Setting::Off => {}
            Setting::Auto => {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=0"));
            }
            Setting::Value(value) => {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(CACHE_CONTROL, value);
                }
            }
        }

        match &overrides.last_modified {
            Setting::Off => {}
            Setting::Value(value) => {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(LAST_MODIFIED, value);
                }
            }
            Setting::Auto => {
                if self.opts.last_modified {
                    if let Some(mtime) = info.mtime {
                        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(mtime)) {
                            headers.insert(LAST_MODIFIED, value);
                        }
                    }
                }
            }
        }

        if let Some(etag) = etag {
            headers.typed_insert(etag.clone());
        }

        if let Some(content_type) = content_type {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        let disposition_type = match &overrides.content_disposition_type {
            Setting::Off => None,
            Setting::Value(kind) => Some((*kind, true)),
            Setting::Auto => Some((DispositionType::Inline, false)),
        };

        if let Some((kind, forced)) = disposition_type {
            let filename = match &overrides.content_disposition_filename {
                Setting::Off => None,
                Setting::Value(name) => Some(name.as_str()),
                Setting::Auto => info.file_name.as_deref(),
            };

            if filename.is_some() || forced {
                if let Some(value) = content_disposition(kind, filename) {
                    headers.insert(CONTENT_DISPOSITION, value);
                }
            }
        }

        if info.content_encoding != IDENTITY {
            if let Ok(value) = HeaderValue::from_str(&info.content_encoding) {
                headers.insert(CONTENT_ENCODING, value);
            }
        }

        if let Some(vary) = &info.vary {
            if let Ok(value) = HeaderValue::from_str(vary) {
                headers.append(VARY, value);
            }
        }

        let range_support = self.opts.max_ranges > 0 && info.size.is_some();
        headers.insert(
            ACCEPT_RANGES,
            HeaderValue::from_static(if range_support { "bytes" } else { "none" }),
        );
    }
}

fn respond<A>(status: StatusCode, headers: HeaderMap, info: StorageInfo<A>) -> StreamResponse<A> {
    let mut resp = StreamResponse::with_status(status);
    resp.headers = headers;
    resp.info = Some(info);
    resp
}

fn content_range_value(start: u64, end: u64, size: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")).unwrap_or(HeaderValue::from_static("bytes */0"))
}
