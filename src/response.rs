use std::io;

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::body::Body;
use crate::error::StorageError;
use crate::storage::StorageInfo;

/// A fully-planned response: status, headers, and a lazy byte stream.
///
/// Always well-formed; failures during planning surface as a 3xx/4xx/5xx
/// status with the `error` field populated, never as a panic or a missing
/// response.
pub struct StreamResponse<A> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    /// Resource metadata, when something was opened. Live handles have
    /// moved into `body` by the time the caller sees this.
    pub info: Option<StorageInfo<A>>,
    /// Out-of-band diagnostic for error responses.
    pub error: Option<StorageError>,
}

impl<A> StreamResponse<A> {
    pub(crate) fn with_status(status: StatusCode) -> Self {
        StreamResponse {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
            info: None,
            error: None,
        }
    }

    /// Convert into a plain `http` response for use with any server stack.
    pub fn into_response(self) -> http::Response<Body> {
        let mut resp = http::Response::new(self.body);
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }

    /// Write the response as an HTTP/1.1 message to `sink`.
    ///
    /// Bytes are produced on demand and pushed through `write_all`, so the
    /// sink's readiness is the backpressure signal. When no
    /// `Content-Length` is known the body is framed with
    /// `Transfer-Encoding: chunked`.
    pub async fn send<W: AsyncWrite + Unpin>(mut self, sink: &mut W) -> io::Result<()> {
        let chunked = !self.body.is_empty() && !self.headers.contains_key(CONTENT_LENGTH);

        let mut head = Vec::with_capacity(256);

        head.extend_from_slice(b"HTTP/1.1 ");
        head.extend_from_slice(self.status.as_str().as_bytes());
        head.extend_from_slice(b" ");
        head.extend_from_slice(self.status.canonical_reason().unwrap_or("Unknown").as_bytes());
        head.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }

        if chunked {
            head.extend_from_slice(b"transfer-encoding: chunked\r\n");
        }

        head.extend_from_slice(b"\r\n");
        sink.write_all(&head).await?;

        while let Some(frame) = self.body.frame().await {
            let frame = frame.map_err(io::Error::other)?;

            let Ok(data) = frame.into_data() else { continue };

            if data.is_empty() {
                continue;
            }

            if chunked {
                sink.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
                sink.write_all(&data).await?;
                sink.write_all(b"\r\n").await?;
            } else {
                sink.write_all(&data).await?;
            }
        }

        if chunked {
            sink.write_all(b"0\r\n\r\n").await?;
        }

        sink.flush().await
    }
}

impl<A> std::fmt::Debug for StreamResponse<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// `Transfer-Encoding: chunked` advertisement for callers that assemble
/// their own head section from [`StreamResponse::headers`].
pub fn chunked_sentinel() -> (http::HeaderName, HeaderValue) {
    (TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
}
