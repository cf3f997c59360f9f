use std::error::Error;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::Full;

pub mod file;
pub mod multipart;

pub use file::FileRangeBody;
pub use multipart::MultipartBody;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("stream aborted")]
    StreamAborted,

    #[error(transparent)]
    Generic(Box<dyn Error + Send + Sync + 'static>),
}

/// The response byte stream.
///
/// A thin tagged wrapper so the cheap cases (no body, one buffer) avoid a
/// box; everything streaming goes through the `Dyn` variant.
#[derive(Default)]
#[repr(transparent)]
#[must_use]
pub struct Body(pub(crate) BodyInner);

#[derive(Default)]
#[pin_project::pin_project(project = BodyProj)]
pub(crate) enum BodyInner {
    #[default]
    Empty,
    Full(#[pin] Full<Bytes>),
    Dyn(#[pin] Pin<Box<dyn HttpBody<Data = Bytes, Error = BodyError> + Send + 'static>>),
}

// assert Send
const _: () = {
    const fn test_send<T: Send>() {}
    test_send::<Body>();
};

impl HttpBody for Body {
    type Data = Bytes;
    type Error = BodyError;

    #[inline]
    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().0).poll_frame(cx)
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }

    #[inline]
    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }
}

impl HttpBody for BodyInner {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            BodyProj::Empty => Poll::Ready(None),
            BodyProj::Full(full) => full.poll_frame(cx).map_err(|never| match never {}),
            BodyProj::Dyn(body) => body.poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(inner) => inner.is_end_stream(),
            Self::Dyn(inner) => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Empty => SizeHint::with_exact(0),
            Self::Full(inner) => inner.size_hint(),
            Self::Dyn(inner) => inner.size_hint(),
        }
    }
}

impl Body {
    /// A body that yields no frames.
    pub const fn empty() -> Body {
        Body(BodyInner::Empty)
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self.0, BodyInner::Empty)
    }

    /// Wrap any compatible `http_body::Body` implementation.
    pub fn wrap<B>(body: B) -> Body
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BodyError>,
    {
        Body(BodyInner::Dyn(Box::pin(WrappedBody { body })))
    }
}

impl From<Bytes> for Body {
    #[inline]
    fn from(value: Bytes) -> Self {
        Body(BodyInner::Full(Full::new(value)))
    }
}

impl From<Vec<u8>> for Body {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Bytes::from(value).into()
    }
}

impl From<String> for Body {
    #[inline]
    fn from(value: String) -> Self {
        Bytes::from(value).into()
    }
}

impl From<&'static str> for Body {
    #[inline]
    fn from(value: &'static str) -> Self {
        Bytes::from_static(value.as_bytes()).into()
    }
}

#[pin_project::pin_project]
struct WrappedBody<B> {
    #[pin]
    body: B,
}

impl<B> HttpBody for WrappedBody<B>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BodyError>,
{
    type Data = Bytes;
    type Error = BodyError;

    #[inline]
    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.project().body.poll_frame(cx).map_err(Into::into)
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.body.is_end_stream()
    }

    #[inline]
    fn size_hint(&self) -> SizeHint {
        self.body.size_hint()
    }
}
