use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// HTTP body streaming `len` bytes from a seekable reader, in `Bytes`
/// chunks of at most `capacity`.
///
/// The seek to the range start happens on first poll, so construction stays
/// synchronous; a premature EOF surfaces as `UnexpectedEof` rather than a
/// silently short body.
pub struct FileRangeBody<R> {
    reader: R,
    seek: SeekState,
    buf: BytesMut,
    capacity: usize,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekState {
    Pending(u64),
    Seeking,
    Done,
}

pub(crate) const DEFAULT_READ_BUF_SIZE: usize = 1024 * 32;

impl<R: AsyncRead + AsyncSeek + Unpin> FileRangeBody<R> {
    /// `offset = None` reads from the current position.
    pub fn new(reader: R, offset: Option<u64>, len: u64, capacity: usize) -> Self {
        FileRangeBody {
            reader,
            seek: match offset {
                Some(0) | None => SeekState::Done,
                Some(offset) => SeekState::Pending(offset),
            },
            buf: BytesMut::new(),
            capacity: capacity.max(1),
            remaining: len,
        }
    }

    /// Drive the reader to the range start.
    fn poll_seek(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match self.seek {
                SeekState::Pending(offset) => {
                    Pin::new(&mut self.reader).start_seek(SeekFrom::Start(offset))?;
                    self.seek = SeekState::Seeking;
                }
                SeekState::Seeking => {
                    ready!(Pin::new(&mut self.reader).poll_complete(cx))?;
                    self.seek = SeekState::Done;
                }
                SeekState::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> Body for FileRangeBody<R> {
    type Data = Bytes;
    type Error = io::Error;

    fn is_end_stream(&self) -> bool {
        self.remaining == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.remaining == 0 {
            return Poll::Ready(None);
        }

        if let Err(err) = ready!(this.poll_seek(cx)) {
            this.remaining = 0;
            return Poll::Ready(Some(Err(err)));
        }

        match ready!(poll_read_chunk(
            Pin::new(&mut this.reader),
            cx,
            &mut this.buf,
            this.capacity,
            this.remaining,
        )) {
            Ok(0) => {
                // the backing store shrank underneath us
                this.remaining = 0;
                Poll::Ready(Some(Err(io::ErrorKind::UnexpectedEof.into())))
            }
            Ok(n) => {
                this.remaining -= n as u64;
                Poll::Ready(Some(Ok(Frame::data(this.buf.split().freeze()))))
            }
            Err(err) => {
                this.remaining = 0;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

/// Read up to `min(capacity, remaining)` bytes into `buf`'s spare capacity.
pub(crate) fn poll_read_chunk<R: AsyncRead>(
    reader: Pin<&mut R>,
    cx: &mut Context<'_>,
    buf: &mut BytesMut,
    capacity: usize,
    remaining: u64,
) -> Poll<io::Result<usize>> {
    if buf.capacity() == 0 {
        buf.reserve(remaining.min(capacity as u64) as usize);
    }

    let mut chunk = buf.spare_capacity_mut();
    if remaining < chunk.len() as u64 {
        chunk = &mut chunk[..remaining as usize];
    }

    let mut read_buf = ReadBuf::uninit(chunk);
    ready!(reader.poll_read(cx, &mut read_buf))?;

    let n = read_buf.filled().len();

    // the filled prefix of the spare capacity is initialized now
    unsafe { buf.advance_mut(n) };

    Poll::Ready(Ok(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io::Write;

    async fn collect(body: FileRangeBody<tokio::fs::File>) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    fn fixture(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let f = fixture(b"hello world");
        let file = tokio::fs::File::open(f.path()).await.unwrap();
        assert_eq!(collect(FileRangeBody::new(file, None, 11, 4)).await, b"hello world");
    }

    #[tokio::test]
    async fn seeks_to_offset() {
        let f = fixture(b"0123456789");
        let file = tokio::fs::File::open(f.path()).await.unwrap();
        assert_eq!(collect(FileRangeBody::new(file, Some(6), 3, 64)).await, b"678");
    }

    #[tokio::test]
    async fn zero_length_yields_nothing() {
        let f = fixture(b"abc");
        let file = tokio::fs::File::open(f.path()).await.unwrap();
        assert_eq!(collect(FileRangeBody::new(file, None, 0, 64)).await, b"");
    }

    #[tokio::test]
    async fn truncated_file_errors() {
        let f = fixture(b"abc");
        let file = tokio::fs::File::open(f.path()).await.unwrap();
        let body = FileRangeBody::new(file, None, 10, 64);
        let err = body.collect().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
