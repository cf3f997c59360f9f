use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, AsyncSeek};

use crate::range::{ByteRanges, MultipartPlan};

use super::file::poll_read_chunk;

/// multipart/byteranges body over one seekable reader.
///
/// Parts are emitted strictly in plan order: preamble (boundary line plus
/// part headers), a seek to the part's start, the part's bytes, then the
/// next part, and finally the closing boundary. The single reader is the
/// serialization point: no byte of part N+1 is read before part N is done,
/// and dropping the body mid-stream abandons all remaining parts.
pub struct MultipartBody<R> {
    reader: R,
    ranges: ByteRanges,
    part_headers: Vec<Bytes>,
    trailer: Bytes,
    index: usize,
    state: PartState,
    buf: BytesMut,
    capacity: usize,
    framed_remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Preamble,
    Seek,
    Seeking,
    Reading { remaining: u64 },
    Trailer,
    Done,
}

impl<R: AsyncRead + AsyncSeek + Unpin> MultipartBody<R> {
    pub fn new(reader: R, plan: MultipartPlan, capacity: usize) -> Self {
        MultipartBody {
            reader,
            ranges: plan.ranges,
            part_headers: plan.part_headers,
            trailer: plan.trailer,
            index: 0,
            state: PartState::Preamble,
            buf: BytesMut::new(),
            capacity: capacity.max(1),
            framed_remaining: plan.total_len,
        }
    }

    fn emit(&mut self, data: Bytes) -> Frame<Bytes> {
        self.framed_remaining = self.framed_remaining.saturating_sub(data.len() as u64);
        Frame::data(data)
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin> Body for MultipartBody<R> {
    type Data = Bytes;
    type Error = io::Error;

    fn is_end_stream(&self) -> bool {
        self.state == PartState::Done
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.framed_remaining)
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        loop {
            match this.state {
                PartState::Preamble => {
                    let header = this.part_headers[this.index].clone();
                    this.state = PartState::Seek;
                    return Poll::Ready(Some(Ok(this.emit(header))));
                }

                PartState::Seek => {
                    let start = this.ranges[this.index].start;
                    if let Err(err) = Pin::new(&mut this.reader).start_seek(io::SeekFrom::Start(start)) {
                        this.state = PartState::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                    this.state = PartState::Seeking;
                }

                PartState::Seeking => match ready!(Pin::new(&mut this.reader).poll_complete(cx)) {
                    Ok(_) => {
                        this.state = PartState::Reading {
                            remaining: this.ranges[this.index].len(),
                        };
                    }
                    Err(err) => {
                        this.state = PartState::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                },

                PartState::Reading { remaining } => {
                    if remaining == 0 {
                        this.index += 1;
                        this.state = if this.index == this.ranges.len() {
                            PartState::Trailer
                        } else {
                            PartState::Preamble
                        };
                        continue;
                    }

                    match ready!(poll_read_chunk(
                        Pin::new(&mut this.reader),
                        cx,
                        &mut this.buf,
                        this.capacity,
                        remaining,
                    )) {
                        Ok(0) => {
                            this.state = PartState::Done;
                            return Poll::Ready(Some(Err(io::ErrorKind::UnexpectedEof.into())));
                        }
                        Ok(n) => {
                            this.state = PartState::Reading {
                                remaining: remaining - n as u64,
                            };
                            let chunk = this.buf.split().freeze();
                            return Poll::Ready(Some(Ok(this.emit(chunk))));
                        }
                        Err(err) => {
                            this.state = PartState::Done;
                            return Poll::Ready(Some(Err(err)));
                        }
                    }
                }

                PartState::Trailer => {
                    let trailer = this.trailer.clone();
                    this.state = PartState::Done;
                    return Poll::Ready(Some(Ok(this.emit(trailer))));
                }

                PartState::Done => return Poll::Ready(None),
            }
        }
    }
}
