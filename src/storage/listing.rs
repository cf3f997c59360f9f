//! Generated HTML directory listings, produced as a lazy byte stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use regex::Regex;
use tokio::fs::ReadDir;

use super::path::forbidden_char;

/// Streams `<header><li>…</li>…<footer>` over a directory iterator.
///
/// Entries whose names contain forbidden characters, or match the ignore
/// pattern, never appear: they could not be requested anyway. Only `&` is
/// HTML-escaped; every other dangerous character is unrepresentable here by
/// the same rule.
///
/// The stream is not restartable; callers re-open the directory to list it
/// again.
pub struct ListingBody {
    dir: Option<ReadDir>,
    ignore: Option<Regex>,
    title: String,
    buf: BytesMut,
    started: bool,
}

/// Upper bound on how much listing HTML is buffered before a frame is
/// flushed to the sink.
const FLUSH_THRESHOLD: usize = 8 * 1024;

impl ListingBody {
    pub fn new(dir: ReadDir, title: String, ignore: Option<Regex>) -> Self {
        ListingBody {
            dir: Some(dir),
            ignore,
            title,
            buf: BytesMut::new(),
            started: false,
        }
    }

    fn push_header(&mut self) {
        let title = escape_amp(&self.title);
        let mut buf = (&mut self.buf).writer();
        use std::io::Write;

        _ = write!(
            buf,
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<ul>\n",
        );
    }

    fn push_entry(&mut self, name: &str) {
        let name = escape_amp(name);
        let mut buf = (&mut self.buf).writer();
        use std::io::Write;

        _ = write!(buf, "<li><a href=\"{name}\">{name}</a></li>\n");
    }

    fn push_footer(&mut self) {
        self.buf.extend_from_slice(b"</ul>\n</body>\n</html>\n");
    }

    fn admits(&self, name: &str) -> bool {
        if name.chars().any(forbidden_char) {
            return false;
        }

        match &self.ignore {
            Some(ignore) => !ignore.is_match(name),
            None => true,
        }
    }
}

fn escape_amp(text: &str) -> String {
    text.replace('&', "&amp;")
}

impl Body for ListingBody {
    type Data = Bytes;
    type Error = io::Error;

    fn is_end_stream(&self) -> bool {
        self.dir.is_none() && self.buf.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if !this.started {
            this.started = true;
            this.push_header();
        }

        while let Some(dir) = this.dir.as_mut() {
            if this.buf.len() >= FLUSH_THRESHOLD {
                break;
            }

            match dir.poll_next_entry(cx) {
                Poll::Ready(Ok(Some(entry))) => {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();

                    if this.admits(&name) {
                        this.push_entry(&name);
                    }
                }
                Poll::Ready(Ok(None)) => {
                    this.dir = None;
                    this.push_footer();
                }
                Poll::Ready(Err(err)) => {
                    this.dir = None;
                    this.buf.clear();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => {
                    if this.buf.is_empty() {
                        return Poll::Pending;
                    }
                    break;
                }
            }
        }

        if this.buf.is_empty() {
            return Poll::Ready(None);
        }

        Poll::Ready(Some(Ok(Frame::data(this.buf.split().freeze()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::default_ignore_pattern;
    use http_body_util::BodyExt;
    use std::io::Write as _;

    async fn render(dir: &std::path::Path, ignore: Option<Regex>) -> String {
        let read_dir = tokio::fs::read_dir(dir).await.unwrap();
        let body = ListingBody::new(read_dir, "sub".to_owned(), ignore);
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn touch(dir: &std::path::Path, name: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(b"x").unwrap();
    }

    #[tokio::test]
    async fn lists_entries_between_header_and_footer() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b.txt");

        let html = render(dir.path(), None).await;

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.ends_with("</ul>\n</body>\n</html>\n"));
        assert!(html.contains("<li><a href=\"a.txt\">a.txt</a></li>"));
        assert!(html.contains("<li><a href=\"b.txt\">b.txt</a></li>"));
        assert!(html.contains("<title>sub</title>"));
    }

    #[tokio::test]
    async fn skips_ignored_entries() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "visible.txt");
        touch(dir.path(), ".hidden");

        let html = render(dir.path(), Some(default_ignore_pattern())).await;

        assert!(html.contains("visible.txt"));
        assert!(!html.contains(".hidden"));
    }

    #[tokio::test]
    async fn escapes_ampersands() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a&b.txt");

        let html = render(dir.path(), None).await;
        assert!(html.contains("a&amp;b.txt"));
        assert!(!html.contains("a&b.txt"));
    }
}
