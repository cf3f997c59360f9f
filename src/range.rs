//! Byte-range planning.
//!
//! Turns the parsed `Range` members into a concrete serving plan against a
//! known resource size: the full body, one clamped range, a
//! multipart/byteranges layout with precomputed framing, or an
//! unsatisfiable verdict (416).

use bytes::Bytes;
use rand::distr::Alphanumeric;
use rand::Rng;
use smallvec::SmallVec;

use crate::headers::range::RangeSpec;

/// An inclusive byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    // inclusive bounds cannot describe an empty interval
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

pub type ByteRanges = SmallVec<[ByteRange; 2]>;

/// How the response body will be laid out.
#[derive(Debug)]
pub enum RangePlan {
    /// Serve the whole resource with 200.
    Full,
    /// Serve one interval with 206 and a `Content-Range` header.
    Single(ByteRange),
    /// Serve several intervals as multipart/byteranges with 206.
    Multipart(MultipartPlan),
    /// No requested interval exists; respond 416.
    Unsatisfiable,
}

/// Precomputed multipart framing.
///
/// Part headers are fixed up front so the overall `Content-Length` is
/// deterministic before any body byte is produced.
#[derive(Debug)]
pub struct MultipartPlan {
    /// Intervals in the client's requested order, not coalesced.
    pub ranges: ByteRanges,
    pub boundary: String,
    /// One preamble per part: boundary line, part headers, blank line.
    pub part_headers: Vec<Bytes>,
    pub trailer: Bytes,
    /// Exact framed body length.
    pub total_len: u64,
}

/// Boundary length in characters; RFC 2046 allows up to 70.
const BOUNDARY_LEN: usize = 32;

pub fn generate_boundary() -> String {
    rand::rng().sample_iter(Alphanumeric).take(BOUNDARY_LEN).map(char::from).collect()
}

/// Resolve parsed range members against the resource size.
///
/// * Unknown size or no (usable) `Range` header → `Full`.
/// * Range support disabled, or more members than `max_ranges` → `Full`;
///   over-limit requests degrade silently rather than fail.
/// * Any member that cannot identify at least one byte → `Unsatisfiable`.
pub fn plan(
    specs: Option<&[RangeSpec]>,
    size: Option<u64>,
    max_ranges: usize,
    content_type: Option<&str>,
) -> RangePlan {
    let Some(size) = size else { return RangePlan::Full };
    let Some(specs) = specs else { return RangePlan::Full };

    if max_ranges == 0 || specs.len() > max_ranges {
        if specs.len() > max_ranges {
            log::trace!("{} ranges exceed the limit of {max_ranges}, serving full content", specs.len());
        }
        return RangePlan::Full;
    }

    let mut ranges = ByteRanges::new();

    for spec in specs {
        match resolve(*spec, size) {
            Some(range) => ranges.push(range),
            None => {
                log::trace!("unsatisfiable byte range {spec:?} against size {size}");
                return RangePlan::Unsatisfiable;
            }
        }
    }

    match ranges.len() {
        1 => RangePlan::Single(ranges[0]),
        _ => RangePlan::Multipart(MultipartPlan::new(ranges, size, content_type)),
    }
}

fn resolve(spec: RangeSpec, size: u64) -> Option<ByteRange> {
    let last = size.checked_sub(1)?;

    match spec {
        RangeSpec::FromTo(start, end) if start <= end && start < size => Some(ByteRange {
            start,
            end: end.min(last),
        }),
        RangeSpec::From(start) if start < size => Some(ByteRange { start, end: last }),
        RangeSpec::Suffix(len) if len > 0 => Some(ByteRange {
            start: size.saturating_sub(len),
            end: last,
        }),
        _ => None,
    }
}

impl MultipartPlan {
    fn new(ranges: ByteRanges, size: u64, content_type: Option<&str>) -> MultipartPlan {
        let boundary = generate_boundary();

        let mut total_len = 0u64;
        let mut part_headers = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().enumerate() {
            let mut block = String::with_capacity(96);

            if index > 0 {
                block.push_str("\r\n");
            }
            block.push_str("--");
            block.push_str(&boundary);
            block.push_str("\r\n");

            if let Some(content_type) = content_type {
                block.push_str("content-type: ");
                block.push_str(content_type);
                block.push_str("\r\n");
            }

            block.push_str(&format!("content-range: bytes {}-{}/{}\r\n\r\n", range.start, range.end, size));

            total_len += block.len() as u64 + range.len();
            part_headers.push(Bytes::from(block));
        }

        let trailer = Bytes::from(format!("\r\n--{boundary}--"));
        total_len += trailer.len() as u64;

        MultipartPlan {
            ranges,
            boundary,
            part_headers,
            trailer,
            total_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_size_serves_full() {
        let specs = [RangeSpec::FromTo(0, 0)];
        assert!(matches!(plan(Some(&specs), None, 200, None), RangePlan::Full));
    }

    #[test]
    fn first_byte_of_five() {
        let specs = [RangeSpec::FromTo(0, 0)];
        match plan(Some(&specs), Some(5), 200, None) {
            RangePlan::Single(r) => {
                assert_eq!((r.start, r.end), (0, 0));
                assert_eq!(r.len(), 1);
            }
            other => panic!("expected single range, got {other:?}"),
        }
    }

    #[test]
    fn start_past_end_of_resource_is_unsatisfiable() {
        let specs = [RangeSpec::FromTo(7, 7)];
        assert!(matches!(plan(Some(&specs), Some(5), 200, None), RangePlan::Unsatisfiable));
    }

    #[test]
    fn suffix_resolves_to_tail() {
        let specs = [RangeSpec::Suffix(3)];
        match plan(Some(&specs), Some(9), 200, None) {
            RangePlan::Single(r) => assert_eq!((r.start, r.end), (6, 8)),
            other => panic!("expected single range, got {other:?}"),
        }
    }

    #[test]
    fn oversized_suffix_clamps_to_whole() {
        let specs = [RangeSpec::Suffix(100)];
        match plan(Some(&specs), Some(9), 200, None) {
            RangePlan::Single(r) => assert_eq!((r.start, r.end), (0, 8)),
            other => panic!("expected single range, got {other:?}"),
        }
    }

    #[test]
    fn end_is_clamped_to_size() {
        let specs = [RangeSpec::FromTo(2, 999)];
        match plan(Some(&specs), Some(5), 200, None) {
            RangePlan::Single(r) => assert_eq!((r.start, r.end), (2, 4)),
            other => panic!("expected single range, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_cannot_satisfy_ranges() {
        let specs = [RangeSpec::FromTo(0, 0)];
        assert!(matches!(plan(Some(&specs), Some(0), 200, None), RangePlan::Unsatisfiable));
    }

    #[test]
    fn zero_suffix_is_unsatisfiable() {
        let specs = [RangeSpec::Suffix(0)];
        assert!(matches!(plan(Some(&specs), Some(5), 200, None), RangePlan::Unsatisfiable));
    }

    #[test]
    fn disabled_or_exceeded_limits_degrade_to_full() {
        let one = [RangeSpec::FromTo(0, 0)];
        let two = [RangeSpec::FromTo(0, 0), RangeSpec::FromTo(2, 2)];

        assert!(matches!(plan(Some(&one), Some(5), 0, None), RangePlan::Full));
        assert!(matches!(plan(Some(&two), Some(5), 1, None), RangePlan::Full));
    }

    #[test]
    fn multipart_framing_is_deterministic() {
        let specs = [RangeSpec::FromTo(0, 0), RangeSpec::FromTo(2, 2)];
        let plan = match plan(Some(&specs), Some(5), 200, Some("text/plain; charset=UTF-8")) {
            RangePlan::Multipart(plan) => plan,
            other => panic!("expected multipart, got {other:?}"),
        };

        assert_eq!(plan.ranges.len(), 2);
        assert_eq!(plan.part_headers.len(), 2);

        let first = std::str::from_utf8(&plan.part_headers[0]).unwrap();
        let second = std::str::from_utf8(&plan.part_headers[1]).unwrap();

        assert_eq!(
            first,
            format!(
                "--{b}\r\ncontent-type: text/plain; charset=UTF-8\r\ncontent-range: bytes 0-0/5\r\n\r\n",
                b = plan.boundary
            )
        );
        assert!(second.starts_with("\r\n--"));

        let framed: u64 = plan.part_headers.iter().map(|h| h.len() as u64).sum::<u64>()
            + plan.ranges.iter().map(ByteRange::len).sum::<u64>()
            + plan.trailer.len() as u64;
        assert_eq!(plan.total_len, framed);

        assert!(plan.boundary.len() >= 24);
        assert!(plan.boundary.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn client_order_is_preserved() {
        let specs = [RangeSpec::FromTo(3, 4), RangeSpec::FromTo(0, 1)];
        match plan(Some(&specs), Some(5), 200, None) {
            RangePlan::Multipart(plan) => {
                assert_eq!((plan.ranges[0].start, plan.ranges[1].start), (3, 0));
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }
}
