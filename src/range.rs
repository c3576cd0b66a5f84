//! `Range` header parsing and resolution against a response body.
//!
//! Only the single `bytes=<start>-<end>` form is understood. Both bounds are
//! inclusive, so `bytes=0-5` asks for six bytes.

use std::fmt;

use tracing::debug;

use crate::body::ResponseBody;
use crate::error::RangeError;

const BYTES_UNIT: &str = "bytes=";

/// Total size of the full representation, if it is known upfront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLength {
    Known(u64),
    /// Open streams without a predetermined length.
    Unknown,
}

/// Renders as it appears after the `/` of a `Content-Range` value.
impl fmt::Display for ResourceLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLength::Known(len) => write!(f, "{}", len),
            ResourceLength::Unknown => f.write_str("*"),
        }
    }
}

/// Inclusive bounds decoded from a `Range` header, not yet checked against
/// the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRange {
    pub start: u64,
    pub end: u64,
}

impl ParsedRange {
    /// Parses `bytes=<digits>-<digits>`. Anything else, including open-ended,
    /// suffix and multi-range forms, is malformed.
    pub fn parse(header: &str) -> Result<ParsedRange, RangeError> {
        let malformed = || RangeError::Malformed(header.to_owned());

        let range_set = header.strip_prefix(BYTES_UNIT).ok_or_else(malformed)?;
        let (start, end) = range_set.split_once('-').ok_or_else(malformed)?;

        Ok(ParsedRange {
            start: parse_bound(start).ok_or_else(malformed)?,
            end: parse_bound(end).ok_or_else(malformed)?,
        })
    }

    /// Validates ordering and, when the length is known, that the range starts
    /// inside the resource. An end past the resource is clamped, not rejected.
    pub fn satisfy(self, length: ResourceLength) -> Result<SatisfiableRange, RangeError> {
        let ParsedRange { start, mut end } = self;
        let unsatisfiable = RangeError::Unsatisfiable { start, end, length };

        if start > end {
            return Err(unsatisfiable);
        }

        if let ResourceLength::Known(len) = length {
            if start >= len {
                return Err(unsatisfiable);
            }
            end = end.min(len - 1);
        }

        Ok(SatisfiableRange { start, end, length })
    }
}

fn parse_bound(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A range that can be served from the resource. `start <= end` always holds,
/// and `end < length` when the length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatisfiableRange {
    pub start: u64,
    pub end: u64,
    pub length: ResourceLength,
}

impl SatisfiableRange {
    /// Number of bytes covered, bounds inclusive. Saturates for a range ending
    /// at `u64::MAX`, which a stream serves until it ends.
    pub fn byte_count(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.length)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfied_content_range(length: ResourceLength) -> String {
    format!("bytes */{}", length)
}

/// Result of resolving a `Range` header against a response body.
#[derive(Debug)]
pub enum Outcome {
    /// No range requested, the body is returned untouched.
    Passthrough(ResponseBody),
    Partial(SatisfiableRange, ResponseBody),
    MalformedRange(ResourceLength),
    UnsatisfiableRange(ResourceLength),
}

/// Resolves an optional raw `Range` header against the full body.
///
/// This never performs I/O: stream bodies are wrapped so that slicing happens
/// lazily as the response is written.
pub fn resolve(header: Option<&str>, body: ResponseBody) -> Outcome {
    let Some(header) = header else {
        return Outcome::Passthrough(body);
    };

    let length = body.resource_length();

    let parsed = match ParsedRange::parse(header) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(%err, "rejecting range");
            return Outcome::MalformedRange(length);
        }
    };

    match parsed.satisfy(length) {
        Ok(range) => {
            debug!(range = %range.content_range(), "serving partial content");
            let sliced = body.slice(&range);
            Outcome::Partial(range, sliced)
        }
        Err(err) => {
            debug!(%err, "rejecting range");
            Outcome::UnsatisfiableRange(length)
        }
    }
}
