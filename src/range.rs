//! HTTP `Range` header handling.
//!
//! Only single ranges in byte units are accepted: `bytes=a-b`, `bytes=a-`
//! and `bytes=-n`. Anything else, including multi-range requests, is
//! treated as not satisfiable.

use crate::{DriveError, Result};

/// A resolved, inclusive byte range within an object of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Total object size.
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A resolved range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    /// Value for an S3 `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// A parsed but unresolved range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b`
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`
    Suffix(u64),
}

fn invalid(header: &str) -> DriveError {
    DriveError::RangeNotSatisfiable(format!("invalid range header: {header}"))
}

/// Parse a `Range` header value.
pub fn parse_range(header: &str) -> Result<RangeSpec> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| invalid(header))?;
    if spec.contains(',') {
        return Err(invalid(header));
    }
    let (start, end) = spec.split_once('-').ok_or_else(|| invalid(header))?;
    let (start, end) = (start.trim(), end.trim());

    let number = |s: &str| s.parse::<u64>().map_err(|_| invalid(header));
    match (start.is_empty(), end.is_empty()) {
        (false, false) => {
            let (a, b) = (number(start)?, number(end)?);
            if b < a {
                return Err(invalid(header));
            }
            Ok(RangeSpec::FromTo(a, b))
        }
        (false, true) => Ok(RangeSpec::From(number(start)?)),
        (true, false) => Ok(RangeSpec::Suffix(number(end)?)),
        (true, true) => Err(invalid(header)),
    }
}

impl RangeSpec {
    /// Resolve against an object of `total` bytes.
    ///
    /// An end past the object is clamped; a start past the object, an empty
    /// suffix or an empty object is not satisfiable.
    pub fn resolve(self, total: u64) -> Result<ByteRange> {
        let unsatisfiable =
            || DriveError::RangeNotSatisfiable(format!("{self:?} outside object of {total} bytes"));
        if total == 0 {
            return Err(unsatisfiable());
        }
        let last = total - 1;
        let (start, end) = match self {
            RangeSpec::FromTo(a, b) => (a, b.min(last)),
            RangeSpec::From(a) => (a, last),
            RangeSpec::Suffix(0) => return Err(unsatisfiable()),
            RangeSpec::Suffix(n) => (total.saturating_sub(n), last),
        };
        if start > last {
            return Err(unsatisfiable());
        }
        Ok(ByteRange { start, end, total })
    }
}

/// Parse and resolve an optional header in one step.
pub fn resolve_header(header: Option<&str>, total: u64) -> Result<Option<ByteRange>> {
    match header {
        None => Ok(None),
        Some(h) => parse_range(h)?.resolve(total).map(Some),
    }
}
