//! Byte-range resolution for `GetObject`.

use crate::error::{StorageError, StorageResult};

/// A concrete byte range within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRange {
    /// Offset of the first byte.
    pub start: u64,
    /// Number of bytes.
    pub length: u64,
}

impl ObjectRange {
    /// Offset one past the last byte.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// A range as requested by the client, before the object size is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRangeRequest {
    /// `bytes=start-end` or, with `end` absent, `bytes=start-`.
    Forward {
        /// First byte requested.
        start: u64,
        /// Last byte requested, inclusive.
        end: Option<u64>,
    },
    /// `bytes=-n`: the final `n` bytes.
    Suffix(u64),
}

impl ObjectRangeRequest {
    /// Resolve against an object of `size` bytes.
    ///
    /// ```
    /// use fakes3_storage::range::ObjectRangeRequest;
    ///
    /// let req = ObjectRangeRequest::Forward { start: 1, end: Some(6) };
    /// let range = req.resolve("contents", 8).unwrap();
    /// assert_eq!((range.start, range.length), (1, 6));
    /// ```
    pub fn resolve(&self, resource: &str, size: u64) -> StorageResult<ObjectRange> {
        let (start, length) = match *self {
            Self::Suffix(n) => {
                let n = n.min(size);
                (size - n, n)
            }
            Self::Forward { start, end } => match end {
                // A zero end with a non-zero start reads to the end.
                Some(0) if start > 0 => (start, size.saturating_sub(start)),
                Some(end) => {
                    let end = end.min(size.saturating_sub(1));
                    (start, (end + 1).saturating_sub(start))
                }
                None => (start, size.saturating_sub(start)),
            },
        };

        if start >= size || length == 0 {
            return Err(StorageError::InvalidRange {
                resource: resource.to_owned(),
            });
        }
        Ok(ObjectRange { start, length })
    }

    /// Parse a `Range` header value.
    ///
    /// Only the `bytes` unit and a single range are supported.
    ///
    /// ```
    /// use fakes3_storage::range::ObjectRangeRequest;
    ///
    /// assert_eq!(
    ///     ObjectRangeRequest::parse_header("bytes=-5").unwrap(),
    ///     ObjectRangeRequest::Suffix(5)
    /// );
    /// assert!(ObjectRangeRequest::parse_header("bytes=0-1,3-4").is_err());
    /// ```
    pub fn parse_header(header: &str) -> StorageResult<Self> {
        let invalid = || StorageError::invalid_argument("Range", format!("invalid range header: {header}"));

        let spec = header.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        if spec.contains(',') {
            return Err(StorageError::not_implemented("multiple ranges"));
        }
        let (first, last) = spec.split_once('-').ok_or_else(invalid)?;
        let (first, last) = (first.trim(), last.trim());
        let parse = |s: &str| s.parse::<u64>().map_err(|_| invalid());

        match (first.is_empty(), last.is_empty()) {
            (true, true) => Err(invalid()),
            (true, false) => Ok(Self::Suffix(parse(last)?)),
            (false, true) => Ok(Self::Forward {
                start: parse(first)?,
                end: None,
            }),
            (false, false) => {
                let start = parse(first)?;
                let end = parse(last)?;
                if start > end {
                    return Err(invalid());
                }
                Ok(Self::Forward {
                    start,
                    end: Some(end),
                })
            }
        }
    }
}
