//! HTTP `Range` header handling for single byte ranges.

/// A parsed `bytes=<start>-<end>?` request. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// A byte range validated against an object size. Both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for an object of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Parse a `Range` header value.
///
/// Only a single `bytes=<start>-<end>?` range is understood; suffix ranges,
/// multiple ranges and other units yield `None`.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;

    let start = start.trim();
    if start.is_empty() {
        return None;
    }
    let start: u64 = start.parse().ok()?;

    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };

    Some(ByteRange { start, end })
}

impl ByteRange {
    /// Validate against an object of `size` bytes. An open end means
    /// `size - 1`; a range starting or ending past the object, or ending
    /// before it starts, is rejected.
    pub fn resolve(&self, size: u64) -> Option<ResolvedRange> {
        if self.start >= size {
            return None;
        }
        let end = self.end.unwrap_or(size - 1);
        if end >= size || self.start > end {
            return None;
        }
        Some(ResolvedRange {
            start: self.start,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_closed_and_open_ranges() {
        assert_eq!(
            parse_range_header("bytes=100-199"),
            Some(ByteRange {
                start: 100,
                end: Some(199)
            })
        );
        assert_eq!(
            parse_range_header("bytes=0-"),
            Some(ByteRange {
                start: 0,
                end: None
            })
        );
    }

    #[test]
    fn test_parse_rejects_other_forms() {
        for value in ["bytes=-500", "bytes=a-b", "items=0-1", "bytes=0-1,5-9", "", "bytes="] {
            assert_eq!(parse_range_header(value), None, "{value:?}");
        }
    }

    #[test]
    fn test_resolve_against_size() {
        let open = ByteRange {
            start: 0,
            end: None,
        };
        let resolved = open.resolve(1000).unwrap();
        assert_eq!((resolved.start, resolved.end, resolved.len()), (0, 999, 1000));
        assert_eq!(resolved.content_range(1000), "bytes 0-999/1000");

        let closed = ByteRange {
            start: 100,
            end: Some(199),
        };
        assert_eq!(closed.resolve(1000).unwrap().len(), 100);
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        let r = |start, end| ByteRange { start, end };
        assert_eq!(r(1000, None).resolve(1000), None);
        assert_eq!(r(0, Some(1000)).resolve(1000), None);
        assert_eq!(r(10, Some(5)).resolve(1000), None);
        assert_eq!(r(0, None).resolve(0), None);
        assert!(r(999, Some(999)).resolve(1000).is_some());
    }
}
