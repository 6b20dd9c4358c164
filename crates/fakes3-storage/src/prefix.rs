//! Prefix and delimiter matching for bucket listings.
//!
//! This is a best-effort rendition of the grouping S3 performs:
//!
//! ```text
//!  $ aws s3 ls s3://my-bucket/AWSLogs
//!                             PRE AWSLogs/
//!  $ aws s3 ls s3://my-bucket/AWSLogs/
//!                             PRE 260839334643/
//!  $ aws s3 ls s3://my-bucket/AWSLogs/2608
//!                             PRE 260839334643/
//! ```

use std::fmt;

/// The `prefix` and `delimiter` parameters of a listing.
///
/// An absent prefix and an empty prefix differ: without a prefix every key
/// matches as content, while an empty prefix combined with a delimiter
/// groups keys under their first segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefix {
    /// Key prefix, if the request carried one.
    pub prefix: Option<String>,
    /// Delimiter, if the request carried a non-empty one.
    pub delimiter: Option<String>,
}

/// Classification of one key against a [`Prefix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// Whether the key belongs in `CommonPrefixes` rather than `Contents`.
    pub common_prefix: bool,
    /// The longest matched part of the key; the common prefix itself when
    /// `common_prefix` is set.
    pub matched_part: String,
}

impl Prefix {
    /// Build from optional request parameters. An empty delimiter is treated
    /// as absent.
    pub fn new(prefix: Option<&str>, delimiter: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(ToOwned::to_owned),
            delimiter: delimiter.filter(|d| !d.is_empty()).map(ToOwned::to_owned),
        }
    }

    /// Match every key.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this matches every key as content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefix.is_none()
    }

    /// Classify `key`, or `None` if it does not match.
    ///
    /// ```
    /// use fakes3_storage::prefix::Prefix;
    ///
    /// let p = Prefix::new(Some("foo"), Some("/"));
    /// let m = p.matches("foo/bar").unwrap();
    /// assert!(m.common_prefix);
    /// assert_eq!(m.matched_part, "foo/");
    /// assert!(p.matches("quux").is_none());
    /// ```
    #[must_use]
    pub fn matches(&self, key: &str) -> Option<PrefixMatch> {
        let Some(prefix) = self.prefix.as_deref() else {
            return Some(PrefixMatch {
                common_prefix: false,
                matched_part: key.to_owned(),
            });
        };

        let Some(delim) = self.delimiter.as_deref() else {
            return key.starts_with(prefix).then(|| PrefixMatch {
                common_prefix: false,
                matched_part: prefix.to_owned(),
            });
        };

        let key_parts: Vec<&str> = key.trim_start_matches(delim).split(delim).collect();
        let pre_parts: Vec<&str> = prefix.trim_start_matches(delim).split(delim).collect();
        if key_parts.len() < pre_parts.len() {
            return None;
        }

        let last = pre_parts.len() - 1;
        for (i, pre) in pre_parts.iter().enumerate() {
            let ok = if i == last {
                key_parts[i].starts_with(pre)
            } else {
                key_parts[i] == *pre
            };
            if !ok {
                return None;
            }
        }

        let mut matched = key_parts[..pre_parts.len()].join(delim);
        if key_parts.len() != pre_parts.len() {
            matched.push_str(delim);
        }

        Some(PrefixMatch {
            common_prefix: matched != key,
            matched_part: matched,
        })
    }

    /// Split a `/`-delimited prefix into its directory path and the partial
    /// name after the last `/`.
    ///
    /// Returns `None` unless a prefix is set and the delimiter is `/`. Used
    /// by the filesystem engines to start a walk in the narrowest directory.
    #[must_use]
    pub fn file_prefix(&self) -> Option<(&str, &str)> {
        if self.delimiter.as_deref() != Some("/") {
            return None;
        }
        let prefix = self.prefix.as_deref()?.trim_start_matches('/');
        Some(match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        })
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, &self.delimiter) {
            (None, _) => f.write_str("<prefix empty>"),
            (Some(p), Some(d)) => write!(f, "prefix:{p:?}, delim:{d:?}"),
            (Some(p), None) => write!(f, "prefix:{p:?}"),
        }
    }
}
