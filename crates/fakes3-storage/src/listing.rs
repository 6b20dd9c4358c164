//! Paginated listing over keys visited in sort order.
//!
//! Engines feed keys in ascending order into an [`ObjectListing`] or a
//! [`VersionListing`], which apply prefix/delimiter grouping, the marker and
//! the page size.

use crate::error::{StorageError, StorageResult};
use crate::prefix::Prefix;
use crate::types::{Content, ListBucketVersionsResult, ObjectList, VersionId, VersionItem};

// ---------------------------------------------------------------------------
// Page parameters
// ---------------------------------------------------------------------------

/// Pagination parameters of `ListBucket`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketPage {
    /// Resume after this key.
    pub marker: Option<String>,
    /// Maximum number of entries; `None` is unlimited.
    pub max_keys: Option<usize>,
}

impl ListBucketPage {
    /// Whether this requests a single unbounded page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marker.is_none() && self.max_keys.is_none()
    }
}

/// Pagination parameters of `ListBucketVersions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketVersionsPage {
    /// Resume at this key.
    pub key_marker: Option<String>,
    /// Resume after this version of `key_marker`.
    pub version_id_marker: Option<VersionId>,
    /// Maximum number of entries; `None` is unlimited.
    pub max_keys: Option<usize>,
}

impl ListBucketVersionsPage {
    /// Reject a version-id marker without a key marker.
    pub fn validate(&self) -> StorageResult<()> {
        if self.version_id_marker.is_some() && self.key_marker.is_none() {
            return Err(StorageError::invalid_argument(
                "version-id-marker",
                "A version-id marker cannot be specified without a key marker",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ObjectListing
// ---------------------------------------------------------------------------

/// Accumulates one page of `ListBucket`.
#[derive(Debug)]
pub struct ObjectListing<'a> {
    prefix: &'a Prefix,
    marker: Option<&'a str>,
    max_keys: Option<usize>,
    list: ObjectList,
    last: Option<String>,
}

impl<'a> ObjectListing<'a> {
    /// Start a page.
    #[must_use]
    pub fn new(prefix: &'a Prefix, page: &'a ListBucketPage) -> Self {
        Self {
            prefix,
            marker: page.marker.as_deref(),
            max_keys: page.max_keys,
            list: ObjectList::default(),
            last: None,
        }
    }

    /// Key to seek to before iterating; keys at or before it are skipped.
    #[must_use]
    pub fn marker(&self) -> Option<&'a str> {
        self.marker
    }

    /// Offer the next key in sort order. `content` is only built when the key
    /// lands in `Contents`. Returns `false` once the page is full.
    pub fn offer(&mut self, key: &str, content: impl FnOnce() -> Content) -> bool {
        if self.marker.is_some_and(|m| key <= m) {
            return true;
        }
        let Some(found) = self.prefix.matches(key) else {
            return true;
        };

        if found.common_prefix {
            let part = found.matched_part;
            if self.marker.is_some_and(|m| part.as_str() <= m)
                || self.list.common_prefixes.contains(&part)
            {
                return true;
            }
            if self.is_full() {
                self.list.is_truncated = true;
                return false;
            }
            self.last = Some(part.clone());
            self.list.add_prefix(part);
        } else {
            if self.is_full() {
                self.list.is_truncated = true;
                return false;
            }
            self.last = Some(key.to_owned());
            self.list.add(content());
        }
        true
    }

    fn is_full(&self) -> bool {
        self.max_keys.is_some_and(|max| self.list.len() >= max)
    }

    /// Finish the page.
    #[must_use]
    pub fn finish(mut self) -> ObjectList {
        if self.list.is_truncated {
            self.list.next_marker = self.last;
        }
        self.list
    }
}

// ---------------------------------------------------------------------------
// VersionListing
// ---------------------------------------------------------------------------

/// Accumulates one page of `ListBucketVersions`.
#[derive(Debug)]
pub struct VersionListing<'a> {
    prefix: &'a Prefix,
    page: &'a ListBucketVersionsPage,
    result: ListBucketVersionsResult,
    last: Option<(String, Option<VersionId>)>,
}

impl<'a> VersionListing<'a> {
    /// Start a page.
    #[must_use]
    pub fn new(prefix: &'a Prefix, page: &'a ListBucketVersionsPage) -> Self {
        Self {
            prefix,
            page,
            result: ListBucketVersionsResult::default(),
            last: None,
        }
    }

    /// Key to seek to before iterating.
    #[must_use]
    pub fn key_marker(&self) -> Option<&'a str> {
        self.page.key_marker.as_deref()
    }

    /// Offer all versions of the next key in sort order, newest first.
    /// Returns `false` once the page is full.
    pub fn offer(&mut self, key: &str, versions: impl IntoIterator<Item = VersionItem>) -> bool {
        let key_marker = self.page.key_marker.as_deref();
        let mut skip_until = None;
        match (key_marker, &self.page.version_id_marker) {
            (Some(m), _) if key < m => return true,
            (Some(m), None) if key == m => return true,
            (Some(m), Some(v)) if key == m => skip_until = Some(v),
            _ => {}
        }

        let Some(found) = self.prefix.matches(key) else {
            return true;
        };

        if found.common_prefix {
            let part = found.matched_part;
            if key_marker.is_some_and(|m| part.as_str() <= m)
                || self.result.common_prefixes.contains(&part)
            {
                return true;
            }
            if self.is_full() {
                self.result.is_truncated = true;
                return false;
            }
            self.last = Some((part.clone(), None));
            self.result.common_prefixes.push(part);
            return true;
        }

        for item in versions {
            if let Some(marker) = skip_until {
                if item.version_id == *marker {
                    skip_until = None;
                }
                continue;
            }
            if self.is_full() {
                self.result.is_truncated = true;
                return false;
            }
            self.last = Some((item.key.clone(), Some(item.version_id.clone())));
            self.result.versions.push(item);
        }
        true
    }

    fn is_full(&self) -> bool {
        self.page
            .max_keys
            .is_some_and(|max| self.result.versions.len() + self.result.common_prefixes.len() >= max)
    }

    /// Finish the page.
    #[must_use]
    pub fn finish(mut self) -> ListBucketVersionsResult {
        if self.result.is_truncated {
            if let Some((key, version)) = self.last {
                self.result.next_key_marker = Some(key);
                self.result.next_version_id_marker = version;
            }
        }
        self.result
    }
}
