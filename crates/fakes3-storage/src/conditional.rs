//! Conditional write evaluation (`If-Match` / `If-None-Match`).

use crate::checksums::normalize_etag;
use crate::error::{StorageError, StorageResult};

/// Preconditions attached to a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutConditions {
    /// `If-Match`: an ETag or `*`.
    pub if_match: Option<String>,
    /// `If-None-Match`: an ETag or `*`.
    pub if_none_match: Option<String>,
}

impl PutConditions {
    /// Require that the object exists with `etag` (or at all, for `*`).
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
            if_none_match: None,
        }
    }

    /// Require that the object does not exist (for `*`) or differs from `etag`.
    pub fn if_none_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: None,
            if_none_match: Some(etag.into()),
        }
    }

    /// Whether no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }

    /// Evaluate against the ETag of the object currently stored at `key`,
    /// `None` when there is no such object.
    ///
    /// ```
    /// use fakes3_storage::conditional::PutConditions;
    ///
    /// let cond = PutConditions::if_none_match("*");
    /// assert!(cond.check("k", None).is_ok());
    /// assert!(cond.check("k", Some("\"abc\"")).is_err());
    /// ```
    pub fn check(&self, key: &str, current_etag: Option<&str>) -> StorageResult<()> {
        if let Some(expected) = self.if_match.as_deref() {
            if !if_match_holds(expected, current_etag) {
                return Err(StorageError::PreconditionFailed { key: key.to_owned() });
            }
        }
        if let Some(expected) = self.if_none_match.as_deref() {
            if !if_none_match_holds(expected, current_etag) {
                return Err(StorageError::PreconditionFailed { key: key.to_owned() });
            }
        }
        Ok(())
    }
}

/// Evaluate an optional set of conditions.
pub(crate) fn check_conditions(
    conditions: Option<&PutConditions>,
    key: &str,
    current_etag: Option<&str>,
) -> StorageResult<()> {
    conditions.map_or(Ok(()), |c| c.check(key, current_etag))
}

fn if_match_holds(expected: &str, current: Option<&str>) -> bool {
    let Some(current) = current else {
        return false;
    };
    let expected = expected.trim();
    expected == "*" || normalize_etag(expected) == normalize_etag(current)
}

fn if_none_match_holds(expected: &str, current: Option<&str>) -> bool {
    let Some(current) = current else {
        return true;
    };
    let expected = expected.trim();
    expected != "*" && normalize_etag(expected) != normalize_etag(current)
}
