//! Storage error types.
//!
//! Defines [`StorageError`], one variant per S3 error code the storage core
//! can produce. The protocol layer renders these on the wire using
//! [`StorageError::code`] for the S3 error code, [`StorageError::kind`] to
//! pick a status class and [`StorageError::resource`] for the `<Resource>`
//! element.
//!
//! # Usage
//!
//! ```
//! use fakes3_storage::error::{ErrorKind, StorageError};
//!
//! let err = StorageError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.code(), "NoSuchBucket");
//! assert_eq!(err.resource(), Some("my-bucket"));
//! ```

use std::fmt;

/// Coarse classification of every storage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A bucket, key, version or upload is absent.
    NotFound,
    /// A bucket create collided with an existing bucket.
    AlreadyExists,
    /// A bucket delete found residual objects.
    NotEmpty,
    /// The request was malformed.
    InvalidArgument,
    /// A conditional write was rejected.
    PreconditionFailed,
    /// The engine lacks the capability.
    NotImplemented,
    /// Unexpected fault.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::NotEmpty => "not empty",
            Self::InvalidArgument => "invalid argument",
            Self::PreconditionFailed => "precondition failed",
            Self::NotImplemented => "not implemented",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    // -----------------------------------------------------------------------
    // Not found
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified version does not exist.
    #[error("The specified version does not exist: key={key}, version_id={version_id}")]
    NoSuchVersion {
        /// The key for the version.
        key: String,
        /// The version ID that was not found.
        version_id: String,
    },

    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    // -----------------------------------------------------------------------
    // Bucket state
    // -----------------------------------------------------------------------
    /// The requested bucket name is not available.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket is not empty and cannot be deleted.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------
    /// The specified bucket name is not valid.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        name: String,
        /// The reason for the error.
        reason: String,
    },

    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// The offending resource (key, header, parameter).
        resource: String,
        /// Description of the invalid argument.
        message: String,
    },

    /// The requested range is not satisfiable.
    #[error("The requested range is not satisfiable: {resource}")]
    InvalidRange {
        /// The object the range was applied to.
        resource: String,
    },

    /// The list of parts was not strictly ascending from 1.
    #[error("The list of parts was not in ascending order: {upload_id}")]
    InvalidPartOrder {
        /// The upload being completed.
        upload_id: String,
    },

    /// One or more of the specified parts could not be found.
    #[error("One or more of the specified parts could not be found: {upload_id} part {part_number}")]
    InvalidPart {
        /// The upload being completed.
        upload_id: String,
        /// The part that failed validation.
        part_number: u32,
    },

    /// The Content-MD5 you specified is invalid.
    #[error("The Content-MD5 you specified is not valid: {key}")]
    InvalidDigest {
        /// The object being written.
        key: String,
    },

    /// The Content-MD5 you specified did not match what we received.
    #[error("The Content-MD5 you specified did not match what we received: {key}")]
    BadDigest {
        /// The object being written.
        key: String,
    },

    /// The key is too long.
    #[error("Your key is too long: {size} bytes")]
    KeyTooLong {
        /// Length of the rejected key in bytes.
        size: usize,
    },

    /// The user metadata exceeds the configured size.
    #[error("Your metadata headers exceed the maximum allowed metadata size: {key}")]
    MetadataTooLarge {
        /// The object being written.
        key: String,
    },

    /// The body ended before the declared size was read.
    #[error("You did not provide the number of bytes specified by the Content-Length: {key}")]
    IncompleteBody {
        /// The object being written.
        key: String,
    },

    // -----------------------------------------------------------------------
    // Conditional request errors
    // -----------------------------------------------------------------------
    /// A precondition specified in the request was not met.
    #[error("At least one of the preconditions you specified did not hold: {key}")]
    PreconditionFailed {
        /// The object the condition was evaluated against.
        key: String,
    },

    // -----------------------------------------------------------------------
    // Feature / implementation errors
    // -----------------------------------------------------------------------
    /// The requested functionality is not implemented by this engine.
    #[error("A header you provided implies functionality that is not implemented: {feature}")]
    NotImplemented {
        /// The unsupported capability.
        feature: String,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Shorthand for [`StorageError::InvalidArgument`].
    pub fn invalid_argument(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`StorageError::NotImplemented`].
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::NoSuchVersion { .. }
            | Self::NoSuchUpload { .. } => ErrorKind::NotFound,
            Self::BucketAlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::BucketNotEmpty { .. } => ErrorKind::NotEmpty,
            Self::InvalidBucketName { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidPartOrder { .. }
            | Self::InvalidPart { .. }
            | Self::InvalidDigest { .. }
            | Self::BadDigest { .. }
            | Self::KeyTooLong { .. }
            | Self::MetadataTooLarge { .. }
            | Self::IncompleteBody { .. } => ErrorKind::InvalidArgument,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The S3 wire error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::NoSuchKey { .. } => "NoSuchKey",
            Self::NoSuchVersion { .. } => "NoSuchVersion",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            Self::BucketNotEmpty { .. } => "BucketNotEmpty",
            Self::InvalidBucketName { .. } => "InvalidBucketName",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InvalidRange { .. } => "InvalidRange",
            Self::InvalidPartOrder { .. } => "InvalidPartOrder",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidDigest { .. } => "InvalidDigest",
            Self::BadDigest { .. } => "BadDigest",
            Self::KeyTooLong { .. } => "KeyTooLongError",
            Self::MetadataTooLarge { .. } => "MetadataTooLarge",
            Self::IncompleteBody { .. } => "IncompleteBody",
            Self::PreconditionFailed { .. } => "PreconditionFailed",
            Self::NotImplemented { .. } => "NotImplemented",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The name of the offending resource, when there is one.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::NoSuchBucket { bucket }
            | Self::BucketAlreadyExists { bucket }
            | Self::BucketNotEmpty { bucket } => Some(bucket),
            Self::NoSuchKey { key }
            | Self::NoSuchVersion { key, .. }
            | Self::InvalidDigest { key }
            | Self::BadDigest { key }
            | Self::MetadataTooLarge { key }
            | Self::IncompleteBody { key }
            | Self::PreconditionFailed { key } => Some(key),
            Self::NoSuchUpload { upload_id }
            | Self::InvalidPartOrder { upload_id }
            | Self::InvalidPart { upload_id, .. } => Some(upload_id),
            Self::InvalidBucketName { name, .. } => Some(name),
            Self::InvalidArgument { resource, .. } | Self::InvalidRange { resource } => {
                Some(resource)
            }
            Self::NotImplemented { feature } => Some(feature),
            Self::KeyTooLong { .. } | Self::Internal(_) => None,
        }
    }
}

/// Wrap any error into [`StorageError::Internal`] with a short context line.
pub(crate) fn internal<E>(context: &'static str) -> impl FnOnce(E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| StorageError::Internal(anyhow::Error::new(e).context(context))
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
