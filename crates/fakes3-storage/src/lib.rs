//! Storage core of fakes3, a local S3 emulator.
//!
//! This crate holds everything beneath the HTTP layer: the capability-based
//! backend contract, three storage engines, and the protocol semantics
//! layered on top of plain blob storage (prefix listing, multipart
//! assembly, versioning with delete markers, conditional writes and byte
//! ranges).
//!
//! # Architecture
//!
//! ```text
//! protocol layer (routing, XML, auth; not in this crate)
//!        |
//!        v
//!   FakeS3 (validation, auto-bucket, Content-MD5, capability dispatch)
//!        |
//!        v
//!   dyn Backend ──as_versioned()──> dyn VersionedBackend
//!        |      └─as_multipart()──> dyn MultipartBackend
//!        v
//!   MemoryBackend | EmbeddedBackend | MultiBucketBackend | SingleBucketBackend
//! ```
//!
//! | Engine | Versioning | Multipart | Paginated listing |
//! |--------|------------|-----------|-------------------|
//! | [`MemoryBackend`] | yes | yes | yes |
//! | [`EmbeddedBackend`] | no | yes | yes |
//! | [`MultiBucketBackend`] | no | staged by [`FakeS3`] | no |
//! | [`SingleBucketBackend`] | no | staged by [`FakeS3`] | no |

pub mod backend;
pub mod checksums;
pub mod conditional;
pub mod embedded;
pub mod error;
pub mod fs;
pub mod listing;
pub mod mem;
pub mod multipart;
pub mod prefix;
pub mod range;
pub mod service;
pub mod types;
pub mod validation;
pub mod version_id;

pub use backend::{Backend, MultipartBackend, VersionedBackend};
pub use embedded::EmbeddedBackend;
pub use error::{ErrorKind, StorageError, StorageResult};
pub use fs::{DiskFs, FileSystem, MemFs, MultiBucketBackend, SingleBucketBackend};
pub use mem::MemoryBackend;
pub use service::{CopySource, FakeS3, PutObjectOptions, open_backend};
