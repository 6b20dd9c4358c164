//! Filesystem engines.
//!
//! Objects are plain files at their key's relative path, so existing trees
//! can be served and stored objects inspected with ordinary tools. Digests
//! and user metadata live in side-car records (see [`meta`]). Neither engine
//! paginates listings nor supports versioning or multipart uploads.

pub mod meta;
mod multi;
mod objects;
mod single;
pub mod vfs;

pub use multi::MultiBucketBackend;
pub use objects::validate_fs_key;
pub use single::SingleBucketBackend;
pub use vfs::{DiskFs, FileSystem, MemFs};
