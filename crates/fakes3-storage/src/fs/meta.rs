//! Side-car metadata for the filesystem engines.
//!
//! The digest and user metadata of an object live in a JSON record named
//! after the MD5 of the object key, so key length and escaping never matter.
//! A record whose size or modification time disagrees with the file is
//! recomputed from the file on the next read.

use std::io::{self, Read};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::vfs::{FileStat, FileSystem, join, parent};
use crate::checksums::{compute_md5, md5_digest};
use crate::error::{StorageResult, internal};
use crate::types::Metadata;

/// Persisted side-car record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideCar {
    /// Path of the payload in the data filesystem.
    pub file: String,
    /// Modification time of the payload when the record was written.
    pub mod_time: DateTime<Utc>,
    /// Size of the payload when the record was written.
    pub size: u64,
    /// Hex MD5 of the payload.
    pub hash: String,
    /// User metadata.
    #[serde(default)]
    pub meta: Metadata,
}

impl SideCar {
    fn is_current(&self, stat: &FileStat) -> bool {
        !self.hash.is_empty() && self.size == stat.size && self.mod_time == stat.modified
    }

    /// Raw MD5 digest.
    pub fn raw_hash(&self) -> StorageResult<Vec<u8>> {
        hex::decode(&self.hash).map_err(internal("decoding side-car hash"))
    }

    /// Quoted ETag.
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.hash)
    }
}

/// Side-car records stored in a [`FileSystem`], below `root`.
#[derive(Debug, Clone)]
pub struct MetaStore {
    fs: Arc<dyn FileSystem>,
    root: String,
}

impl MetaStore {
    /// Store records in `fs` below `root`.
    pub fn new(fs: Arc<dyn FileSystem>, root: &str) -> Self {
        Self {
            fs,
            root: root.to_owned(),
        }
    }

    fn path(&self, bucket: &str, key: &str) -> String {
        let name = format!("{}.json", compute_md5(key.as_bytes()));
        join(&[&self.root, bucket, &name])
    }

    fn read(&self, path: &str) -> StorageResult<Option<SideCar>> {
        let mut raw = Vec::new();
        match self.fs.open(path) {
            Ok(mut f) => {
                f.read_to_end(&mut raw).map_err(internal("reading side-car record"))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(internal("opening side-car record")(e)),
        }
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path, error = %e, "discarding unreadable side-car record");
                Ok(None)
            }
        }
    }

    /// Load the record of `key`, recomputing the digest from `data` when the
    /// record is missing or stale.
    pub fn load(
        &self,
        data: &dyn FileSystem,
        bucket: &str,
        key: &str,
        file: &str,
        stat: &FileStat,
    ) -> StorageResult<SideCar> {
        let path = self.path(bucket, key);
        let stored = self.read(&path)?;
        if let Some(record) = stored.as_ref().filter(|r| r.is_current(stat)) {
            return Ok(record.clone());
        }

        let mut payload = Vec::new();
        data.open(file)
            .and_then(|mut f| f.read_to_end(&mut payload))
            .map_err(internal("hashing object file"))?;
        let record = SideCar {
            file: file.to_owned(),
            mod_time: stat.modified,
            size: payload.len() as u64,
            hash: hex::encode(md5_digest(&payload)),
            meta: stored.map(|r| r.meta).unwrap_or_default(),
        };
        debug!(bucket, key, "recomputed side-car record");
        self.save(bucket, key, &record)?;
        Ok(record)
    }

    /// Write the record of `key`.
    pub fn save(&self, bucket: &str, key: &str, record: &SideCar) -> StorageResult<()> {
        let path = self.path(bucket, key);
        let raw = serde_json::to_vec(record).map_err(internal("encoding side-car record"))?;
        self.fs
            .create_dir_all(parent(&path))
            .map_err(internal("creating side-car directory"))?;
        self.fs
            .write(&path, &raw)
            .map_err(internal("writing side-car record"))
    }

    /// Remove the record of `key`, if any.
    pub fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        match self.fs.remove_file(&self.path(bucket, key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(internal("deleting side-car record")(e))
            }
            _ => Ok(()),
        }
    }

    /// Remove every record of `bucket`.
    pub fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        match self.fs.remove_dir_all(&join(&[&self.root, bucket])) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(internal("deleting side-car directory")(e))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::vfs::MemFs;

    #[test]
    fn test_should_recompute_stale_record() {
        let data = MemFs::new();
        data.write("obj", b"first").unwrap();
        let store = MetaStore::new(Arc::new(MemFs::new()), "");

        let stat = data.stat("obj").unwrap();
        let mut meta = Metadata::new();
        meta.insert("color".into(), "blue".into());
        store
            .save(
                "bucket",
                "obj",
                &SideCar {
                    file: "obj".into(),
                    mod_time: stat.modified,
                    size: stat.size,
                    hash: compute_md5(b"first"),
                    meta,
                },
            )
            .unwrap();

        // Changed behind our back.
        data.write("obj", b"second!").unwrap();
        let stat = data.stat("obj").unwrap();
        let record = store.load(&data, "bucket", "obj", "obj", &stat).unwrap();
        assert_eq!(record.hash, compute_md5(b"second!"));
        assert_eq!(record.size, 7);
        assert_eq!(record.meta["color"], "blue");
    }

    #[test]
    fn test_should_tolerate_corrupt_record() {
        let data = MemFs::new();
        data.write("obj", b"payload").unwrap();
        let meta_fs = Arc::new(MemFs::new());
        let store = MetaStore::new(meta_fs.clone(), "meta");
        let path = store.path("bucket", "obj");
        meta_fs.create_dir_all(parent(&path)).unwrap();
        meta_fs.write(&path, b"{not json").unwrap();

        let stat = data.stat("obj").unwrap();
        let record = store.load(&data, "bucket", "obj", "obj", &stat).unwrap();
        assert_eq!(record.hash, compute_md5(b"payload"));
        assert!(path.starts_with("meta/bucket/"));

        store.delete("bucket", "obj").unwrap();
        store.delete("bucket", "obj").unwrap();
        store.delete_bucket("bucket").unwrap();
        store.delete_bucket("bucket").unwrap();
    }
}
