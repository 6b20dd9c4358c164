//! Object operations shared by the single- and multi-bucket engines.
//!
//! Both engines keep a bucket's objects as files below a base directory of
//! a [`FileSystem`]; they differ only in where that directory is and in how
//! buckets come and go.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tracing::{debug, trace};

use super::meta::{MetaStore, SideCar};
use super::vfs::{FileStat, FileSystem, join, parent};
use crate::checksums::{format_etag, md5_digest, read_exact_size};
use crate::conditional::{PutConditions, check_conditions};
use crate::error::{StorageError, StorageResult, internal};
use crate::listing::{ListBucketPage, ObjectListing};
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    Content, DeletedObject, Metadata, MultiDeleteResult, Object, ObjectBody, ObjectList,
    PutObjectResult,
};

/// Reject keys that cannot map onto a relative file path. This includes
/// folder placeholders such as `photos/`, which would name a directory.
pub fn validate_fs_key(key: &str) -> StorageResult<()> {
    let bad = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::invalid_argument(
            key,
            "key cannot be stored as a file path",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(super) struct FsObjects {
    pub data: Arc<dyn FileSystem>,
    pub meta: MetaStore,
}

impl FsObjects {
    /// Stat `key` below `base`, treating directories as missing.
    fn stat_object(&self, base: &str, key: &str) -> StorageResult<Option<(String, FileStat)>> {
        let file = join(&[base, key]);
        match self.data.stat(&file) {
            Ok(stat) if !stat.is_dir => Ok(Some((file, stat))),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(e) => Err(internal("reading object attributes")(e)),
        }
    }

    fn load(&self, bucket: &str, key: &str, file: &str, stat: &FileStat) -> StorageResult<SideCar> {
        self.meta.load(self.data.as_ref(), bucket, key, file, stat)
    }

    pub fn get(
        &self,
        base: &str,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
        with_body: bool,
    ) -> StorageResult<Object> {
        validate_fs_key(key)?;
        let (file, stat) = self
            .stat_object(base, key)?
            .ok_or_else(|| StorageError::NoSuchKey { key: key.to_owned() })?;
        let record = self.load(bucket, key, &file, &stat)?;
        let resolved = range.map(|r| r.resolve(key, stat.size)).transpose()?;

        let body = if with_body {
            let mut reader = self.data.open(&file).map_err(internal("opening object file"))?;
            match resolved {
                Some(r) => {
                    reader
                        .seek(SeekFrom::Start(r.start))
                        .map_err(internal("seeking object file"))?;
                    ObjectBody::new(reader.take(r.length))
                }
                None => ObjectBody::new(reader.take(stat.size)),
            }
        } else {
            ObjectBody::empty()
        };

        Ok(Object {
            name: key.to_owned(),
            hash: record.raw_hash()?,
            metadata: record.meta,
            size: stat.size,
            last_modified: stat.modified,
            range: resolved,
            version_id: None,
            is_delete_marker: false,
            body,
        })
    }

    /// Fail when a parent segment of `key` is an existing file.
    fn check_parents(&self, base: &str, key: &str) -> StorageResult<()> {
        let mut dir = String::new();
        let segments: Vec<&str> = key.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            dir = join(&[&dir, segment]);
            if let Ok(stat) = self.data.stat(&join(&[base, &dir])) {
                if !stat.is_dir {
                    return Err(StorageError::invalid_argument(
                        key,
                        format!("{dir} is an object, not a prefix"),
                    ));
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        base: &str,
        bucket: &str,
        key: &str,
        metadata: Metadata,
        input: &mut dyn Read,
        size: u64,
        conditions: Option<&PutConditions>,
    ) -> StorageResult<PutObjectResult> {
        validate_fs_key(key)?;
        self.check_parents(base, key)?;
        let file = join(&[base, key]);
        if self.data.stat(&file).is_ok_and(|s| s.is_dir) {
            return Err(StorageError::invalid_argument(
                key,
                "key collides with an existing prefix",
            ));
        }

        if conditions.is_some_and(|c| !c.is_empty()) {
            let current = match self.stat_object(base, key)? {
                Some((file, stat)) => Some(self.load(bucket, key, &file, &stat)?.etag()),
                None => None,
            };
            check_conditions(conditions, key, current.as_deref())?;
        }

        let data = read_exact_size(key, input, size)?;
        let hash = md5_digest(&data);

        self.data
            .create_dir_all(parent(&file))
            .map_err(internal("creating object directory"))?;
        self.data
            .write(&file, &data)
            .map_err(internal("writing object file"))?;
        let stat = self.data.stat(&file).map_err(internal("reading object attributes"))?;

        self.meta.save(
            bucket,
            key,
            &SideCar {
                file,
                mod_time: stat.modified,
                size: stat.size,
                hash: hex::encode(&hash),
                meta: metadata,
            },
        )?;
        debug!(bucket, key, size, "stored object file");

        Ok(PutObjectResult {
            version_id: None,
            etag: format_etag(&hash),
        })
    }

    /// Delete `key` and prune the directories it leaves empty.
    pub fn delete(&self, base: &str, bucket: &str, key: &str) -> StorageResult<()> {
        validate_fs_key(key)?;
        if let Some((file, _)) = self.stat_object(base, key)? {
            match self.data.remove_file(&file) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    return Err(internal("deleting object file")(e));
                }
                _ => {}
            }
            self.prune(base, parent(&file));
        }
        self.meta.delete(bucket, key)?;
        debug!(bucket, key, "deleted object file");
        Ok(())
    }

    fn prune(&self, base: &str, mut dir: &str) {
        while dir.len() > base.len() && dir.starts_with(base) {
            let empty = self.data.read_dir(dir).is_ok_and(|entries| entries.is_empty());
            if !empty || self.data.remove_dir(dir).is_err() {
                break;
            }
            trace!(dir, "pruned empty directory");
            dir = parent(dir);
        }
    }

    pub fn delete_multi(&self, base: &str, bucket: &str, keys: &[String]) -> MultiDeleteResult {
        let mut result = MultiDeleteResult::default();
        for key in keys {
            match self.delete(base, bucket, key) {
                Ok(()) => result.deleted.push(DeletedObject {
                    key: key.clone(),
                    version_id: None,
                    delete_marker: false,
                    delete_marker_version_id: None,
                }),
                Err(e) => result.push_error(key, None, &e),
            }
        }
        result
    }

    pub fn list(
        &self,
        base: &str,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        if !page.is_empty() {
            return Err(StorageError::not_implemented("pagination"));
        }
        match prefix.file_prefix() {
            Some((dir, part)) => self.list_directory(base, bucket, dir, part),
            None => self.list_walk(base, bucket, prefix),
        }
    }

    fn content(&self, bucket: &str, key: &str, file: &str, stat: &FileStat) -> StorageResult<Content> {
        let record = self.load(bucket, key, file, stat)?;
        Ok(Content {
            key: key.to_owned(),
            last_modified: stat.modified,
            etag: record.etag(),
            size: stat.size,
        })
    }

    /// List one directory: files become contents, subdirectories common
    /// prefixes.
    fn list_directory(&self, base: &str, bucket: &str, dir: &str, part: &str) -> StorageResult<ObjectList> {
        let mut list = ObjectList::default();
        let entries = match self.data.read_dir(&join(&[base, dir])) {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(list);
            }
            Err(e) => return Err(internal("listing directory")(e)),
        };

        for entry in entries.iter().filter(|e| e.name.starts_with(part)) {
            let key = join(&[dir, &entry.name]);
            if entry.stat.is_dir {
                list.add_prefix(format!("{key}/"));
            } else {
                let file = join(&[base, &key]);
                list.add(self.content(bucket, &key, &file, &entry.stat)?);
            }
        }
        trace!(bucket, dir, part, entries = list.len(), "listed directory");
        Ok(list)
    }

    /// Walk the whole bucket and classify every key against `prefix`.
    fn list_walk(&self, base: &str, bucket: &str, prefix: &Prefix) -> StorageResult<ObjectList> {
        let mut files = Vec::new();
        self.walk(base, "", &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let page = ListBucketPage::default();
        let mut listing = ObjectListing::new(prefix, &page);
        for (key, stat) in &files {
            let content = match prefix.matches(key) {
                Some(m) if !m.common_prefix => {
                    Some(self.content(bucket, key, &join(&[base, key]), stat)?)
                }
                _ => None,
            };
            listing.offer(key, || content.unwrap_or_default());
        }
        trace!(bucket, %prefix, files = files.len(), "walked bucket");
        Ok(listing.finish())
    }

    fn walk(&self, base: &str, dir: &str, out: &mut Vec<(String, FileStat)>) -> StorageResult<()> {
        let entries = match self.data.read_dir(&join(&[base, dir])) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(internal("walking bucket")(e)),
        };
        for entry in entries {
            let key = join(&[dir, &entry.name]);
            if entry.stat.is_dir {
                self.walk(base, &key, out)?;
            } else {
                out.push((key, entry.stat));
            }
        }
        Ok(())
    }
}
