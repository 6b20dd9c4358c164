//! A filesystem tree holding one directory per bucket.

use std::io::{self, Read};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use super::meta::MetaStore;
use super::objects::FsObjects;
use super::vfs::{FileSystem, join};
use crate::backend::Backend;
use crate::conditional::PutConditions;
use crate::error::{StorageError, StorageResult, internal};
use crate::listing::ListBucketPage;
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    BucketInfo, Metadata, MultiDeleteResult, Object, ObjectDeleteResult, ObjectList,
    PutObjectResult,
};
use crate::validation::validate_bucket_name;

const BUCKETS_DIR: &str = "buckets";
const METADATA_DIR: &str = "metadata";

/// Stores bucket `b` below `buckets/b` and its side-cars below
/// `metadata/b`, both on the same [`FileSystem`].
#[derive(Debug)]
pub struct MultiBucketBackend {
    objects: FsObjects,
    lock: Mutex<()>,
}

impl MultiBucketBackend {
    /// Use `fs`, creating the top-level directories if needed.
    pub fn new(fs: Arc<dyn FileSystem>) -> StorageResult<Self> {
        for dir in [BUCKETS_DIR, METADATA_DIR] {
            fs.create_dir_all(dir)
                .map_err(internal("creating storage layout"))?;
        }
        Ok(Self {
            objects: FsObjects {
                meta: MetaStore::new(Arc::clone(&fs), METADATA_DIR),
                data: fs,
            },
            lock: Mutex::new(()),
        })
    }

    fn base(bucket: &str) -> String {
        join(&[BUCKETS_DIR, bucket])
    }

    fn exists_locked(&self, bucket: &str) -> StorageResult<bool> {
        match self.objects.data.stat(&Self::base(bucket)) {
            Ok(stat) => Ok(stat.is_dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(internal("reading bucket directory")(e)),
        }
    }

    /// Resolve the directory of an existing bucket.
    fn require(&self, bucket: &str) -> StorageResult<String> {
        if self.exists_locked(bucket)? {
            Ok(Self::base(bucket))
        } else {
            Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }
}

impl Backend for MultiBucketBackend {
    fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let _guard = self.lock.lock();
        let entries = self
            .objects
            .data
            .read_dir(BUCKETS_DIR)
            .map_err(internal("listing buckets"))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.stat.is_dir && validate_bucket_name(&e.name).is_ok())
            .map(|e| BucketInfo {
                name: e.name,
                creation_date: e.stat.modified,
            })
            .collect())
    }

    fn create_bucket(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        if self.exists_locked(name)? {
            return Err(StorageError::BucketAlreadyExists {
                bucket: name.to_owned(),
            });
        }
        self.objects
            .data
            .create_dir_all(&Self::base(name))
            .map_err(internal("creating bucket directory"))?;
        info!(bucket = name, "created bucket");
        Ok(())
    }

    fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let base = self.require(name)?;
        let entries = self
            .objects
            .data
            .read_dir(&base)
            .map_err(internal("listing bucket directory"))?;
        if !entries.is_empty() {
            return Err(StorageError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }
        self.objects
            .data
            .remove_dir(&base)
            .map_err(internal("removing bucket directory"))?;
        self.objects.meta.delete_bucket(name)?;
        info!(bucket = name, "deleted bucket");
        Ok(())
    }

    fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        self.exists_locked(name)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        self.objects.get(&base, bucket, key, range, true)
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        self.objects.get(&base, bucket, key, None, false)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
        input: &mut dyn Read,
        size: u64,
        conditions: Option<&PutConditions>,
    ) -> StorageResult<PutObjectResult> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        self.objects
            .put(&base, bucket, key, metadata, input, size, conditions)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectDeleteResult> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        self.objects.delete(&base, bucket, key)?;
        Ok(ObjectDeleteResult::default())
    }

    fn delete_multi(&self, bucket: &str, keys: &[String]) -> StorageResult<MultiDeleteResult> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        Ok(self.objects.delete_multi(&base, bucket, keys))
    }

    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        let _guard = self.lock.lock();
        let base = self.require(bucket)?;
        self.objects.list(&base, bucket, prefix, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::vfs::{DiskFs, MemFs};

    fn put(backend: &MultiBucketBackend, bucket: &str, key: &str, body: &[u8]) {
        let mut input = body;
        backend
            .put_object(bucket, key, Metadata::new(), &mut input, body.len() as u64, None)
            .unwrap();
    }

    #[test]
    fn test_should_manage_bucket_lifecycle() {
        let fs = Arc::new(MemFs::new());
        let backend = MultiBucketBackend::new(fs.clone()).unwrap();
        backend.create_bucket("alpha").unwrap();
        assert_eq!(
            backend.create_bucket("alpha").unwrap_err().code(),
            "BucketAlreadyExists"
        );

        put(&backend, "alpha", "dir/obj", b"data");
        assert!(fs.stat("metadata/alpha").unwrap().is_dir);
        assert_eq!(
            backend.delete_bucket("alpha").unwrap_err().code(),
            "BucketNotEmpty"
        );

        backend.delete_object("alpha", "dir/obj").unwrap();
        backend.delete_bucket("alpha").unwrap();
        assert!(!backend.bucket_exists("alpha").unwrap());
        assert!(fs.stat("metadata/alpha").is_err());
        assert_eq!(
            backend.delete_bucket("alpha").unwrap_err().code(),
            "NoSuchBucket"
        );
    }

    #[test]
    fn test_should_skip_invalid_directory_names() {
        let fs = Arc::new(MemFs::new());
        let backend = MultiBucketBackend::new(fs.clone()).unwrap();
        backend.create_bucket("good").unwrap();
        fs.create_dir_all("buckets/Not_A_Bucket").unwrap();
        let names: Vec<_> = backend
            .list_buckets()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["good"]);
    }

    #[test]
    fn test_should_store_payloads_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(DiskFs::new(dir.path()).unwrap());
        let backend = MultiBucketBackend::new(fs).unwrap();
        backend.create_bucket("disk").unwrap();
        put(&backend, "disk", "a/b.txt", b"contents");

        let on_disk = std::fs::read(dir.path().join("buckets/disk/a/b.txt")).unwrap();
        assert_eq!(on_disk, b"contents");

        let range = ObjectRangeRequest::Forward {
            start: 1,
            end: Some(6),
        };
        let obj = backend.get_object("disk", "a/b.txt", Some(&range)).unwrap();
        assert_eq!(obj.body.read_all().unwrap(), b"ontent");
    }

    #[test]
    fn test_should_serve_fetched_body_across_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(DiskFs::new(dir.path()).unwrap());
        let backend = MultiBucketBackend::new(fs).unwrap();
        backend.create_bucket("torn").unwrap();
        put(&backend, "torn", "k", b"aaaaaaaa");

        let fetched = backend.get_object("torn", "k", None).unwrap();
        put(&backend, "torn", "k", b"bb");

        assert_eq!(fetched.size, 8);
        assert_eq!(fetched.hash, crate::checksums::md5_digest(b"aaaaaaaa"));
        assert_eq!(fetched.body.read_all().unwrap(), b"aaaaaaaa");
        let current = backend.get_object("torn", "k", None).unwrap();
        assert_eq!(current.body.read_all().unwrap(), b"bb");
    }

    #[test]
    fn test_should_pick_up_files_changed_externally() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Arc::new(DiskFs::new(dir.path()).unwrap());
        let backend = MultiBucketBackend::new(fs).unwrap();
        backend.create_bucket("ext").unwrap();
        put(&backend, "ext", "f", b"one");

        std::fs::write(dir.path().join("buckets/ext/f"), b"twotwo").unwrap();
        let obj = backend.head_object("ext", "f").unwrap();
        assert_eq!(obj.size, 6);
        assert_eq!(obj.hash, crate::checksums::md5_digest(b"twotwo"));
    }
}
