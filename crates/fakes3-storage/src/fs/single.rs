//! A filesystem tree exposed as one fixed bucket.

use std::io::Read;
use std::sync::Arc;

use parking_lot::Mutex;

use super::meta::MetaStore;
use super::objects::FsObjects;
use super::vfs::{FileSystem, MemFs};
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

/// Serves the root of a [`FileSystem`] as the bucket `name`.
///
/// Buckets cannot be created or deleted. Side-car records go to a separate
/// filesystem, in memory unless one is supplied, so nothing is written next
/// to the served files.
#[derive(Debug)]
pub struct SingleBucketBackend {
    name: String,
    objects: FsObjects,
    lock: Mutex<()>,
}

impl SingleBucketBackend {
    /// Serve `data` as `name`, keeping side-cars in memory.
    pub fn new(name: &str, data: Arc<dyn FileSystem>) -> StorageResult<Self> {
        Self::with_meta(name, data, Arc::new(MemFs::new()))
    }

    /// Serve `data` as `name`, keeping side-cars in `meta`.
    pub fn with_meta(
        name: &str,
        data: Arc<dyn FileSystem>,
        meta: Arc<dyn FileSystem>,
    ) -> StorageResult<Self> {
        validate_bucket_name(name)?;
        Ok(Self {
            name: name.to_owned(),
            objects: FsObjects {
                data,
                meta: MetaStore::new(meta, ""),
            },
            lock: Mutex::new(()),
        })
    }

    fn check(&self, bucket: &str) -> StorageResult<()> {
        if bucket == self.name {
            Ok(())
        } else {
            Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }
}

impl Backend for SingleBucketBackend {
    fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let _guard = self.lock.lock();
        let stat = self
            .objects
            .data
            .stat("")
            .map_err(internal("reading bucket root"))?;
        Ok(vec![BucketInfo {
            name: self.name.clone(),
            creation_date: stat.modified,
        }])
    }

    fn create_bucket(&self, _name: &str) -> StorageResult<()> {
        Err(StorageError::not_implemented("bucket creation on a single-bucket filesystem"))
    }

    fn delete_bucket(&self, _name: &str) -> StorageResult<()> {
        Err(StorageError::not_implemented("bucket deletion on a single-bucket filesystem"))
    }

    fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(name == self.name)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        self.check(bucket)?;
        let _guard = self.lock.lock();
        self.objects.get("", bucket, key, range, true)
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.check(bucket)?;
        let _guard = self.lock.lock();
        self.objects.get("", bucket, key, None, false)
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
        self.check(bucket)?;
        let _guard = self.lock.lock();
        self.objects
            .put("", bucket, key, metadata, input, size, conditions)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectDeleteResult> {
        self.check(bucket)?;
        let _guard = self.lock.lock();
        self.objects.delete("", bucket, key)?;
        Ok(ObjectDeleteResult::default())
    }

    fn delete_multi(&self, bucket: &str, keys: &[String]) -> StorageResult<MultiDeleteResult> {
        self.check(bucket)?;
        let _guard = self.lock.lock();
        Ok(self.objects.delete_multi("", bucket, keys))
    }

    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        self.check(bucket)?;
        let _guard = self.lock.lock();
        self.objects.list("", bucket, prefix, page)
    }
}
