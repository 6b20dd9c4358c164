//! Embedded transactional engine on `redb`.
//!
//! Every bucket is its own table in a single database file. Object payloads
//! are split into chunks stored once under their SHA-256 digest and shared
//! by reference between objects and multipart parts. An overwrite commits
//! the new chunks and the new record first, then releases the superseded
//! chunks in a second transaction, so a crash between the two leaks chunks
//! but never loses the previous object.
//!
//! This engine advertises multipart uploads but not versioning.

mod multipart;
mod store;

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use fakes3_core::{SystemTimeSource, TimeSource};
use parking_lot::Mutex;
use redb::{Database, ReadTransaction, ReadableTable, ReadableTableMetadata, WriteTransaction};
use tracing::{debug, info, warn};

use self::store::{
    BucketRecord, CHUNKS, ChunkRef, ChunkWriter, META, ObjectRecord, UPLOADS,
    bucket_key, bucket_name, bucket_table, bucket_table_name, decode, encode, read_range,
};
use crate::backend::{Backend, MultipartBackend};
use crate::checksums::{format_etag, md5_digest, read_exact_size};
use crate::conditional::{PutConditions, check_conditions};
use crate::error::{StorageError, StorageResult, internal};
use crate::listing::{ListBucketPage, ObjectListing};
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    BucketInfo, DeletedObject, Metadata, MultiDeleteResult, Object, ObjectBody,
    ObjectDeleteResult, ObjectList, PutObjectResult,
};

/// Default size of one stored chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Single-file transactional storage engine.
pub struct EmbeddedBackend {
    db: Database,
    chunk_size: usize,
    time: Arc<dyn TimeSource>,
    /// Serializes multipart part assignment.
    part_lock: Mutex<()>,
}

impl std::fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedBackend")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl EmbeddedBackend {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with(path, DEFAULT_CHUNK_SIZE, Arc::new(SystemTimeSource))
    }

    /// Open or create the database at `path` with an explicit chunk size and
    /// clock.
    pub fn open_with(
        path: impl AsRef<Path>,
        chunk_size: usize,
        time: Arc<dyn TimeSource>,
    ) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(internal("creating database directory"))?;
        }
        let db = Database::create(path).map_err(internal("opening database"))?;

        // redb only creates tables inside a write transaction.
        let txn = db.begin_write().map_err(internal("beginning transaction"))?;
        {
            txn.open_table(META).map_err(internal("creating tables"))?;
            txn.open_table(UPLOADS).map_err(internal("creating tables"))?;
            ChunkWriter::open(&txn)?;
        }
        txn.commit().map_err(internal("committing transaction"))?;
        info!(path = %path.display(), chunk_size, "opened embedded store");

        Ok(Self {
            db,
            chunk_size: chunk_size.max(1),
            time,
            part_lock: Mutex::new(()),
        })
    }

    fn read(&self) -> StorageResult<ReadTransaction> {
        self.db.begin_read().map_err(internal("beginning read transaction"))
    }

    fn write(&self) -> StorageResult<WriteTransaction> {
        self.db.begin_write().map_err(internal("beginning write transaction"))
    }

    fn ensure_bucket_read(txn: &ReadTransaction, bucket: &str) -> StorageResult<()> {
        let meta = txn.open_table(META).map_err(internal("opening meta table"))?;
        require_bucket(&meta, bucket)
    }

    fn ensure_bucket_write(txn: &WriteTransaction, bucket: &str) -> StorageResult<()> {
        let meta = txn.open_table(META).map_err(internal("opening meta table"))?;
        require_bucket(&meta, bucket)
    }

    fn load_record(
        table: &impl ReadableTable<&'static str, &'static str>,
        key: &str,
    ) -> StorageResult<Option<ObjectRecord>> {
        table
            .get(key)
            .map_err(internal("reading object record"))?
            .map(|g| decode(g.value()))
            .transpose()
    }

    /// Second phase of an overwrite or completion: drop references held by
    /// records that are no longer reachable. Failure only leaks chunks.
    fn release_later(&self, refs: &[ChunkRef]) {
        if refs.is_empty() {
            return;
        }
        let released = self.write().and_then(|txn| {
            ChunkWriter::open(&txn)?.release(refs)?;
            txn.commit().map_err(internal("committing chunk release"))
        });
        if let Err(e) = released {
            warn!(error = %e, chunks = refs.len(), "failed to release superseded chunks");
        }
    }

    /// Commit `record` under `key`, evaluating `conditions` in the same
    /// transaction. `chunks` of the new record must already be retained by
    /// the caller through `stage`.
    fn commit_record<F>(
        &self,
        bucket: &str,
        key: &str,
        conditions: Option<&PutConditions>,
        stage: F,
    ) -> StorageResult<ObjectRecord>
    where
        F: FnOnce(&WriteTransaction, &mut ChunkWriter<'_>) -> StorageResult<ObjectRecord>,
    {
        let txn = self.write()?;
        Self::ensure_bucket_write(&txn, bucket)?;
        let (record, superseded) = {
            let mut objects = txn
                .open_table(bucket_table(&bucket_table_name(bucket)))
                .map_err(internal("opening bucket table"))?;
            let previous = Self::load_record(&objects, key)?;
            check_conditions(conditions, key, previous.as_ref().map(ObjectRecord::etag).as_deref())?;

            let mut chunks = ChunkWriter::open(&txn)?;
            let record = stage(&txn, &mut chunks)?;
            objects
                .insert(key, encode(&record)?.as_str())
                .map_err(internal("writing object record"))?;
            (record, previous.map(|p| p.chunks).unwrap_or_default())
        };
        txn.commit().map_err(internal("committing object"))?;

        self.release_later(&superseded);
        Ok(record)
    }

    fn fetch(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
        with_body: bool,
    ) -> StorageResult<Object> {
        let txn = self.read()?;
        Self::ensure_bucket_read(&txn, bucket)?;
        let objects = txn
            .open_table(bucket_table(&bucket_table_name(bucket)))
            .map_err(internal("opening bucket table"))?;
        let record = Self::load_record(&objects, key)?.ok_or_else(|| StorageError::NoSuchKey {
            key: key.to_owned(),
        })?;

        let resolved = range.map(|r| r.resolve(key, record.size)).transpose()?;
        let body = if with_body {
            let chunks = txn.open_table(CHUNKS).map_err(internal("opening chunk table"))?;
            ObjectBody::new(Cursor::new(read_range(&chunks, &record.chunks, resolved)?))
        } else {
            ObjectBody::empty()
        };

        Ok(Object {
            name: key.to_owned(),
            hash: record.raw_hash()?,
            size: record.size,
            last_modified: record.last_modified,
            metadata: record.metadata,
            range: resolved,
            version_id: None,
            is_delete_marker: false,
            body,
        })
    }

    fn remove_object(txn: &WriteTransaction, bucket: &str, key: &str) -> StorageResult<bool> {
        let mut objects = txn
            .open_table(bucket_table(&bucket_table_name(bucket)))
            .map_err(internal("opening bucket table"))?;
        let removed = objects
            .remove(key)
            .map_err(internal("deleting object record"))?
            .map(|g| decode::<ObjectRecord>(g.value()))
            .transpose()?;
        let Some(record) = removed else {
            return Ok(false);
        };
        ChunkWriter::open(txn)?.release(&record.chunks)?;
        Ok(true)
    }
}

fn require_bucket(
    meta: &impl ReadableTable<&'static str, &'static str>,
    bucket: &str,
) -> StorageResult<()> {
    let exists = meta
        .get(bucket_key(bucket).as_str())
        .map_err(internal("reading bucket record"))?
        .is_some();
    if !exists {
        return Err(StorageError::NoSuchBucket {
            bucket: bucket.to_owned(),
        });
    }
    Ok(())
}

impl Backend for EmbeddedBackend {
    fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let txn = self.read()?;
        let meta = txn.open_table(META).map_err(internal("opening meta table"))?;
        let mut buckets = Vec::new();
        for entry in meta.range(bucket_key("").as_str()..).map_err(internal("listing buckets"))? {
            let (k, v) = entry.map_err(internal("listing buckets"))?;
            let Some(name) = bucket_name(k.value()) else {
                break;
            };
            let record: BucketRecord = decode(v.value())?;
            buckets.push(BucketInfo {
                name: name.to_owned(),
                creation_date: record.creation_date,
            });
        }
        Ok(buckets)
    }

    fn create_bucket(&self, name: &str) -> StorageResult<()> {
        let txn = self.write()?;
        {
            let mut meta = txn.open_table(META).map_err(internal("opening meta table"))?;
            let key = bucket_key(name);
            if meta.get(key.as_str()).map_err(internal("reading bucket record"))?.is_some() {
                return Err(StorageError::BucketAlreadyExists {
                    bucket: name.to_owned(),
                });
            }
            let record = BucketRecord {
                creation_date: self.time.now(),
            };
            meta.insert(key.as_str(), encode(&record)?.as_str())
                .map_err(internal("writing bucket record"))?;
            txn.open_table(bucket_table(&bucket_table_name(name)))
                .map_err(internal("creating bucket table"))?;
        }
        txn.commit().map_err(internal("committing bucket"))?;
        info!(bucket = name, "created bucket");
        Ok(())
    }

    fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let txn = self.write()?;
        Self::ensure_bucket_write(&txn, name)?;
        {
            let objects = txn
                .open_table(bucket_table(&bucket_table_name(name)))
                .map_err(internal("opening bucket table"))?;
            if !objects.is_empty().map_err(internal("reading bucket table"))? {
                return Err(StorageError::BucketNotEmpty {
                    bucket: name.to_owned(),
                });
            }
        }
        txn.delete_table(bucket_table(&bucket_table_name(name)))
            .map_err(internal("deleting bucket table"))?;
        {
            let mut meta = txn.open_table(META).map_err(internal("opening meta table"))?;
            meta.remove(bucket_key(name).as_str())
                .map_err(internal("deleting bucket record"))?;
        }
        multipart::drop_bucket_uploads(&txn, name)?;
        txn.commit().map_err(internal("committing bucket delete"))?;
        info!(bucket = name, "deleted bucket");
        Ok(())
    }

    fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        let txn = self.read()?;
        match Self::ensure_bucket_read(&txn, name) {
            Ok(()) => Ok(true),
            Err(StorageError::NoSuchBucket { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        self.fetch(bucket, key, range, true)
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.fetch(bucket, key, None, false)
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
        Self::ensure_bucket_read(&self.read()?, bucket)?;

        let data = read_exact_size(key, input, size)?;
        let hash = md5_digest(&data);
        let last_modified = self.time.now();
        let chunk_size = self.chunk_size;

        let record = self.commit_record(bucket, key, conditions, |_, chunks| {
            Ok(ObjectRecord {
                metadata,
                last_modified,
                size,
                hash: hex::encode(&hash),
                chunks: chunks.store(&data, chunk_size)?,
            })
        })?;
        debug!(bucket, key, size, chunks = record.chunks.len(), "stored object");

        Ok(PutObjectResult {
            version_id: None,
            etag: format_etag(&hash),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectDeleteResult> {
        let txn = self.write()?;
        Self::ensure_bucket_write(&txn, bucket)?;
        let removed = Self::remove_object(&txn, bucket, key)?;
        txn.commit().map_err(internal("committing object delete"))?;
        debug!(bucket, key, removed, "deleted object");
        Ok(ObjectDeleteResult::default())
    }

    fn delete_multi(&self, bucket: &str, keys: &[String]) -> StorageResult<MultiDeleteResult> {
        Self::ensure_bucket_read(&self.read()?, bucket)?;
        let mut result = MultiDeleteResult::default();
        for key in keys {
            match self.delete_object(bucket, key) {
                Ok(_) => result.deleted.push(DeletedObject {
                    key: key.clone(),
                    version_id: None,
                    delete_marker: false,
                    delete_marker_version_id: None,
                }),
                Err(e) => result.push_error(key, None, &e),
            }
        }
        Ok(result)
    }

    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        let txn = self.read()?;
        Self::ensure_bucket_read(&txn, bucket)?;
        let objects = txn
            .open_table(bucket_table(&bucket_table_name(bucket)))
            .map_err(internal("opening bucket table"))?;

        let mut listing = ObjectListing::new(prefix, page);
        let entries = match listing.marker() {
            Some(marker) => objects.range(marker..),
            None => objects.range::<&str>(..),
        }
        .map_err(internal("listing objects"))?;

        for entry in entries {
            let (k, v) = entry.map_err(internal("listing objects"))?;
            let key = k.value();
            let record: ObjectRecord = decode(v.value())?;
            if !listing.offer(key, || record.content(key)) {
                break;
            }
        }
        Ok(listing.finish())
    }

    fn as_multipart(&self) -> Option<&dyn MultipartBackend> {
        Some(self)
    }
}
