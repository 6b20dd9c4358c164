//! The service facade the protocol layer talks to.
//!
//! [`FakeS3`] owns one engine and the configuration. It validates input
//! before any engine sees it, creates buckets on demand in auto-bucket mode,
//! verifies `Content-MD5`, and turns a missing versioning capability into
//! `NotImplemented`. Engines without their own multipart support get uploads
//! staged in memory by the facade and committed with a plain put.

use std::io::Read;
use std::sync::Arc;

use fakes3_core::{BackendKind, FakeS3Config, SystemTimeSource, TimeSource};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::backend::{Backend, MultipartBackend, VersionedBackend};
use crate::checksums::{read_exact_size, verify_content_md5};
use crate::conditional::PutConditions;
use crate::embedded::EmbeddedBackend;
use crate::error::{ErrorKind, StorageError, StorageResult, internal};
use crate::fs::{DiskFs, MultiBucketBackend, SingleBucketBackend};
use crate::listing::{ListBucketPage, ListBucketVersionsPage};
use crate::mem::MemoryBackend;
use crate::multipart::{
    CompletedPart, ListMultipartUploadsPage, ListMultipartUploadsResult, ListPartsPage,
    ListPartsResult, Uploader,
};
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    BucketInfo, DeletedObject, ListBucketVersionsResult, Metadata, MultiDeleteResult, Object,
    ObjectDeleteResult, ObjectId, ObjectList, PutObjectResult, VersionId, VersionItem,
    VersioningConfiguration,
};
use crate::validation::{validate_bucket_name, validate_metadata_size, validate_object_key};

/// Open the engine selected by `config`.
pub fn open_backend(config: &FakeS3Config) -> StorageResult<Arc<dyn Backend>> {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let backend: Arc<dyn Backend> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::with_time_source(time)),
        BackendKind::Embedded => Arc::new(EmbeddedBackend::open_with(
            config.db_path(),
            config.chunk_size,
            time,
        )?),
        BackendKind::Fs => {
            let fs = DiskFs::new(&config.data_dir).map_err(internal("opening data directory"))?;
            Arc::new(MultiBucketBackend::new(Arc::new(fs))?)
        }
        BackendKind::FsSingle => {
            let fs = DiskFs::new(&config.data_dir).map_err(internal("opening data directory"))?;
            Arc::new(SingleBucketBackend::new(&config.single_bucket, Arc::new(fs))?)
        }
    };
    info!(backend = %config.backend, data_dir = %config.data_dir, "opened storage backend");
    Ok(backend)
}

/// Optional inputs of [`FakeS3::put_object`].
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct PutObjectOptions {
    /// User metadata to store with the object.
    #[builder(default)]
    pub metadata: Metadata,
    /// Base64 MD5 the body must match.
    #[builder(default, setter(strip_option, into))]
    pub content_md5: Option<String>,
    /// Preconditions on the object being replaced.
    #[builder(default, setter(strip_option))]
    pub conditions: Option<PutConditions>,
}

/// Source of [`FakeS3::copy_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Source bucket.
    pub bucket: String,
    /// Source key.
    pub key: String,
    /// Source version; the current version when `None`.
    pub version_id: Option<VersionId>,
}

/// Storage service over one engine.
#[derive(Debug, Clone)]
pub struct FakeS3 {
    backend: Arc<dyn Backend>,
    config: FakeS3Config,
    /// Stages uploads for engines without a multipart capability.
    uploads: Arc<Uploader>,
}

/// Where multipart calls go.
enum Multipart<'a> {
    Engine(&'a dyn MultipartBackend),
    Staged(&'a Uploader),
}

impl FakeS3 {
    /// Open the configured engine and create the initial buckets.
    pub fn from_config(config: FakeS3Config) -> StorageResult<Self> {
        let backend = open_backend(&config)?;
        Self::new(backend, config)
    }

    /// Wrap `backend`, creating the configured initial buckets that are
    /// missing.
    pub fn new(backend: Arc<dyn Backend>, config: FakeS3Config) -> StorageResult<Self> {
        Self::with_time_source(backend, config, Arc::new(SystemTimeSource))
    }

    /// Like [`FakeS3::new`], stamping staged uploads with `time`.
    pub fn with_time_source(
        backend: Arc<dyn Backend>,
        config: FakeS3Config,
        time: Arc<dyn TimeSource>,
    ) -> StorageResult<Self> {
        let service = Self {
            backend,
            config,
            uploads: Arc::new(Uploader::new(time)),
        };
        for bucket in &service.config.initial_buckets {
            if !service.backend.bucket_exists(bucket)? {
                service.create_bucket(bucket)?;
            }
        }
        Ok(service)
    }

    /// The underlying engine.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FakeS3Config {
        &self.config
    }

    fn versioned(&self) -> StorageResult<&dyn VersionedBackend> {
        self.backend
            .as_versioned()
            .ok_or_else(|| StorageError::not_implemented("versioning"))
    }

    fn multipart(&self) -> Multipart<'_> {
        match self.backend.as_multipart() {
            Some(engine) => Multipart::Engine(engine),
            None => Multipart::Staged(&self.uploads),
        }
    }

    fn require_bucket(&self, bucket: &str) -> StorageResult<()> {
        if self.backend.bucket_exists(bucket)? {
            Ok(())
        } else {
            Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }

    /// Create `bucket` on first write in auto-bucket mode.
    fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        if !self.config.auto_bucket || self.backend.bucket_exists(bucket)? {
            return Ok(());
        }
        validate_bucket_name(bucket)?;
        match self.backend.create_bucket(bucket) {
            Err(e) if e.kind() != ErrorKind::AlreadyExists => Err(e),
            _ => {
                info!(bucket, "created bucket on demand");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// List all buckets.
    pub fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.backend.list_buckets()
    }

    /// Create a bucket after validating its name.
    pub fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        self.backend.create_bucket(bucket)
    }

    /// Delete an empty bucket, dropping uploads staged for it.
    pub fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.backend.delete_bucket(bucket)?;
        self.uploads.forget_bucket(bucket);
        Ok(())
    }

    /// Whether the bucket exists.
    pub fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        self.backend.bucket_exists(bucket)
    }

    /// Versioning configuration; never-versioned engines report the default.
    pub fn versioning_configuration(&self, bucket: &str) -> StorageResult<VersioningConfiguration> {
        match self.backend.as_versioned() {
            Some(v) => v.versioning_configuration(bucket),
            None => {
                self.require_bucket(bucket)?;
                Ok(VersioningConfiguration::default())
            }
        }
    }

    /// Change the versioning configuration.
    pub fn set_versioning_configuration(
        &self,
        bucket: &str,
        config: VersioningConfiguration,
    ) -> StorageResult<()> {
        self.versioned()?
            .set_versioning_configuration(bucket, config)
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Fetch an object, or one version of it.
    pub fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        match version_id {
            Some(v) => self.versioned()?.get_object_version(bucket, key, v, range),
            None => self.backend.get_object(bucket, key, range),
        }
    }

    /// Fetch attributes of an object, or of one version of it.
    pub fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
    ) -> StorageResult<Object> {
        match version_id {
            Some(v) => self.versioned()?.head_object_version(bucket, key, v),
            None => self.backend.head_object(bucket, key),
        }
    }

    /// Store an object.
    pub fn put_object(
        &self,
        bucket: &str,
        key: &str,
        input: &mut dyn Read,
        size: u64,
        options: PutObjectOptions,
    ) -> StorageResult<PutObjectResult> {
        validate_object_key(key)?;
        validate_metadata_size(key, &options.metadata, self.config.metadata_size_limit)?;
        self.ensure_bucket(bucket)?;

        let result = match options.content_md5.as_deref() {
            Some(expected) => {
                let data = read_exact_size(key, input, size)?;
                verify_content_md5(key, &data, expected)?;
                self.backend.put_object(
                    bucket,
                    key,
                    options.metadata,
                    &mut data.as_slice(),
                    size,
                    options.conditions.as_ref(),
                )
            }
            None => self.backend.put_object(
                bucket,
                key,
                options.metadata,
                input,
                size,
                options.conditions.as_ref(),
            ),
        }?;
        debug!(bucket, key, size, etag = %result.etag, "put object");
        Ok(result)
    }

    /// Copy an object. Destination preconditions are not evaluated; the
    /// source metadata is kept unless `metadata` replaces it.
    pub fn copy_object(
        &self,
        source: &CopySource,
        bucket: &str,
        key: &str,
        metadata: Option<Metadata>,
    ) -> StorageResult<PutObjectResult> {
        let src = self.get_object(
            &source.bucket,
            &source.key,
            source.version_id.as_ref(),
            None,
        )?;
        if src.is_delete_marker {
            return Err(StorageError::NoSuchKey {
                key: source.key.clone(),
            });
        }
        let size = src.size;
        let metadata = metadata.unwrap_or(src.metadata);
        let mut body = src.body;
        self.put_object(
            bucket,
            key,
            &mut body,
            size,
            PutObjectOptions::builder().metadata(metadata).build(),
        )
    }

    /// Delete the current version of an object, or remove one version.
    pub fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&VersionId>,
    ) -> StorageResult<ObjectDeleteResult> {
        match version_id {
            Some(v) => self.versioned()?.delete_object_version(bucket, key, v),
            None => self.backend.delete_object(bucket, key),
        }
    }

    /// Delete several objects. Items without a version go through the
    /// engine's batch delete; versioned items are removed one by one.
    pub fn delete_multi(&self, bucket: &str, objects: &[ObjectId]) -> StorageResult<MultiDeleteResult> {
        let (plain, versioned): (Vec<&ObjectId>, Vec<&ObjectId>) =
            objects.iter().partition(|o| o.version_id.is_none());

        let keys: Vec<String> = plain.iter().map(|o| o.key.clone()).collect();
        let mut result = if keys.is_empty() {
            self.require_bucket(bucket)?;
            MultiDeleteResult::default()
        } else {
            self.backend.delete_multi(bucket, &keys)?
        };

        for object in versioned {
            let Some(version_id) = object.version_id.as_ref() else {
                continue;
            };
            match self
                .versioned()
                .and_then(|v| v.delete_object_version(bucket, &object.key, version_id))
            {
                Ok(deleted) => result.deleted.push(DeletedObject {
                    key: object.key.clone(),
                    version_id: Some(version_id.clone()),
                    delete_marker: deleted.is_delete_marker,
                    delete_marker_version_id: deleted
                        .is_delete_marker
                        .then(|| version_id.clone()),
                }),
                Err(e) => result.push_error(&object.key, Some(version_id.clone()), &e),
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// List objects, applying the default page size. An engine that cannot
    /// paginate returns the whole listing when the fallback is enabled.
    pub fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        let page = ListBucketPage {
            marker: page.marker.clone(),
            max_keys: page.max_keys.or(Some(self.config.default_max_keys)),
        };
        match self.backend.list_bucket(bucket, prefix, &page) {
            Err(e) if e.kind() == ErrorKind::NotImplemented && self.config.pagination_fallback => {
                debug!(bucket, %prefix, "engine cannot paginate, listing everything");
                self.backend
                    .list_bucket(bucket, prefix, &ListBucketPage::default())
            }
            other => other,
        }
    }

    /// List versions. Engines without versioning report every object as its
    /// only, `null` version.
    pub fn list_bucket_versions(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketVersionsPage,
    ) -> StorageResult<ListBucketVersionsResult> {
        page.validate()?;
        if let Some(v) = self.backend.as_versioned() {
            let page = ListBucketVersionsPage {
                max_keys: page.max_keys.or(Some(self.config.default_max_keys)),
                ..page.clone()
            };
            return v.list_bucket_versions(bucket, prefix, &page);
        }

        let list = self.list_bucket(
            bucket,
            prefix,
            &ListBucketPage {
                marker: page.key_marker.clone(),
                max_keys: page.max_keys,
            },
        )?;
        let next_version_id_marker = list
            .next_marker
            .as_ref()
            .filter(|m| list.contents.last().is_some_and(|c| &c.key == *m))
            .map(|_| VersionId::null());
        Ok(ListBucketVersionsResult {
            versions: list
                .contents
                .into_iter()
                .map(|c| VersionItem {
                    key: c.key,
                    version_id: VersionId::null(),
                    is_latest: true,
                    is_delete_marker: false,
                    last_modified: c.last_modified,
                    etag: Some(c.etag),
                    size: c.size,
                })
                .collect(),
            common_prefixes: list.common_prefixes,
            is_truncated: list.is_truncated,
            next_key_marker: list.next_marker,
            next_version_id_marker,
        })
    }

    // -----------------------------------------------------------------------
    // Multipart uploads
    // -----------------------------------------------------------------------

    /// Start a multipart upload.
    pub fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        validate_object_key(key)?;
        validate_metadata_size(key, &metadata, self.config.metadata_size_limit)?;
        self.ensure_bucket(bucket)?;
        match self.multipart() {
            Multipart::Engine(m) => m.create_multipart_upload(bucket, key, metadata),
            Multipart::Staged(u) => {
                self.require_bucket(bucket)?;
                Ok(u.initiate(bucket, key, metadata))
            }
        }
    }

    /// Store one part of an upload.
    pub fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: &mut dyn Read,
        size: u64,
    ) -> StorageResult<String> {
        match self.multipart() {
            Multipart::Engine(m) => m.upload_part(bucket, key, upload_id, part_number, input, size),
            Multipart::Staged(u) => {
                self.require_bucket(bucket)?;
                u.put_part(bucket, key, upload_id, part_number, input, size)
            }
        }
    }

    /// Assemble an upload into its object.
    pub fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutObjectResult> {
        match self.multipart() {
            Multipart::Engine(m) => m.complete_multipart_upload(bucket, key, upload_id, parts),
            Multipart::Staged(u) => u.complete(bucket, key, upload_id, parts, |metadata, body| {
                let size = body.len() as u64;
                let result = self
                    .backend
                    .put_object(bucket, key, metadata, &mut &body[..], size, None)?;
                info!(
                    bucket,
                    key,
                    upload_id,
                    parts = parts.len(),
                    size,
                    "completed staged multipart upload"
                );
                Ok(result)
            }),
        }
    }

    /// Discard an upload.
    pub fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()> {
        match self.multipart() {
            Multipart::Engine(m) => m.abort_multipart_upload(bucket, key, upload_id),
            Multipart::Staged(u) => u.abort(bucket, key, upload_id),
        }
    }

    /// List uploads in progress.
    pub fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListMultipartUploadsPage,
    ) -> StorageResult<ListMultipartUploadsResult> {
        match self.multipart() {
            Multipart::Engine(m) => m.list_multipart_uploads(bucket, prefix, page),
            Multipart::Staged(u) => {
                self.require_bucket(bucket)?;
                Ok(u.list_uploads(bucket, prefix, page))
            }
        }
    }

    /// List the parts of an upload.
    pub fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        page: &ListPartsPage,
    ) -> StorageResult<ListPartsResult> {
        match self.multipart() {
            Multipart::Engine(m) => m.list_parts(bucket, key, upload_id, page),
            Multipart::Staged(u) => u.list_parts(bucket, key, upload_id, page),
        }
    }
}
