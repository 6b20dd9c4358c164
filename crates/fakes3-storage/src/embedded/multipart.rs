//! Multipart uploads for the embedded engine.
//!
//! Parts are stored as chunks like any object payload; completion makes the
//! object record reference the part chunks instead of copying them.

use std::io::Read;

use digest::Digest;
use md5::Md5;
use redb::{ReadableTable, WriteTransaction};
use tracing::{debug, info};

use super::EmbeddedBackend;
use super::store::{ChunkRef, ChunkWriter, ObjectRecord, UPLOADS, UploadRecord, decode, encode};
use crate::backend::MultipartBackend;
use crate::checksums::{compute_etag, format_etag, read_exact_size};
use crate::error::{StorageError, StorageResult, internal};
use crate::multipart::{
    CompletedPart, ListMultipartUploadsPage, ListMultipartUploadsResult, ListPartsPage,
    ListPartsResult, MultipartUploadInfo, UploadPart, generate_upload_id, list_parts, list_uploads,
    validate_completion, validate_part_number,
};
use crate::prefix::Prefix;
use crate::types::{Metadata, PutObjectResult};

fn load_upload(
    table: &impl ReadableTable<&'static str, &'static str>,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> StorageResult<UploadRecord> {
    let upload: Option<UploadRecord> = table
        .get(upload_id)
        .map_err(internal("reading upload record"))?
        .map(|g| decode(g.value()))
        .transpose()?;
    upload
        .filter(|u| u.belongs_to(bucket, key))
        .ok_or_else(|| StorageError::NoSuchUpload {
            upload_id: upload_id.to_owned(),
        })
}

fn part_chunks(upload: &UploadRecord) -> Vec<ChunkRef> {
    upload
        .parts
        .values()
        .flat_map(|p| p.data.iter().cloned())
        .collect()
}

/// Remove every upload of `bucket` and release its part chunks.
pub(super) fn drop_bucket_uploads(txn: &WriteTransaction, bucket: &str) -> StorageResult<()> {
    let mut uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
    let mut doomed = Vec::new();
    for entry in uploads.iter().map_err(internal("listing uploads"))? {
        let (k, v) = entry.map_err(internal("listing uploads"))?;
        let upload: UploadRecord = decode(v.value())?;
        if upload.bucket == bucket {
            doomed.push((k.value().to_owned(), part_chunks(&upload)));
        }
    }

    let mut chunks = ChunkWriter::open(txn)?;
    for (upload_id, refs) in doomed {
        uploads
            .remove(upload_id.as_str())
            .map_err(internal("deleting upload record"))?;
        chunks.release(&refs)?;
    }
    Ok(())
}

impl MultipartBackend for EmbeddedBackend {
    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        let upload_id = generate_upload_id();
        let txn = self.write()?;
        Self::ensure_bucket_write(&txn, bucket)?;
        {
            let upload = UploadRecord::new(upload_id.clone(), bucket, key, metadata, self.time.now());
            let mut uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
            uploads
                .insert(upload_id.as_str(), encode(&upload)?.as_str())
                .map_err(internal("writing upload record"))?;
        }
        txn.commit().map_err(internal("committing upload"))?;
        debug!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: &mut dyn Read,
        size: u64,
    ) -> StorageResult<String> {
        validate_part_number(part_number)?;
        Self::ensure_bucket_read(&self.read()?, bucket)?;

        let data = read_exact_size(key, input, size)?;
        let etag = compute_etag(&data);
        let last_modified = self.time.now();

        let _assign = self.part_lock.lock();
        let txn = self.write()?;
        let replaced = {
            let mut uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
            let mut upload = load_upload(&uploads, bucket, key, upload_id)?;
            let stored = ChunkWriter::open(&txn)?.store(&data, self.chunk_size)?;
            let replaced = upload.parts.insert(
                part_number,
                UploadPart {
                    etag: etag.clone(),
                    size,
                    last_modified,
                    data: stored,
                },
            );
            uploads
                .insert(upload_id, encode(&upload)?.as_str())
                .map_err(internal("writing upload record"))?;
            replaced.map(|p| p.data).unwrap_or_default()
        };
        txn.commit().map_err(internal("committing upload part"))?;
        self.release_later(&replaced);

        debug!(bucket, key, upload_id, part_number, size, "stored upload part");
        Ok(etag)
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutObjectResult> {
        let last_modified = self.time.now();
        let mut part_refs = Vec::new();

        let record = self.commit_record(bucket, key, None, |txn, chunks| {
            let mut uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
            let upload = load_upload(&uploads, bucket, key, upload_id)?;
            let ordered = validate_completion(&upload, parts)?;

            let mut hasher = Md5::new();
            let mut refs = Vec::new();
            let mut size = 0;
            for part in ordered {
                for chunk in &part.data {
                    hasher.update(chunks.read(chunk)?);
                    refs.push(chunk.clone());
                }
                size += part.size;
            }
            chunks.retain(&refs)?;

            uploads
                .remove(upload_id)
                .map_err(internal("deleting upload record"))?;
            part_refs = part_chunks(&upload);

            Ok(ObjectRecord {
                metadata: upload.metadata,
                last_modified,
                size,
                hash: hex::encode(hasher.finalize()),
                chunks: refs,
            })
        })?;
        self.release_later(&part_refs);

        info!(bucket, key, upload_id, parts = parts.len(), size = record.size, "completed multipart upload");
        Ok(PutObjectResult {
            version_id: None,
            etag: format_etag(&record.raw_hash()?),
        })
    }

    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        let txn = self.write()?;
        {
            let mut uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
            let upload = load_upload(&uploads, bucket, key, upload_id)?;
            uploads
                .remove(upload_id)
                .map_err(internal("deleting upload record"))?;
            ChunkWriter::open(&txn)?.release(&part_chunks(&upload))?;
        }
        txn.commit().map_err(internal("committing upload abort"))?;
        debug!(bucket, key, upload_id, "aborted multipart upload");
        Ok(())
    }

    fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListMultipartUploadsPage,
    ) -> StorageResult<ListMultipartUploadsResult> {
        let txn = self.read()?;
        Self::ensure_bucket_read(&txn, bucket)?;
        let uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;

        let mut found: Vec<MultipartUploadInfo> = Vec::new();
        for entry in uploads.iter().map_err(internal("listing uploads"))? {
            let (_, v) = entry.map_err(internal("listing uploads"))?;
            let upload: UploadRecord = decode(v.value())?;
            if upload.bucket == bucket {
                found.push(upload.info());
            }
        }
        found.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));
        Ok(list_uploads(found, prefix, page))
    }

    fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        page: &ListPartsPage,
    ) -> StorageResult<ListPartsResult> {
        let txn = self.read()?;
        let uploads = txn.open_table(UPLOADS).map_err(internal("opening upload table"))?;
        let upload = load_upload(&uploads, bucket, key, upload_id)?;
        Ok(list_parts(&upload, page))
    }
}
