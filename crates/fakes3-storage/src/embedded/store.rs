//! Table layout, persisted records and the content-addressed chunk store.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::checksums::compute_sha256;
use crate::error::{StorageError, StorageResult, internal};
use crate::multipart::MultipartUpload;
use crate::range::ObjectRange;
use crate::types::{Content, Metadata};

/// Bucket records, keyed `bucket/<name>`.
pub(super) const META: TableDefinition<&str, &str> = TableDefinition::new("_meta");
/// Upload records, keyed by upload id.
pub(super) const UPLOADS: TableDefinition<&str, &str> = TableDefinition::new("_uploads");
/// Chunk payloads, keyed by hex SHA-256.
pub(super) const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("_chunks");
/// Number of records referencing each chunk.
pub(super) const CHUNK_REFS: TableDefinition<&str, u64> = TableDefinition::new("_chunk_refs");

const BUCKET_KEY_PREFIX: &str = "bucket/";

const BUCKET_TABLE_PREFIX: &str = "b/";

/// Name of the object table of bucket `name`. The prefix keeps bucket
/// tables apart from the reserved ones.
pub(super) fn bucket_table_name(name: &str) -> String {
    format!("{BUCKET_TABLE_PREFIX}{name}")
}

/// Definition of an object table named by [`bucket_table_name`].
pub(super) fn bucket_table(table: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(table)
}

pub(super) fn bucket_key(name: &str) -> String {
    format!("{BUCKET_KEY_PREFIX}{name}")
}

/// Bucket name of a `_meta` key, if it is a bucket record.
pub(super) fn bucket_name(meta_key: &str) -> Option<&str> {
    meta_key.strip_prefix(BUCKET_KEY_PREFIX)
}

pub(super) fn encode<T: Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(internal("encoding record"))
}

pub(super) fn decode<T: DeserializeOwned>(raw: &str) -> StorageResult<T> {
    serde_json::from_str(raw).map_err(internal("decoding record"))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BucketRecord {
    pub creation_date: DateTime<Utc>,
}

/// A stored chunk referenced from an object or a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct ChunkRef {
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ObjectRecord {
    pub metadata: Metadata,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Hex MD5 of the full payload.
    pub hash: String,
    pub chunks: Vec<ChunkRef>,
}

impl ObjectRecord {
    pub fn raw_hash(&self) -> StorageResult<Vec<u8>> {
        hex::decode(&self.hash).map_err(internal("decoding stored hash"))
    }

    pub fn etag(&self) -> String {
        format!("\"{}\"", self.hash)
    }

    pub fn content(&self, key: &str) -> Content {
        Content {
            key: key.to_owned(),
            last_modified: self.last_modified,
            etag: self.etag(),
            size: self.size,
        }
    }
}

/// Multipart upload whose parts reference chunks.
pub(super) type UploadRecord = MultipartUpload<Vec<ChunkRef>>;

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Handles on the chunk tables inside one write transaction.
pub(super) struct ChunkWriter<'txn> {
    chunks: Table<'txn, &'static str, &'static [u8]>,
    refs: Table<'txn, &'static str, u64>,
}

impl<'txn> ChunkWriter<'txn> {
    pub fn open(txn: &'txn WriteTransaction) -> StorageResult<Self> {
        Ok(Self {
            chunks: txn.open_table(CHUNKS).map_err(internal("opening chunk table"))?,
            refs: txn
                .open_table(CHUNK_REFS)
                .map_err(internal("opening chunk reference table"))?,
        })
    }

    /// Store `data` split into `chunk_size` pieces, taking one reference on
    /// each. Identical pieces are stored once.
    pub fn store(&mut self, data: &[u8], chunk_size: usize) -> StorageResult<Vec<ChunkRef>> {
        data.chunks(chunk_size.max(1))
            .map(|piece| {
                let digest = compute_sha256(piece);
                if self.chunks.get(digest.as_str()).map_err(internal("reading chunk"))?.is_none() {
                    self.chunks
                        .insert(digest.as_str(), piece)
                        .map_err(internal("writing chunk"))?;
                }
                self.retain_one(&digest)?;
                Ok(ChunkRef {
                    digest,
                    size: piece.len() as u64,
                })
            })
            .collect()
    }

    /// Take one more reference on each chunk.
    pub fn retain(&mut self, refs: &[ChunkRef]) -> StorageResult<()> {
        refs.iter().try_for_each(|r| self.retain_one(&r.digest))
    }

    fn retain_one(&mut self, digest: &str) -> StorageResult<()> {
        let count = self
            .refs
            .get(digest)
            .map_err(internal("reading chunk references"))?
            .map_or(0, |g| g.value());
        self.refs
            .insert(digest, count + 1)
            .map_err(internal("writing chunk references"))?;
        Ok(())
    }

    /// Drop one reference on each chunk, deleting chunks nobody references.
    pub fn release(&mut self, refs: &[ChunkRef]) -> StorageResult<()> {
        for r in refs {
            let digest = r.digest.as_str();
            let count = self
                .refs
                .get(digest)
                .map_err(internal("reading chunk references"))?
                .map_or(0, |g| g.value());
            if count > 1 {
                self.refs
                    .insert(digest, count - 1)
                    .map_err(internal("writing chunk references"))?;
            } else {
                self.refs
                    .remove(digest)
                    .map_err(internal("writing chunk references"))?;
                self.chunks.remove(digest).map_err(internal("deleting chunk"))?;
            }
        }
        Ok(())
    }

    pub fn read(&self, r: &ChunkRef) -> StorageResult<Vec<u8>> {
        read_chunk(&self.chunks, r)
    }
}

/// Load one chunk. A missing chunk is an internal fault.
pub(super) fn read_chunk(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    r: &ChunkRef,
) -> StorageResult<Vec<u8>> {
    table
        .get(r.digest.as_str())
        .map_err(internal("reading chunk"))?
        .map(|g| g.value().to_vec())
        .ok_or_else(|| {
            StorageError::Internal(anyhow::anyhow!("chunk {} is missing", r.digest))
        })
}

/// Assemble the bytes of `chunks` covered by `range` (all of them when
/// `None`), skipping chunks outside it.
pub(super) fn read_range(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    chunks: &[ChunkRef],
    range: Option<ObjectRange>,
) -> StorageResult<Vec<u8>> {
    let total: u64 = chunks.iter().map(|c| c.size).sum();
    let (start, end) = range.map_or((0, total), |r| (r.start, r.end()));
    let mut out = Vec::with_capacity(usize::try_from(end - start).unwrap_or(0));

    let mut offset = 0u64;
    for chunk in chunks {
        let chunk_start = offset;
        let chunk_end = offset + chunk.size;
        offset = chunk_end;
        if chunk_end <= start || chunk_start >= end {
            continue;
        }
        let data = read_chunk(table, chunk)?;
        let from = usize::try_from(start.saturating_sub(chunk_start)).unwrap_or(0);
        let to = usize::try_from(end.min(chunk_end) - chunk_start).unwrap_or(data.len());
        out.extend_from_slice(&data[from..to.min(data.len())]);
    }
    Ok(out)
}
