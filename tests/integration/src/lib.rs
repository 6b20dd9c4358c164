//! Contract tests for the fakes3 storage engines.
//!
//! Every scenario runs against each engine that offers the capability it
//! needs, through the [`FakeS3`] facade, so the engines are held to the same
//! observable behavior.
//!
//! Run them with:
//! ```text
//! cargo test -p fakes3-integration
//! ```
//!
//! Set `RUST_LOG=debug` to see the engines' tracing output.

use std::sync::{Arc, Once};

use fakes3_core::{FakeS3Config, LogFormat};
use fakes3_storage::types::PutObjectResult;
use fakes3_storage::{
    Backend, DiskFs, EmbeddedBackend, FakeS3, MemFs, MemoryBackend, MultiBucketBackend,
    PutObjectOptions, SingleBucketBackend, StorageResult,
};
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Bucket name served by the single-bucket engine.
pub const SINGLE_BUCKET: &str = "single-bucket";

/// Initialize tracing (once), the way the service does.
fn init_tracing() {
    INIT.call_once(|| {
        fakes3_core::init_tracing("warn", LogFormat::Text).expect("install tracing subscriber");
    });
}

/// One engine under test, wrapped in the facade.
#[derive(Debug)]
pub struct Engine {
    /// Short engine name for assertion messages.
    pub name: &'static str,
    /// The facade over the engine.
    pub s3: FakeS3,
    single: bool,
    paginates: bool,
    _dir: Option<TempDir>,
}

impl Engine {
    fn new(name: &'static str, backend: Arc<dyn Backend>, dir: Option<TempDir>) -> Self {
        let s3 = FakeS3::new(backend, FakeS3Config::default()).expect("wrap engine");
        Self {
            name,
            s3,
            single: false,
            paginates: false,
            _dir: dir,
        }
    }

    /// A fresh empty bucket; the single-bucket engine always hands out its
    /// one bucket.
    #[must_use]
    pub fn bucket(&self, prefix: &str) -> String {
        if self.single {
            return SINGLE_BUCKET.to_owned();
        }
        let name = test_bucket_name(prefix);
        self.s3.create_bucket(&name).expect("create bucket");
        name
    }

    /// Whether the engine can create and delete buckets.
    #[must_use]
    pub fn manages_buckets(&self) -> bool {
        !self.single
    }

    /// Whether the engine honors markers and page sizes itself.
    #[must_use]
    pub fn paginates(&self) -> bool {
        self.paginates
    }
}

fn memory() -> Engine {
    let mut engine = Engine::new("memory", Arc::new(MemoryBackend::new()), None);
    engine.paginates = true;
    engine
}

fn embedded() -> Engine {
    let dir = tempfile::tempdir().expect("temp dir");
    // Small chunks so multi-chunk paths are exercised.
    let backend = EmbeddedBackend::open_with(
        dir.path().join("fakes3.redb"),
        4,
        Arc::new(fakes3_core::SystemTimeSource),
    )
    .expect("open embedded store");
    let mut engine = Engine::new("embedded", Arc::new(backend), Some(dir));
    engine.paginates = true;
    engine
}

fn fs_disk() -> Engine {
    let dir = tempfile::tempdir().expect("temp dir");
    let fs = DiskFs::new(dir.path()).expect("disk fs");
    let backend = MultiBucketBackend::new(Arc::new(fs)).expect("multi-bucket engine");
    Engine::new("fs-disk", Arc::new(backend), Some(dir))
}

fn fs_mem() -> Engine {
    let backend = MultiBucketBackend::new(Arc::new(MemFs::new())).expect("multi-bucket engine");
    Engine::new("fs-mem", Arc::new(backend), None)
}

fn fs_single() -> Engine {
    let dir = tempfile::tempdir().expect("temp dir");
    let fs = DiskFs::new(dir.path()).expect("disk fs");
    let backend = SingleBucketBackend::new(SINGLE_BUCKET, Arc::new(fs)).expect("single engine");
    let mut engine = Engine::new("fs-single", Arc::new(backend), Some(dir));
    engine.single = true;
    engine
}

/// Every engine.
#[must_use]
pub fn all_engines() -> Vec<Engine> {
    init_tracing();
    vec![memory(), embedded(), fs_disk(), fs_mem(), fs_single()]
}

/// Engines with versioning.
#[must_use]
pub fn versioned_engines() -> Vec<Engine> {
    all_engines()
        .into_iter()
        .filter(|e| e.s3.backend().as_versioned().is_some())
        .collect()
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Put `body` under `key` with no options.
pub fn put(s3: &FakeS3, bucket: &str, key: &str, body: &[u8]) -> StorageResult<PutObjectResult> {
    let mut input = body;
    s3.put_object(
        bucket,
        key,
        &mut input,
        body.len() as u64,
        PutObjectOptions::default(),
    )
}

/// Read the current payload of `key`.
#[must_use]
pub fn read(s3: &FakeS3, bucket: &str, key: &str) -> Vec<u8> {
    s3.get_object(bucket, key, None, None)
        .expect("get object")
        .body
        .read_all()
        .expect("read body")
}

mod test_bucket;
mod test_error;
mod test_list;
mod test_multipart;
mod test_object;
mod test_precondition;
mod test_versioning;
