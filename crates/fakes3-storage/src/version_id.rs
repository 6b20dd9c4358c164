//! Version id generation.
//!
//! Ids look like the ones S3 hands out (`3/` followed by url-safe base64)
//! but carry a fixed-width hex sequence number before the random tail, so
//! ids from one generator sort in the order they were issued.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::types::VersionId;

/// Default number of random bytes appended to each id.
pub const DEFAULT_TAIL_BYTES: usize = 16;

#[derive(Debug)]
struct GeneratorState {
    sequence: u64,
    rng: StdRng,
}

/// Owned, synchronized source of fresh [`VersionId`]s.
///
/// ```
/// use fakes3_storage::version_id::VersionGenerator;
///
/// let generator = VersionGenerator::new(42);
/// let a = generator.next();
/// let b = generator.next();
/// assert!(a < b);
/// assert!(a.as_str().starts_with("3/"));
/// ```
#[derive(Debug)]
pub struct VersionGenerator {
    state: Mutex<GeneratorState>,
    tail_bytes: usize,
}

impl VersionGenerator {
    /// Create a generator whose random tail is seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_tail(seed, DEFAULT_TAIL_BYTES)
    }

    /// Create a generator with `tail_bytes` random bytes per id.
    #[must_use]
    pub fn with_tail(seed: u64, tail_bytes: usize) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                sequence: 0,
                rng: StdRng::seed_from_u64(seed),
            }),
            tail_bytes,
        }
    }

    /// Create a generator seeded from the thread-local RNG.
    #[must_use]
    pub fn from_entropy() -> Self {
        let mut seed = [0u8; 8];
        rand::rng().fill(&mut seed);
        Self::new(u64::from_le_bytes(seed))
    }

    /// Issue the next id. Every id is strictly greater than the previous one.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> VersionId {
        let mut tail = vec![0u8; self.tail_bytes];
        let sequence = {
            let mut state = self.state.lock();
            state.sequence += 1;
            state.rng.fill(tail.as_mut_slice());
            state.sequence
        };

        VersionId::new(format!(
            "3/{sequence:016x}{}",
            URL_SAFE_NO_PAD.encode(&tail)
        ))
    }
}
