//! Configuration for fakes3.
//!
//! Provides [`FakeS3Config`]. Every value can be overridden through an
//! environment variable via [`FakeS3Config::from_env`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::error::{FakeS3Error, FakeS3Result};

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Which storage engine backs the emulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Process-lifetime in-memory maps.
    #[default]
    Memory,
    /// Single-file transactional store under the data directory.
    Embedded,
    /// Directory tree with one subdirectory per bucket.
    Fs,
    /// Directory tree exposed as a single fixed bucket.
    FsSingle,
}

impl BackendKind {
    /// Return the canonical name used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Embedded => "embedded",
            Self::Fs => "fs",
            Self::FsSingle => "fs-single",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = FakeS3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "embedded" | "bolt" | "redb" => Ok(Self::Embedded),
            "fs" | "fs-multi" => Ok(Self::Fs),
            "fs-single" => Ok(Self::FsSingle),
            _ => Err(FakeS3Error::UnknownBackend(s.to_owned())),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

// ---------------------------------------------------------------------------
// FakeS3Config
// ---------------------------------------------------------------------------

/// fakes3 configuration.
///
/// # Examples
///
/// ```
/// use fakes3_core::{BackendKind, FakeS3Config};
///
/// let config = FakeS3Config::default();
/// assert_eq!(config.backend, BackendKind::Memory);
/// assert_eq!(config.metadata_size_limit, 2000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct FakeS3Config {
    /// Storage engine to open.
    #[builder(default)]
    pub backend: BackendKind,

    /// Directory holding the embedded database file or the filesystem tree.
    #[builder(default = String::from("./fakes3-data"))]
    pub data_dir: String,

    /// File name of the embedded database inside `data_dir`.
    #[builder(default = String::from("fakes3.redb"))]
    pub db_file: String,

    /// Bucket name exposed by the single-bucket filesystem engine.
    #[builder(default = String::from("fakes3"))]
    pub single_bucket: String,

    /// Create missing buckets on first write instead of failing.
    #[builder(default = false)]
    pub auto_bucket: bool,

    /// Buckets created when the service starts.
    #[builder(default)]
    pub initial_buckets: Vec<String>,

    /// Upper bound on the summed size of user metadata keys and values.
    #[builder(default = 2000)]
    pub metadata_size_limit: usize,

    /// Page size applied to listings that do not ask for one.
    #[builder(default = 1000)]
    pub default_max_keys: usize,

    /// Size of the content-addressed chunks written by the embedded engine.
    #[builder(default = 1_048_576)]
    pub chunk_size: usize,

    /// Return a full listing when an engine cannot paginate.
    #[builder(default = true)]
    pub pagination_fallback: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Log output format.
    #[builder(default)]
    pub log_format: LogFormat,
}

impl Default for FakeS3Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            data_dir: String::from("./fakes3-data"),
            db_file: String::from("fakes3.redb"),
            single_bucket: String::from("fakes3"),
            auto_bucket: false,
            initial_buckets: Vec::new(),
            metadata_size_limit: 2000,
            default_max_keys: 1000,
            chunk_size: 1_048_576,
            pagination_fallback: true,
            log_level: String::from("info"),
            log_format: LogFormat::Text,
        }
    }
}

impl FakeS3Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `FAKES3_BACKEND` | `memory` |
    /// | `FAKES3_DATA_DIR` | `./fakes3-data` |
    /// | `FAKES3_DB_FILE` | `fakes3.redb` |
    /// | `FAKES3_SINGLE_BUCKET` | `fakes3` |
    /// | `FAKES3_AUTO_BUCKET` | `false` |
    /// | `FAKES3_INITIAL_BUCKETS` | *(empty)* |
    /// | `FAKES3_METADATA_SIZE_LIMIT` | `2000` |
    /// | `FAKES3_DEFAULT_MAX_KEYS` | `1000` |
    /// | `FAKES3_CHUNK_SIZE` | `1048576` |
    /// | `FAKES3_PAGINATION_FALLBACK` | `true` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    ///
    /// A set variable whose value does not parse is an error.
    pub fn from_env() -> FakeS3Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`FakeS3Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FakeS3Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("FAKES3_BACKEND") {
            config.backend = v.parse()?;
        }
        if let Some(v) = lookup("FAKES3_DATA_DIR") {
            config.data_dir = v;
        }
        if let Some(v) = lookup("FAKES3_DB_FILE") {
            config.db_file = v;
        }
        if let Some(v) = lookup("FAKES3_SINGLE_BUCKET") {
            config.single_bucket = v;
        }
        if let Some(v) = lookup("FAKES3_AUTO_BUCKET") {
            config.auto_bucket = parse_bool("FAKES3_AUTO_BUCKET", &v)?;
        }
        if let Some(v) = lookup("FAKES3_INITIAL_BUCKETS") {
            config.initial_buckets = parse_list(&v);
        }
        if let Some(v) = lookup("FAKES3_METADATA_SIZE_LIMIT") {
            config.metadata_size_limit = parse_count("FAKES3_METADATA_SIZE_LIMIT", &v)?;
        }
        if let Some(v) = lookup("FAKES3_DEFAULT_MAX_KEYS") {
            config.default_max_keys = parse_count("FAKES3_DEFAULT_MAX_KEYS", &v)?;
        }
        if let Some(v) = lookup("FAKES3_CHUNK_SIZE") {
            config.chunk_size = parse_count("FAKES3_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("FAKES3_PAGINATION_FALLBACK") {
            config.pagination_fallback = parse_bool("FAKES3_PAGINATION_FALLBACK", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            config.log_format = match v.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(invalid("LOG_FORMAT", &v, "text or json")),
            };
        }

        debug!(backend = %config.backend, data_dir = %config.data_dir, "loaded configuration");
        Ok(config)
    }

    /// Path of the embedded database file.
    #[must_use]
    pub fn db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join(&self.db_file)
    }
}

fn invalid(var: &'static str, value: &str, expected: &'static str) -> FakeS3Error {
    FakeS3Error::InvalidSetting {
        var,
        value: value.to_owned(),
        expected,
    }
}

/// Parse `1`/`0`/`true`/`false` (case-insensitive).
fn parse_bool(var: &'static str, value: &str) -> FakeS3Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(var, value, "true or false")),
    }
}

/// Parse a positive integer.
fn parse_count(var: &'static str, value: &str) -> FakeS3Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(var, value, "a positive integer")),
    }
}

/// Split a comma separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
