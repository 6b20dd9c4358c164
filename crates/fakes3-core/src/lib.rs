//! Core building blocks shared by the fakes3 storage engines.
//!
//! This crate carries the pieces every engine and the service facade need
//! but which have nothing to do with object storage itself: environment
//! driven configuration, the clock abstraction used to stamp buckets and
//! objects, and the tracing subscriber setup.

mod config;
mod error;
mod logging;
mod time;

pub use config::{BackendKind, FakeS3Config, LogFormat};
pub use error::{FakeS3Error, FakeS3Result};
pub use logging::init_tracing;
pub use time::{FixedTimeSource, SystemTimeSource, TimeSource};
