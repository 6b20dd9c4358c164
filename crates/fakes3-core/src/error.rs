//! Errors raised while configuring and starting fakes3.
//!
//! Storage faults have their own type in `fakes3-storage`; this one only
//! covers what can go wrong before an engine is opened.

/// A bad setting or a failed process-level setup step.
#[derive(Debug, thiserror::Error)]
pub enum FakeS3Error {
    /// `FAKES3_BACKEND` named an engine that does not exist.
    #[error("unknown backend kind: {0} (expected memory, embedded, fs or fs-single)")]
    UnknownBackend(String),

    /// An environment variable held a value of the wrong shape.
    #[error("invalid value {value:?} for {var}: expected {expected}")]
    InvalidSetting {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// What the variable accepts.
        expected: &'static str,
    },

    /// The log filter did not parse or a subscriber was already installed.
    #[error("cannot set up tracing: {0}")]
    Tracing(String),
}

/// Result of configuration and setup steps.
pub type FakeS3Result<T> = Result<T, FakeS3Error>;
