//! Crate error taxonomy.
//!
//! Only input-level and infrastructure problems surface as `Err`:
//! an invalid `n` is fatal to the whole invocation, an encoding gap is
//! fatal to one run. Solver crashes and timeouts are *data* — they are
//! degraded to `Unknown` result records so a batch sweep never aborts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// `n` must be even and at least 2.
    #[error("invalid instance: n must be even and >= 2, got {0}")]
    InvalidInstance(u32),

    /// An encoder could not represent a constraint for this configuration.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Result-store I/O failure.
    #[error("result store: {0}")]
    Store(#[from] std::io::Error),

    /// Result (de)serialization failure.
    #[error("result serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
