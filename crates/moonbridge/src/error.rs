// Bridge error taxonomy.
//
// Conversion mismatches and path failures are local, recoverable conditions;
// compile and runtime failures additionally flow through the state's error
// sink. `Expired` marks a call on a host object that is already gone.

use thiserror::Error;

use crate::value::RefKey;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Source failed to compile; execution never started.
    #[error("{message}")]
    Compile { label: String, message: String },

    /// The VM aborted mid-execution.
    #[error("{0}")]
    Runtime(String),

    /// A value cannot be represented in the requested field category.
    #[error("cannot convert {from} to {to}")]
    Mismatch {
        from: &'static str,
        to: &'static str,
    },

    /// An intermediate segment of a dotted field path is not indexable.
    #[error("path '{path}' stops at '{segment}'")]
    PathNotFound { path: String, segment: String },

    /// The weak host reference behind a bridged value no longer resolves.
    #[error("host object expired")]
    Expired,

    /// A reference key that is not (or no longer) registered.
    #[error("invalid reference key {0}")]
    InvalidRef(RefKey),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
