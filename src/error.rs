//! Error taxonomy surfaced to callers (spec §6, §7).

use thiserror::Error;

/// Errors that can escape any public operation in this crate. Every variant
/// carries the offending key or name, per §7 ("every error kind... reaches
/// the caller with the offending key/name attached").
#[derive(Debug, Error)]
pub enum IgitError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("prefix {prefix} is ambiguous ({} matches)", matches.len())]
    Ambiguous { prefix: String, matches: Vec<String> },

    #[error("data corruption: object {key} hash mismatch (expected {expected}, got {actual})")]
    DataCorruption {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("value at {key} cannot be hashed deterministically")]
    UnhashableValue { key: String },

    #[error("working tree has uncommitted changes, refusing to {operation}")]
    DirtyWorkingTree { operation: &'static str },

    #[error("merge conflict at path(s): {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    #[error("no common ancestor among the given refs")]
    NoCommonAncestor,

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("unsupported variant/option: {0}")]
    UnsupportedVariant(String),

    #[error("backend I/O error on {key}")]
    BackendIo {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, IgitError>;
