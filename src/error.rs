//! Error types for `$ref` resolution, dereferencing and bundling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`Fetcher`](crate::Fetcher) while loading a document.
///
/// Inside a resolution session these never abort the traversal: the
/// resolver records the source as absent and the affected `$ref` is
/// reported through `on_error`.
#[derive(Debug, Error)]
pub enum FetchError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote sources are not supported: {url}")]
    RemoteDisabled { url: String },

    // Parse errors (exit code 2)
    #[error("invalid JSON in {source_id}: {source}")]
    InvalidJson {
        source_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {source_id}: {source}")]
    InvalidYaml {
        source_id: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{message}")]
    Other { message: String },
}

impl FetchError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            FetchError::FileNotFound { .. } | FetchError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            FetchError::NetworkError { .. } => 3,
            FetchError::RemoteDisabled { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors returned by the top-level [`dereference`](crate::dereference) and
/// [`bundle`](crate::bundle) calls.
///
/// Only the base document can fail a call. Anything unreachable below it
/// degrades to a pass-through `$ref` and is reported through `on_error`.
#[derive(Debug, Error)]
pub enum RefError {
    #[error("cannot resolve base document {source_id}: {source}")]
    SourceUnavailable {
        source_id: String,
        #[source]
        source: FetchError,
    },

    #[error("cannot resolve pointer {pointer} in base document {source_id}")]
    PointerUnavailable { source_id: String, pointer: String },

    #[error("output contains a circular reference at {path}")]
    Circular { path: String },
}

impl RefError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RefError::SourceUnavailable { source, .. } => source.exit_code(),
            _ => 2,
        }
    }
}
