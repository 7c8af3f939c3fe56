//! Error types for the three pipeline stages.
//!
//! Every variant here describes the failure of a single item (or, for
//! [`FetchError::LinksFile`], of a whole stage's input). None of them abort
//! the run: stages turn them into [`crate::stages::ItemFailure`] entries and
//! move on to the next item.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Could not read links file '{path}': {source}")]
    LinksFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a local name from '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to start decoder '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder exited with {status}: {stderr}")]
    DecoderFailed { status: ExitStatus, stderr: String },
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image has invalid dimensions ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Resizing {width}x{height} to width {dim} leaves no rows")]
    DegenerateSize { width: u32, height: u32, dim: u32 },

    #[error("Resized height {height} is too large for an image buffer")]
    TooLarge { height: u64 },

    #[error("Failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
