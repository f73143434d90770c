//! Unified error types for Mooring

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Mooring operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Manifest errors
    #[error("Failed to read manifest '{path}': {source}")]
    ManifestRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse manifest '{path}': {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("Manifest validation failed: {0}")]
    ManifestValidation(String),

    #[error("Failed to serialize manifest: {0}")]
    ManifestSerialize(#[from] serde_yaml::Error),

    // Compose derivation errors
    #[error("Failed to read compose file '{path}': {source}")]
    ComposeRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse compose file '{path}': {message}")]
    ComposeParse { path: PathBuf, message: String },

    #[error("Cannot determine compose project name for '{0}'")]
    ComposeProjectName(PathBuf),

    // Settings errors
    #[error("Invalid value for {key}: '{value}' (expected {expected})")]
    InvalidSetting {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid network pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    // Runtime errors
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Runtime call '{operation}' for container '{container}' timed out after {seconds} seconds")]
    RuntimeTimeout {
        operation: &'static str,
        container: String,
        seconds: u64,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Interrupted by shutdown request")]
    Interrupted,

    // Output errors
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Mooring operations
pub type Result<T> = std::result::Result<T, Error>;
