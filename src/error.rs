//! Error types for AtlasBlob
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasBlob operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid blob size: {0}")]
    InvalidSize(u64),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Declared {expected} bytes but stream carried {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    // -------------------------------------------------------------------------
    // Path Index Errors
    // -------------------------------------------------------------------------
    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Rename target is occupied: {0}")]
    Conflict(String),

    #[error("File has been deleted: {0}")]
    FileDeleted(String),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    #[error("No space for {size} bytes")]
    NoSpace { size: u64 },

    // -------------------------------------------------------------------------
    // Consistency Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
