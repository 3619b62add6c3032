/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Error types for signing, verification, encryption and extraction.

use std::io;

/// Comprehensive error type for all ZipSig operations.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// I/O errors during file operations
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    /// ZIP format errors during archive processing
    #[error("ZIP Error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Manifest JSON encoding errors
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input rejected before any cryptographic work started
    #[error("Validation Error: {0}")]
    Validation(String),

    /// Configuration or setup errors
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Key generation, import or export failures
    #[error("Key Error: {0}")]
    Key(String),

    /// Low-level primitive failures (RNG, signing)
    #[error("Cryptography Error: {0}")]
    Crypto(String),

    /// The manifest member exists but cannot be decoded
    #[error("Manifest Error: {0}")]
    Manifest(String),

    /// The archive has no `.zipsig` member
    #[error("Not a signed archive: manifest `{}` is missing", crate::MANIFEST_NAME)]
    ManifestMissing,

    /// Encrypted members were found but no password was supplied
    #[error("Archive contains encrypted members; a password is required")]
    PasswordRequired,

    /// A member failed to decrypt; extraction stops at the first failure
    #[error("Decryption failed for `{path}`: {source}")]
    Decryption {
        path: String,
        #[source]
        source: CipherError,
    },

    /// A single time authority attempt failed
    #[error("Time authority error: {0}")]
    TimeAuthority(String),

    /// The caller abandoned the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<ring::error::Unspecified> for SignerError {
    fn from(e: ring::error::Unspecified) -> Self {
        Self::Crypto(e.to_string())
    }
}

/// Failures of the per-member symmetric cipher.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("salt must be {expected} bytes, got {actual}")]
    InvalidSalt { expected: usize, actual: usize },

    #[error("iv must be {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("invalid base64 in `{0}` field")]
    Encoding(&'static str),

    #[error("wrong password or corrupted ciphertext")]
    BadPadding,

    #[error("random number generator failure")]
    Rng,
}
