/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! # ZipSig Rust Library
//!
//! Bundles files into a ZIP archive carrying a signed `.zipsig` manifest,
//! verifies such archives, and optionally encrypts each member with a
//! password. It provides the core functionality for the `zipsig`
//! command-line tool.
//!
//! ```text
//! sign:    files -> (encrypt) -> digest -> manifest -> RSA-PSS -> archive
//! verify:  archive -> manifest -> digest check -> signature check -> verdict
//! extract: archive -> manifest -> per-member decrypt -> plain archive
//! ```

pub mod cipher;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod processor;
pub mod signing;
pub mod time;
pub mod ui;
pub mod verification;

pub use error::SignerError;
pub use manifest::{Manifest, MemberInfo};
pub use signing::{SignRequest, SignedBundle, Signer, SourceFile};
pub use verification::{ArtifactVerifier, RejectReason, VerificationReport, Verdict};

pub const APP_NAME: &str = "ZipSig";
pub const APP_BIN_NAME: &str = "zipsig";
pub const APP_VERSION: &str = "1.0.0";
pub const APP_AUTHOR: &str = "Tiash H Kabir / @MrCarb0n";
pub const APP_ABOUT: &str =
    "Sign, verify, encrypt and extract ZIP bundles with a detached RSA-PSS manifest.";
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Reserved archive member holding the manifest.
pub const MANIFEST_NAME: &str = ".zipsig";
/// Literal written to the manifest `tool` field.
pub const TOOL_TAG: &str = "zipsig";

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
