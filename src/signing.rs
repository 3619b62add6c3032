/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Sign path: validate, timestamp, (encrypt), digest, draft, sign, assemble.

use crate::{
    cipher,
    crypto::CryptoEngine,
    error::SignerError,
    keys::KeyPair,
    manifest::{Manifest, MemberInfo},
    processor::ArchiveProcessor,
    time::{CancelToken, TrustedClock},
    MANIFEST_NAME,
};
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine};
use rayon::prelude::*;
use std::collections::HashSet;

/// One input file: archive-relative path plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Password and its confirmation, as typed by the user.
#[derive(Clone)]
pub struct EncryptionRequest {
    pub password: String,
    pub confirmation: String,
}

impl EncryptionRequest {
    pub fn new(password: impl Into<String>, confirmation: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            confirmation: confirmation.into(),
        }
    }

    /// Confirmation equal to the password, for generated or scripted input.
    pub fn confirmed(password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            confirmation: password.clone(),
            password,
        }
    }
}

impl std::fmt::Debug for EncryptionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionRequest").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SignRequest {
    pub creator_id: String,
    pub files: Vec<SourceFile>,
    /// `Some` turns on per-member encryption.
    pub encryption: Option<EncryptionRequest>,
}

impl SignRequest {
    pub fn new(creator_id: impl Into<String>, files: Vec<SourceFile>) -> Self {
        Self {
            creator_id: creator_id.into(),
            files,
            encryption: None,
        }
    }

    pub fn with_encryption(mut self, encryption: EncryptionRequest) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Rejects bad input before any cryptographic work starts.
    pub fn validate(&self) -> Result<(), SignerError> {
        if self.creator_id.trim().is_empty() {
            return Err(SignerError::Validation("Creator ID is required".into()));
        }
        if self.files.is_empty() {
            return Err(SignerError::Validation(
                "At least one file is required".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.files.len());
        for file in &self.files {
            validate_member_path(&file.path)?;
            if !seen.insert(file.path.as_str()) {
                return Err(SignerError::Validation(format!(
                    "Duplicate member path `{}`",
                    file.path
                )));
            }
        }

        if let Some(enc) = &self.encryption {
            cipher::validate_password(&enc.password, &enc.confirmation)?;
        }
        Ok(())
    }
}

/// Relative, forward-slash, no `..`, not the manifest name.
pub fn validate_member_path(path: &str) -> Result<(), SignerError> {
    let bad = |why: &str| {
        Err(SignerError::Validation(format!(
            "Invalid member path `{}`: {}",
            path, why
        )))
    };
    if path.is_empty() {
        return bad("empty");
    }
    if path == MANIFEST_NAME {
        return bad("reserved for the signature manifest");
    }
    if path.starts_with('/') {
        return bad("must be relative");
    }
    if path.contains('\\') {
        return bad("use forward slashes");
    }
    if path.ends_with('/') {
        return bad("names a directory");
    }
    if path.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return bad("empty, `.` or `..` component");
    }
    Ok(())
}

/// Everything a signing run produces.
pub struct SignedBundle {
    pub archive: Vec<u8>,
    pub manifest: Manifest,
    /// PKCS#8 PEM of the one-off signing key.
    pub private_key_pem: String,
    /// Present only when encryption was requested.
    pub password: Option<String>,
}

impl std::fmt::Debug for SignedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedBundle")
            .field("archive_len", &self.archive.len())
            .field("manifest", &self.manifest)
            .field("encrypted", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignStage {
    Collecting,
    Hashing,
    Signing,
    Signed,
}

fn enter(stage: SignStage) {
    log::debug!("sign: {:?}", stage);
}

pub struct Signer {
    clock: TrustedClock,
}

impl Signer {
    pub fn new(clock: TrustedClock) -> Self {
        Self { clock }
    }

    /// Full signing run with a trusted timestamp and a fresh keypair.
    pub fn sign(
        &self,
        request: &SignRequest,
        cancel: &CancelToken,
    ) -> Result<SignedBundle, SignerError> {
        enter(SignStage::Collecting);
        request.validate()?;

        let timestamp = self.clock.fetch_timestamp(cancel)?;
        log::info!("Trusted timestamp: {}", timestamp);

        let keys = KeyPair::generate()?;
        Self::sign_with_keypair(request, &timestamp, &keys)
    }

    /// Signs with a caller-supplied timestamp and keypair.
    pub fn sign_with_keypair(
        request: &SignRequest,
        timestamp: &str,
        keys: &KeyPair,
    ) -> Result<SignedBundle, SignerError> {
        request.validate()?;

        let (stored, member_list) = match &request.encryption {
            Some(enc) => Self::encrypt_members(&request.files, &enc.password)?,
            None => Self::plain_members(&request.files),
        };

        enter(SignStage::Hashing);
        let digest = CryptoEngine::content_digest(
            stored.iter().map(|(p, d)| (p.as_str(), d.as_slice())),
        );
        log::debug!("Content digest: {}", digest);

        let is_encrypted = request.encryption.as_ref().map(|_| true);
        let mut manifest = Manifest::draft(
            request.creator_id.as_str(),
            timestamp,
            digest,
            member_list,
            is_encrypted,
        );

        enter(SignStage::Signing);
        let payload = manifest.canonical_payload()?;
        let signature = keys.private_key.sign(&payload)?;
        manifest.set_signature(base64_engine.encode(signature));
        manifest.set_public_key(keys.public_key.to_pem());

        let archive = ArchiveProcessor::assemble(&stored, &manifest)?;
        enter(SignStage::Signed);
        log::info!(
            "Signed {} members for `{}`",
            stored.len(),
            manifest.creator_id()
        );

        Ok(SignedBundle {
            archive,
            manifest,
            private_key_pem: keys.private_key.to_pem(),
            password: request.encryption.as_ref().map(|e| e.password.clone()),
        })
    }

    fn plain_members(files: &[SourceFile]) -> (Vec<(String, Vec<u8>)>, Vec<MemberInfo>) {
        files
            .iter()
            .map(|f| {
                (
                    (f.path.clone(), f.data.clone()),
                    MemberInfo::plain(f.path.clone(), f.data.len() as u64),
                )
            })
            .unzip()
    }

    fn encrypt_members(
        files: &[SourceFile],
        password: &str,
    ) -> Result<(Vec<(String, Vec<u8>)>, Vec<MemberInfo>), SignerError> {
        let encrypted: Vec<_> = files
            .par_iter()
            .map(|f| {
                log::debug!("Encrypting {}", f.path);
                cipher::encrypt_member(&f.data, password)
                    .map(|enc| (f, enc))
                    .map_err(|e| SignerError::Crypto(format!("{}: {}", f.path, e)))
            })
            .collect::<Result<_, _>>()?;

        Ok(encrypted
            .into_iter()
            .map(|(f, enc)| {
                let info = MemberInfo {
                    member_path: f.path.clone(),
                    size: f.data.len() as u64,
                    iv: Some(enc.iv_b64()),
                    salt: Some(enc.salt_b64()),
                    is_encrypted: Some(true),
                };
                ((f.path.clone(), enc.ciphertext), info)
            })
            .unzip())
    }
}
