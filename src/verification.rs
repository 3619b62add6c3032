/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as base64_engine, Engine};

use crate::{
    error::SignerError,
    keys::{PrivateKey, PublicKey},
    manifest::Manifest,
    processor::ArchiveProcessor,
};

/// Fixed message signed when checking possession of a private key.
pub const KEY_PROBE: &[u8] = b"test_verification_data";

/// Which payload the signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Compact canonical JSON
    Current,
    /// `creator_id + timestamp + file_hash`
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    ManifestMissing,
    Malformed(String),
    ContentModified,
    InvalidSignature,
}

impl RejectReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::ManifestMissing => "manifest-missing",
            RejectReason::Malformed(_) => "malformed",
            RejectReason::ContentModified => "content-modified",
            RejectReason::InvalidSignature => "invalid-signature",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RejectReason::ManifestMissing => format!(
                "Not a signed archive: no `{}` manifest found",
                crate::MANIFEST_NAME
            ),
            RejectReason::Malformed(detail) => format!("Malformed archive or manifest: {}", detail),
            RejectReason::ContentModified => {
                "Archive contents were modified after signing".to_string()
            }
            RejectReason::InvalidSignature => {
                "Signature does not match the manifest".to_string()
            }
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified(SignatureScheme),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    Loaded,
    DigestChecked,
    SignatureChecked,
}

fn enter(stage: VerifyStage) {
    log::debug!("verify: {:?}", stage);
}

/// Outcome of a verification run. The manifest is attached whenever it
/// could be parsed, even if the archive was rejected.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub verdict: Verdict,
    pub manifest: Option<Manifest>,
    pub computed_digest: Option<String>,
}

impl VerificationReport {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            verdict: Verdict::Rejected(reason),
            manifest: None,
            computed_digest: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.verdict, Verdict::Verified(_))
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.verdict {
            Verdict::Rejected(r) => Some(r),
            Verdict::Verified(_) => None,
        }
    }
}

/// Result of a private-key possession check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    Matched,
    NotMatched,
    Unreadable(String),
}

/// Verifies `.zipsig` signed archives.
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    pub fn verify(path: &Path) -> Result<VerificationReport, SignerError> {
        let bytes = std::fs::read(path)?;
        Ok(Self::verify_bytes(&bytes))
    }

    /// Verifies against the public key embedded in the manifest.
    pub fn verify_bytes(archive: &[u8]) -> VerificationReport {
        Self::verify_with_key(archive, None)
    }

    /// Verifies against `public_key` when given, else the embedded key.
    pub fn verify_with_key(archive: &[u8], public_key: Option<&PublicKey>) -> VerificationReport {
        let contents = match ArchiveProcessor::read_archive(archive) {
            Ok(c) => c,
            Err(e) => return VerificationReport::rejected(RejectReason::Malformed(e.to_string())),
        };
        let Some(manifest_bytes) = contents.manifest.as_deref() else {
            return VerificationReport::rejected(RejectReason::ManifestMissing);
        };
        let manifest = match Manifest::from_storage_bytes(manifest_bytes) {
            Ok(m) => m,
            Err(e) => return VerificationReport::rejected(RejectReason::Malformed(e.to_string())),
        };
        enter(VerifyStage::Loaded);

        let digest = contents.digest();
        let mut report = VerificationReport {
            verdict: Verdict::Rejected(RejectReason::ContentModified),
            manifest: None,
            computed_digest: Some(digest.clone()),
        };
        if digest != manifest.content_digest() {
            log::debug!(
                "Digest mismatch: manifest {}, computed {}",
                manifest.content_digest(),
                digest
            );
            report.manifest = Some(manifest);
            return report;
        }
        enter(VerifyStage::DigestChecked);

        let embedded;
        let key = match public_key {
            Some(k) => Some(k),
            None => {
                embedded = PublicKey::from_pem(manifest.public_key());
                match &embedded {
                    Ok(k) => Some(k),
                    Err(e) => {
                        log::debug!("Embedded public key unusable: {}", e);
                        None
                    }
                }
            }
        };

        report.verdict = match key.and_then(|k| Self::check_signature(&manifest, k)) {
            Some(scheme) => Verdict::Verified(scheme),
            None => Verdict::Rejected(RejectReason::InvalidSignature),
        };
        enter(VerifyStage::SignatureChecked);
        log::info!("Verdict: {:?}", report.verdict);

        report.manifest = Some(manifest);
        report
    }

    /// Tries the current payload, then the legacy one for V1 manifests.
    pub fn check_signature(manifest: &Manifest, key: &PublicKey) -> Option<SignatureScheme> {
        let signature = base64_engine.decode(manifest.signature().trim()).ok()?;

        if let Ok(payload) = manifest.canonical_payload() {
            if key.verify(&payload, &signature) {
                return Some(SignatureScheme::Current);
            }
        }
        if manifest.is_legacy() && key.verify(&manifest.legacy_payload(), &signature) {
            log::debug!("Signature matched legacy payload");
            return Some(SignatureScheme::Legacy);
        }
        None
    }

    /// Whether `private_pem` holds the key that produced `manifest`.
    pub fn check_private_key(manifest: &Manifest, private_pem: &str) -> KeyMatch {
        let private_key = match PrivateKey::from_pem(private_pem) {
            Ok(k) => k,
            Err(e) => return KeyMatch::Unreadable(e.to_string()),
        };
        let public_key = match PublicKey::from_pem(manifest.public_key()) {
            Ok(k) => k,
            Err(e) => return KeyMatch::Unreadable(format!("manifest public key: {}", e)),
        };
        match private_key.sign(KEY_PROBE) {
            Ok(sig) if public_key.verify(KEY_PROBE, &sig) => KeyMatch::Matched,
            Ok(_) => KeyMatch::NotMatched,
            Err(e) => KeyMatch::Unreadable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::CryptoEngine,
        keys::tests::{other_keypair, shared_keypair},
        manifest::ManifestV1,
        processor::ArchiveContents,
        signing::{SignRequest, Signer, SourceFile},
        MANIFEST_NAME,
    };
    use std::io::{Cursor, Write};
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn signed() -> crate::SignedBundle {
        let request = SignRequest::new(
            "alice",
            vec![
                SourceFile::new("a.txt", "x"),
                SourceFile::new("b/c.txt", "y"),
                SourceFile::new("d.txt", "z"),
            ],
        );
        Signer::sign_with_keypair(&request, "2024-05-01T10:20:30Z", shared_keypair()).unwrap()
    }

    fn raw_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn round_trip_verifies_with_current_scheme() {
        let bundle = signed();
        let report = ArtifactVerifier::verify_bytes(&bundle.archive);
        assert_eq!(report.verdict, Verdict::Verified(SignatureScheme::Current));
        assert_eq!(
            report.computed_digest.as_deref(),
            Some(CryptoEngine::compute_sha256(b"xyz").as_str())
        );
        assert_eq!(report.manifest.unwrap(), bundle.manifest);
    }

    #[test]
    fn tampered_member_is_content_modified() {
        let bundle = signed();
        let manifest = bundle.manifest.to_storage_bytes().unwrap();
        let tampered = raw_zip(&[
            ("a.txt", &b"X"[..]),
            ("b/c.txt", &b"y"[..]),
            ("d.txt", &b"z"[..]),
            (MANIFEST_NAME, &manifest[..]),
        ]);
        let report = ArtifactVerifier::verify_bytes(&tampered);
        assert_eq!(report.reject_reason().unwrap().code(), "content-modified");
        assert!(report.manifest.is_some());
    }

    #[test]
    fn foreign_key_is_invalid_signature() {
        let bundle = signed();
        let report =
            ArtifactVerifier::verify_with_key(&bundle.archive, Some(&other_keypair().public_key));
        assert_eq!(report.reject_reason().unwrap().code(), "invalid-signature");

        let report =
            ArtifactVerifier::verify_with_key(&bundle.archive, Some(&shared_keypair().public_key));
        assert!(report.is_verified());
    }

    #[test]
    fn missing_and_malformed_manifest() {
        let report = ArtifactVerifier::verify_bytes(&raw_zip(&[("a.txt", &b"x"[..])]));
        assert_eq!(report.reject_reason(), Some(&RejectReason::ManifestMissing));

        let report = ArtifactVerifier::verify_bytes(&raw_zip(&[
            ("a.txt", &b"x"[..]),
            (MANIFEST_NAME, &b"{oops"[..]),
        ]));
        assert_eq!(report.reject_reason().unwrap().code(), "malformed");

        let report = ArtifactVerifier::verify_bytes(b"not a zip at all");
        assert_eq!(report.reject_reason().unwrap().code(), "malformed");
    }

    #[test]
    fn legacy_manifest_uses_legacy_payload() {
        let keys = shared_keypair();
        let contents = ArchiveContents {
            manifest: None,
            members: [("a.txt".to_string(), b"x".to_vec())].into_iter().collect(),
        };
        let mut manifest = Manifest::V1(ManifestV1 {
            creator_id: "carol".into(),
            timestamp: "2023-02-03T04:05:06Z".into(),
            content_digest: contents.digest(),
            signature: String::new(),
            public_key: keys.public_key.to_pem(),
            tool: "zipsig".into(),
        });
        let sig = keys.private_key.sign(&manifest.legacy_payload()).unwrap();
        manifest.set_signature(base64_engine.encode(&sig));

        assert!(!keys
            .public_key
            .verify(&manifest.canonical_payload().unwrap(), &sig));

        let archive = raw_zip(&[
            ("a.txt", &b"x"[..]),
            (MANIFEST_NAME, &manifest.to_storage_bytes().unwrap()[..]),
        ]);
        let report = ArtifactVerifier::verify_bytes(&archive);
        assert_eq!(report.verdict, Verdict::Verified(SignatureScheme::Legacy));
    }

    #[test]
    fn structured_manifest_never_takes_legacy_path() {
        let keys = shared_keypair();
        let mut manifest = signed().manifest;
        let sig = keys.private_key.sign(&manifest.legacy_payload()).unwrap();
        manifest.set_signature(base64_engine.encode(&sig));
        assert_eq!(ArtifactVerifier::check_signature(&manifest, &keys.public_key), None);
    }

    #[test]
    fn private_key_possession() {
        let manifest = signed().manifest;
        assert_eq!(
            ArtifactVerifier::check_private_key(&manifest, &shared_keypair().private_key.to_pem()),
            KeyMatch::Matched
        );
        assert_eq!(
            ArtifactVerifier::check_private_key(&manifest, &other_keypair().private_key.to_pem()),
            KeyMatch::NotMatched
        );
        assert!(matches!(
            ArtifactVerifier::check_private_key(&manifest, "garbage"),
            KeyMatch::Unreadable(_)
        ));
    }
}
