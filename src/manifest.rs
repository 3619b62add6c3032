/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! The `.zipsig` manifest: data model, signing payloads and storage encoding.
//!
//! Two payload shapes exist. The current scheme signs a compact JSON object
//! whose keys follow [`CANONICAL_FIELD_ORDER`]. The legacy scheme, produced
//! by early releases, signs the bare concatenation
//! `creator_id + timestamp + file_hash`.
//!
//! The storage encoding is pretty-printed JSON and is never signed directly.

use crate::error::SignerError;
use serde::{Deserialize, Serialize};

/// Key order of the current-scheme signing payload. The last two keys are
/// only emitted when present.
pub const CANONICAL_FIELD_ORDER: [&str; 6] = [
    "creator_id",
    "timestamp",
    "file_hash",
    "tool",
    "file_structure",
    "encrypted",
];

/// Per-member metadata recorded in V2 manifests. Field declaration order
/// (`path, size, iv, salt, encrypted`) is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(rename = "path")]
    pub member_path: String,
    /// Plaintext length in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(
        rename = "encrypted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_encrypted: Option<bool>,
}

impl MemberInfo {
    pub fn plain(path: impl Into<String>, size: u64) -> Self {
        Self {
            member_path: path.into(),
            size,
            iv: None,
            salt: None,
            is_encrypted: None,
        }
    }

    /// True when this entry carries everything needed to decrypt the member.
    pub fn is_decryptable(&self) -> bool {
        self.is_encrypted == Some(true) && self.iv.is_some() && self.salt.is_some()
    }
}

/// Fields shared by every manifest generation, in storage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestV1 {
    pub creator_id: String,
    pub timestamp: String,
    #[serde(rename = "file_hash")]
    pub content_digest: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub public_key: String,
    pub tool: String,
}

/// Structured manifest: V1 fields plus member list and encryption flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestV2 {
    #[serde(flatten)]
    pub base: ManifestV1,
    #[serde(
        rename = "file_structure",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub member_list: Option<Vec<MemberInfo>>,
    #[serde(
        rename = "encrypted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_encrypted: Option<bool>,
}

/// A parsed or freshly built manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Legacy shape; verified against the concatenation payload.
    V1(ManifestV1),
    /// Structured shape; verified against the canonical JSON payload only.
    V2(ManifestV2),
}

/// Current-scheme payload. Field declaration order is the wire order.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    creator_id: &'a str,
    timestamp: &'a str,
    file_hash: &'a str,
    tool: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_structure: Option<&'a [MemberInfo]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted: Option<bool>,
}

impl Manifest {
    /// Unsigned V2 draft: signature and public key are empty.
    pub fn draft(
        creator_id: impl Into<String>,
        timestamp: impl Into<String>,
        content_digest: impl Into<String>,
        member_list: Vec<MemberInfo>,
        is_encrypted: Option<bool>,
    ) -> Self {
        Manifest::V2(ManifestV2 {
            base: ManifestV1 {
                creator_id: creator_id.into(),
                timestamp: timestamp.into(),
                content_digest: content_digest.into(),
                signature: String::new(),
                public_key: String::new(),
                tool: crate::TOOL_TAG.to_string(),
            },
            member_list: Some(member_list),
            is_encrypted,
        })
    }

    fn base(&self) -> &ManifestV1 {
        match self {
            Manifest::V1(m) => m,
            Manifest::V2(m) => &m.base,
        }
    }

    fn base_mut(&mut self) -> &mut ManifestV1 {
        match self {
            Manifest::V1(m) => m,
            Manifest::V2(m) => &mut m.base,
        }
    }

    pub fn creator_id(&self) -> &str {
        &self.base().creator_id
    }

    pub fn timestamp(&self) -> &str {
        &self.base().timestamp
    }

    pub fn content_digest(&self) -> &str {
        &self.base().content_digest
    }

    pub fn signature(&self) -> &str {
        &self.base().signature
    }

    pub fn public_key(&self) -> &str {
        &self.base().public_key
    }

    pub fn tool(&self) -> &str {
        &self.base().tool
    }

    pub fn member_list(&self) -> Option<&[MemberInfo]> {
        match self {
            Manifest::V1(_) => None,
            Manifest::V2(m) => m.member_list.as_deref(),
        }
    }

    pub fn is_encrypted(&self) -> Option<bool> {
        match self {
            Manifest::V1(_) => None,
            Manifest::V2(m) => m.is_encrypted,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Manifest::V1(_))
    }

    pub fn is_signed(&self) -> bool {
        !self.signature().is_empty() && !self.public_key().is_empty()
    }

    /// Looks up the member entry for `path`, if the manifest has a list.
    pub fn member(&self, path: &str) -> Option<&MemberInfo> {
        self.member_list()?.iter().find(|m| m.member_path == path)
    }

    pub(crate) fn set_signature(&mut self, signature: String) {
        self.base_mut().signature = signature;
    }

    pub(crate) fn set_public_key(&mut self, public_key: String) {
        self.base_mut().public_key = public_key;
    }

    /// Current-scheme signing payload: compact JSON, explicit key order.
    pub fn canonical_payload(&self) -> Result<Vec<u8>, SignerError> {
        let base = self.base();
        let payload = CanonicalPayload {
            creator_id: &base.creator_id,
            timestamp: &base.timestamp,
            file_hash: &base.content_digest,
            tool: &base.tool,
            file_structure: self.member_list(),
            encrypted: self.is_encrypted(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Legacy signing payload: `creator_id + timestamp + file_hash`.
    pub fn legacy_payload(&self) -> Vec<u8> {
        let base = self.base();
        let mut out = Vec::with_capacity(
            base.creator_id.len() + base.timestamp.len() + base.content_digest.len(),
        );
        out.extend_from_slice(base.creator_id.as_bytes());
        out.extend_from_slice(base.timestamp.as_bytes());
        out.extend_from_slice(base.content_digest.as_bytes());
        out
    }

    /// Bytes written as the `.zipsig` member.
    pub fn to_storage_bytes(&self) -> Result<Vec<u8>, SignerError> {
        let bytes = match self {
            Manifest::V1(m) => serde_json::to_vec_pretty(m)?,
            Manifest::V2(m) => serde_json::to_vec_pretty(m)?,
        };
        Ok(bytes)
    }

    /// Parses a stored manifest and picks the generation by field presence.
    pub fn from_storage_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let parsed: ManifestV2 = serde_json::from_slice(bytes)
            .map_err(|e| SignerError::Manifest(format!("cannot decode manifest: {}", e)))?;
        if parsed.member_list.is_none() && parsed.is_encrypted.is_none() {
            Ok(Manifest::V1(parsed.base))
        } else {
            Ok(Manifest::V2(parsed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v2() -> Manifest {
        let mut m = Manifest::draft(
            "alice",
            "2024-05-01T10:20:30Z",
            "abc123",
            vec![
                MemberInfo::plain("a.txt", 1),
                MemberInfo {
                    member_path: "b/c.txt".into(),
                    size: 5,
                    iv: Some("aXY=".into()),
                    salt: Some("c2FsdA==".into()),
                    is_encrypted: Some(true),
                },
            ],
            Some(true),
        );
        m.set_signature("c2ln".into());
        m.set_public_key("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----".into());
        m
    }

    #[test]
    fn canonical_payload_has_fixed_key_order() {
        let payload = String::from_utf8(sample_v2().canonical_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            concat!(
                r#"{"creator_id":"alice","timestamp":"2024-05-01T10:20:30Z","file_hash":"abc123","tool":"zipsig","#,
                r#""file_structure":[{"path":"a.txt","size":1},"#,
                r#"{"path":"b/c.txt","size":5,"iv":"aXY=","salt":"c2FsdA==","encrypted":true}],"#,
                r#""encrypted":true}"#
            )
        );

        let mut last = 0;
        for key in CANONICAL_FIELD_ORDER {
            let at = payload.find(&format!("\"{}\":", key)).unwrap();
            assert!(at >= last, "{} out of order", key);
            last = at;
        }
    }

    #[test]
    fn canonical_payload_excludes_signature_and_key() {
        let payload = String::from_utf8(sample_v2().canonical_payload().unwrap()).unwrap();
        assert!(!payload.contains("signature"));
        assert!(!payload.contains("public_key"));
    }

    #[test]
    fn canonical_payload_omits_absent_markers() {
        let m = Manifest::draft("bob", "2024-01-01T00:00:00Z", "ff", vec![], None);
        let payload = String::from_utf8(m.canonical_payload().unwrap()).unwrap();
        assert!(payload.ends_with(r#""tool":"zipsig","file_structure":[]}"#));
        assert!(!payload.contains("\"encrypted\""));
    }

    #[test]
    fn legacy_payload_is_plain_concatenation() {
        let m = sample_v2();
        assert_eq!(m.legacy_payload(), b"alice2024-05-01T10:20:30Zabc123".to_vec());
    }

    #[test]
    fn storage_encoding_is_pretty_and_round_trips() {
        let m = sample_v2();
        let bytes = m.to_storage_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("{\n  \"creator_id\": \"alice\",\n  \"timestamp\""));
        let sig_at = text.find("\"signature\"").unwrap();
        let tool_at = text.find("\"tool\"").unwrap();
        let list_at = text.find("\"file_structure\"").unwrap();
        assert!(sig_at < tool_at && tool_at < list_at);

        let parsed = Manifest::from_storage_bytes(&bytes).unwrap();
        assert_eq!(parsed, m);
        assert!(parsed.is_signed());
    }

    #[test]
    fn manifest_without_markers_parses_as_legacy() {
        let json = br#"{
          "creator_id": "carol",
          "timestamp": "2023-02-03T04:05:06Z",
          "file_hash": "00ff",
          "signature": "c2ln",
          "public_key": "pem",
          "tool": "zipsig"
        }"#;
        let m = Manifest::from_storage_bytes(json).unwrap();
        assert!(m.is_legacy());
        assert_eq!(m.content_digest(), "00ff");
        assert!(m.member_list().is_none());
    }

    #[test]
    fn single_marker_is_enough_for_structured() {
        let json = br#"{"creator_id":"c","timestamp":"t","file_hash":"h","signature":"s","public_key":"p","tool":"zipsig","encrypted":false}"#;
        let m = Manifest::from_storage_bytes(json).unwrap();
        assert!(!m.is_legacy());
        assert_eq!(m.is_encrypted(), Some(false));
        assert!(m.member_list().is_none());
    }

    #[test]
    fn garbage_is_a_manifest_error() {
        let err = Manifest::from_storage_bytes(b"not json").unwrap_err();
        assert!(matches!(err, SignerError::Manifest(_)));
        let err = Manifest::from_storage_bytes(br#"{"creator_id":"x"}"#).unwrap_err();
        assert!(matches!(err, SignerError::Manifest(_)));
    }

    #[test]
    fn member_lookup_and_decryptable_flag() {
        let m = sample_v2();
        assert!(!m.member("a.txt").unwrap().is_decryptable());
        assert!(m.member("b/c.txt").unwrap().is_decryptable());
        assert!(m.member("missing").is_none());
    }
}
