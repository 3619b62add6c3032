/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! ZIP container handling: reading members, assembling signed archives,
//! integrity re-checks, and the extract / decrypt / repackage flow.

use crate::{
    cipher, crypto::CryptoEngine, error::SignerError, manifest::Manifest,
    time::MANIFEST_TIME_FORMAT, BUFFER_SIZE, MANIFEST_NAME,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use crc32fast::Hasher as Crc32;
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    io::{Cursor, Read, Write},
};
use zip::{
    write::{SimpleFileOptions, ZipWriter},
    CompressionMethod, DateTime, ZipArchive,
};

/// Members of an archive, split into the manifest and everything else.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    /// Raw bytes of the `.zipsig` member, if present
    pub manifest: Option<Vec<u8>>,
    /// Every other file member keyed by path (ordinal order)
    pub members: BTreeMap<String, Vec<u8>>,
}

impl ArchiveContents {
    /// Content digest over the non-manifest members.
    pub fn digest(&self) -> String {
        CryptoEngine::content_digest(
            self.members
                .iter()
                .map(|(path, data)| (path.as_str(), data.as_slice())),
        )
    }
}

/// Result of opening a signed archive for extraction.
#[derive(Debug)]
pub struct Extraction {
    pub manifest: Manifest,
    /// Plaintext files keyed by path, manifest excluded
    pub files: BTreeMap<String, Vec<u8>>,
    /// How many members were decrypted
    pub decrypted: usize,
}

impl Extraction {
    /// Output name used for the repackaged archive.
    pub fn suggested_name(&self) -> String {
        let creator = self.manifest.creator_id().trim();
        let stem = if creator.is_empty() { "files" } else { creator };
        format!("{}_extracted.zip", sanitize_file_stem(stem))
    }
}

/// Replaces characters that are awkward in file names.
pub fn sanitize_file_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub struct ArchiveProcessor;

impl ArchiveProcessor {
    /// Reads every file member. Directory entries are skipped.
    pub fn read_archive(bytes: &[u8]) -> Result<ArchiveContents, SignerError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut contents = ArchiveContents::default();
        let mut buf = vec![0u8; BUFFER_SIZE];

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            // The declared size is untrusted; only use it as a bounded hint.
            let mut data = Vec::with_capacity(file.size().min(BUFFER_SIZE as u64) as usize);
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }

            if name == MANIFEST_NAME {
                contents.manifest = Some(data);
            } else {
                log::trace!("Read member {} ({} bytes)", name, data.len());
                contents.members.insert(name, data);
            }
        }

        log::debug!(
            "Archive has {} members, manifest {}",
            contents.members.len(),
            if contents.manifest.is_some() {
                "present"
            } else {
                "missing"
            }
        );
        Ok(contents)
    }

    /// Writes the content members in the given order followed by the
    /// manifest, then re-reads the result to check every CRC.
    pub fn assemble(
        members: &[(String, Vec<u8>)],
        manifest: &Manifest,
    ) -> Result<Vec<u8>, SignerError> {
        let timestamp = Self::zip_datetime(manifest.timestamp());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (name, data) in members {
            Self::write_entry(&mut writer, name, data, timestamp)?;
        }
        let manifest_bytes = manifest.to_storage_bytes()?;
        Self::write_entry(&mut writer, MANIFEST_NAME, &manifest_bytes, timestamp)?;

        let bytes = writer.finish()?.into_inner();
        Self::verify_zip_integrity(&bytes)?;
        log::debug!(
            "Assembled archive: {} members + manifest, {} bytes",
            members.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Plain archive of extracted files, no manifest.
    pub fn repackage(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, SignerError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            Self::write_entry(&mut writer, name, data, None)?;
        }
        let bytes = writer.finish()?.into_inner();
        Self::verify_zip_integrity(&bytes)?;
        Ok(bytes)
    }

    /// Opens a signed archive and decrypts every member whose manifest
    /// entry marks it encrypted. Any decryption failure aborts the whole
    /// extraction.
    pub fn extract(bytes: &[u8], password: Option<&str>) -> Result<Extraction, SignerError> {
        let contents = Self::read_archive(bytes)?;
        let manifest_bytes = contents.manifest.ok_or(SignerError::ManifestMissing)?;
        let manifest = Manifest::from_storage_bytes(&manifest_bytes)?;

        let needs_password = contents
            .members
            .keys()
            .any(|path| manifest.member(path).is_some_and(|m| m.is_decryptable()));
        let password = match (needs_password, password) {
            (true, None) => return Err(SignerError::PasswordRequired),
            (true, Some(pw)) if pw.is_empty() => return Err(SignerError::PasswordRequired),
            (_, pw) => pw.unwrap_or_default(),
        };

        let results: Result<Vec<(String, Vec<u8>, bool)>, SignerError> = contents
            .members
            .into_par_iter()
            .map(|(path, data)| match manifest.member(&path) {
                Some(info) if info.is_decryptable() => {
                    let (salt, iv) = (
                        info.salt.as_deref().unwrap_or_default(),
                        info.iv.as_deref().unwrap_or_default(),
                    );
                    log::debug!("Decrypting {}", path);
                    match cipher::decrypt_member_b64(&data, password, salt, iv) {
                        Ok(plain) => Ok((path, plain, true)),
                        Err(source) => Err(SignerError::Decryption { path, source }),
                    }
                }
                _ => Ok((path, data, false)),
            })
            .collect();

        let mut files = BTreeMap::new();
        let mut decrypted = 0;
        for (path, data, was_encrypted) in results? {
            if was_encrypted {
                decrypted += 1;
            }
            files.insert(path, data);
        }
        log::info!(
            "Extracted {} files ({} decrypted)",
            files.len(),
            decrypted
        );

        Ok(Extraction {
            manifest,
            files,
            decrypted,
        })
    }

    fn write_entry<W: Write + std::io::Seek>(
        w: &mut ZipWriter<W>,
        n: &str,
        d: &[u8],
        t: Option<DateTime>,
    ) -> Result<(), SignerError> {
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        if let Some(t) = t {
            options = options.last_modified_time(t);
        }
        w.start_file(n, options)?;
        w.write_all(d)?;
        Ok(())
    }

    /// Manifest timestamp as a ZIP entry time; `None` outside the DOS range.
    fn zip_datetime(timestamp: &str) -> Option<DateTime> {
        let dt = NaiveDateTime::parse_from_str(timestamp, MANIFEST_TIME_FORMAT).ok()?;
        let year = u16::try_from(dt.year()).ok()?;
        DateTime::from_date_and_time(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
        .ok()
    }

    fn verify_zip_integrity(bytes: &[u8]) -> Result<(), SignerError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut buf = vec![0u8; BUFFER_SIZE];
        for i in 0..archive.len() {
            let mut f = archive.by_index(i)?;
            let mut hasher = Crc32::new();
            loop {
                let n = f.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let stored = f.crc32();
            let computed = hasher.finalize();
            if stored != computed {
                return Err(SignerError::Validation(format!(
                    "CRC mismatch for `{}`: stored={:#010x}, computed={:#010x}",
                    f.name(),
                    stored,
                    computed
                )));
            }
        }
        Ok(())
    }
}
