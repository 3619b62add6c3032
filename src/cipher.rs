/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Per-member password encryption: PBKDF2-HMAC-SHA256 (100 000 rounds,
//! 16-byte salt) feeding AES-256-CBC with PKCS#7 padding and a 16-byte IV.
//! Every call draws a fresh salt and IV.

use crate::error::{CipherError, SignerError};
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;
use ring::{pbkdf2, rand::SecureRandom};
use std::num::NonZeroU32;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_PASSWORD_LEN: usize = 16;
const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Ciphertext plus the parameters needed to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMember {
    pub ciphertext: Vec<u8>,
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
}

impl EncryptedMember {
    pub fn salt_b64(&self) -> String {
        base64_engine.encode(self.salt)
    }

    pub fn iv_b64(&self) -> String {
        base64_engine.encode(self.iv)
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        &mut key[..],
    );
    key
}

pub fn encrypt_member(plaintext: &[u8], password: &str) -> Result<EncryptedMember, CipherError> {
    let rng = ring::rand::SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill(&mut salt).map_err(|_| CipherError::Rng)?;
    rng.fill(&mut iv).map_err(|_| CipherError::Rng)?;

    let key = derive_key(password, &salt);
    let key_bytes: &[u8; KEY_LEN] = &key;
    let ciphertext = Aes256CbcEnc::new(key_bytes.into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok(EncryptedMember {
        ciphertext,
        salt,
        iv,
    })
}

pub fn decrypt_member(
    ciphertext: &[u8],
    password: &str,
    salt: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if salt.len() != SALT_LEN {
        return Err(CipherError::InvalidSalt {
            expected: SALT_LEN,
            actual: salt.len(),
        });
    }
    let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| CipherError::InvalidIv {
        expected: IV_LEN,
        actual: iv.len(),
    })?;

    let key = derive_key(password, salt);
    let key_bytes: &[u8; KEY_LEN] = &key;
    Aes256CbcDec::new(key_bytes.into(), (&iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CipherError::BadPadding)
}

/// Decrypts using the base64 `salt` / `iv` strings stored in a manifest.
pub fn decrypt_member_b64(
    ciphertext: &[u8],
    password: &str,
    salt_b64: &str,
    iv_b64: &str,
) -> Result<Vec<u8>, CipherError> {
    let salt = base64_engine
        .decode(salt_b64)
        .map_err(|_| CipherError::Encoding("salt"))?;
    let iv = base64_engine
        .decode(iv_b64)
        .map_err(|_| CipherError::Encoding("iv"))?;
    decrypt_member(ciphertext, password, &salt, &iv)
}

/// Random password drawn from letters, digits and punctuation.
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..len)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// Encryption password rules, checked before any work starts.
pub fn validate_password(password: &str, confirmation: &str) -> Result<(), SignerError> {
    if password.is_empty() {
        return Err(SignerError::Validation(
            "An encryption password is required".into(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SignerError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password != confirmation {
        return Err(SignerError::Validation(
            "Password confirmation does not match".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let enc = encrypt_member(&data, "correct-horse-1").unwrap();
        assert_ne!(enc.ciphertext, data);
        assert_eq!(enc.ciphertext.len() % 16, 0);
        let dec = decrypt_member(&enc.ciphertext, "correct-horse-1", &enc.salt, &enc.iv).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn round_trip_empty_and_block_aligned() {
        for len in [0usize, 16, 31, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let enc = encrypt_member(&data, "pw").unwrap();
            // PKCS#7 always adds at least one byte.
            assert_eq!(enc.ciphertext.len(), (len / 16 + 1) * 16);
            let dec = decrypt_member_b64(&enc.ciphertext, "pw", &enc.salt_b64(), &enc.iv_b64())
                .unwrap();
            assert_eq!(dec, data);
        }
    }

    #[test]
    fn fresh_salt_iv_and_ciphertext_per_call() {
        let a = encrypt_member(b"same input", "same password").unwrap();
        let b = encrypt_member(b"same input", "same password").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_password_is_never_silently_accepted() {
        let data = b"secret payload".to_vec();
        let enc = encrypt_member(&data, "correct-horse-1").unwrap();
        let res = decrypt_member(&enc.ciphertext, "wrong-password", &enc.salt, &enc.iv);
        // Without a MAC a wrong key passes the padding check with ~1/256
        // probability, but it can never reproduce the plaintext.
        assert_ne!(res, Ok(data));
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let enc = encrypt_member(b"0123456789abcdef0123", "pw-pw-pw").unwrap();
        let res = decrypt_member(&enc.ciphertext[..17], "pw-pw-pw", &enc.salt, &enc.iv);
        assert_eq!(res, Err(CipherError::BadPadding));
    }

    #[test]
    fn bad_parameter_lengths_are_typed_errors() {
        assert_eq!(
            decrypt_member(&[0u8; 16], "pw", &[0u8; 8], &[0u8; 16]),
            Err(CipherError::InvalidSalt {
                expected: 16,
                actual: 8
            })
        );
        assert_eq!(
            decrypt_member(&[0u8; 16], "pw", &[0u8; 16], &[0u8; 12]),
            Err(CipherError::InvalidIv {
                expected: 16,
                actual: 12
            })
        );
        assert_eq!(
            decrypt_member_b64(&[0u8; 16], "pw", "***", "AAAA"),
            Err(CipherError::Encoding("salt"))
        );
    }

    #[test]
    fn generated_passwords_use_charset() {
        let pw = generate_password(DEFAULT_PASSWORD_LEN);
        assert_eq!(pw.len(), DEFAULT_PASSWORD_LEN);
        assert!(pw.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
        assert_ne!(pw, generate_password(DEFAULT_PASSWORD_LEN));
        assert!(validate_password(&pw, &pw).is_ok());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("", "").is_err());
        assert!(validate_password("short", "short").is_err());
        assert!(validate_password("long-enough", "long-enougH").is_err());
        assert!(validate_password("long-enough", "long-enough").is_ok());
    }
}
