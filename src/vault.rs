//! Vault (C1): a symmetric encryption facade over a single process-wide
//! master key.
//!
//! Grounded 1:1 on `src/utils/vault.py`: PBKDF2-HMAC-SHA256 with a fixed
//! salt and 100,000 iterations derives the working key; the Python original
//! used Fernet (AES-128-CBC + HMAC-SHA256) for the AEAD step. This port
//! swaps Fernet for `aes-gcm` (AES-256-GCM) — both are authenticated
//! encryption, and AES-GCM is the standard RustCrypto choice alongside the
//! `hmac`/`sha2` crates this crate already depends on for venue request
//! signing, keeping the whole crypto stack inside one ecosystem family.

use crate::error::VaultError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::Sha256;

/// Matches the Python original's static salt `b'polybot_vault_v1'` — rotation
/// requires re-encrypting every Secret row, which is deliberately out of scope.
const KDF_SALT: &[u8] = b"polybot_vault_v1";
const KDF_ITERATIONS: u32 = 100_000;
/// Prefix marking a string as one of ours; anything without it is legacy
/// plaintext (see `allow_plaintext_secrets` in Config).
const CIPHERTEXT_PREFIX: &str = "pbv1:";

pub struct Vault {
    key: Option<Key<Aes256Gcm>>,
    allow_plaintext: bool,
}

impl Vault {
    /// Derives the working key from `master_key` via PBKDF2-HMAC-SHA256.
    /// `master_key` is `None` when `POLYBOT_MASTER_KEY` is unset — the
    /// vault still constructs (paper-mode tenants may never touch secrets)
    /// but `encrypt`/`decrypt` of ciphertext-shaped input will fail.
    pub fn new(master_key: Option<&str>, allow_plaintext: bool) -> Self {
        let key = master_key.map(|mk| {
            let mut derived = [0u8; 32];
            pbkdf2::<Hmac<Sha256>>(mk.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut derived)
                .expect("pbkdf2 output length is exactly the key length");
            *Key::<Aes256Gcm>::from_slice(&derived)
        });
        Self { key, allow_plaintext }
    }

    pub fn from_env(allow_plaintext: bool) -> Self {
        Self::new(std::env::var("POLYBOT_MASTER_KEY").ok().as_deref(), allow_plaintext)
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key = self.key.as_ref().ok_or(VaultError::MissingMasterKey)?;
        Ok(Aes256Gcm::new(key))
    }

    /// `Encrypt(plaintext) -> ciphertext`. Fails if master key absent.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::DecryptionFailed)?;

        let mut payload = Vec::with_capacity(nonce.len() + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{CIPHERTEXT_PREFIX}{}", URL_SAFE_NO_PAD.encode(payload)))
    }

    /// `Decrypt(ciphertext) -> plaintext`. If `ciphertext` lacks the
    /// recognized prefix, the legacy behavior returns it unchanged; this
    /// port resolves the spec's flagged open question by gating that
    /// fallback behind `allow_plaintext` (default false — see Config).
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let Some(encoded) = ciphertext.strip_prefix(CIPHERTEXT_PREFIX) else {
            return if self.allow_plaintext {
                Ok(ciphertext.to_string())
            } else {
                Err(VaultError::NotCiphertext)
            };
        };

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| VaultError::Encoding(e.to_string()))?;
        if payload.len() < 12 {
            return Err(VaultError::DecryptionFailed);
        }
        let (nonce, ct) = payload.split_at(12);
        let cipher = self.cipher()?;
        let plaintext = cipher
            .decrypt(nonce.into(), ct)
            .map_err(|_| VaultError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|e| VaultError::Encoding(e.to_string()))
    }

    /// `GenerateMasterKey() -> string`: a fresh 32-byte URL-safe key,
    /// standalone of any existing vault instance.
    pub fn generate_master_key() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_plaintext() {
        let vault = Vault::new(Some("test-master-key"), false);
        for sample in ["", "hello world", "a-secret-api-key-1234", "unicode ☃ text"] {
            let ct = vault.encrypt(sample).unwrap();
            assert!(ct.starts_with(CIPHERTEXT_PREFIX));
            assert_eq!(vault.decrypt(&ct).unwrap(), sample);
        }
    }

    #[test]
    fn non_prefixed_input_rejected_by_default() {
        let vault = Vault::new(Some("test-master-key"), false);
        let err = vault.decrypt("plain-legacy-value").unwrap_err();
        assert!(matches!(err, VaultError::NotCiphertext));
    }

    #[test]
    fn non_prefixed_input_passes_through_when_allowed() {
        let vault = Vault::new(Some("test-master-key"), true);
        assert_eq!(vault.decrypt("plain-legacy-value").unwrap(), "plain-legacy-value");
    }

    #[test]
    fn missing_master_key_fails_encrypt() {
        let vault = Vault::new(None, true);
        assert!(matches!(vault.encrypt("x"), Err(VaultError::MissingMasterKey)));
    }

    #[test]
    fn generated_master_key_is_32_bytes() {
        let key = Vault::generate_master_key();
        let decoded = URL_SAFE_NO_PAD.decode(&key).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let vault = Vault::new(Some("test-master-key"), false);
        let mut ct = vault.encrypt("sensitive").unwrap();
        ct.push('x');
        assert!(vault.decrypt(&ct).is_err());
    }
}
